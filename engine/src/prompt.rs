//! Persona prompt rendering
//!
//! Turns a character's NPC profile into the two system prompts used by a
//! conversation: the role-play prompt given to the candidate model and the
//! user-simulation prompt given to the judger. English and Chinese layouts
//! are supported; the dataset registry decides which one applies.

use std::borrow::Cow;

use sdk::errors::BenchError;
use sdk::types::NpcProfile;
use serde_json::Value;

use crate::config::Language;

/// Profile attributes every persona must provide
const PROFILE_FIELDS: [&str; 5] = [
    "name_text",
    "title",
    "description",
    "definition_text",
    "long_definition_text",
];

/// Profile values in `PROFILE_FIELDS` order
struct Persona<'a> {
    name: Cow<'a, str>,
    title: Cow<'a, str>,
    description: Cow<'a, str>,
    definition: Cow<'a, str>,
    long_definition: Cow<'a, str>,
}

impl<'a> Persona<'a> {
    fn from_profile(profile: &'a NpcProfile) -> Result<Self, BenchError> {
        let field = |key: &str| -> Result<Cow<'a, str>, BenchError> {
            match profile.get(key) {
                Some(Value::String(s)) => Ok(Cow::Borrowed(s.as_str())),
                // Scalars are rendered as their text
                Some(Value::Number(n)) => Ok(Cow::Owned(n.to_string())),
                Some(Value::Bool(b)) => Ok(Cow::Owned(b.to_string())),
                Some(_) => Err(BenchError::Prompt(format!(
                    "npc_profile field `{}` is not text",
                    key
                ))),
                None => Err(BenchError::Prompt(format!("npc_profile is missing `{}`", key))),
            }
        };

        Ok(Self {
            name: field(PROFILE_FIELDS[0])?,
            title: field(PROFILE_FIELDS[1])?,
            description: field(PROFILE_FIELDS[2])?,
            definition: field(PROFILE_FIELDS[3])?,
            long_definition: field(PROFILE_FIELDS[4])?,
        })
    }

    fn profile_block(&self, language: Language) -> String {
        let headings = match language {
            Language::En => [
                "# NPC Profile:",
                "## Name",
                "## Title",
                "## Description",
                "## Definition",
                "## Long Definition",
            ],
            Language::Zh => [
                "# NPC 角色档案:",
                "## 姓名",
                "## 称号",
                "## 描述",
                "## 定义",
                "## 长定义",
            ],
        };

        format!(
            "{}\n{}\n{}\n\n{}\n{}\n\n{}\n{}\n\n{}\n{}\n\n{}\n{}\n",
            headings[0],
            headings[1],
            self.name,
            headings[2],
            self.title,
            headings[3],
            self.description,
            headings[4],
            self.definition,
            headings[5],
            self.long_definition,
        )
    }
}

/// Render the candidate's role-play system prompt.
///
/// # Errors
///
/// Returns `BenchError::Prompt` if a persona attribute is missing, null or structured.
pub fn render_model_prompt(
    profile: &NpcProfile,
    background: &str,
    language: Language,
) -> Result<String, BenchError> {
    let persona = Persona::from_profile(profile)?;
    Ok(format!("{}\n\n{}", background, persona.profile_block(language)))
}

/// Render the judger's user-simulation system prompt.
///
/// # Errors
///
/// Returns `BenchError::Prompt` if a persona attribute is missing, null or structured.
pub fn render_judger_prompt(profile: &NpcProfile, language: Language) -> Result<String, BenchError> {
    let persona = Persona::from_profile(profile)?;
    let instructions = match language {
        Language::En => {
            "You are an AI NPC system. You need to simulate a user and interact with AI NPC. \
             For each round, You should give your response to AI NPC. It will be in a JSON format: \
             {\"winner\": \"model_a\", \"next_round_user_speaks\": \"YOUR RESPONSE AS THE SIMULATED USER\", \
             \"decision_reason\": \"None\"}.\n"
        }
        Language::Zh => {
            "你是一个 AI NPC 系统。你需要模拟一个用户并与 AI NPC 进行互动。在每一轮中，你需要对 AI NPC 给出你的响应。\
             响应格式将是一个 JSON 格式，例如：\n\
             {\"winner\": \"model_a\", \"next_round_user_speaks\": \"作为模拟用户的你的回应内容\", \"decision_reason\": \"无\"}。\n"
        }
    };
    Ok(format!("{}\n{}", persona.profile_block(language), instructions))
}
