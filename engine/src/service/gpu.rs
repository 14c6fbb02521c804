//! GPU discovery
//!
//! Free devices are found by asking `nvidia-smi` for per-device memory use.
//! A device counts as free while its used memory stays under a threshold.

use sdk::errors::BenchError;
use tokio::process::Command;
use tracing::{debug, info};

/// Memory use reported for one device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuUsage {
    pub index: u32,
    pub memory_used_mb: u64,
}

/// Parse `nvidia-smi --query-gpu=index,memory.used --format=csv,noheader,nounits`
pub fn parse_gpu_usage(output: &str) -> Result<Vec<GpuUsage>, BenchError> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let (index, used) = line.split_once(',').ok_or_else(|| {
                BenchError::Service(format!("Unexpected nvidia-smi line: {}", line))
            })?;
            let index = index.trim().parse().map_err(|e| {
                BenchError::Service(format!("Bad GPU index '{}': {}", index.trim(), e))
            })?;
            let memory_used_mb = used.trim().parse().map_err(|e| {
                BenchError::Service(format!("Bad memory value '{}': {}", used.trim(), e))
            })?;
            Ok(GpuUsage {
                index,
                memory_used_mb,
            })
        })
        .collect()
}

/// Pick the first `count` devices whose used memory is below `threshold_mb`
pub fn select_free(
    usage: &[GpuUsage],
    count: usize,
    threshold_mb: u64,
) -> Result<Vec<u32>, BenchError> {
    let free: Vec<u32> = usage
        .iter()
        .filter(|gpu| gpu.memory_used_mb < threshold_mb)
        .map(|gpu| gpu.index)
        .take(count)
        .collect();

    if free.len() < count {
        return Err(BenchError::Service(format!(
            "Requested {} free GPUs but only {} available",
            count,
            free.len()
        )));
    }
    Ok(free)
}

/// Query the local driver and return `count` free device indices
pub async fn free_gpus(count: usize, threshold_mb: u64) -> Result<Vec<u32>, BenchError> {
    let output = Command::new("nvidia-smi")
        .args([
            "--query-gpu=index,memory.used",
            "--format=csv,noheader,nounits",
        ])
        .output()
        .await
        .map_err(|e| BenchError::Service(format!("Failed to run nvidia-smi: {}", e)))?;

    if !output.status.success() {
        return Err(BenchError::Service(format!(
            "nvidia-smi exited with {}",
            output.status
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let usage = parse_gpu_usage(&stdout)?;
    debug!("GPU usage: {:?}", usage);

    let devices = select_free(&usage, count, threshold_mb)?;
    info!("Selected GPUs {:?}", devices);
    Ok(devices)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "0, 81000\n1, 3\n2, 512\n3, 40000\n";

    #[test]
    fn test_parse_gpu_usage() {
        let usage = parse_gpu_usage(SAMPLE).unwrap();
        assert_eq!(usage.len(), 4);
        assert_eq!(
            usage[1],
            GpuUsage {
                index: 1,
                memory_used_mb: 3
            }
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_gpu_usage("No devices were found").is_err());
        assert!(parse_gpu_usage("0, lots").is_err());
    }

    #[test]
    fn test_select_free_takes_lowest_indices() {
        let usage = parse_gpu_usage(SAMPLE).unwrap();
        assert_eq!(select_free(&usage, 2, 1000).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_select_free_not_enough() {
        let usage = parse_gpu_usage(SAMPLE).unwrap();
        let err = select_free(&usage, 3, 1000).unwrap_err();
        assert!(matches!(err, BenchError::Service(_)));
    }
}
