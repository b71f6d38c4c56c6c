//! Process resource sampling (CPU time and resident memory)

use serde::{Deserialize, Serialize};

/// Kernel clock ticks per second used by `/proc/self/stat`
#[cfg(target_os = "linux")]
const CLOCK_TICKS_PER_SEC: f64 = 100.0;

/// Point-in-time resource snapshot of the current process
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    /// User plus system CPU time consumed so far, in seconds
    pub cpu_seconds: f64,
    /// Resident set size, in MB
    pub memory_mb: f64,
}

/// Resource deltas over one call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub cpu_seconds: f64,
    pub memory_delta_mb: f64,
    pub final_memory_mb: f64,
}

impl ResourceUsage {
    pub fn between(start: &ResourceSample, end: &ResourceSample) -> Self {
        Self {
            cpu_seconds: end.cpu_seconds - start.cpu_seconds,
            memory_delta_mb: end.memory_mb - start.memory_mb,
            final_memory_mb: end.memory_mb,
        }
    }
}

/// Source of resource snapshots.
///
/// Returning `None` disables the resource fields for the call being measured.
pub trait ResourceSampler: Send + Sync {
    fn sample(&self) -> Option<ResourceSample>;
}

/// Samples the current process through procfs
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessSampler;

impl ProcessSampler {
    pub fn new() -> Self {
        Self
    }

    #[cfg(target_os = "linux")]
    fn cpu_seconds() -> Option<f64> {
        let stat = std::fs::read_to_string("/proc/self/stat").ok()?;
        parse_cpu_seconds(&stat)
    }

    #[cfg(target_os = "linux")]
    fn memory_mb() -> Option<f64> {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        parse_rss_mb(&status)
    }
}

impl ResourceSampler for ProcessSampler {
    #[cfg(target_os = "linux")]
    fn sample(&self) -> Option<ResourceSample> {
        Some(ResourceSample {
            cpu_seconds: Self::cpu_seconds()?,
            memory_mb: Self::memory_mb()?,
        })
    }

    #[cfg(not(target_os = "linux"))]
    fn sample(&self) -> Option<ResourceSample> {
        None
    }
}

/// `utime + stime` from a `/proc/<pid>/stat` line, in seconds
#[cfg(target_os = "linux")]
fn parse_cpu_seconds(stat: &str) -> Option<f64> {
    // The command name may contain spaces, so skip past its closing paren
    let rest = &stat[stat.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();

    // Fields after the command start at `state` (3rd overall); utime is 14th, stime 15th
    let utime: f64 = fields.get(11)?.parse().ok()?;
    let stime: f64 = fields.get(12)?.parse().ok()?;

    Some((utime + stime) / CLOCK_TICKS_PER_SEC)
}

/// `VmRSS` from `/proc/<pid>/status`, in MB
#[cfg(target_os = "linux")]
fn parse_rss_mb(status: &str) -> Option<f64> {
    status
        .lines()
        .find(|line| line.starts_with("VmRSS:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<f64>().ok())
        .map(|kb| kb / 1024.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_between_samples() {
        let start = ResourceSample {
            cpu_seconds: 1.5,
            memory_mb: 100.0,
        };
        let end = ResourceSample {
            cpu_seconds: 2.0,
            memory_mb: 96.0,
        };

        let usage = ResourceUsage::between(&start, &end);
        assert_eq!(usage.cpu_seconds, 0.5);
        assert_eq!(usage.memory_delta_mb, -4.0);
        assert_eq!(usage.final_memory_mb, 96.0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_parse_proc_stat() {
        let stat = "4242 (my (odd) prog) S 1 4242 4242 0 -1 4194560 500 0 0 0 250 50 0 0 20 0 1 0";
        assert_eq!(parse_cpu_seconds(stat), Some(3.0));
        assert_eq!(parse_cpu_seconds("garbage"), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_parse_proc_status() {
        let status = "Name:\tcalltrace\nVmPeak:\t  9000 kB\nVmRSS:\t    2048 kB\nThreads:\t1\n";
        assert_eq!(parse_rss_mb(status), Some(2.0));
        assert_eq!(parse_rss_mb("Name:\tx\n"), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_process_sampler_reads_procfs() {
        let sample = ProcessSampler::new().sample().expect("procfs sample");
        assert!(sample.cpu_seconds >= 0.0);
        assert!(sample.memory_mb > 0.0);
    }
}
