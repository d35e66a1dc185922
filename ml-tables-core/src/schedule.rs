//! Pipeline execution settings

use serde::{Deserialize, Serialize};

/// Configuration for draining and parallelizing pipelines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of worker threads used by `parallel(0)`
    pub worker_threads: usize,

    /// How many indices per worker may be computed ahead of delivery
    pub window_factor: usize,

    /// Initial capacity of each column while collecting
    pub collect_capacity: usize,

    /// Default chunk size for batch stages
    pub batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get(),
            window_factor: 4,
            collect_capacity: 13,
            batch_size: 1024,
        }
    }
}

impl PipelineConfig {
    /// Resolve a requested concurrency, `0` meaning one worker per CPU
    pub fn concurrency(&self, requested: usize) -> usize {
        if requested == 0 {
            self.worker_threads.max(1)
        } else {
            requested
        }
    }

    /// Number of indices that may be in flight for `workers` workers
    pub fn window(&self, workers: usize) -> u64 {
        (workers.max(1) * self.window_factor.max(1)) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.worker_threads, num_cpus::get());
        assert_eq!(config.window_factor, 4);
        assert_eq!(config.collect_capacity, 13);
        assert_eq!(config.concurrency(3), 3);
        assert!(config.concurrency(0) >= 1);
        assert_eq!(config.window(2), 8);
    }

    #[test]
    fn test_serde_round_trip() {
        let config = PipelineConfig {
            worker_threads: 2,
            window_factor: 1,
            collect_capacity: 64,
            batch_size: 16,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(serde_json::from_str::<PipelineConfig>(&json).unwrap(), config);
    }
}
