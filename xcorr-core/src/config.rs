//! Correlator configuration, serializable so drivers can keep it in a file.

use serde::{Deserialize, Serialize};

/// Default cap on the overlap-save chunk size.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 1 << 20;

/// Alignment quantum, in samples, the wrap-around region must respect in strict mode.
pub const ALIGNMENT_QUANTUM: usize = 64;

/// How windows are distributed over threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Strategy {
    /// One thread walks every window.
    Sequential,
    /// Windows are dealt round-robin to a fixed set of workers.
    /// `None` uses the transform engine's thread count.
    WorkerPartitioned { workers: Option<usize> },
    /// Reference and first data transform run on two threads, the rest serially.
    PairedTransform,
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::WorkerPartitioned { workers: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelatorConfig {
    /// Upper bound for the chunk size; the chunk is never smaller than twice the reference.
    pub max_chunk_size: usize,
    pub strategy: Strategy,
    /// Reject chunk sizes whose wrap-around region is not a multiple of [`ALIGNMENT_QUANTUM`].
    pub alignment_strict: bool,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            strategy: Strategy::default(),
            alignment_strict: true,
        }
    }
}

impl CorrelatorConfig {
    pub fn with_max_chunk_size(mut self, max_chunk_size: usize) -> Self {
        self.max_chunk_size = max_chunk_size;
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_alignment_strict(mut self, strict: bool) -> Self {
        self.alignment_strict = strict;
        self
    }
}

/// Chunk size for a reference of `reference_length` and data of `data_length` samples.
///
/// Large enough that the `reference_length` wasted wrap-around samples are amortized
/// over a useful window, never larger than the data or the cap unless the reference
/// itself forces it.
pub fn chunk_size(reference_length: usize, data_length: usize, max_chunk_size: usize) -> usize {
    (2 * reference_length).max(data_length.min(max_chunk_size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_size_policy() {
        assert_eq!(chunk_size(100, 10_000, 1024), 1024);
        assert_eq!(chunk_size(100, 500, 1024), 500);
        assert_eq!(chunk_size(600, 1000, 1024), 1200);
        assert_eq!(chunk_size(4, 10, DEFAULT_MAX_CHUNK_SIZE), 10);
    }

    #[test]
    fn test_config_json_defaults_fill_missing_fields() {
        let config: CorrelatorConfig =
            serde_json::from_str(r#"{ "max_chunk_size": 4096 }"#).unwrap();
        assert_eq!(config.max_chunk_size, 4096);
        assert!(config.alignment_strict);
        assert_eq!(config.strategy, Strategy::WorkerPartitioned { workers: None });
    }

    #[test]
    fn test_strategy_json_shape() {
        let strategy = Strategy::WorkerPartitioned { workers: Some(3) };
        let json = serde_json::to_string(&strategy).unwrap();
        assert_eq!(json, r#"{"kind":"worker_partitioned","workers":3}"#);
        let parsed: Strategy = serde_json::from_str(r#"{"kind":"sequential"}"#).unwrap();
        assert_eq!(parsed, Strategy::Sequential);
    }
}
