//! Configuration types for match running and batch evaluation
//!
//! Level 4 - Utilities and configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How a single engine process is launched and supervised
#[derive(Clone, Debug, PartialEq)]
pub struct MatchConfig {
    /// Engine executable
    pub engine_path: PathBuf,
    /// Turn cap passed to the engine
    pub max_turns: u32,
    /// Wall-clock limit per match
    pub timeout: Duration,
    /// Where per-match artifacts are written (system temp dir when `None`)
    pub scratch_dir: Option<PathBuf>,
    /// How often the child process is polled
    pub poll_interval: Duration,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            engine_path: PathBuf::from("tycoon-engine"),
            max_turns: 1000,
            timeout: Duration::from_secs(30),
            scratch_dir: None,
            poll_interval: Duration::from_millis(20),
        }
    }
}

impl MatchConfig {
    pub fn new(engine_path: impl Into<PathBuf>) -> Self {
        Self {
            engine_path: engine_path.into(),
            ..Default::default()
        }
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Resolved scratch directory
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Weights of the fitness formula
///
/// `fitness = win_rate * win_weight (if any wins)
///          + (avg_score - avg_opponent_score) / score_divisor
///          - penalty_weight * avg_penalty`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitnessWeights {
    pub win_weight: f64,
    pub score_divisor: f64,
    pub penalty_weight: f64,
}

impl Default for FitnessWeights {
    fn default() -> Self {
        Self {
            win_weight: 1000.0,
            score_divisor: 10.0,
            penalty_weight: 5.0,
        }
    }
}

/// Configuration for batch evaluation
#[derive(Clone, Debug, PartialEq)]
pub struct EvalConfig {
    /// Run matches on a worker pool
    pub parallel: bool,
    /// Share of available cores given to the pool
    pub parallel_fraction: f64,
    pub weights: FitnessWeights,
    pub match_config: MatchConfig,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            parallel_fraction: 0.75,
            weights: FitnessWeights::default(),
            match_config: MatchConfig::default(),
        }
    }
}

impl EvalConfig {
    pub fn new(match_config: MatchConfig) -> Self {
        Self {
            match_config,
            ..Default::default()
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_parallel_fraction(mut self, fraction: f64) -> Self {
        self.parallel_fraction = fraction;
        self
    }

    pub fn with_weights(mut self, weights: FitnessWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Worker count: `max(1, floor(cores * parallel_fraction))`
    pub fn worker_threads(&self) -> usize {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        pool_size(cores, self.parallel_fraction)
    }
}

fn pool_size(cores: usize, fraction: f64) -> usize {
    let scaled = (cores as f64 * fraction).floor();
    if scaled.is_finite() && scaled >= 1.0 {
        scaled as usize
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_config_defaults() {
        let config = MatchConfig::default();
        assert_eq!(config.max_turns, 1000);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.scratch_dir.is_none());
    }

    #[test]
    fn test_match_config_builders() {
        let config = MatchConfig::new("/opt/engine")
            .with_max_turns(200)
            .with_timeout(Duration::from_millis(500))
            .with_scratch_dir("/tmp/scratch");
        assert_eq!(config.engine_path, PathBuf::from("/opt/engine"));
        assert_eq!(config.max_turns, 200);
        assert_eq!(config.scratch_dir(), PathBuf::from("/tmp/scratch"));
    }

    #[test]
    fn test_pool_size() {
        assert_eq!(pool_size(8, 0.75), 6);
        assert_eq!(pool_size(1, 0.75), 1);
        assert_eq!(pool_size(4, 0.0), 1);
        assert_eq!(pool_size(4, f64::NAN), 1);
        assert!(EvalConfig::default().worker_threads() >= 1);
    }

    #[test]
    fn test_weights_partial_json() {
        let weights: FitnessWeights = serde_json::from_str(r#"{"penalty_weight": 0.0}"#).unwrap();
        assert_eq!(weights.win_weight, 1000.0);
        assert_eq!(weights.penalty_weight, 0.0);
    }

    #[test]
    fn test_eval_config_defaults() {
        let config = EvalConfig::default();
        assert!(config.parallel);
        assert_eq!(config.parallel_fraction, 0.75);
        assert_eq!(config.weights, FitnessWeights::default());

        let config = EvalConfig::new(MatchConfig::new("/opt/engine")).with_parallel(false);
        assert!(!config.parallel);
        assert_eq!(config.match_config.engine_path, PathBuf::from("/opt/engine"));
    }
}
