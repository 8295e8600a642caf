//! Harness configuration - JSON file plus command-line overrides
//!
//! Level 4 - Configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use tycoon_tournament::{EvalConfig, FitnessWeights, MatchConfig};

/// Longest accepted match timeout (one day)
const MAX_TIMEOUT_SECS: f64 = 86_400.0;

/// Everything the harness needs to reach the engine and the adapters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Engine executable
    pub engine_path: PathBuf,
    /// Adapter that runs genome-driven policies
    pub learned_adapter: PathBuf,
    /// Adapter for scripted baseline opponents
    pub baseline_adapter: PathBuf,
    /// Policy configuration handed to learned agents
    pub policy_config: PathBuf,
    pub max_turns: u32,
    pub timeout_secs: f64,
    /// Checkpoint every N generations (0 disables)
    pub checkpoint_interval: u32,
    pub parallel_fraction: f64,
    pub weights: FitnessWeights,
    /// Per-match artifacts (system temp dir when unset)
    pub scratch_dir: Option<PathBuf>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            engine_path: PathBuf::from("./build/engine"),
            learned_adapter: PathBuf::from("./build/agents/policy_bridge.so"),
            baseline_adapter: PathBuf::from("./build/agents/policy_bridge.so"),
            policy_config: PathBuf::from("policy_config.txt"),
            max_turns: 1000,
            timeout_secs: 30.0,
            checkpoint_interval: 5,
            parallel_fraction: 0.75,
            weights: FitnessWeights::default(),
            scratch_dir: None,
        }
    }
}

impl HarnessConfig {
    /// Load from a JSON file; absent keys keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Default config, or the file at `path` when given
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Every required path must exist before any match is scheduled
    pub fn validate(&self) -> Result<()> {
        require_path("Engine binary", &self.engine_path)?;
        require_path("Learned-policy adapter", &self.learned_adapter)?;
        require_path("Baseline adapter", &self.baseline_adapter)?;
        require_path("Policy config", &self.policy_config)?;

        if !(self.timeout_secs.is_finite() && self.timeout_secs > 0.0) {
            anyhow::bail!("timeout_secs must be positive, got {}", self.timeout_secs);
        }
        if self.timeout_secs > MAX_TIMEOUT_SECS {
            anyhow::bail!(
                "timeout_secs must be at most {}, got {}",
                MAX_TIMEOUT_SECS,
                self.timeout_secs
            );
        }
        Ok(())
    }

    pub fn match_config(&self) -> MatchConfig {
        let mut config = MatchConfig::new(&self.engine_path)
            .with_max_turns(self.max_turns)
            .with_timeout(Duration::from_secs_f64(self.timeout_secs));
        if let Some(dir) = &self.scratch_dir {
            config = config.with_scratch_dir(dir);
        }
        config
    }

    pub fn eval_config(&self, parallel: bool) -> EvalConfig {
        EvalConfig::new(self.match_config())
            .with_parallel(parallel)
            .with_parallel_fraction(self.parallel_fraction)
            .with_weights(self.weights.clone())
    }
}

fn require_path(what: &str, path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("{} not found: {}", what, path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harness.json");
        std::fs::write(&path, r#"{"max_turns": 250, "weights": {"win_weight": 500.0}}"#).unwrap();

        let config = HarnessConfig::load(&path).unwrap();
        assert_eq!(config.max_turns, 250);
        assert_eq!(config.weights.win_weight, 500.0);
        assert_eq!(config.weights.score_divisor, 10.0);
        assert_eq!(config.checkpoint_interval, 5);
    }

    #[test]
    fn test_validate_names_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig {
            engine_path: dir.path().join("no-engine"),
            ..Default::default()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("Engine binary"));
        assert!(err.contains("no-engine"));
    }

    #[test]
    fn test_validate_accepts_existing_paths() {
        let dir = tempfile::tempdir().unwrap();
        let touch = |name: &str| {
            let p = dir.path().join(name);
            std::fs::write(&p, b"").unwrap();
            p
        };
        let config = HarnessConfig {
            engine_path: touch("engine"),
            learned_adapter: touch("learned.so"),
            baseline_adapter: touch("baseline.so"),
            policy_config: touch("policy.cfg"),
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let bad_timeout = HarnessConfig { timeout_secs: 0.0, ..config.clone() };
        assert!(bad_timeout.validate().is_err());
    }

    #[test]
    fn test_validate_caps_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let touch = |name: &str| {
            let p = dir.path().join(name);
            std::fs::write(&p, b"").unwrap();
            p
        };
        let config = HarnessConfig {
            engine_path: touch("engine"),
            learned_adapter: touch("learned.so"),
            baseline_adapter: touch("baseline.so"),
            policy_config: touch("policy.cfg"),
            ..Default::default()
        };

        let one_day = HarnessConfig { timeout_secs: MAX_TIMEOUT_SECS, ..config.clone() };
        assert!(one_day.validate().is_ok());

        for timeout_secs in [MAX_TIMEOUT_SECS + 1.0, 1e20, f64::INFINITY, f64::NAN] {
            let huge = HarnessConfig { timeout_secs, ..config.clone() };
            let err = huge.validate().unwrap_err().to_string();
            assert!(err.contains("timeout_secs"), "{err}");
        }
    }

    #[test]
    fn test_match_config_conversion() {
        let config = HarnessConfig {
            timeout_secs: 1.5,
            scratch_dir: Some(PathBuf::from("/tmp/tycoon")),
            ..Default::default()
        };
        let match_config = config.match_config();
        assert_eq!(match_config.timeout, Duration::from_millis(1500));
        assert_eq!(match_config.max_turns, 1000);
        assert_eq!(match_config.scratch_dir(), PathBuf::from("/tmp/tycoon"));

        let eval = config.eval_config(false);
        assert!(!eval.parallel);
        assert_eq!(eval.parallel_fraction, 0.75);
    }
}
