//! Agent identities - who sits in each engine seat
//!
//! Level 4 - Utilities and configuration

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};

/// Stable agent identifier within a batch
pub type AgentId = u32;

/// What an agent brings to the table
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AgentParams {
    /// Policy driven by an opaque genome blob, relayed to the adapter untouched
    Learned {
        genome: Arc<[u8]>,
        policy_config: PathBuf,
    },
    /// Network-less baseline
    Scripted,
}

/// An agent as seen by the match runner
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentIdentity {
    pub id: AgentId,
    pub name: String,
    /// Adapter the engine loads for this seat
    pub adapter_path: PathBuf,
    pub params: AgentParams,
}

impl AgentIdentity {
    pub fn learned(
        id: AgentId,
        name: impl Into<String>,
        adapter_path: impl Into<PathBuf>,
        genome: impl Into<Arc<[u8]>>,
        policy_config: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            adapter_path: adapter_path.into(),
            params: AgentParams::Learned {
                genome: genome.into(),
                policy_config: policy_config.into(),
            },
        }
    }

    pub fn scripted(id: AgentId, name: impl Into<String>, adapter_path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            name: name.into(),
            adapter_path: adapter_path.into(),
            params: AgentParams::Scripted,
        }
    }

    pub fn is_learned(&self) -> bool {
        matches!(self.params, AgentParams::Learned { .. })
    }

    /// Genome bytes, if any
    pub fn genome(&self) -> Option<&[u8]> {
        match &self.params {
            AgentParams::Learned { genome, .. } => Some(&genome[..]),
            AgentParams::Scripted => None,
        }
    }

    /// Per-seat config handed to the adapter
    ///
    /// Learned agents get `{"genome_path", "config_path"}`; scripted ones `{}`.
    pub fn config_json(&self, genome_path: Option<&Path>) -> Value {
        match (&self.params, genome_path) {
            (AgentParams::Learned { policy_config, .. }, Some(path)) => json!({
                "genome_path": path.to_string_lossy(),
                "config_path": policy_config.to_string_lossy(),
            }),
            _ => json!({}),
        }
    }
}
