//! Tycoon Tournament - Fitness evaluation through engine matches
//!
//! This crate provides tournament infrastructure:
//! - Agent identities and per-seat engine configuration
//! - Match running against an external engine process, with timeouts
//! - Grouped and flat batch formats on a bounded worker pool
//! - Fitness aggregation and per-generation summaries
//!
//! ## Architecture (4-layer granularity)
//!
//! - Level 1: evaluate_batch, evaluate_flat (orchestration)
//! - Level 2: run_tasks, aggregate (phases)
//! - Level 3: run_match, form_groups, compute_fitness (steps)
//! - Level 4: agents, session, configuration, errors

mod agent;
mod config;
mod error;
mod fitness;
mod match_runner;
mod session;
mod tournament;

pub use agent::{AgentId, AgentIdentity, AgentParams};
pub use config::{EvalConfig, FitnessWeights, MatchConfig};
pub use error::TournamentError;
pub use fitness::{compute_fitness, FitnessRecord, GenerationSummary};
pub use match_runner::{parse_result_line, MatchResult, MatchRunner, MatchStatus, ParsedResult};
pub use session::EvalSession;
pub use tournament::{form_groups, BatchReport, Group, MatchTask, Seat, TournamentEvaluator};
