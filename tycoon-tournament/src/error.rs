//! Error types for tournament evaluation
//!
//! Level 4 - Utilities and configuration
//!
//! A failing match is not an error: it comes back as a `MatchStatus`.
//! These variants cover the harness itself breaking.

/// Error types for tournament operations
#[derive(Debug, thiserror::Error)]
pub enum TournamentError {
    #[error("Scratch artifact I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Agent config serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Worker pool construction failed: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("Invalid group size: {0}")]
    InvalidGroupSize(usize),
}
