//! Error types for the core crate
//!
//! Encoding and decoding never fail; only parsing external input does.

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid snapshot JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}
