//! Tycoon Core - state encoding and action decoding for board-game policies
//!
//! This crate provides the policy-facing half of the harness:
//! - Game state snapshot (players, properties, trade offers)
//! - State encoder with a fixed, documented feature layout
//! - Policy decoder turning raw network output into one action
//! - Scripted baseline policy and a network-driven policy wrapper

pub mod action;
pub mod baseline;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod state;

// Re-exports for convenient access
pub use action::ActionCommand;
pub use baseline::{DecodedPolicy, Policy, ScriptedPolicy};
pub use decoder::{Decision, DecisionContext, Decoder, DecoderConfig, Thresholds};
pub use encoder::{encode, Encoder, EncoderSchema, FeatureVector};
pub use error::CoreError;
pub use state::{GameStateSnapshot, PlayerState, PropertyKind, PropertyState, TradeOffer, TradeSide};
