//! Error types for the floor arbitration engine.
//!
//! Denials (`HumanSpeaking`, `OtherActive`, `RateLimited`) are *not* errors —
//! they are normal decision outcomes carried in [`crate::state::TurnDecision`].
//! `FloorError` covers genuine faults: misconfiguration, wiring bugs, and a
//! torn-down session.

use thiserror::Error;

/// Result type alias for floor operations.
pub type FloorResult<T> = Result<T, FloorError>;

/// Errors that can occur in the arbitration engine.
#[derive(Error, Debug)]
pub enum FloorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown participant: {0}")]
    UnknownParticipant(String),

    #[error("Channel receive error: {0}")]
    ChannelReceive(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Session closed")]
    SessionClosed,
}
