//! # Chorus Floor — turn arbitration for multi-persona conversations
//!
//! Coordinates who may speak at any instant in a spoken conversation between
//! humans and several autonomous personas. Each persona independently watches
//! its own silence signal and would otherwise talk over everyone else; this
//! crate grants or denies the exclusive right to speak (the *floor*),
//! enforces human priority, and applies escalating per-persona backoff so no
//! persona dominates.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                    Conversation Session                        │
//! │  ┌───────────────┐   started/stopped   ┌──────────────────┐  │
//! │  │ Speech Activity│ ───────────────────→│  Activity Intake │  │
//! │  │ Monitor (ext.) │                     │  (aggregate flag)│  │
//! │  └───────────────┘                     └─────────┬────────┘  │
//! │                                                   ↓            │
//! │  ┌───────────────┐   try_acquire /     ┌──────────────────┐  │
//! │  │ Per-Persona    │ ←──────────────────→│  Floor Arbiter   │  │
//! │  │ Scheduler (×N) │   grant / deny      │  (actor + state) │  │
//! │  └───────┬───────┘                     └──────────────────┘  │
//! │          ↓ on grant              preemption via CancellationToken │
//! │  ┌───────────────┐                                            │
//! │  │ Response       │  completion/failure → release              │
//! │  │ Pipeline (ext.)│                                            │
//! │  └───────────────┘                                            │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Audio capture, VAD, STT/TTS, and language generation are external
//! collaborators behind the [`ResponsePipeline`] trait and the
//! [`SpeechActivityEvent`] wire shape.

pub mod arbiter;
pub mod config;
pub mod error;
pub mod monitor;
pub mod participant;
pub mod pipeline;
pub mod scheduler;
pub mod session;
pub mod state;

pub use arbiter::{FloorArbiter, FloorDecision, FloorGrant, FloorHandle, FloorSnapshot};
pub use config::{FloorConfig, PersonaConfig};
pub use error::{FloorError, FloorResult};
pub use monitor::{run_activity_intake, ActivityTracker, SpeechActivityEvent, SpeechSignal};
pub use participant::{Participant, ParticipantId, ParticipantKind};
pub use pipeline::{
    PipelineOutcome, PlaceholderPipeline, ResponsePipeline, SynthesisHandle, SynthesisReporter,
    UnavailablePipeline,
};
pub use scheduler::{spawn_persona_scheduler, SchedulerHandle, SchedulerState, TurnCue};
pub use session::ConversationSession;
pub use state::{ConversationState, DenialReason, TurnDecision};
