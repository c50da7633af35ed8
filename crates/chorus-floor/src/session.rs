//! Conversation session lifecycle: wires the arbiter, activity intake, and
//! persona schedulers together, and tears them all down at once.
//!
//! A session is created once per conversation and is memory-resident only —
//! no state survives teardown.

use crate::arbiter::{FloorArbiter, FloorHandle, FloorSnapshot};
use crate::config::{FloorConfig, PersonaConfig};
use crate::error::FloorResult;
use crate::monitor::{run_activity_intake, SpeechActivityEvent};
use crate::participant::{ParticipantId, ParticipantKind};
use crate::pipeline::ResponsePipeline;
use crate::scheduler::{spawn_persona_scheduler, SchedulerHandle, TurnCue};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

const CUE_CHANNEL_SIZE: usize = 16;
const ACTIVITY_CHANNEL_SIZE: usize = 64;

/// A live conversation session. Dropping it without calling [`shutdown`]
/// leaves tasks running until their channels close; prefer `shutdown`.
///
/// [`shutdown`]: ConversationSession::shutdown
pub struct ConversationSession {
    handle: FloorHandle,
    arbiter_task: JoinHandle<()>,
    intake_tasks: Vec<JoinHandle<()>>,
    schedulers: Vec<SchedulerHandle>,
}

impl ConversationSession {
    /// Start a session: spawns the floor arbiter.
    pub fn start(config: FloorConfig) -> FloorResult<Self> {
        let (handle, arbiter_task) = FloorArbiter::spawn(config)?;
        Ok(Self {
            handle,
            arbiter_task,
            intake_tasks: Vec::new(),
            schedulers: Vec::new(),
        })
    }

    /// Handle for direct turn-protocol access (tests, custom wiring).
    pub fn handle(&self) -> FloorHandle {
        self.handle.clone()
    }

    /// Attach a speech-activity stream. `channels` maps each monitored
    /// channel id to the kind of participant behind it. Returns the sender
    /// the Speech Activity Monitor feeds.
    pub fn attach_activity_stream(
        &mut self,
        channels: HashMap<String, ParticipantKind>,
    ) -> mpsc::Sender<SpeechActivityEvent> {
        let (tx, rx) = mpsc::channel(ACTIVITY_CHANNEL_SIZE);
        let task = tokio::spawn(run_activity_intake(channels, rx, self.handle.clone()));
        self.intake_tasks.push(task);
        tx
    }

    /// Add a persona: spawns its scheduler and returns the cue sender its
    /// silence-detection signal feeds. The scheduler registers the persona
    /// with the arbiter itself.
    pub fn add_persona(
        &mut self,
        id: impl Into<ParticipantId>,
        config: PersonaConfig,
        pipeline: Arc<dyn ResponsePipeline>,
    ) -> FloorResult<mpsc::Sender<TurnCue>> {
        config.validate()?;
        let (cue_tx, cue_rx) = mpsc::channel(CUE_CHANNEL_SIZE);
        let sched =
            spawn_persona_scheduler(id.into(), config, self.handle.clone(), pipeline, cue_rx);
        self.schedulers.push(sched);
        Ok(cue_tx)
    }

    pub async fn snapshot(&self) -> FloorResult<FloorSnapshot> {
        self.handle.snapshot().await
    }

    /// Tear the session down: stop the arbiter (preempting any outstanding
    /// grant) and end all intake and scheduler tasks. Applies to every
    /// persona simultaneously — the only terminal transition.
    pub async fn shutdown(self) {
        let _ = self.handle.shutdown().await;
        let _ = self.arbiter_task.await;
        for task in self.intake_tasks {
            task.abort();
        }
        for sched in self.schedulers {
            sched.task.abort();
        }
        info!("conversation session torn down");
    }
}
