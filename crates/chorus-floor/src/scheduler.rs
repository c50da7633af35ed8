//! Per-persona scheduler: the thin loop between silence detection and speech.
//!
//! Each persona runs one independent task. It waits for a turn cue from its
//! own silence-detection signal, sleeps its endpointing offset (the stagger
//! that keeps personas from colliding on the same instant — the arbiter's
//! mutual exclusion remains the correctness guarantee), makes exactly one
//! `try_acquire` call, and on a grant drives the response pipeline. Any
//! denial means doing nothing until the next cue; there is no polling.

use crate::arbiter::{FloorDecision, FloorHandle};
use crate::config::PersonaConfig;
use crate::error::FloorResult;
use crate::participant::{Participant, ParticipantId};
use crate::pipeline::{PipelineOutcome, ResponsePipeline};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A candidate turn-start condition from the persona's silence detector.
#[derive(Debug, Clone)]
pub struct TurnCue {
    pub detected_at: DateTime<Utc>,
}

impl TurnCue {
    pub fn now() -> Self {
        Self {
            detected_at: Utc::now(),
        }
    }
}

/// Scheduler state machine. `Preempted` is not a state of its own: it is the
/// transition from `Requesting` or `Speaking` straight back to `Listening`,
/// triggered only by human speech onset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Initializing,
    Listening,
    Requesting,
    Speaking,
}

/// Handle to a running persona scheduler: observe its state, await its task.
pub struct SchedulerHandle {
    pub persona: ParticipantId,
    pub state: watch::Receiver<SchedulerState>,
    pub task: JoinHandle<()>,
}

/// Spawn the scheduler task for one persona. `cues` is fed by the persona's
/// own silence-detection signal; the loop ends when it closes or the session
/// shuts down.
pub fn spawn_persona_scheduler(
    persona: ParticipantId,
    config: PersonaConfig,
    handle: FloorHandle,
    pipeline: Arc<dyn ResponsePipeline>,
    cues: mpsc::Receiver<TurnCue>,
) -> SchedulerHandle {
    let (state_tx, state_rx) = watch::channel(SchedulerState::Initializing);
    let id = persona.clone();
    let task = tokio::spawn(async move {
        if let Err(e) = run(id.clone(), config, handle, pipeline, cues, state_tx).await {
            warn!("scheduler for {} ended with error: {}", id, e);
        }
    });
    SchedulerHandle {
        persona,
        state: state_rx,
        task,
    }
}

async fn run(
    persona: ParticipantId,
    config: PersonaConfig,
    handle: FloorHandle,
    pipeline: Arc<dyn ResponsePipeline>,
    mut cues: mpsc::Receiver<TurnCue>,
    state: watch::Sender<SchedulerState>,
) -> FloorResult<()> {
    // INITIALIZING: register, then unconditionally enter LISTENING.
    handle
        .register(Participant::persona(persona.clone(), config.clone()))
        .await?;
    let offset = config.endpointing_offset();
    info!(
        "scheduler for {} listening (endpointing offset {:.1}s)",
        persona,
        offset.as_secs_f32()
    );
    let _ = state.send(SchedulerState::Listening);

    while let Some(cue) = cues.recv().await {
        debug!(
            "{}: silence cue at {} — staggering {:?}",
            persona, cue.detected_at, offset
        );
        if !offset.is_zero() {
            tokio::time::sleep(offset).await;
        }

        let _ = state.send(SchedulerState::Requesting);
        let decision = handle.try_acquire(persona.clone()).await?;
        let grant = match decision {
            FloorDecision::Granted(grant) => grant,
            FloorDecision::Denied(reason) => {
                // Expected control flow: wait for the next cue, no retries.
                debug!("{}: denied ({:?})", persona, reason);
                let _ = state.send(SchedulerState::Listening);
                continue;
            }
        };

        let _ = state.send(SchedulerState::Speaking);
        match pipeline.synthesize(&persona).await {
            Ok(mut synthesis) => {
                tokio::select! {
                    outcome = synthesis.wait() => {
                        match outcome {
                            PipelineOutcome::Completed => {
                                debug!("{}: response complete", persona);
                            }
                            PipelineOutcome::Failed(reason) => {
                                // Surfaced, not retried; the floor must still
                                // be released so it is not stranded.
                                warn!("{}: pipeline failed: {}", persona, reason);
                            }
                        }
                        handle.release(persona.clone()).await?;
                    }
                    _ = grant.preempt.cancelled() => {
                        // PREEMPTED: the arbiter already cleared the floor;
                        // stop the pipeline and go straight back to listening.
                        synthesis.cancel();
                        info!("⚡ {}: preempted, back to listening", persona);
                    }
                }
            }
            Err(e) => {
                warn!("{}: pipeline refused to start: {}", persona, e);
                handle.release(persona.clone()).await?;
            }
        }
        let _ = state.send(SchedulerState::Listening);
    }

    debug!("{}: cue stream closed, leaving session", persona);
    let _ = handle.deregister(persona).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbiter::FloorArbiter;
    use crate::config::FloorConfig;
    use crate::pipeline::PlaceholderPipeline;
    use std::time::Duration;

    async fn wait_for_state(
        rx: &mut watch::Receiver<SchedulerState>,
        wanted: SchedulerState,
    ) {
        while *rx.borrow() != wanted {
            rx.changed().await.expect("scheduler gone");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cue_leads_to_speaking_then_listening() {
        let (handle, _task) = FloorArbiter::spawn(FloorConfig::default()).unwrap();
        let (cue_tx, cue_rx) = mpsc::channel(4);
        let pipeline = Arc::new(PlaceholderPipeline::speaking_for(Duration::from_millis(500)));

        let mut sched = spawn_persona_scheduler(
            "alba".into(),
            PersonaConfig::default(),
            handle.clone(),
            pipeline,
            cue_rx,
        );

        wait_for_state(&mut sched.state, SchedulerState::Listening).await;
        cue_tx.send(TurnCue::now()).await.unwrap();
        wait_for_state(&mut sched.state, SchedulerState::Speaking).await;
        assert_eq!(
            handle.snapshot().await.unwrap().active_speaker,
            Some("alba".into())
        );

        wait_for_state(&mut sched.state, SchedulerState::Listening).await;
        assert_eq!(handle.snapshot().await.unwrap().active_speaker, None);
    }

    #[tokio::test(start_paused = true)]
    async fn pipeline_failure_still_releases_floor() {
        let (handle, _task) = FloorArbiter::spawn(FloorConfig::default()).unwrap();
        let (cue_tx, cue_rx) = mpsc::channel(4);
        let pipeline = Arc::new(PlaceholderPipeline::failing_after(
            Duration::from_millis(100),
            "synthesis backend down",
        ));

        let mut sched = spawn_persona_scheduler(
            "alba".into(),
            PersonaConfig::default(),
            handle.clone(),
            pipeline,
            cue_rx,
        );

        wait_for_state(&mut sched.state, SchedulerState::Listening).await;
        cue_tx.send(TurnCue::now()).await.unwrap();
        wait_for_state(&mut sched.state, SchedulerState::Speaking).await;
        wait_for_state(&mut sched.state, SchedulerState::Listening).await;
        assert_eq!(handle.snapshot().await.unwrap().active_speaker, None);
    }
}
