//! **The Floor Arbiter** — a state-machine actor owning the conversation state.
//!
//! A single task holds [`ConversationState`] and serves requests over a
//! message mailbox; everything else (schedulers, the activity monitor, tests)
//! talks to it through a cloneable [`FloorHandle`]. Because every mutation
//! flows through one mailbox, grants form a total order and a human-speech
//! event can never lose a race against an in-flight acquire: whichever
//! message is dequeued first wins, and the state the loser sees already
//! reflects it.

use crate::config::FloorConfig;
use crate::error::{FloorError, FloorResult};
use crate::participant::{Participant, ParticipantId};
use crate::state::{ConversationState, DenialReason, TurnDecision};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A successful acquisition: the exclusive right to speak, plus the
/// preemption signal the holder must watch while speaking.
#[derive(Debug, Clone)]
pub struct FloorGrant {
    pub persona: ParticipantId,
    pub granted_at: Instant,
    /// Cancelled by the arbiter on human speech onset, holder disconnect, or
    /// watchdog expiry. The holder must stop its pipeline when this fires.
    pub preempt: CancellationToken,
}

/// Arbiter-level decision: like [`TurnDecision`] but a grant carries the
/// live [`FloorGrant`].
#[derive(Debug)]
pub enum FloorDecision {
    Granted(FloorGrant),
    Denied(DenialReason),
}

/// Point-in-time view of the conversation state, for tests and diagnostics.
#[derive(Debug, Clone)]
pub struct FloorSnapshot {
    pub session_id: Uuid,
    pub active_speaker: Option<ParticipantId>,
    pub human_speaking: bool,
    pub taken_at: DateTime<Utc>,
}

enum ArbiterMsg {
    TryAcquire {
        persona: ParticipantId,
        reply: oneshot::Sender<FloorResult<FloorDecision>>,
    },
    Release {
        persona: ParticipantId,
    },
    HumanSpeech {
        speaking: bool,
    },
    Register {
        participant: Participant,
        reply: oneshot::Sender<FloorResult<()>>,
    },
    Deregister {
        persona: ParticipantId,
    },
    Snapshot {
        reply: oneshot::Sender<FloorSnapshot>,
    },
    Shutdown,
}

/// Cloneable handle to the arbiter actor. All methods are short, non-blocking
/// requests; a closed mailbox means the session has been torn down.
#[derive(Clone)]
pub struct FloorHandle {
    tx: mpsc::Sender<ArbiterMsg>,
}

impl FloorHandle {
    /// Request the floor. Returns a decision, never blocks on other speakers.
    pub async fn try_acquire(&self, persona: ParticipantId) -> FloorResult<FloorDecision> {
        let (reply, rx) = oneshot::channel();
        self.send(ArbiterMsg::TryAcquire { persona, reply }).await?;
        rx.await
            .map_err(|e| FloorError::ChannelReceive(e.to_string()))?
    }

    /// Give the floor back. Idempotent: a no-op if `persona` does not hold it.
    pub async fn release(&self, persona: ParticipantId) -> FloorResult<()> {
        self.send(ArbiterMsg::Release { persona }).await
    }

    /// Report the aggregate human-speaking flag (from the activity monitor).
    pub async fn human_speech(&self, speaking: bool) -> FloorResult<()> {
        self.send(ArbiterMsg::HumanSpeech { speaking }).await
    }

    pub async fn register(&self, participant: Participant) -> FloorResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(ArbiterMsg::Register { participant, reply }).await?;
        rx.await
            .map_err(|e| FloorError::ChannelReceive(e.to_string()))?
    }

    /// Remove a participant; clears the floor immediately if it held it.
    pub async fn deregister(&self, persona: ParticipantId) -> FloorResult<()> {
        self.send(ArbiterMsg::Deregister { persona }).await
    }

    pub async fn snapshot(&self) -> FloorResult<FloorSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(ArbiterMsg::Snapshot { reply }).await?;
        rx.await
            .map_err(|e| FloorError::ChannelReceive(e.to_string()))
    }

    /// Tear the session down. Outstanding grants are preempted.
    pub async fn shutdown(&self) -> FloorResult<()> {
        self.send(ArbiterMsg::Shutdown).await
    }

    async fn send(&self, msg: ArbiterMsg) -> FloorResult<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| FloorError::SessionClosed)
    }
}

/// The actor. Owns the state; nothing else can touch it.
pub struct FloorArbiter {
    session_id: Uuid,
    config: FloorConfig,
    state: ConversationState,
    /// Preemption token of the current grant, if any.
    current_grant: Option<CancellationToken>,
}

impl FloorArbiter {
    /// Validate the config and spawn the actor task. Returns the handle plus
    /// the task handle (await it after `shutdown()` for a clean teardown).
    pub fn spawn(config: FloorConfig) -> FloorResult<(FloorHandle, JoinHandle<()>)> {
        config.validate()?;
        let (tx, rx) = mpsc::channel(config.mailbox_capacity);
        let session_id = Uuid::new_v4();
        let arbiter = Self {
            session_id,
            config,
            state: ConversationState::new(),
            current_grant: None,
        };
        info!("floor arbiter started (session {})", session_id);
        let task = tokio::spawn(arbiter.run(rx));
        Ok((FloorHandle { tx }, task))
    }

    async fn run(mut self, mut rx: mpsc::Receiver<ArbiterMsg>) {
        let mut watchdog = tokio::time::interval(self.config.watchdog_tick());
        watchdog.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        watchdog.tick().await;

        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(ArbiterMsg::Shutdown) | None => break,
                    Some(msg) => self.handle(msg),
                },
                _ = watchdog.tick() => self.check_stale_holder(),
            }
        }

        // Session teardown preempts whoever is still speaking.
        if let Some(token) = self.current_grant.take() {
            token.cancel();
        }
        info!("floor arbiter stopped (session {})", self.session_id);
    }

    fn handle(&mut self, msg: ArbiterMsg) {
        match msg {
            ArbiterMsg::TryAcquire { persona, reply } => {
                let decision = self.try_acquire(persona);
                let _ = reply.send(decision);
            }
            ArbiterMsg::Release { persona } => {
                if self.state.release(&persona) {
                    self.current_grant = None;
                }
            }
            ArbiterMsg::HumanSpeech { speaking } => {
                if let Some(preempted) = self.state.set_human_speaking(speaking) {
                    self.preempt_current(&preempted, "human speech onset");
                }
            }
            ArbiterMsg::Register { participant, reply } => {
                let _ = reply.send(self.state.register(participant));
            }
            ArbiterMsg::Deregister { persona } => {
                if self.state.deregister(&persona) {
                    self.preempt_current(&persona, "holder deregistered");
                }
            }
            ArbiterMsg::Snapshot { reply } => {
                let _ = reply.send(FloorSnapshot {
                    session_id: self.session_id,
                    active_speaker: self.state.active_speaker().cloned(),
                    human_speaking: self.state.human_speaking(),
                    taken_at: Utc::now(),
                });
            }
            ArbiterMsg::Shutdown => unreachable!("handled in run()"),
        }
    }

    fn try_acquire(&mut self, persona: ParticipantId) -> FloorResult<FloorDecision> {
        let now = Instant::now();
        match self.state.try_acquire(&persona, now)? {
            TurnDecision::Granted { granted_at } => {
                let preempt = CancellationToken::new();
                self.current_grant = Some(preempt.clone());
                Ok(FloorDecision::Granted(FloorGrant {
                    persona,
                    granted_at,
                    preempt,
                }))
            }
            TurnDecision::Denied(reason) => {
                debug!("floor denied to {}: {:?}", persona, reason);
                Ok(FloorDecision::Denied(reason))
            }
        }
    }

    /// Watchdog: a floor held past the timeout means the holder crashed or
    /// disconnected without releasing. Force-clear so the floor is never
    /// permanently locked. Self-healing, not fatal.
    fn check_stale_holder(&mut self) {
        let now = Instant::now();
        if let Some(age) = self.state.holder_age(now) {
            if age >= self.config.watchdog_timeout() {
                if let Some(evicted) = self.state.force_clear() {
                    warn!(
                        "⏱️ stale holder {} evicted after {:.1}s (watchdog)",
                        evicted,
                        age.as_secs_f32()
                    );
                    if let Some(token) = self.current_grant.take() {
                        token.cancel();
                    }
                }
            }
        }
    }

    fn preempt_current(&mut self, holder: &ParticipantId, why: &str) {
        if let Some(token) = self.current_grant.take() {
            token.cancel();
            info!("floor holder {} preempted: {}", holder, why);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PersonaConfig;

    fn persona(id: &str) -> Participant {
        Participant::persona(id, PersonaConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn grant_then_other_active() {
        let (handle, task) = FloorArbiter::spawn(FloorConfig::default()).unwrap();
        handle.register(persona("alba")).await.unwrap();
        handle.register(persona("brio")).await.unwrap();

        let first = handle.try_acquire("alba".into()).await.unwrap();
        assert!(matches!(first, FloorDecision::Granted(_)));

        match handle.try_acquire("brio".into()).await.unwrap() {
            FloorDecision::Denied(DenialReason::OtherActive(holder)) => {
                assert_eq!(holder, "alba".into());
            }
            other => panic!("expected OtherActive, got {:?}", other),
        }

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn human_speech_cancels_grant_token() {
        let (handle, task) = FloorArbiter::spawn(FloorConfig::default()).unwrap();
        handle.register(persona("alba")).await.unwrap();

        let grant = match handle.try_acquire("alba".into()).await.unwrap() {
            FloorDecision::Granted(g) => g,
            other => panic!("expected grant, got {:?}", other),
        };
        assert!(!grant.preempt.is_cancelled());

        handle.human_speech(true).await.unwrap();
        grant.preempt.cancelled().await;

        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.active_speaker, None);
        assert!(snap.human_speaking);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_preempts_outstanding_grant() {
        let (handle, task) = FloorArbiter::spawn(FloorConfig::default()).unwrap();
        handle.register(persona("alba")).await.unwrap();

        let grant = match handle.try_acquire("alba".into()).await.unwrap() {
            FloorDecision::Granted(g) => g,
            other => panic!("expected grant, got {:?}", other),
        };

        handle.shutdown().await.unwrap();
        task.await.unwrap();
        assert!(grant.preempt.is_cancelled());

        // The session is gone; further requests report it closed.
        let err = handle.try_acquire("alba".into()).await.unwrap_err();
        assert!(matches!(err, FloorError::SessionClosed));
    }
}
