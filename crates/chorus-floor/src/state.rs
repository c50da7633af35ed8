//! Conversation state and the core turn decision algorithm.
//!
//! `ConversationState` is the single source of truth: current floor holder,
//! the human-speaking flag, and per-persona intervention history. It is pure
//! and synchronous — no channels, no tasks, no clock of its own — so the
//! decision logic is unit-testable in isolation. The [`crate::arbiter`] actor
//! is its sole owner at runtime, which is what makes every operation here
//! appear atomic to callers.

use crate::config::PersonaConfig;
use crate::error::{FloorError, FloorResult};
use crate::participant::{Participant, ParticipantId, ParticipantKind};
use std::collections::HashMap;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of a turn request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnDecision {
    /// The requester now holds the floor.
    Granted { granted_at: Instant },
    /// The floor was not granted; the reason says when (if ever) to try again.
    Denied(DenialReason),
}

/// Why a turn request was denied. Not an error — an expected control-flow
/// outcome the scheduler handles by simply waiting for its next cue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    /// A human is currently speaking; humans always win.
    HumanSpeaking,
    /// Another persona holds the floor.
    OtherActive(ParticipantId),
    /// The requester's escalating cooldown has not elapsed yet.
    RateLimited { next_eligible: Instant },
}

/// Per-persona intervention history.
#[derive(Debug, Clone)]
struct PersonaRecord {
    config: PersonaConfig,
    last_grant: Option<Instant>,
    /// Non-decreasing within a session; increments only on a grant.
    intervention_count: u32,
}

/// The shared conversation record. Created once per session; torn down with it.
#[derive(Debug)]
pub struct ConversationState {
    active_speaker: Option<ParticipantId>,
    human_speaking: bool,
    /// When the current holder was granted the floor (for the watchdog).
    held_since: Option<Instant>,
    personas: HashMap<ParticipantId, PersonaRecord>,
    humans: Vec<ParticipantId>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self {
            active_speaker: None,
            human_speaking: false,
            held_since: None,
            personas: HashMap::new(),
            humans: Vec::new(),
        }
    }

    /// Register a participant joining the session. Re-registering a persona
    /// replaces its config but keeps its intervention history.
    pub fn register(&mut self, participant: Participant) -> FloorResult<()> {
        match participant.kind {
            ParticipantKind::Persona => {
                let config = participant.config.unwrap_or_default();
                config.validate()?;
                self.personas
                    .entry(participant.id.clone())
                    .and_modify(|r| r.config = config.clone())
                    .or_insert(PersonaRecord {
                        config,
                        last_grant: None,
                        intervention_count: 0,
                    });
                debug!("participant registered: persona {}", participant.id);
            }
            ParticipantKind::Human => {
                if !self.humans.contains(&participant.id) {
                    self.humans.push(participant.id.clone());
                }
                debug!("participant registered: human {}", participant.id);
            }
        }
        Ok(())
    }

    /// Remove a participant. Returns `true` if it held the floor (the caller
    /// must cancel the outstanding grant — stale-holder reconciliation).
    pub fn deregister(&mut self, id: &ParticipantId) -> bool {
        self.personas.remove(id);
        self.humans.retain(|h| h != id);
        if self.active_speaker.as_ref() == Some(id) {
            warn!("floor holder {} deregistered; clearing floor", id);
            self.clear_holder();
            return true;
        }
        false
    }

    /// Set the human-speaking flag. If a persona held the floor when a human
    /// started talking, the floor is cleared immediately and the preempted
    /// holder is returned so its pipeline can be cancelled. Idempotent on
    /// repeated equal values.
    pub fn set_human_speaking(&mut self, is_speaking: bool) -> Option<ParticipantId> {
        if self.human_speaking == is_speaking {
            return None;
        }
        self.human_speaking = is_speaking;
        if is_speaking {
            let preempted = self.active_speaker.take();
            self.held_since = None;
            if let Some(ref p) = preempted {
                info!("⚡ human speech started: preempting {}", p);
            }
            preempted
        } else {
            None
        }
    }

    /// The core decision function (§ arbitration). Order encodes priority:
    /// human speech always wins; among personas, first-come-first-served with
    /// an escalating per-persona cooldown.
    pub fn try_acquire(&mut self, id: &ParticipantId, now: Instant) -> FloorResult<TurnDecision> {
        if self.human_speaking {
            return Ok(TurnDecision::Denied(DenialReason::HumanSpeaking));
        }
        if let Some(ref holder) = self.active_speaker {
            if holder != id {
                return Ok(TurnDecision::Denied(DenialReason::OtherActive(
                    holder.clone(),
                )));
            }
        }
        let record = self
            .personas
            .get_mut(id)
            .ok_or_else(|| FloorError::UnknownParticipant(id.to_string()))?;

        if let Some(last) = record.last_grant {
            let min_delay = record.config.min_delay(record.intervention_count);
            let next_eligible = last + min_delay;
            if now < next_eligible {
                return Ok(TurnDecision::Denied(DenialReason::RateLimited {
                    next_eligible,
                }));
            }
        }

        record.last_grant = Some(now);
        record.intervention_count += 1;
        self.active_speaker = Some(id.clone());
        self.held_since = Some(now);
        info!(
            "🎯 floor granted to {} (intervention #{})",
            id, record.intervention_count
        );
        Ok(TurnDecision::Granted { granted_at: now })
    }

    /// Clear the floor, but only if `id` currently holds it. Idempotent:
    /// releasing a floor you do not hold is a no-op and never mutates the
    /// grant bookkeeping. Returns whether the floor was actually cleared.
    pub fn release(&mut self, id: &ParticipantId) -> bool {
        if self.active_speaker.as_ref() == Some(id) {
            debug!("floor released by {}", id);
            self.clear_holder();
            true
        } else {
            false
        }
    }

    /// Force-clear the floor regardless of holder (watchdog recovery).
    /// Returns the evicted holder, if any.
    pub fn force_clear(&mut self) -> Option<ParticipantId> {
        let evicted = self.active_speaker.take();
        self.held_since = None;
        evicted
    }

    /// How long the current holder has held the floor.
    pub fn holder_age(&self, now: Instant) -> Option<std::time::Duration> {
        self.held_since.map(|t| now.duration_since(t))
    }

    pub fn active_speaker(&self) -> Option<&ParticipantId> {
        self.active_speaker.as_ref()
    }

    pub fn human_speaking(&self) -> bool {
        self.human_speaking
    }

    /// A persona's intervention count (for diagnostics and tests).
    pub fn intervention_count(&self, id: &ParticipantId) -> Option<u32> {
        self.personas.get(id).map(|r| r.intervention_count)
    }

    fn clear_holder(&mut self) {
        self.active_speaker = None;
        self.held_since = None;
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}
