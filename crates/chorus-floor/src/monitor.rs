//! Speech activity intake — turns raw per-channel started/stopped signals
//! into the single aggregate human-speaking flag the arbiter cares about.
//!
//! One speech activity monitor instance exists per audio channel (external
//! collaborator). Events may arrive duplicated or slightly out of order
//! across channels; each channel's own events are ordered. The tracker is
//! deliberately tolerant: duplicates are idempotent, a `stopped` with no
//! matching `started` is a logged no-op, and malformed sequences never raise.

use crate::arbiter::FloorHandle;
use crate::participant::ParticipantKind;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Wire shape consumed from a Speech Activity Monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechActivityEvent {
    pub channel_id: String,
    pub event: SpeechSignal,
    /// Monitor-local timestamp (seconds). Carried for logging/diagnostics;
    /// arbitration uses its own monotonic clock.
    pub timestamp: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechSignal {
    Started,
    Stopped,
}

/// Pure per-channel speaking tracker. Feeding it an event yields the new
/// aggregate human-speaking value only when the aggregate actually changed.
#[derive(Debug)]
pub struct ActivityTracker {
    /// channel id -> participant kind behind that channel.
    channels: HashMap<String, ParticipantKind>,
    speaking_humans: HashSet<String>,
}

impl ActivityTracker {
    pub fn new(channels: HashMap<String, ParticipantKind>) -> Self {
        Self {
            channels,
            speaking_humans: HashSet::new(),
        }
    }

    /// Apply one event. Returns `Some(flag)` when the aggregate
    /// human-speaking flag transitioned, `None` otherwise.
    pub fn apply(&mut self, event: &SpeechActivityEvent) -> Option<bool> {
        let kind = match self.channels.get(&event.channel_id) {
            Some(k) => *k,
            None => {
                warn!(
                    "activity event for unregistered channel {:?} dropped",
                    event.channel_id
                );
                return None;
            }
        };
        // Persona self-output channels are tracked by their own schedulers;
        // they never drive the human-speaking flag.
        if kind != ParticipantKind::Human {
            return None;
        }

        let was_speaking = !self.speaking_humans.is_empty();
        match event.event {
            SpeechSignal::Started => {
                if !self.speaking_humans.insert(event.channel_id.clone()) {
                    debug!("duplicate started on {:?} ignored", event.channel_id);
                }
            }
            SpeechSignal::Stopped => {
                if !self.speaking_humans.remove(&event.channel_id) {
                    // Stopped without a prior started: tolerated, logged.
                    debug!(
                        "stopped with no matching started on {:?} (t={:.3})",
                        event.channel_id, event.timestamp
                    );
                }
            }
        }
        let now_speaking = !self.speaking_humans.is_empty();
        (now_speaking != was_speaking).then_some(now_speaking)
    }

    pub fn any_human_speaking(&self) -> bool {
        !self.speaking_humans.is_empty()
    }
}

/// Intake loop: consume activity events and forward aggregate transitions to
/// the arbiter. Ends when the event stream closes or the session shuts down.
pub async fn run_activity_intake(
    channels: HashMap<String, ParticipantKind>,
    mut events: mpsc::Receiver<SpeechActivityEvent>,
    handle: FloorHandle,
) {
    let mut tracker = ActivityTracker::new(channels);
    info!("activity intake started");
    while let Some(event) = events.recv().await {
        if let Some(speaking) = tracker.apply(&event) {
            if handle.human_speech(speaking).await.is_err() {
                debug!("activity intake: session closed");
                break;
            }
        }
    }
    info!("activity intake stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels() -> HashMap<String, ParticipantKind> {
        HashMap::from([
            ("mic-0".to_string(), ParticipantKind::Human),
            ("mic-1".to_string(), ParticipantKind::Human),
            ("persona-alba".to_string(), ParticipantKind::Persona),
        ])
    }

    fn ev(channel: &str, event: SpeechSignal, timestamp: f64) -> SpeechActivityEvent {
        SpeechActivityEvent {
            channel_id: channel.to_string(),
            event,
            timestamp,
        }
    }

    #[test]
    fn aggregate_transitions_only() {
        let mut tracker = ActivityTracker::new(channels());

        assert_eq!(tracker.apply(&ev("mic-0", SpeechSignal::Started, 0.0)), Some(true));
        // A second human joining in does not re-transition.
        assert_eq!(tracker.apply(&ev("mic-1", SpeechSignal::Started, 0.1)), None);
        assert_eq!(tracker.apply(&ev("mic-0", SpeechSignal::Stopped, 0.5)), None);
        // Last speaking human stops: transition back.
        assert_eq!(tracker.apply(&ev("mic-1", SpeechSignal::Stopped, 0.6)), Some(false));
    }

    #[test]
    fn duplicates_are_idempotent() {
        let mut tracker = ActivityTracker::new(channels());
        assert_eq!(tracker.apply(&ev("mic-0", SpeechSignal::Started, 0.0)), Some(true));
        assert_eq!(tracker.apply(&ev("mic-0", SpeechSignal::Started, 0.01)), None);
        assert_eq!(tracker.apply(&ev("mic-0", SpeechSignal::Stopped, 0.5)), Some(false));
        assert_eq!(tracker.apply(&ev("mic-0", SpeechSignal::Stopped, 0.51)), None);
    }

    #[test]
    fn stopped_without_started_is_a_noop() {
        let mut tracker = ActivityTracker::new(channels());
        assert_eq!(tracker.apply(&ev("mic-0", SpeechSignal::Stopped, 0.0)), None);
        assert!(!tracker.any_human_speaking());
    }

    #[test]
    fn persona_and_unknown_channels_never_drive_the_flag() {
        let mut tracker = ActivityTracker::new(channels());
        assert_eq!(
            tracker.apply(&ev("persona-alba", SpeechSignal::Started, 0.0)),
            None
        );
        assert_eq!(tracker.apply(&ev("mystery", SpeechSignal::Started, 0.0)), None);
        assert!(!tracker.any_human_speaking());
    }

    #[test]
    fn wire_shape_round_trips() {
        let json = r#"{"channel_id":"mic-0","event":"started","timestamp":1.25}"#;
        let event: SpeechActivityEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event, SpeechSignal::Started);
        assert_eq!(event.channel_id, "mic-0");
        assert!((event.timestamp - 1.25).abs() < 1e-9);
    }
}
