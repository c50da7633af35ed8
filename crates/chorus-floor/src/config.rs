//! Timing configuration for personas and the arbiter.
//!
//! Per-persona timing (base cooldown, escalation increment, endpointing
//! offset) was effectively hard-coded per persona in earlier designs; lifting
//! it into explicit structs enables table-driven tests across many timing
//! configurations and wiring changes without code edits.

use crate::error::{FloorError, FloorResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_base_interval() -> f32 {
    8.0
}

fn default_escalation_increment() -> f32 {
    3.0
}

fn default_watchdog_timeout() -> f32 {
    30.0
}

fn default_watchdog_tick() -> f32 {
    1.0
}

fn default_mailbox_capacity() -> usize {
    64
}

/// Timing configuration for a single persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// Minimum cooldown between this persona's consecutive grants (default: 8s).
    #[serde(default = "default_base_interval")]
    pub base_interval_secs: f32,

    /// Added to the cooldown per prior intervention (default: 3s). Linear,
    /// never decays within a session: a persona that has already spoken
    /// several times waits progressively longer.
    #[serde(default = "default_escalation_increment")]
    pub escalation_increment_secs: f32,

    /// Stagger applied before this persona's own silence timer fires
    /// (default: 0s). Deliberately distinct per persona (e.g. 0.0 / 0.5 / 1.0)
    /// so two personas rarely detect end-of-turn in the same instant.
    #[serde(default)]
    pub endpointing_offset_secs: f32,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            base_interval_secs: default_base_interval(),
            escalation_increment_secs: default_escalation_increment(),
            endpointing_offset_secs: 0.0,
        }
    }
}

impl PersonaConfig {
    /// Cooldown required before the next grant, given the number of prior
    /// interventions: `base + count × increment`.
    pub fn min_delay(&self, intervention_count: u32) -> Duration {
        let secs =
            self.base_interval_secs + intervention_count as f32 * self.escalation_increment_secs;
        Duration::from_secs_f32(secs.max(0.0))
    }

    /// The endpointing stagger as a `Duration`.
    pub fn endpointing_offset(&self) -> Duration {
        Duration::from_secs_f32(self.endpointing_offset_secs.max(0.0))
    }

    /// All timing fields must be non-negative.
    pub fn validate(&self) -> FloorResult<()> {
        for (name, v) in [
            ("base_interval_secs", self.base_interval_secs),
            ("escalation_increment_secs", self.escalation_increment_secs),
            ("endpointing_offset_secs", self.endpointing_offset_secs),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(FloorError::Config(format!(
                    "{} must be a non-negative number, got {}",
                    name, v
                )));
            }
        }
        Ok(())
    }
}

/// Configuration for the floor arbiter itself.
///
/// | Env | Default | Description |
/// |-----|---------|-------------|
/// | CHORUS_WATCHDOG_TIMEOUT_SECS | 30.0 | Clear a floor held longer than this (stale holder). |
/// | CHORUS_WATCHDOG_TICK_SECS | 1.0 | How often the watchdog checks. |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloorConfig {
    /// Floor held longer than this is considered stale and force-cleared.
    #[serde(default = "default_watchdog_timeout")]
    pub watchdog_timeout_secs: f32,

    /// Watchdog check interval.
    #[serde(default = "default_watchdog_tick")]
    pub watchdog_tick_secs: f32,

    /// Capacity of the arbiter's message mailbox.
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
}

impl Default for FloorConfig {
    fn default() -> Self {
        Self {
            watchdog_timeout_secs: default_watchdog_timeout(),
            watchdog_tick_secs: default_watchdog_tick(),
            mailbox_capacity: default_mailbox_capacity(),
        }
    }
}

impl FloorConfig {
    /// Load from environment. Unset or invalid => defaults (see struct docs).
    pub fn from_env() -> Self {
        Self {
            watchdog_timeout_secs: env_f32("CHORUS_WATCHDOG_TIMEOUT_SECS", default_watchdog_timeout()),
            watchdog_tick_secs: env_f32("CHORUS_WATCHDOG_TICK_SECS", default_watchdog_tick()),
            mailbox_capacity: default_mailbox_capacity(),
        }
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_secs_f32(self.watchdog_timeout_secs.max(0.0))
    }

    pub fn watchdog_tick(&self) -> Duration {
        Duration::from_secs_f32(self.watchdog_tick_secs.max(0.0))
    }

    pub fn validate(&self) -> FloorResult<()> {
        if !self.watchdog_timeout_secs.is_finite() || self.watchdog_timeout_secs <= 0.0 {
            return Err(FloorError::Config(format!(
                "watchdog_timeout_secs must be positive, got {}",
                self.watchdog_timeout_secs
            )));
        }
        if !self.watchdog_tick_secs.is_finite() || self.watchdog_tick_secs <= 0.0 {
            return Err(FloorError::Config(format!(
                "watchdog_tick_secs must be positive, got {}",
                self.watchdog_tick_secs
            )));
        }
        if self.mailbox_capacity == 0 {
            return Err(FloorError::Config(
                "mailbox_capacity must be nonzero".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_f32(name: &str, default: f32) -> f32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<f32>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persona_config_defaults() {
        let c = PersonaConfig::default();
        assert!((c.base_interval_secs - 8.0).abs() < 1e-6);
        assert!((c.escalation_increment_secs - 3.0).abs() < 1e-6);
        assert!((c.endpointing_offset_secs - 0.0).abs() < 1e-6);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn min_delay_escalates_linearly() {
        let c = PersonaConfig {
            base_interval_secs: 8.0,
            escalation_increment_secs: 3.0,
            endpointing_offset_secs: 0.0,
        };
        assert_eq!(c.min_delay(0), Duration::from_secs(8));
        assert_eq!(c.min_delay(3), Duration::from_secs(17));
    }

    #[test]
    fn negative_timing_rejected() {
        let c = PersonaConfig {
            base_interval_secs: -1.0,
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn floor_config_validation() {
        assert!(FloorConfig::default().validate().is_ok());

        let mut c = FloorConfig::default();
        c.mailbox_capacity = 0;
        assert!(c.validate().is_err());

        let mut c = FloorConfig::default();
        c.watchdog_timeout_secs = 0.0;
        assert!(c.validate().is_err());
    }
}
