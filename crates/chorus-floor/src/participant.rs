//! Participant identity: humans and autonomous personas.

use crate::config::PersonaConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a conversation participant (persona name or human session id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ParticipantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Whether a participant is a human or an autonomous persona.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantKind {
    Human,
    Persona,
}

/// A registered participant. Humans carry no timing configuration — they are
/// never rate-limited and never hold the floor (their speech is tracked via
/// the human-speaking flag instead).
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: ParticipantId,
    pub kind: ParticipantKind,
    pub config: Option<PersonaConfig>,
}

impl Participant {
    /// A persona with its timing configuration.
    pub fn persona(id: impl Into<ParticipantId>, config: PersonaConfig) -> Self {
        Self {
            id: id.into(),
            kind: ParticipantKind::Persona,
            config: Some(config),
        }
    }

    /// A human participant (identified by session id).
    pub fn human(id: impl Into<ParticipantId>) -> Self {
        Self {
            id: id.into(),
            kind: ParticipantKind::Human,
            config: None,
        }
    }
}
