use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identifier of a process or application recording audio
/// (package name, bundle id or process binary, depending on the platform)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ClientId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Clients currently reported as recording. Empty means the microphone is idle.
pub type RecordingSet = BTreeSet<ClientId>;

/// Build a recording set from anything that yields client ids
pub fn recording_set<I, T>(clients: I) -> RecordingSet
where
    I: IntoIterator<Item = T>,
    T: Into<ClientId>,
{
    clients.into_iter().map(Into::into).collect()
}

/// How a participant was attributed over the lifetime of its session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    /// Led every attribution snapshot it appeared in
    Foreground,
    /// Seen in at least one snapshot without always leading it
    Background,
    /// Never seen in any snapshot
    Inactive,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Classification::Foreground => "FOREGROUND",
            Classification::Background => "BACKGROUND",
            Classification::Inactive => "INACTIVE",
        };
        f.write_str(label)
    }
}

/// A single participant of a sealed session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub client_id: ClientId,

    /// Human-readable name, falls back to the client id
    pub display_name: String,

    pub classification: Classification,
}

/// Immutable summary of a sealed recording session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Monotonic session sequence number
    pub id: u64,

    /// Display name of the primary participant
    pub app_name: String,

    /// When the microphone became busy
    pub started_at: DateTime<Utc>,

    /// When the microphone became idle again
    pub ended_at: DateTime<Utc>,

    /// `ended_at - started_at`, never negative
    pub duration_ms: u64,

    /// Every client observed during the session, in first-observed order
    pub participants: Vec<ParticipantRecord>,

    /// Number of attribution snapshots folded into the session
    pub attribution_samples: usize,

    /// Most recent attribution snapshot received while the session was open
    pub last_attribution: Vec<ClientId>,
}

impl SessionRecord {
    pub fn participant(&self, client_id: &ClientId) -> Option<&ParticipantRecord> {
        self.participants.iter().find(|p| &p.client_id == client_id)
    }

    pub fn classification_of(&self, client_id: &ClientId) -> Option<Classification> {
        self.participant(client_id).map(|p| p.classification)
    }
}
