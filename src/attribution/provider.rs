use crate::session::ClientId;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One attribution poll result, freshest-used client first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionSnapshot {
    pub captured_at: DateTime<Utc>,
    pub clients: Vec<ClientId>,
}

impl AttributionSnapshot {
    pub fn new(captured_at: DateTime<Utc>, clients: Vec<ClientId>) -> Self {
        Self {
            captured_at,
            clients,
        }
    }

    /// The client believed to be in the foreground
    pub fn leader(&self) -> Option<&ClientId> {
        self.clients.first()
    }

    pub fn contains(&self, client_id: &ClientId) -> bool {
        self.clients.contains(client_id)
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

/// Source of "which applications were used recently" information
///
/// Implementations:
/// - `CommandProvider`: runs an external command (xdotool, osascript, adb, ...)
/// - `ReplayProvider`: foreground lists scripted alongside a replayed session
/// - `StaticProvider`: fixed answer, also used when attribution is disabled
#[async_trait::async_trait]
pub trait AttributionProvider: Send + Sync {
    /// Clients used within `[window_start, window_end]`, most recent first
    ///
    /// May block on I/O. Errors are transient: the scheduler logs them and
    /// the open session keeps going with degraded attribution.
    async fn poll(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<ClientId>>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Provider returning the same list on every poll
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    clients: Vec<ClientId>,
}

impl StaticProvider {
    pub fn new(clients: Vec<ClientId>) -> Self {
        Self { clients }
    }

    /// Provider that never attributes anything
    pub fn disabled() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl AttributionProvider for StaticProvider {
    async fn poll(
        &self,
        _window_start: DateTime<Utc>,
        _window_end: DateTime<Utc>,
    ) -> Result<Vec<ClientId>> {
        Ok(self.clients.clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}
