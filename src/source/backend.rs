use crate::session::RecordingSet;
use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

/// Size of the event channel between a source and the monitor
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

/// The set of recording clients changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingEvent {
    /// Every client recording after the change (empty = microphone idle)
    pub clients: RecordingSet,

    /// When the platform reported the change
    pub at: DateTime<Utc>,
}

impl RecordingEvent {
    pub fn new(clients: RecordingSet, at: DateTime<Utc>) -> Self {
        Self { clients, at }
    }

    pub fn now(clients: RecordingSet) -> Self {
        Self::new(clients, Utc::now())
    }
}

/// Push-based source of recording-set changes
///
/// Implementations:
/// - `PactlSource`: PulseAudio / PipeWire source outputs (Linux)
/// - `ReplaySource`: scripted sessions from a JSON-lines file
/// - `ManualSource`: events pushed through a `SourceHandle` (embedding, tests)
///
/// Sources may coalesce or drop rapid transitions and may repeat a set; the
/// monitor tolerates both.
#[async_trait::async_trait]
pub trait AudioStateSource: Send + Sync {
    /// Start observing
    ///
    /// Returns a channel receiver that will receive recording events. The
    /// channel closes when the source stops or runs out of events.
    async fn start(&mut self) -> Result<mpsc::Receiver<RecordingEvent>>;

    /// Stop observing
    async fn stop(&mut self) -> Result<()>;

    /// Check if the source is currently delivering events
    fn is_running(&self) -> bool;

    /// Source name for logging
    fn name(&self) -> &str;
}
