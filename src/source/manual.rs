use super::backend::{AudioStateSource, RecordingEvent, EVENT_CHANNEL_CAPACITY};
use crate::session::RecordingSet;
use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::info;

type SharedSender = Arc<Mutex<Option<mpsc::Sender<RecordingEvent>>>>;

fn lock(sender: &SharedSender) -> MutexGuard<'_, Option<mpsc::Sender<RecordingEvent>>> {
    sender.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Source fed from outside through a [`SourceHandle`]
///
/// Lets an embedding application forward platform callbacks (or a test drive
/// the monitor) without implementing [`AudioStateSource`] itself.
pub struct ManualSource {
    sender: SharedSender,
}

/// Cloneable handle pushing events into a [`ManualSource`]
#[derive(Clone)]
pub struct SourceHandle {
    sender: SharedSender,
}

impl ManualSource {
    pub fn new() -> (Self, SourceHandle) {
        let sender: SharedSender = Arc::new(Mutex::new(None));
        (
            Self {
                sender: Arc::clone(&sender),
            },
            SourceHandle { sender },
        )
    }
}

impl SourceHandle {
    /// Report the current recording set, timestamped now
    pub fn push(&self, clients: RecordingSet) -> Result<()> {
        self.push_at(clients, Utc::now())
    }

    /// Report the recording set as observed at `at`
    ///
    /// Never blocks, so it can be called from platform callback threads.
    pub fn push_at(&self, clients: RecordingSet, at: DateTime<Utc>) -> Result<()> {
        let sender = lock(&self.sender);
        let Some(tx) = sender.as_ref() else {
            bail!("Source is not running");
        };

        tx.try_send(RecordingEvent::new(clients, at))
            .map_err(|e| anyhow!("Failed to queue recording event: {}", e))
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.sender).is_some()
    }
}

#[async_trait::async_trait]
impl AudioStateSource for ManualSource {
    async fn start(&mut self) -> Result<mpsc::Receiver<RecordingEvent>> {
        let mut sender = lock(&self.sender);
        if sender.is_some() {
            bail!("Already running");
        }

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        *sender = Some(tx);
        info!("Manual recording source started");
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if lock(&self.sender).take().is_some() {
            info!("Manual recording source stopped");
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        lock(&self.sender).is_some()
    }

    fn name(&self) -> &str {
        "manual"
    }
}
