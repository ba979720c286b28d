use super::backend::{AudioStateSource, RecordingEvent, EVENT_CHANNEL_CAPACITY};
use crate::attribution::AttributionProvider;
use crate::session::{recording_set, ClientId};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// One line of a replay script
///
/// ```json
/// {"at_ms": 0, "recording": ["org.zoom"]}
/// {"at_ms": 500, "foreground": ["org.zoom", "com.slack"]}
/// {"at_ms": 1200, "recording": []}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScriptEntry {
    /// Offset from the start of the replay
    pub at_ms: u64,

    /// New recording set, if this entry changes it
    #[serde(default)]
    pub recording: Option<Vec<String>>,

    /// New recently-used list (freshest first), if this entry changes it
    #[serde(default)]
    pub foreground: Option<Vec<String>>,
}

/// A scripted microphone timeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayScript {
    entries: Vec<ScriptEntry>,
}

impl ReplayScript {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading replay script: {}", path.display());

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay script {}", path.display()))?;
        Self::parse(&text)
    }

    /// Parse JSON lines; blank lines and `#` comments are skipped
    pub fn parse(text: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let entry: ScriptEntry = serde_json::from_str(line)
                .with_context(|| format!("Invalid replay entry on line {}", index + 1))?;
            if entry.recording.is_none() && entry.foreground.is_none() {
                bail!(
                    "Replay entry on line {} has neither `recording` nor `foreground`",
                    index + 1
                );
            }
            entries.push(entry);
        }

        // Stable: entries sharing an offset keep file order
        entries.sort_by_key(|entry| entry.at_ms);
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ScriptEntry] {
        &self.entries
    }

    /// Split into a source and a provider sharing the scripted foreground list
    pub fn into_parts(self) -> (ReplaySource, ReplayProvider) {
        let foreground = Arc::new(RwLock::new(Vec::new()));
        (
            ReplaySource {
                script: Arc::new(self),
                foreground: Arc::clone(&foreground),
                cancel: None,
                task: None,
            },
            ReplayProvider { foreground },
        )
    }
}

type Foreground = Arc<RwLock<Vec<ClientId>>>;

/// Replays the `recording` entries of a script in real time
pub struct ReplaySource {
    script: Arc<ReplayScript>,
    foreground: Foreground,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

#[async_trait::async_trait]
impl AudioStateSource for ReplaySource {
    async fn start(&mut self) -> Result<mpsc::Receiver<RecordingEvent>> {
        if self.task.is_some() {
            bail!("Already replaying");
        }

        info!("Starting replay of {} entries", self.script.entries.len());

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(replay(
            Arc::clone(&self.script),
            Arc::clone(&self.foreground),
            tx,
            cancel.clone(),
        ));

        self.cancel = Some(cancel);
        self.task = Some(task);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Replay task panicked: {}", e);
            }
            info!("Replay stopped");
        }

        Ok(())
    }

    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn name(&self) -> &str {
        "replay"
    }
}

async fn replay(
    script: Arc<ReplayScript>,
    foreground: Foreground,
    tx: mpsc::Sender<RecordingEvent>,
    cancel: CancellationToken,
) {
    let origin = Instant::now();

    for entry in &script.entries {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = sleep_until(origin + Duration::from_millis(entry.at_ms)) => {}
        }

        if let Some(clients) = &entry.foreground {
            let clients: Vec<ClientId> = clients.iter().map(|c| ClientId::from(c.as_str())).collect();
            debug!("Replay t={}ms foreground {:?}", entry.at_ms, clients);
            *foreground.write().unwrap_or_else(PoisonError::into_inner) = clients;
        }

        if let Some(clients) = &entry.recording {
            let event = RecordingEvent::now(recording_set(clients.iter().map(String::as_str)));
            debug!("Replay t={}ms recording {:?}", entry.at_ms, event.clients);
            if tx.send(event).await.is_err() {
                debug!("Replay receiver dropped");
                return;
            }
        }
    }

    info!("Replay script finished");
}

/// Answers polls with the foreground list most recently reached by the replay
#[derive(Clone)]
pub struct ReplayProvider {
    foreground: Foreground,
}

#[async_trait::async_trait]
impl AttributionProvider for ReplayProvider {
    async fn poll(
        &self,
        _window_start: DateTime<Utc>,
        _window_end: DateTime<Utc>,
    ) -> Result<Vec<ClientId>> {
        Ok(self
            .foreground
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn name(&self) -> &str {
        "replay"
    }
}
