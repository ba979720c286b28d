use crate::attribution::{
    AttributionProvider, AttributionScheduler, CommandProvider, SchedulerConfig, SchedulerStats,
    StaticProvider,
};
use crate::config::{Config, MonitorConfig, ProviderKind, SourceKind};
use crate::events::EventSink;
use crate::names::{NameResolver, StaticNames};
use crate::session::{recording_set, MonitorStatus, SessionLog, SessionMonitor, Transition};
use crate::source::{
    AudioStateSource, ManualSource, PactlSource, RecordingEvent, ReplayScript, SourceHandle,
};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// The platform-facing collaborators of a monitor service
pub struct Backends {
    source: Box<dyn AudioStateSource>,
    provider: Arc<dyn AttributionProvider>,

    /// Present exactly when `source` is the [`ManualSource`] built by
    /// [`Backends::manual`]
    handle: Option<SourceHandle>,
}

impl Backends {
    /// Any source driven by the platform or a script
    pub fn new(source: Box<dyn AudioStateSource>, provider: Arc<dyn AttributionProvider>) -> Self {
        Self {
            source,
            provider,
            handle: None,
        }
    }

    /// A [`ManualSource`], its handle kept for [`MonitorService::source_handle`]
    pub fn manual(provider: Arc<dyn AttributionProvider>) -> Self {
        let (source, handle) = ManualSource::new();
        Self {
            source: Box::new(source),
            provider,
            handle: Some(handle),
        }
    }

    pub fn handle(&self) -> Option<&SourceHandle> {
        self.handle.as_ref()
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let wants_replay = config.source.kind == SourceKind::Replay
            || config.attribution.kind == ProviderKind::Replay;

        let (mut replay_source, mut replay_provider) = if wants_replay {
            let Some(path) = &config.source.script else {
                bail!("Replay requires `source.script` to point at a script file");
            };
            let (source, provider) = ReplayScript::load(path)?.into_parts();
            (Some(source), Some(provider))
        } else {
            (None, None)
        };

        let source: Option<Box<dyn AudioStateSource>> = match config.source.kind {
            SourceKind::Pactl => Some(Box::new(PactlSource::new(Duration::from_millis(
                config.source.poll_interval_ms.max(1),
            )))),
            SourceKind::Manual => None,
            SourceKind::Replay => match replay_source.take() {
                Some(source) => Some(Box::new(source)),
                None => bail!("Replay source could not be built"),
            },
        };

        let provider: Arc<dyn AttributionProvider> = match config.attribution.kind {
            ProviderKind::Command => Arc::new(
                CommandProvider::new(&config.attribution.command, config.attribution.max_entries)
                    .context("Invalid attribution command")?,
            ),
            ProviderKind::Disabled => Arc::new(StaticProvider::disabled()),
            ProviderKind::Replay => {
                if config.source.kind != SourceKind::Replay {
                    bail!("Replay attribution only works together with the replay source");
                }
                match replay_provider.take() {
                    Some(provider) => Arc::new(provider),
                    None => bail!("Replay provider could not be built"),
                }
            }
        };

        Ok(match source {
            Some(source) => Self::new(source, provider),
            None => Self::manual(provider),
        })
    }
}

/// Everything the status endpoint reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub summary: String,
    pub monitor: MonitorStatus,
    pub attribution: SchedulerStats,
    pub sessions_logged: usize,
    pub listeners: usize,
}

struct Lifecycle {
    running: bool,
    source: Box<dyn AudioStateSource>,
    forwarder: Option<(CancellationToken, JoinHandle<()>)>,
}

/// Wires a recording source, the session monitor and the attribution
/// scheduler under one start/stop lifecycle
pub struct MonitorService {
    monitor: Arc<SessionMonitor>,
    scheduler: Arc<AttributionScheduler>,
    lifecycle: Mutex<Lifecycle>,
    handle: Option<SourceHandle>,
}

impl MonitorService {
    pub fn new(
        config: &MonitorConfig,
        names: Arc<dyn NameResolver>,
        backends: Backends,
        scheduler_config: SchedulerConfig,
    ) -> Self {
        let log = Arc::new(SessionLog::new(config.log_capacity));
        let sink = Arc::new(EventSink::new());
        let monitor = Arc::new(
            SessionMonitor::new(log, sink, names).with_ignored_clients(recording_set(
                config.ignored_clients.iter().map(String::as_str),
            )),
        );

        // Idle until started
        monitor.shutdown(Utc::now());

        let scheduler = Arc::new(AttributionScheduler::new(
            backends.provider,
            Arc::clone(&monitor),
            scheduler_config,
        ));

        Self {
            monitor,
            scheduler,
            lifecycle: Mutex::new(Lifecycle {
                running: false,
                source: backends.source,
                forwarder: None,
            }),
            handle: backends.handle,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let backends = Backends::from_config(config)?;
        let names = Arc::new(StaticNames::new(config.name_table()));
        Ok(Self::new(
            &config.monitor,
            names,
            backends,
            config.attribution.scheduler(),
        ))
    }

    /// Start monitoring. Returns `false` if already started.
    pub async fn start(&self) -> Result<bool> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.running {
            debug!("Monitoring already started");
            return Ok(false);
        }

        info!("Starting microphone monitoring ({})", lifecycle.source.name());

        let events = lifecycle
            .source
            .start()
            .await
            .with_context(|| format!("Failed to start {} source", lifecycle.source.name()))?;

        self.monitor.resume();

        let cancel = CancellationToken::new();
        let forwarder = tokio::spawn(forward_events(
            events,
            Arc::clone(&self.monitor),
            Arc::clone(&self.scheduler),
            cancel.clone(),
        ));

        self.scheduler.start().await;

        lifecycle.forwarder = Some((cancel, forwarder));
        lifecycle.running = true;

        info!("Microphone monitoring started");
        Ok(true)
    }

    /// Stop monitoring. Returns `false` if already stopped.
    ///
    /// New events are refused immediately; the call returns once the source,
    /// the forwarding task and both polling tasks have wound down. A session
    /// still open is sealed now.
    pub async fn stop(&self) -> Result<bool> {
        let mut lifecycle = self.lifecycle.lock().await;
        if !lifecycle.running {
            debug!("Monitoring already stopped");
            return Ok(false);
        }

        info!("Stopping microphone monitoring");

        if let Some(record) = self.monitor.shutdown(Utc::now()) {
            info!("Session {} closed by shutdown", record.id);
        }

        if let Some((cancel, forwarder)) = lifecycle.forwarder.take() {
            cancel.cancel();
            if let Err(e) = forwarder.await {
                error!("Event forwarding task panicked: {}", e);
            }
        }

        if let Err(e) = lifecycle.source.stop().await {
            error!("Failed to stop {} source: {:#}", lifecycle.source.name(), e);
        }

        self.scheduler.stop().await;
        lifecycle.running = false;

        info!("Microphone monitoring stopped");
        Ok(true)
    }

    pub async fn is_running(&self) -> bool {
        self.lifecycle.lock().await.running
    }

    pub fn status(&self) -> ServiceStatus {
        let monitor = self.monitor.status();
        ServiceStatus {
            summary: monitor.summary(),
            monitor,
            attribution: self.scheduler.stats(),
            sessions_logged: self.monitor.log().len(),
            listeners: self.monitor.sink().listener_count(),
        }
    }

    pub fn monitor(&self) -> &Arc<SessionMonitor> {
        &self.monitor
    }

    pub fn log(&self) -> &Arc<SessionLog> {
        self.monitor.log()
    }

    pub fn sink(&self) -> &Arc<EventSink> {
        self.monitor.sink()
    }

    /// Handle for pushing events, when built with a manual source
    pub fn source_handle(&self) -> Option<&SourceHandle> {
        self.handle.as_ref()
    }
}

async fn forward_events(
    mut events: mpsc::Receiver<RecordingEvent>,
    monitor: Arc<SessionMonitor>,
    scheduler: Arc<AttributionScheduler>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events.recv() => event,
        };

        let Some(event) = event else {
            info!("Recording source closed its event stream");
            break;
        };

        if let Transition::Opened { .. } = monitor.on_recording_set_changed(event.clients, event.at)
        {
            // Attribute the new session right away instead of on the next tick
            scheduler.trigger();
        }
    }

    debug!("Event forwarding task stopped");
}
