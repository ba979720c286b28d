use super::provider::{AttributionProvider, AttributionSnapshot};
use crate::session::SessionMonitor;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Cadences of the two polling tasks
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Fast poll feeding classification (default: 1s)
    pub poll_interval: Duration,

    /// Liveness heartbeat (default: 5s)
    pub heartbeat_interval: Duration,

    /// Upper bound for a single provider call
    pub poll_timeout: Duration,

    /// How far back the provider looks for recent usage (default: 10s)
    pub window: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            heartbeat_interval: Duration::from_millis(5000),
            poll_timeout: Duration::from_millis(2000),
            window: Duration::from_millis(10_000),
        }
    }
}

/// Counters exposed on the status endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub running: bool,
    pub polls: u64,
    pub failures: u64,
    pub heartbeats: u64,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

struct Shared {
    provider: Arc<dyn AttributionProvider>,
    monitor: Arc<SessionMonitor>,
    config: SchedulerConfig,
    trigger: Notify,
    stats: Mutex<SchedulerStats>,
}

impl Shared {
    fn stats(&self) -> MutexGuard<'_, SchedulerStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Query the provider outside of any monitor lock
    async fn poll(&self) -> Result<AttributionSnapshot> {
        let window_end = Utc::now();
        let window_start =
            window_end - chrono::Duration::milliseconds(self.config.window.as_millis() as i64);

        let clients = timeout(
            self.config.poll_timeout,
            self.provider.poll(window_start, window_end),
        )
        .await
        .map_err(|_| {
            anyhow!(
                "{} did not answer within {}ms",
                self.provider.name(),
                self.config.poll_timeout.as_millis()
            )
        })??;

        Ok(AttributionSnapshot::new(window_end, clients))
    }

    fn record_failure(&self, task: &str, err: &anyhow::Error) {
        warn!("Attribution {} via {} failed: {:#}", task, self.provider.name(), err);
        let mut stats = self.stats();
        stats.failures += 1;
        stats.last_error = Some(format!("{:#}", err));
    }
}

struct Running {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Drives the fast attribution poll and the slow heartbeat
///
/// Both tasks are spawned and cancelled together under one lock; `stop`
/// returns only after both have been joined, so no snapshot reaches the
/// monitor afterwards.
pub struct AttributionScheduler {
    shared: Arc<Shared>,
    running: tokio::sync::Mutex<Option<Running>>,
}

impl AttributionScheduler {
    pub fn new(
        provider: Arc<dyn AttributionProvider>,
        monitor: Arc<SessionMonitor>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                provider,
                monitor,
                config,
                trigger: Notify::new(),
                stats: Mutex::new(SchedulerStats::default()),
            }),
            running: tokio::sync::Mutex::new(None),
        }
    }

    /// Spawn both polling tasks. Returns `false` if they were already running.
    pub async fn start(&self) -> bool {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!("Attribution scheduler already running");
            return false;
        }

        info!(
            "Starting attribution scheduler via {} (poll={}ms, heartbeat={}ms)",
            self.shared.provider.name(),
            self.shared.config.poll_interval.as_millis(),
            self.shared.config.heartbeat_interval.as_millis()
        );

        let cancel = CancellationToken::new();
        let handles = vec![
            tokio::spawn(fast_poll_loop(Arc::clone(&self.shared), cancel.clone())),
            tokio::spawn(heartbeat_loop(Arc::clone(&self.shared), cancel.clone())),
        ];

        self.shared.stats().running = true;
        *running = Some(Running { cancel, handles });
        true
    }

    /// Cancel both tasks and wait for them. Returns `false` if not running.
    pub async fn stop(&self) -> bool {
        let mut running = self.running.lock().await;
        let Some(Running { cancel, handles }) = running.take() else {
            debug!("Attribution scheduler already stopped");
            return false;
        };

        info!("Stopping attribution scheduler");
        cancel.cancel();

        for result in join_all(handles).await {
            if let Err(e) = result {
                error!("Attribution task panicked: {}", e);
            }
        }

        self.shared.stats().running = false;
        info!("Attribution scheduler stopped");
        true
    }

    /// Ask for a fast poll now instead of waiting for the next tick
    pub fn trigger(&self) {
        self.shared.trigger.notify_one();
    }

    pub fn stats(&self) -> SchedulerStats {
        self.shared.stats().clone()
    }

    pub fn is_running(&self) -> bool {
        self.shared.stats().running
    }
}

async fn fast_poll_loop(shared: Arc<Shared>, cancel: CancellationToken) {
    let mut ticker = interval(shared.config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = shared.trigger.notified() => ticker.reset(),
            _ = ticker.tick() => {}
        }

        let result = shared.poll().await;

        // A poll that finished after cancellation is dropped
        if cancel.is_cancelled() {
            break;
        }

        match result {
            Ok(snapshot) => {
                shared.stats().polls += 1;
                shared.monitor.on_attribution_snapshot(&snapshot);
            }
            Err(e) => shared.record_failure("poll", &e),
        }
    }

    debug!("Attribution poll task stopped");
}

async fn heartbeat_loop(shared: Arc<Shared>, cancel: CancellationToken) {
    let mut ticker = interval(shared.config.heartbeat_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = shared.poll().await;
        if cancel.is_cancelled() {
            break;
        }

        match result {
            Ok(snapshot) => {
                {
                    let mut stats = shared.stats();
                    stats.heartbeats += 1;
                    stats.last_heartbeat = Some(snapshot.captured_at);
                }
                if !shared.monitor.on_attribution_snapshot(&snapshot) {
                    debug!("Heartbeat snapshot not attributed to any session");
                }
            }
            Err(e) => shared.record_failure("heartbeat", &e),
        }
    }

    debug!("Attribution heartbeat task stopped");
}
