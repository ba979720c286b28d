use crate::session::SessionRecord;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Receiver of sealed sessions (UI bridge, notification updater, exporter...)
pub trait SessionListener: Send + Sync + 'static {
    fn on_session(&self, record: &SessionRecord) -> Result<()>;

    /// Listener name for logging
    fn name(&self) -> &str {
        "listener"
    }
}

impl<F> SessionListener for F
where
    F: Fn(&SessionRecord) -> Result<()> + Send + Sync + 'static,
{
    fn on_session(&self, record: &SessionRecord) -> Result<()> {
        self(record)
    }
}

/// Opaque handle returned by [`EventSink::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Subscriber {
    name: String,
    tx: mpsc::UnboundedSender<Arc<SessionRecord>>,
    task: JoinHandle<()>,
}

/// Fan-out of sealed sessions to registered listeners
///
/// Every listener owns a queue and a delivery task, so records reach each
/// listener in emission order while `publish` only enqueues. Listener errors
/// and panics are logged and stay confined to that listener.
///
/// Delivery tasks run on the runtime the sink was created in (or was handed
/// with [`with_handle`](Self::with_handle)), so listeners can be registered
/// from any thread.
pub struct EventSink {
    subscribers: Mutex<HashMap<SubscriptionId, Subscriber>>,
    next_id: AtomicU64,
    runtime: Option<Handle>,
}

impl EventSink {
    /// Sink bound to the current tokio runtime, if there is one
    pub fn new() -> Self {
        Self::build(Handle::try_current().ok())
    }

    /// Sink delivering on `runtime`
    pub fn with_handle(runtime: Handle) -> Self {
        Self::build(Some(runtime))
    }

    fn build(runtime: Option<Handle>) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            runtime,
        }
    }

    /// Register a listener
    ///
    /// Fails when the sink has no runtime to deliver on and the caller is
    /// not inside one either.
    pub fn subscribe<L: SessionListener>(&self, listener: L) -> Result<SubscriptionId> {
        let runtime = match &self.runtime {
            Some(runtime) => runtime.clone(),
            None => Handle::try_current()
                .context("No tokio runtime to deliver sessions on; build the sink with EventSink::with_handle")?,
        };

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let name = listener.name().to_string();
        let listener: Arc<dyn SessionListener> = Arc::new(listener);
        let (tx, rx) = mpsc::unbounded_channel();

        let task = runtime.spawn(deliver(id, name.clone(), listener, rx));

        info!("Listener {} subscribed as {}", name, id);
        self.lock().insert(id, Subscriber { name, tx, task });
        Ok(id)
    }

    /// Remove a listener. Records already queued for it are still delivered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        match self.lock().remove(&id) {
            Some(subscriber) => {
                info!("Listener {} unsubscribed ({})", subscriber.name, id);
                true
            }
            None => false,
        }
    }

    /// Queue `record` for every registered listener
    pub fn publish(&self, record: SessionRecord) {
        let record = Arc::new(record);
        let subscribers = self.lock();
        debug!(
            "Publishing session {} to {} listeners",
            record.id,
            subscribers.len()
        );
        for (id, subscriber) in subscribers.iter() {
            if subscriber.tx.send(Arc::clone(&record)).is_err() {
                warn!(
                    "Listener {} ({}) is gone, session {} not delivered",
                    subscriber.name, id, record.id
                );
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    /// Unsubscribe everyone and wait until queued records are delivered
    pub async fn close(&self) {
        let subscribers: Vec<Subscriber> = self.lock().drain().map(|(_, s)| s).collect();
        for subscriber in subscribers {
            drop(subscriber.tx);
            if let Err(e) = subscriber.task.await {
                error!("Delivery task for {} failed: {}", subscriber.name, e);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriptionId, Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}

async fn deliver(
    id: SubscriptionId,
    name: String,
    listener: Arc<dyn SessionListener>,
    mut rx: mpsc::UnboundedReceiver<Arc<SessionRecord>>,
) {
    while let Some(record) = rx.recv().await {
        let listener = Arc::clone(&listener);
        let session_id = record.id;

        // Listeners are plain callbacks and may block
        let outcome = tokio::task::spawn_blocking(move || listener.on_session(&record)).await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(
                "Listener {} ({}) failed on session {}: {:#}",
                name, id, session_id, e
            ),
            Err(e) => error!(
                "Listener {} ({}) panicked on session {}: {}",
                name, id, session_id, e
            ),
        }
    }

    debug!("Delivery task for {} ({}) finished", name, id);
}
