use super::log::SessionLog;
use super::types::{Classification, ClientId, ParticipantRecord, RecordingSet, SessionRecord};
use crate::attribution::AttributionSnapshot;
use crate::events::EventSink;
use crate::names::NameResolver;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Outcome of feeding a recording-set change into the monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// IDLE -> RECORDING, a new session was opened
    Opened { id: u64, started_at: DateTime<Utc> },

    /// Still RECORDING, the set changed; `added` lists new participants
    Updated { id: u64, added: Vec<ClientId> },

    /// RECORDING -> IDLE, the session was sealed, logged and published
    Sealed(SessionRecord),

    /// Same set as before, or idle set while already idle
    Unchanged,

    /// Monitoring is stopped; the event was dropped
    Rejected,
}

/// Point-in-time view of the monitor, for status endpoints and notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorStatus {
    /// Whether events are being accepted
    pub monitoring: bool,

    /// Whether a session is currently open
    pub recording: bool,

    /// Clients reported as recording right now
    pub active_clients: Vec<ClientId>,

    pub open_session: Option<u64>,
    pub open_since: Option<DateTime<Utc>>,
}

impl MonitorStatus {
    /// One-line status, the text a notification surface would show
    pub fn summary(&self) -> String {
        if !self.monitoring {
            "Monitoring stopped".to_string()
        } else if self.recording {
            let count = self.active_clients.len();
            let noun = if count == 1 { "app" } else { "apps" };
            format!("Recording active: {} {}", count, noun)
        } else {
            "Monitoring active - no recording".to_string()
        }
    }
}

#[derive(Debug, Clone)]
struct AttributionEntry {
    client_id: ClientId,
    is_foreground: bool,
    is_active: bool,
}

/// The open session, owned by the monitor until sealed
#[derive(Debug)]
struct Session {
    id: u64,
    started_at: DateTime<Utc>,
    participants: Vec<ClientId>,
    attribution: Vec<AttributionEntry>,
    samples: usize,
    last_snapshot: Option<AttributionSnapshot>,
}

impl Session {
    fn open(id: u64, started_at: DateTime<Utc>, clients: &RecordingSet) -> Self {
        Self {
            id,
            started_at,
            participants: clients.iter().cloned().collect(),
            attribution: Vec::new(),
            samples: 0,
            last_snapshot: None,
        }
    }

    /// Union `clients` into the participants, returning the newly added ones
    fn absorb(&mut self, clients: &RecordingSet) -> Vec<ClientId> {
        let mut added = Vec::new();
        for client in clients {
            if !self.participants.contains(client) {
                self.participants.push(client.clone());
                added.push(client.clone());
            }
        }
        added
    }

    fn attribute(&mut self, snapshot: &AttributionSnapshot) {
        let leader = snapshot.leader();
        for client_id in &self.participants {
            self.attribution.push(AttributionEntry {
                client_id: client_id.clone(),
                is_foreground: leader == Some(client_id),
                is_active: snapshot.contains(client_id),
            });
        }
        self.samples += 1;
        self.last_snapshot = Some(snapshot.clone());
    }

    fn classify(&self, client_id: &ClientId) -> Classification {
        let mut seen = false;
        let mut always_leading = true;
        for entry in self.attribution.iter().filter(|e| &e.client_id == client_id) {
            if entry.is_active {
                seen = true;
                always_leading &= entry.is_foreground;
            }
        }

        match (seen, always_leading) {
            (false, _) => Classification::Inactive,
            (true, true) => Classification::Foreground,
            (true, false) => Classification::Background,
        }
    }

    fn seal(self, ended_at: DateTime<Utc>, names: &dyn NameResolver) -> SessionRecord {
        let duration_ms = ended_at
            .signed_duration_since(self.started_at)
            .num_milliseconds()
            .max(0) as u64;

        let participants: Vec<ParticipantRecord> = self
            .participants
            .iter()
            .map(|client_id| ParticipantRecord {
                client_id: client_id.clone(),
                display_name: names.display_name(client_id),
                classification: self.classify(client_id),
            })
            .collect();

        let app_name = [Classification::Foreground, Classification::Background]
            .iter()
            .find_map(|wanted| participants.iter().find(|p| p.classification == *wanted))
            .or_else(|| participants.first())
            .map(|p| p.display_name.clone())
            .unwrap_or_default();

        // Reordered platform events can put the close before the open
        let ended_at = ended_at.max(self.started_at);

        SessionRecord {
            id: self.id,
            app_name,
            started_at: self.started_at,
            ended_at,
            duration_ms,
            participants,
            attribution_samples: self.samples,
            last_attribution: self
                .last_snapshot
                .map(|snapshot| snapshot.clients)
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug)]
struct MonitorState {
    accepting: bool,
    recording_set: RecordingSet,
    current: Option<Session>,
    next_id: u64,
}

/// Microphone session state machine
///
/// Turns recording-set changes and attribution snapshots into sealed
/// [`SessionRecord`]s. All state sits behind one mutex and both entry points
/// run to completion under it; nothing in here awaits or does I/O. Sealed
/// records are logged and published before the lock is released, so they are
/// emitted in the order their closing events were processed.
pub struct SessionMonitor {
    state: Mutex<MonitorState>,
    log: Arc<SessionLog>,
    sink: Arc<EventSink>,
    names: Arc<dyn NameResolver>,
    ignored: RecordingSet,
}

impl SessionMonitor {
    pub fn new(log: Arc<SessionLog>, sink: Arc<EventSink>, names: Arc<dyn NameResolver>) -> Self {
        Self {
            state: Mutex::new(MonitorState {
                accepting: true,
                recording_set: RecordingSet::new(),
                current: None,
                next_id: 1,
            }),
            log,
            sink,
            names,
            ignored: RecordingSet::new(),
        }
    }

    /// Clients that never count as recording (typically our own process)
    pub fn with_ignored_clients(mut self, ignored: RecordingSet) -> Self {
        self.ignored = ignored;
        self
    }

    /// Handle a change of the set of recording clients reported at `at`
    pub fn on_recording_set_changed(&self, clients: RecordingSet, at: DateTime<Utc>) -> Transition {
        let clients: RecordingSet = clients
            .into_iter()
            .filter(|client| !self.ignored.contains(client))
            .collect();

        let mut state = self.lock();
        if !state.accepting {
            debug!("Monitoring stopped, dropping recording set {:?}", clients);
            return Transition::Rejected;
        }

        if clients == state.recording_set {
            debug!("Duplicate recording set notification ignored");
            return Transition::Unchanged;
        }

        state.recording_set = clients.clone();

        if clients.is_empty() {
            return match state.current.take() {
                Some(session) => Transition::Sealed(self.seal(session, at)),
                None => Transition::Unchanged,
            };
        }

        match state.current.as_mut() {
            Some(session) => {
                let added = session.absorb(&clients);
                if !added.is_empty() {
                    info!("Session {}: new participants {:?}", session.id, added);
                }
                Transition::Updated {
                    id: session.id,
                    added,
                }
            }
            None => {
                let id = state.next_id;
                state.next_id += 1;
                info!("Microphone busy, session {} opened by {:?}", id, clients);
                state.current = Some(Session::open(id, at, &clients));
                Transition::Opened { id, started_at: at }
            }
        }
    }

    /// Fold an attribution snapshot into the open session
    ///
    /// Returns `false` when there is nothing to attribute, or when the
    /// snapshot was captured before the open session started.
    pub fn on_attribution_snapshot(&self, snapshot: &AttributionSnapshot) -> bool {
        let mut state = self.lock();
        if !state.accepting {
            return false;
        }

        match state.current.as_mut() {
            Some(session) if snapshot.captured_at < session.started_at => {
                debug!(
                    "Session {}: dropping snapshot captured at {} before it opened",
                    session.id, snapshot.captured_at
                );
                false
            }
            Some(session) => {
                session.attribute(snapshot);
                debug!(
                    "Session {}: attribution sample {} leader={:?}",
                    session.id,
                    session.samples,
                    snapshot.leader()
                );
                true
            }
            None => false,
        }
    }

    /// Stop accepting events, sealing the open session at `at` if any
    pub fn shutdown(&self, at: DateTime<Utc>) -> Option<SessionRecord> {
        let mut state = self.lock();
        state.accepting = false;
        state.recording_set.clear();
        let session = state.current.take()?;
        info!("Monitoring stopped with session {} still open", session.id);
        Some(self.seal(session, at))
    }

    /// Accept events again after [`shutdown`](Self::shutdown)
    pub fn resume(&self) {
        let mut state = self.lock();
        state.accepting = true;
        state.recording_set.clear();
    }

    pub fn is_recording(&self) -> bool {
        self.lock().current.is_some()
    }

    pub fn is_accepting(&self) -> bool {
        self.lock().accepting
    }

    pub fn status(&self) -> MonitorStatus {
        let state = self.lock();
        MonitorStatus {
            monitoring: state.accepting,
            recording: state.current.is_some(),
            active_clients: state.recording_set.iter().cloned().collect(),
            open_session: state.current.as_ref().map(|s| s.id),
            open_since: state.current.as_ref().map(|s| s.started_at),
        }
    }

    pub fn log(&self) -> &Arc<SessionLog> {
        &self.log
    }

    pub fn sink(&self) -> &Arc<EventSink> {
        &self.sink
    }

    // Called with the state lock held
    fn seal(&self, session: Session, at: DateTime<Utc>) -> SessionRecord {
        let record = session.seal(at, self.names.as_ref());
        info!(
            "Microphone idle, session {} sealed: {} for {}ms ({} participants, {} samples)",
            record.id,
            record.app_name,
            record.duration_ms,
            record.participants.len(),
            record.attribution_samples
        );
        self.log.append(record.clone());
        self.sink.publish(record.clone());
        record
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
