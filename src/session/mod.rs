//! Microphone session tracking
//!
//! This module provides:
//! - `SessionMonitor`: the IDLE/RECORDING state machine fed by recording-set
//!   changes and attribution snapshots
//! - `SessionLog`: bounded newest-first history of sealed sessions
//! - `SessionRecord`: the immutable summary handed to consumers

mod log;
mod monitor;
mod types;

pub use log::{SessionLog, DEFAULT_LOG_CAPACITY};
pub use monitor::{MonitorStatus, SessionMonitor, Transition};
pub use types::{
    recording_set, Classification, ClientId, ParticipantRecord, RecordingSet, SessionRecord,
};
