pub mod attribution;
pub mod config;
pub mod events;
pub mod http;
pub mod names;
pub mod service;
pub mod session;
pub mod source;

pub use attribution::{
    AttributionProvider, AttributionScheduler, AttributionSnapshot, CommandProvider,
    SchedulerConfig, SchedulerStats, StaticProvider,
};
pub use config::Config;
pub use events::{EventSink, LogListener, SessionListener, SubscriptionId};
pub use http::{create_router, AppState};
pub use names::{NameResolver, StaticNames};
pub use service::{Backends, MonitorService, ServiceStatus};
pub use session::{
    recording_set, Classification, ClientId, MonitorStatus, ParticipantRecord, RecordingSet,
    SessionLog, SessionMonitor, SessionRecord, Transition,
};
pub use source::{
    AudioStateSource, ManualSource, PactlSource, RecordingEvent, ReplayProvider, ReplayScript,
    ReplaySource, SourceHandle,
};
