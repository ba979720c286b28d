pub mod backend;
pub mod manual;
pub mod pactl;
pub mod replay;

pub use backend::{AudioStateSource, RecordingEvent, EVENT_CHANNEL_CAPACITY};
pub use manual::{ManualSource, SourceHandle};
pub use pactl::{parse_source_outputs, PactlSource};
pub use replay::{ReplayProvider, ReplayScript, ReplaySource, ScriptEntry};
