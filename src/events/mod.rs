//! Delivery of sealed sessions to interested observers

mod listeners;
mod sink;

pub use listeners::LogListener;
pub use sink::{EventSink, SessionListener, SubscriptionId};
