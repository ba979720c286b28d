//! HTTP API for a local UI or tray applet
//!
//! - GET /health - Health check
//! - GET /status - Monitor, attribution and log status
//! - GET /sessions - Session history, newest first
//! - DELETE /sessions - Clear the history
//! - POST /monitor/start - Start monitoring
//! - POST /monitor/stop - Stop monitoring

mod handlers;
mod routes;
mod state;

pub use handlers::LifecycleResponse;
pub use routes::create_router;
pub use state::AppState;
