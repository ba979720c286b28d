use super::sink::SessionListener;
use crate::session::SessionRecord;
use anyhow::Result;
use tracing::info;

/// Writes one log line per sealed session and participant
#[derive(Debug, Clone, Default)]
pub struct LogListener;

impl SessionListener for LogListener {
    fn on_session(&self, record: &SessionRecord) -> Result<()> {
        info!(
            "Session {}: {} used the microphone for {}ms (from {})",
            record.id,
            record.app_name,
            record.duration_ms,
            record.started_at.to_rfc3339()
        );

        for participant in &record.participants {
            info!(
                "  {} ({}) - {}",
                participant.display_name, participant.client_id, participant.classification
            );
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}
