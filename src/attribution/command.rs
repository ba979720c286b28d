use super::provider::AttributionProvider;
use crate::session::ClientId;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tokio::process::Command;
use tracing::debug;

/// Number of recently used clients kept from a poll
pub const DEFAULT_MAX_ENTRIES: usize = 5;

/// Attribution from an external command
///
/// The command prints one client id per line, most recently used first. The
/// poll window is passed through `GUARDIAN_WINDOW_START` / `GUARDIAN_WINDOW_END`
/// (RFC 3339) and `GUARDIAN_WINDOW_START_MS` / `GUARDIAN_WINDOW_END_MS` (unix ms).
#[derive(Debug, Clone)]
pub struct CommandProvider {
    program: String,
    args: Vec<String>,
    max_entries: usize,
}

impl CommandProvider {
    pub fn new(command: &[String], max_entries: usize) -> Result<Self> {
        let Some((program, args)) = command.split_first() else {
            bail!("Attribution command is empty");
        };

        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            max_entries: max_entries.max(1),
        })
    }
}

#[async_trait::async_trait]
impl AttributionProvider for CommandProvider {
    async fn poll(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<ClientId>> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .env("GUARDIAN_WINDOW_START", window_start.to_rfc3339())
            .env("GUARDIAN_WINDOW_END", window_end.to_rfc3339())
            .env(
                "GUARDIAN_WINDOW_START_MS",
                window_start.timestamp_millis().to_string(),
            )
            .env(
                "GUARDIAN_WINDOW_END_MS",
                window_end.timestamp_millis().to_string(),
            )
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to run attribution command {}", self.program))?;

        if !output.status.success() {
            bail!(
                "Attribution command {} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let clients = parse_client_list(&stdout, self.max_entries);
        debug!("{} reported {} recent clients", self.program, clients.len());
        Ok(clients)
    }

    fn name(&self) -> &str {
        &self.program
    }
}

/// One client per line, blank lines skipped, first occurrence wins
pub fn parse_client_list(output: &str, max_entries: usize) -> Vec<ClientId> {
    let mut clients: Vec<ClientId> = Vec::new();
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let client = ClientId::from(line);
        if !clients.contains(&client) {
            clients.push(client);
        }
        if clients.len() == max_entries {
            break;
        }
    }
    clients
}
