// Linux recording source: polls PulseAudio / PipeWire source outputs
//
// Every application capturing audio holds a "source output". Corked outputs
// are paused and do not count as recording.

use super::backend::{AudioStateSource, RecordingEvent, EVENT_CHANNEL_CAPACITY};
use crate::session::{ClientId, RecordingSet};
use anyhow::{bail, Context, Result};
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Recording source backed by `pactl list source-outputs`
pub struct PactlSource {
    poll_interval: Duration,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl PactlSource {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            cancel: None,
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioStateSource for PactlSource {
    async fn start(&mut self) -> Result<mpsc::Receiver<RecordingEvent>> {
        if self.task.is_some() {
            bail!("Already polling");
        }

        // Fail early when pactl is missing instead of warning every tick
        list_source_outputs()
            .await
            .context("pactl is not usable on this system")?;

        info!(
            "Polling PulseAudio source outputs every {}ms",
            self.poll_interval.as_millis()
        );

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        self.task = Some(tokio::spawn(poll_loop(self.poll_interval, tx, cancel.clone())));
        self.cancel = Some(cancel);

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }

        if let Some(task) = self.task.take() {
            task.await.context("pactl poll task panicked")?;
            info!("PulseAudio polling stopped");
        }

        Ok(())
    }

    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn name(&self) -> &str {
        "pactl"
    }
}

async fn poll_loop(
    poll_interval: Duration,
    tx: mpsc::Sender<RecordingEvent>,
    cancel: CancellationToken,
) {
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last = RecordingSet::new();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let clients = match list_source_outputs().await {
            Ok(output) => parse_source_outputs(&output),
            Err(e) => {
                warn!("pactl poll failed: {:#}", e);
                continue;
            }
        };

        if clients == last {
            continue;
        }

        debug!("Source outputs changed: {:?} -> {:?}", last, clients);
        last = clients.clone();

        if tx.send(RecordingEvent::now(clients)).await.is_err() {
            error!("Recording event receiver dropped, stopping pactl poll");
            break;
        }
    }
}

async fn list_source_outputs() -> Result<String> {
    let output = Command::new("pactl")
        .args(["list", "source-outputs"])
        .env("LC_ALL", "C")
        .kill_on_drop(true)
        .output()
        .await
        .context("Failed to run pactl")?;

    if !output.status.success() {
        bail!(
            "pactl exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Extract the clients of every uncorked source output
///
/// A client is identified by `application.process.binary`, falling back to
/// `application.name`.
pub fn parse_source_outputs(output: &str) -> RecordingSet {
    let mut clients = RecordingSet::new();

    for block in output.split("Source Output #").skip(1) {
        let mut corked = false;
        let mut binary = None;
        let mut app_name = None;

        for line in block.lines().map(str::trim) {
            if let Some(value) = line.strip_prefix("Corked:") {
                corked = value.trim() == "yes";
            } else if let Some(value) = property(line, "application.process.binary") {
                binary = Some(value);
            } else if let Some(value) = property(line, "application.name") {
                app_name = Some(value);
            }
        }

        if corked {
            continue;
        }

        if let Some(id) = binary.or(app_name) {
            clients.insert(ClientId::from(id));
        }
    }

    clients
}

fn property<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(key)?.trim_start();
    let value = rest.strip_prefix('=')?.trim();
    let value = value.trim_matches('"');
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_OUTPUTS: &str = r#"Source Output #41
	Driver: protocol-native.c
	Owner Module: 10
	Client: 57
	Source: 1
	Corked: no
	Mute: no
	Properties:
		media.name = "RecordStream"
		application.name = "Firefox"
		application.process.id = "4242"
		application.process.binary = "firefox"

Source Output #42
	Driver: protocol-native.c
	Corked: no
	Properties:
		media.name = "Capture"
		application.name = "Zoom"
"#;

    #[test]
    fn test_parse_prefers_process_binary() {
        let clients = parse_source_outputs(TWO_OUTPUTS);
        assert_eq!(clients.len(), 2);
        assert!(clients.contains(&ClientId::from("firefox")));
        assert!(clients.contains(&ClientId::from("Zoom")));
    }

    #[test]
    fn test_parse_skips_corked_outputs() {
        let output = "Source Output #7\n\tCorked: yes\n\tProperties:\n\t\tapplication.process.binary = \"arecord\"\n";
        assert!(parse_source_outputs(output).is_empty());
    }

    #[test]
    fn test_parse_empty_listing() {
        assert!(parse_source_outputs("").is_empty());
    }

    #[test]
    fn test_property_does_not_match_longer_keys() {
        assert_eq!(property("application.name = \"Zoom\"", "application.name"), Some("Zoom"));
        assert_eq!(property("application.name.extra = \"x\"", "application.name"), None);
    }
}
