// End-to-end tests for the monitor service lifecycle

use anyhow::Result;
use mic_guardian::config::{MonitorConfig, ProviderKind, SourceKind};
use mic_guardian::{
    recording_set, Backends, Classification, ClientId, Config, ManualSource, MonitorService,
    SchedulerConfig, SessionRecord, StaticNames, StaticProvider,
};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

fn fast_scheduler() -> SchedulerConfig {
    SchedulerConfig {
        poll_interval: Duration::from_millis(10),
        heartbeat_interval: Duration::from_millis(50),
        poll_timeout: Duration::from_millis(200),
        window: Duration::from_millis(10_000),
    }
}

fn manual_service(foreground: &[&str]) -> MonitorService {
    let backends = Backends::manual(Arc::new(StaticProvider::new(
        foreground.iter().map(|c| ClientId::from(*c)).collect(),
    )));
    let names = Arc::new(StaticNames::new([("zoom".to_string(), "Zoom".to_string())]));

    MonitorService::new(&MonitorConfig::default(), names, backends, fast_scheduler())
}

fn collect_sessions(service: &MonitorService) -> mpsc::UnboundedReceiver<SessionRecord> {
    let (tx, rx) = mpsc::unbounded_channel();
    service.sink().subscribe(move |record: &SessionRecord| -> Result<()> {
        tx.send(record.clone())?;
        Ok(())
    })
    .expect("subscribed inside the test runtime");
    rx
}

#[tokio::test]
async fn test_manual_source_end_to_end() -> Result<()> {
    let service = manual_service(&["zoom"]);
    let mut sessions = collect_sessions(&service);
    let handle = service.source_handle().expect("manual source has a handle").clone();

    assert!(service.start().await?);
    handle.push(recording_set(["zoom"]))?;
    sleep(Duration::from_millis(60)).await;

    let status = service.status();
    assert_eq!(status.summary, "Recording active: 1 app");
    assert!(status.monitor.recording);

    handle.push(recording_set::<_, &str>([]))?;
    let record = tokio::time::timeout(Duration::from_secs(2), sessions.recv())
        .await?
        .expect("one sealed session");

    assert_eq!(record.id, 1);
    assert_eq!(record.app_name, "Zoom");
    assert!(record.attribution_samples >= 1);
    assert_eq!(
        record.classification_of(&ClientId::from("zoom")),
        Some(Classification::Foreground)
    );
    assert_eq!(service.log().len(), 1);
    assert_eq!(service.status().summary, "Monitoring active - no recording");

    service.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_start_and_stop_are_idempotent() -> Result<()> {
    let service = manual_service(&[]);
    assert!(!service.is_running().await);
    assert_eq!(service.status().summary, "Monitoring stopped");

    assert!(service.start().await?);
    assert!(!service.start().await?);
    assert!(service.is_running().await);
    assert!(service.status().attribution.running);

    assert!(service.stop().await?);
    assert!(!service.stop().await?);
    assert!(!service.is_running().await);
    assert!(!service.status().attribution.running);
    Ok(())
}

#[tokio::test]
async fn test_push_before_start_is_refused() {
    let service = manual_service(&[]);
    let handle = service.source_handle().cloned().unwrap();

    assert!(!handle.is_connected());
    assert!(handle.push(recording_set(["zoom"])).is_err());
}

#[tokio::test]
async fn test_stop_seals_open_session() -> Result<()> {
    let service = manual_service(&[]);
    let handle = service.source_handle().cloned().unwrap();

    service.start().await?;
    handle.push(recording_set(["zoom", "arecord"]))?;
    sleep(Duration::from_millis(30)).await;
    assert!(service.monitor().is_recording());

    service.stop().await?;

    assert!(!service.monitor().is_recording());
    let record = service.log().latest().expect("session sealed on stop");
    assert_eq!(record.participants.len(), 2);
    // No attribution available, so nobody was seen active
    assert_eq!(
        record.classification_of(&ClientId::from("arecord")),
        Some(Classification::Inactive)
    );

    assert!(handle.push(recording_set(["zoom"])).is_err());
    assert_eq!(service.status().summary, "Monitoring stopped");
    Ok(())
}

#[tokio::test]
async fn test_restart_continues_session_ids() -> Result<()> {
    let service = manual_service(&[]);
    let handle = service.source_handle().cloned().unwrap();

    for _ in 0..2 {
        service.start().await?;
        handle.push(recording_set(["zoom"]))?;
        sleep(Duration::from_millis(20)).await;
        handle.push(recording_set::<_, &str>([]))?;
        sleep(Duration::from_millis(20)).await;
        service.stop().await?;
    }

    let ids: Vec<u64> = service.log().snapshot().iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![2, 1]);
    Ok(())
}

#[tokio::test]
async fn test_replay_script_from_config() -> Result<()> {
    let mut script = tempfile::NamedTempFile::new()?;
    writeln!(script, "# zoom leads, then a recorder joins in the background")?;
    writeln!(script, r#"{{"at_ms": 0, "foreground": ["zoom"]}}"#)?;
    writeln!(script, r#"{{"at_ms": 10, "recording": ["zoom"]}}"#)?;
    writeln!(script, r#"{{"at_ms": 60, "recording": ["zoom", "arecord"]}}"#)?;
    writeln!(script, r#"{{"at_ms": 150, "recording": []}}"#)?;

    let mut config = Config::default();
    config.source.kind = SourceKind::Replay;
    config.source.script = Some(script.path().to_path_buf());
    config.attribution.kind = ProviderKind::Replay;
    config.attribution.poll_interval_ms = 10;

    let service = MonitorService::from_config(&config)?;
    assert!(service.source_handle().is_none());

    service.start().await?;
    sleep(Duration::from_millis(400)).await;
    service.stop().await?;

    let sessions = service.log().snapshot();
    assert_eq!(sessions.len(), 1);

    let record = &sessions[0];
    assert_eq!(record.app_name, "zoom");
    assert!(record.duration_ms >= 100);
    assert_eq!(
        record.classification_of(&ClientId::from("zoom")),
        Some(Classification::Foreground)
    );
    // Never in the recent list
    assert_eq!(
        record.classification_of(&ClientId::from("arecord")),
        Some(Classification::Inactive)
    );
    Ok(())
}

#[test]
fn test_replay_attribution_needs_replay_source() {
    let mut config = Config::default();
    config.source.kind = SourceKind::Manual;
    config.attribution.kind = ProviderKind::Replay;

    assert!(MonitorService::from_config(&config).is_err());
}

#[test]
fn test_replay_source_needs_script() {
    let mut config = Config::default();
    config.source.kind = SourceKind::Replay;

    let err = MonitorService::from_config(&config).err().unwrap();
    assert!(format!("{:#}", err).contains("source.script"));
}

#[test]
fn test_backends_keep_handle_with_manual_source() {
    let manual = Backends::manual(Arc::new(StaticProvider::disabled()));
    assert!(manual.handle().is_some());

    let (source, _handle) = ManualSource::new();
    let custom = Backends::new(Box::new(source), Arc::new(StaticProvider::disabled()));
    assert!(custom.handle().is_none());
}

#[test]
fn test_manual_config_exposes_source_handle() -> Result<()> {
    let mut config = Config::default();
    config.source.kind = SourceKind::Manual;

    let backends = Backends::from_config(&config)?;
    assert!(backends.handle().is_some());

    let service = MonitorService::from_config(&config)?;
    let handle = service.source_handle().expect("manual source handle");
    assert!(!handle.is_connected());
    Ok(())
}

#[tokio::test]
async fn test_source_handle_drives_the_service_source() -> Result<()> {
    let service = manual_service(&[]);
    let handle = service.source_handle().cloned().unwrap();

    service.start().await?;
    assert!(handle.is_connected());
    handle.push(recording_set(["zoom"]))?;
    sleep(Duration::from_millis(20)).await;
    assert!(service.monitor().is_recording());

    service.stop().await?;
    assert!(!handle.is_connected());
    Ok(())
}
