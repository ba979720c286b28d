// Tests for configuration loading and replay script parsing

use anyhow::Result;
use mic_guardian::config::{ProviderKind, SourceKind};
use mic_guardian::{ClientId, Config, NameResolver, ReplayScript, StaticNames};
use std::time::Duration;

#[test]
fn test_defaults() {
    let config = Config::default();

    assert_eq!(config.service.name, "mic-guardian");
    assert!(config.service.http.enabled);
    assert_eq!(config.service.http.port, 7878);
    assert_eq!(config.monitor.log_capacity, 100);
    assert_eq!(config.source.kind, SourceKind::Pactl);
    assert_eq!(config.attribution.kind, ProviderKind::Disabled);
    assert_eq!(config.attribution.max_entries, 5);

    let scheduler = config.attribution.scheduler();
    assert_eq!(scheduler.poll_interval, Duration::from_secs(1));
    assert_eq!(scheduler.heartbeat_interval, Duration::from_secs(5));
    assert_eq!(scheduler.window, Duration::from_secs(10));
}

#[test]
fn test_missing_file_falls_back_to_defaults() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("absent");

    let config = Config::load(path.to_str().unwrap())?;
    assert_eq!(config.source.kind, SourceKind::Pactl);
    assert!(config.names.is_empty());
    Ok(())
}

#[test]
fn test_load_toml_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("guardian.toml");
    std::fs::write(
        &path,
        r#"
[service.http]
enabled = false
port = 9000

[monitor]
ignored_clients = ["mic-guardian"]

[source]
kind = "manual"

[attribution]
kind = "command"
poll_interval_ms = 250
command = ["echo", "zoom"]

[[names]]
id = "org.Zoom"
name = "Zoom Meetings"
"#,
    )?;

    // Extension is optional
    let config = Config::load(dir.path().join("guardian").to_str().unwrap())?;

    assert!(!config.service.http.enabled);
    assert_eq!(config.service.http.port, 9000);
    assert_eq!(config.monitor.ignored_clients, vec!["mic-guardian"]);
    assert_eq!(config.source.kind, SourceKind::Manual);
    assert_eq!(config.attribution.kind, ProviderKind::Command);
    assert_eq!(config.attribution.command, vec!["echo", "zoom"]);
    assert_eq!(
        config.attribution.scheduler().poll_interval,
        Duration::from_millis(250)
    );
    // Untouched keys keep their defaults
    assert_eq!(config.attribution.heartbeat_interval_ms, 5000);

    let names = StaticNames::new(config.name_table());
    assert_eq!(names.display_name(&ClientId::from("org.Zoom")), "Zoom Meetings");
    assert_eq!(names.display_name(&ClientId::from("arecord")), "arecord");
    Ok(())
}

#[test]
fn test_env_overrides_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("guardian.toml");
    std::fs::write(&path, "[attribution]\nwindow_ms = 3000\n")?;

    std::env::set_var("GUARDIAN__ATTRIBUTION__WINDOW_MS", "20000");
    let config = Config::load(path.to_str().unwrap());
    std::env::remove_var("GUARDIAN__ATTRIBUTION__WINDOW_MS");

    assert_eq!(config?.attribution.window_ms, 20_000);
    Ok(())
}

#[test]
fn test_unknown_source_kind_is_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("guardian.toml");
    std::fs::write(&path, "[source]\nkind = \"alsa\"\n")?;

    assert!(Config::load(path.to_str().unwrap()).is_err());
    Ok(())
}

#[test]
fn test_replay_script_parse() -> Result<()> {
    let script = ReplayScript::parse(
        r#"
# comment
{"at_ms": 500, "recording": []}
{"at_ms": 0, "foreground": ["zoom"]}

{"at_ms": 0, "recording": ["zoom"]}
"#,
    )?;

    let offsets: Vec<u64> = script.entries().iter().map(|e| e.at_ms).collect();
    assert_eq!(offsets, vec![0, 0, 500]);
    // Same offset keeps file order
    assert!(script.entries()[0].foreground.is_some());
    assert_eq!(script.entries()[1].recording, Some(vec!["zoom".to_string()]));
    Ok(())
}

#[test]
fn test_replay_script_errors_name_the_line() {
    let err = ReplayScript::parse("{\"at_ms\": 0, \"recording\": []}\nnot json\n").unwrap_err();
    assert!(format!("{:#}", err).contains("line 2"));

    let err = ReplayScript::parse("{\"at_ms\": 10}").unwrap_err();
    assert!(format!("{:#}", err).contains("neither"));
}

#[test]
fn test_demo_script_parses() -> Result<()> {
    let script = ReplayScript::load(concat!(env!("CARGO_MANIFEST_DIR"), "/demos/meeting.jsonl"))?;
    assert!(!script.entries().is_empty());
    Ok(())
}
