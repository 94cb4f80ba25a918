// ABOUTME: Behavioral tests for configuration loading
// Verifies defaults, partial files and how settings flow into git invocations

use anyhow::Result;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

use commit_canvas::config::{AppConfig, CredentialBackend};

/// Defaults favor unreliable networks and keep credentials in the keychain
#[test]
fn test_default_config_has_sensible_values() {
    let config = AppConfig::default();

    assert!(!config.transport.ssl_verify);
    assert_eq!(config.transport.http_post_buffer, 524_288_000);
    assert_eq!(config.transport.low_speed_limit, 1000);
    assert_eq!(config.transport.low_speed_time, 300);
    assert_eq!(config.transport.clone_depth, 1);

    assert_eq!(config.tasks.git_binary, "git");
    assert!(config.tasks.event_buffer > 0);
    assert_eq!(config.tasks.speed_sample_interval, Duration::from_secs(1));

    assert_eq!(config.credentials.backend, CredentialBackend::Keyring);
    assert!(!config.remote.accepted_token_prefixes.is_empty());
}

/// A partial file overrides only what it names
#[test]
fn test_partial_config_file_keeps_other_defaults() -> Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("config.toml");
    fs::write(
        &path,
        r#"
[transport]
ssl_verify = true
clone_depth = 0

[tasks]
cancel_grace = 5

[credentials]
backend = "file"
file_path = "/tmp/canvas-credentials.json"
"#,
    )?;

    let config = AppConfig::load_from_path(&path)?;

    assert!(config.transport.ssl_verify);
    assert_eq!(config.transport.clone_depth, 0);
    assert_eq!(config.transport.low_speed_time, 300);
    assert_eq!(config.tasks.cancel_grace, Duration::from_secs(5));
    assert_eq!(config.tasks.git_binary, "git");
    assert_eq!(config.credentials.backend, CredentialBackend::File);
    assert_eq!(
        config.credentials.resolved_file_path(),
        std::path::PathBuf::from("/tmp/canvas-credentials.json")
    );
    Ok(())
}

/// Transport settings become per-invocation `-c` overrides
#[test]
fn test_transport_settings_become_git_config_args() {
    let args = AppConfig::default().transport.git_config_args();

    assert_eq!(
        args,
        vec![
            "-c",
            "http.sslVerify=false",
            "-c",
            "http.postBuffer=524288000",
            "-c",
            "http.lowSpeedLimit=1000",
            "-c",
            "http.lowSpeedTime=300",
        ]
    );
}

/// Invalid TOML is reported with the offending path
#[test]
fn test_invalid_config_file_is_an_error() -> Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("config.toml");
    fs::write(&path, "[transport\nssl_verify = ")?;

    let err = AppConfig::load_from_path(&path).unwrap_err();
    assert!(format!("{err:#}").contains("config.toml"));
    Ok(())
}

/// Serialized config reads back to the same settings
#[test]
fn test_config_survives_toml_serialization() -> Result<()> {
    let mut config = AppConfig::default();
    config.scanner.max_depth = 3;
    config.remote.api_base = "https://git.example.com/api/v3".to_string();

    let temp = TempDir::new()?;
    let path = temp.path().join("config.toml");
    fs::write(&path, toml::to_string_pretty(&config)?)?;
    let loaded = AppConfig::load_from_path(&path)?;

    assert_eq!(loaded.scanner.max_depth, 3);
    assert_eq!(loaded.remote.api_base, "https://git.example.com/api/v3");
    assert_eq!(loaded.transport, config.transport);
    Ok(())
}
