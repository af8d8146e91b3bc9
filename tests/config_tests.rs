use anyhow::Result;
use botguard::config::{
    resolve_retry_config, BotguardConfig, ConfigError, RetryConfig, RetryOverride,
    DEFAULT_RETRY_CONFIG, DISCORD_RETRY_DEFAULTS,
};
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_camel_case_document() -> Result<()> {
    let mut file = NamedTempFile::new()?;
    writeln!(
        file,
        r#"{{
            "channels": {{
                "telegram": {{ "retry": {{ "attempts": 5, "minDelayMs": 250, "maxDelayMs": 10000 }} }},
                "discord": {{ "retry": {{ "jitter": 0.2 }} }}
            }}
        }}"#
    )?;

    let config = BotguardConfig::load(file.path())?;

    let telegram = config.telegram_retry().copied().unwrap_or_default();
    assert_eq!(telegram.attempts, Some(5));
    assert_eq!(telegram.min_delay_ms, Some(250));
    assert_eq!(telegram.max_delay_ms, Some(10_000));
    assert_eq!(telegram.jitter, None);
    assert_eq!(config.discord_retry().and_then(|r| r.jitter), Some(0.2));
    Ok(())
}

#[test]
fn test_snake_case_keys_are_accepted() -> Result<()> {
    let config = BotguardConfig::from_json_str(
        r#"{ "channels": { "discord": { "retry": { "min_delay_ms": 750, "max_delay_ms": 5000 } } } }"#,
    )?;

    let resolved = resolve_retry_config(DISCORD_RETRY_DEFAULTS, &[config.discord_retry()]);

    assert_eq!(resolved.min_delay_ms, 750);
    assert_eq!(resolved.max_delay_ms, 5_000);
    assert_eq!(resolved.attempts, DISCORD_RETRY_DEFAULTS.attempts);
    Ok(())
}

#[test]
fn test_missing_sections_fall_back_to_defaults() -> Result<()> {
    let config = BotguardConfig::from_json_str(r#"{ "gateway": { "port": 18789 } }"#)?;

    assert!(config.telegram_retry().is_none());
    assert!(config.discord_retry().is_none());
    assert_eq!(
        resolve_retry_config(DISCORD_RETRY_DEFAULTS, &[config.discord_retry(), None]),
        DISCORD_RETRY_DEFAULTS
    );
    Ok(())
}

#[test]
fn test_invalid_json_is_parse_error() {
    let err = BotguardConfig::from_json_str("{ channels: ").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_wrong_field_type_is_parse_error() {
    let err = BotguardConfig::from_json_str(
        r#"{ "channels": { "telegram": { "retry": { "attempts": "many" } } } }"#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_missing_file_is_read_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("absent.json");

    let err = BotguardConfig::load(&path).unwrap_err();

    match err {
        ConfigError::Read { path: reported, .. } => {
            assert!(reported.ends_with("absent.json"));
        }
        other => panic!("Expected read error, got {:?}", other),
    }
    Ok(())
}

#[test]
fn test_resolution_normalizes_out_of_range_values() {
    let wild = RetryOverride::default()
        .attempts(0)
        .min_delay_ms(5_000)
        .max_delay_ms(1_000)
        .jitter(3.0);

    let resolved = resolve_retry_config(DEFAULT_RETRY_CONFIG, &[Some(&wild)]);

    assert_eq!(
        resolved,
        RetryConfig {
            attempts: 1,
            min_delay_ms: 5_000,
            max_delay_ms: 5_000,
            jitter: 1.0,
        }
    );
}
