use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use archiver_core::{ConfigError, ExportConfig, MAX_BATCH_SIZE};
use pretty_assertions::assert_eq;

fn config_from(pairs: &[(&str, &str)]) -> Result<ExportConfig, ConfigError> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    ExportConfig::from_lookup(|name| vars.get(name).cloned())
}

#[test]
fn empty_environment_yields_defaults() {
    let config = config_from(&[]).unwrap();
    assert_eq!(config, ExportConfig::default());
    assert_eq!(config.batch_size, 100);
    assert_eq!(config.max_batches, None);
}

#[test]
fn batch_size_is_clamped_to_api_maximum() {
    let config = config_from(&[("EXPORT_BATCH_SIZE", "500")]).unwrap();
    assert_eq!(config.batch_size, MAX_BATCH_SIZE);

    let config = config_from(&[("EXPORT_BATCH_SIZE", "0")]).unwrap();
    assert_eq!(config.batch_size, 1);
}

#[test]
fn overrides_are_applied() {
    let config = config_from(&[
        ("EXPORT_BATCH_DELAY_MS", "250"),
        ("EXPORT_MAX_BATCHES", "3"),
        ("EXPORTS_DIR", "/tmp/out"),
        ("DISCORD_API_BASE", "http://localhost:9000/api/"),
        ("PORT", "8080"),
    ])
    .unwrap();
    assert_eq!(config.batch_delay, Duration::from_millis(250));
    assert_eq!(config.max_batches, Some(3));
    assert_eq!(config.exports_dir, PathBuf::from("/tmp/out"));
    assert_eq!(config.api_base, "http://localhost:9000/api");
    assert_eq!(config.port, 8080);
}

#[test]
fn zero_batch_ceiling_means_unlimited() {
    let config = config_from(&[("EXPORT_MAX_BATCHES", "0")]).unwrap();
    assert_eq!(config.max_batches, None);
}

#[test]
fn blank_values_keep_defaults() {
    let config = config_from(&[("PORT", "   "), ("EXPORT_BATCH_SIZE", "")]).unwrap();
    assert_eq!(config.port, 3000);
    assert_eq!(config.batch_size, 100);
}

#[test]
fn malformed_number_names_the_variable() {
    let err = config_from(&[("EXPORT_BATCH_DELAY_MS", "soon")]).unwrap_err();
    let ConfigError::Invalid { name, value, .. } = err;
    assert_eq!(name, "EXPORT_BATCH_DELAY_MS");
    assert_eq!(value, "soon");
}
