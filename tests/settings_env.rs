mod common;

use autopiloot_limiter::config::{DEFAULT_SETTINGS_PATH, SETTINGS_ENV_VAR};
use autopiloot_limiter::{ConfigError, LimitsConfig};
use common::test_helpers::LogCapture;
use std::io::Write;

// Only test in this binary: it owns AUTOPILOOT_SETTINGS.
#[test]
fn from_env_resolves_settings_path() {
    let logs = LogCapture::default();
    let _guard = logs.install();
    let dir = tempfile::tempdir().unwrap();

    // Unset: falls back to the default path, absent in the crate root.
    std::env::remove_var(SETTINGS_ENV_VAR);
    let config = LimitsConfig::from_env().unwrap();
    assert!(config.rapidapi.plugins.is_empty());
    assert!(logs.contents().contains(DEFAULT_SETTINGS_PATH));

    // Points at a missing file: empty config plus a warning naming the path.
    let missing = dir.path().join("absent.yaml");
    std::env::set_var(SETTINGS_ENV_VAR, &missing);
    let config = LimitsConfig::from_env().unwrap();
    assert!(config.rapidapi.plugins.is_empty());
    let out = logs.contents();
    assert!(out.contains("WARN"));
    assert!(out.contains("settings file not found; no plugins configured"));
    assert!(out.contains("autopiloot_limiter::config"));
    assert!(out.contains(&missing.display().to_string()));

    // Malformed file: the parse error is returned, not swallowed.
    let malformed = dir.path().join("settings.yaml");
    std::fs::File::create(&malformed)
        .unwrap()
        .write_all(b"rapidapi:\n  plugins:\n    twitter:\n      limits:\n        monthly: -1\n")
        .unwrap();
    std::env::set_var(SETTINGS_ENV_VAR, &malformed);
    assert!(matches!(LimitsConfig::from_env(), Err(ConfigError::Yaml(_))));

    // Well-formed file is loaded.
    std::fs::write(&malformed, "rapidapi:\n  plugins:\n    twitter:\n      limits:\n        monthly: 5\n")
        .unwrap();
    let config = LimitsConfig::from_env().unwrap();
    assert_eq!(config.rapidapi.plugins.len(), 1);
}
