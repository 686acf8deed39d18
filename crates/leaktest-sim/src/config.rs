//! TOML test-configuration files for the simulator.
//!
//! The file mirrors `TestConfig` directly:
//!
//! ```toml
//! test_duration_s = 30
//! mode = "manual"
//!
//! [[chambers]]
//! enabled = true
//! target_mbar = 300
//! threshold_mbar = 290
//! tolerance_mbar = 5
//! offset_mbar = 0.0
//! # ... two more [[chambers]] tables
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

use leaktest_core::TestConfig;

/// Load and validate a test configuration from a TOML file.
pub fn load_test_config(path: &Path) -> anyhow::Result<TestConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading test config {}", path.display()))?;
    let config: TestConfig = toml::from_str(&raw)
        .with_context(|| format!("parsing test config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Conventional location for the simulator's test configuration.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "leaktest")
        .map(|dirs| dirs.config_dir().join("test.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_a_full_config_file() {
        let toml = r#"
            test_duration_s = 30
            mode = "manual"

            [[chambers]]
            enabled = true
            target_mbar = 300
            threshold_mbar = 290
            tolerance_mbar = 5
            offset_mbar = 0.5

            [[chambers]]
            enabled = true
            target_mbar = 250
            threshold_mbar = 240
            tolerance_mbar = 5
            offset_mbar = 0.0

            [[chambers]]
            enabled = false
            target_mbar = 300
            threshold_mbar = 290
            tolerance_mbar = 5
            offset_mbar = 0.0
        "#;
        let dir = std::env::temp_dir().join("leaktest-sim-config-test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("test.toml");
        fs::write(&path, toml).unwrap();

        let config = load_test_config(&path).unwrap();
        assert_eq!(config.test_duration_s, 30);
        assert_eq!(config.chambers[1].target_mbar, 250);
        assert!(!config.chambers[2].enabled);
    }

    #[test]
    fn rejects_invalid_configuration() {
        let toml = r#"
            test_duration_s = 0
            mode = "manual"

            [[chambers]]
            enabled = true
            target_mbar = 300
            threshold_mbar = 290
            tolerance_mbar = 5
            offset_mbar = 0.0

            [[chambers]]
            enabled = true
            target_mbar = 300
            threshold_mbar = 290
            tolerance_mbar = 5
            offset_mbar = 0.0

            [[chambers]]
            enabled = true
            target_mbar = 300
            threshold_mbar = 290
            tolerance_mbar = 5
            offset_mbar = 0.0
        "#;
        let dir = std::env::temp_dir().join("leaktest-sim-config-test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("invalid.toml");
        fs::write(&path, toml).unwrap();

        assert!(load_test_config(&path).is_err());
    }
}
