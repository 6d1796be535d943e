//! Runtime configuration.
//!
//! Values come from the environment (a `.env` file is loaded by the binary
//! first) and fall back to defaults; CLI flags override both.

use std::path::PathBuf;

/// File name of the persisted artifact inside the model directory.
pub const ARTIFACT_FILE_NAME: &str = "best_model.bin";

/// Where log output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    Stderr,
    File,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// SQLite database holding `features` and `predictions_log`
    pub database_path: PathBuf,
    /// Directory of the model artifact
    pub model_dir: PathBuf,
    pub log_mode: LogMode,
    /// Append-only log file used when `log_mode` is `File`
    pub log_file: PathBuf,
    /// Seed for the split, the forest and boosting
    pub seed: u64,
    /// Held-out fraction, in (0, 1)
    pub test_size: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/hdp.sqlite3"),
            model_dir: PathBuf::from("models"),
            log_mode: LogMode::Stderr,
            log_file: PathBuf::from("logs/hdp.log"),
            seed: 42,
            test_size: 0.2,
        }
    }
}

impl Config {
    /// Load config overrides from the process environment (best-effort).
    ///
    /// Supported:
    /// - HDP_DATABASE_PATH
    /// - HDP_MODEL_DIR
    /// - HDP_LOG_MODE="stderr" | "file"
    /// - HDP_LOG_FILE
    /// - HDP_SEED
    /// - HDP_TEST_SIZE (exclusive range 0..1)
    ///
    /// Unusable values keep their default and are reported in the returned
    /// warnings, which the caller logs once a subscriber is installed.
    #[must_use]
    pub fn from_env_or_default() -> (Self, Vec<String>) {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Config::from_env_or_default`] with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> (Self, Vec<String>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let mut warnings = Vec::new();

        if let Some(v) = lookup("HDP_DATABASE_PATH").filter(|v| !v.trim().is_empty()) {
            cfg.database_path = PathBuf::from(v.trim());
        }

        if let Some(v) = lookup("HDP_MODEL_DIR").filter(|v| !v.trim().is_empty()) {
            cfg.model_dir = PathBuf::from(v.trim());
        }

        if let Some(v) = lookup("HDP_LOG_MODE") {
            match v.trim().to_ascii_lowercase().as_str() {
                "stderr" => cfg.log_mode = LogMode::Stderr,
                "file" => cfg.log_mode = LogMode::File,
                other => warnings.push(format!(
                    "Ignoring HDP_LOG_MODE={other:?}; expected stderr or file"
                )),
            }
        }

        if let Some(v) = lookup("HDP_LOG_FILE").filter(|v| !v.trim().is_empty()) {
            cfg.log_file = PathBuf::from(v.trim());
        }

        if let Some(v) = lookup("HDP_SEED") {
            match v.trim().parse::<u64>() {
                Ok(seed) => cfg.seed = seed,
                Err(_) => warnings.push(format!(
                    "Ignoring HDP_SEED={v:?}; expected an unsigned integer"
                )),
            }
        }

        if let Some(v) = lookup("HDP_TEST_SIZE") {
            match v.trim().parse::<f64>() {
                Ok(x) if x > 0.0 && x < 1.0 => cfg.test_size = x,
                _ => warnings.push(format!(
                    "Ignoring HDP_TEST_SIZE={v:?}; expected a value in (0, 1)"
                )),
            }
        }

        (cfg, warnings)
    }

    /// Path of the persisted artifact.
    #[must_use]
    pub fn artifact_path(&self) -> PathBuf {
        self.model_dir.join(ARTIFACT_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let (cfg, warnings) = Config::from_lookup(lookup(&[]));
        assert_eq!(cfg, Config::default());
        assert!(warnings.is_empty());
        assert_eq!(cfg.artifact_path(), PathBuf::from("models/best_model.bin"));
    }

    #[test]
    fn test_overrides() {
        let (cfg, warnings) = Config::from_lookup(lookup(&[
            ("HDP_DATABASE_PATH", "/tmp/x.db"),
            ("HDP_MODEL_DIR", "out"),
            ("HDP_LOG_MODE", "FILE"),
            ("HDP_SEED", "7"),
            ("HDP_TEST_SIZE", "0.25"),
        ]));
        assert_eq!(cfg.database_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(cfg.artifact_path(), PathBuf::from("out/best_model.bin"));
        assert_eq!(cfg.log_mode, LogMode::File);
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.test_size, 0.25);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let (cfg, warnings) = Config::from_lookup(lookup(&[
            ("HDP_LOG_MODE", "syslog"),
            ("HDP_SEED", "-1"),
            ("HDP_TEST_SIZE", "1.5"),
            ("HDP_MODEL_DIR", "  "),
        ]));
        assert_eq!(cfg, Config::default());
        assert_eq!(warnings.len(), 3);
        assert!(warnings[0].contains("HDP_LOG_MODE"));
        assert!(warnings[1].contains("HDP_SEED"));
        assert!(warnings[2].contains("HDP_TEST_SIZE"));
    }
}
