//! Configuration for the notetodo monitor.
//!
//! This module handles parsing configuration from environment variables.
//! Every variable is optional.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `NOTETODO_NOTES_DIR` | current directory | Notes directory to scan and watch |
//! | `NOTETODO_STORE_PATH` | `<data dir>/notetodo/todos.json` | Persisted todo store |
//! | `NOTETODO_EXTENSIONS` | `md,markdown,txt` | Comma-separated note extensions |
//! | `NOTETODO_DEBOUNCE_MS` | 500 | Per-file quiet window before a rescan |
//! | `NOTETODO_INFERENCE_URL` | `https://api.openai.com/v1` | OpenAI-compatible base URL |
//! | `NOTETODO_INFERENCE_MODEL` | `gpt-4o-mini` | Model name |
//! | `NOTETODO_API_KEY` | - | Bearer credential for the inference provider |
//! | `NOTETODO_INFERENCE_TIMEOUT_SECS` | 30 | Inference timeout (1-600) |
//! | `NOTETODO_DEDUP_WITHIN_BATCH` | false | Also dedup inferred candidates against each other |
//!
//! # Example
//!
//! ```no_run
//! use notetodo_monitor::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("Notes: {}", config.notes_dir.display());
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use directories::BaseDirs;
use thiserror::Error;

use crate::reconcile::ReconcilePolicy;
use crate::utils::DEFAULT_DEBOUNCE_MS;

/// Default note file extensions.
const DEFAULT_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

/// Application directory name under the platform data directory.
const DATA_DIR_NAME: &str = "notetodo";

/// Store file name inside [`DATA_DIR_NAME`].
const STORE_FILE_NAME: &str = "todos.json";

/// Default OpenAI-compatible API base URL.
pub const DEFAULT_INFERENCE_URL: &str = "https://api.openai.com/v1";

/// Default model name.
pub const DEFAULT_INFERENCE_MODEL: &str = "gpt-4o-mini";

/// Default inference timeout (in seconds).
pub const DEFAULT_INFERENCE_TIMEOUT_SECS: u64 = 30;

const MIN_INFERENCE_TIMEOUT_SECS: u64 = 1;
const MAX_INFERENCE_TIMEOUT_SECS: u64 = 600;

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to determine home directory.
    #[error("failed to determine home directory")]
    NoHomeDirectory,
}

/// Settings for the inference provider.
#[derive(Clone)]
pub struct InferenceConfig {
    /// API base URL, without a trailing slash.
    pub base_url: String,

    pub model: String,

    /// Bearer credential. `None` means every inference is unauthorized.
    pub api_key: Option<String>,

    /// Upper bound for a whole inference request.
    pub timeout: Duration,
}

impl std::fmt::Debug for InferenceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_INFERENCE_URL.to_string(),
            model: DEFAULT_INFERENCE_MODEL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(DEFAULT_INFERENCE_TIMEOUT_SECS),
        }
    }
}

/// Configuration for the notetodo monitor.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory scanned and watched for notes.
    pub notes_dir: PathBuf,

    /// Location of the persisted todo store.
    pub store_path: PathBuf,

    /// Note file extensions, lowercase and without a leading dot.
    pub extensions: Vec<String>,

    /// Per-file debounce window for change events.
    pub debounce: Duration,

    pub inference: InferenceConfig,

    /// How inferred candidates are deduplicated.
    pub reconcile_policy: ReconcilePolicy,
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - A numeric or boolean variable cannot be parsed or is out of range
    /// - `NOTETODO_EXTENSIONS` lists no extensions
    /// - The data directory cannot be determined (needed for the default store path)
    pub fn from_env() -> Result<Self, ConfigError> {
        let notes_dir = match env::var("NOTETODO_NOTES_DIR") {
            Ok(val) => PathBuf::from(val),
            Err(_) => env::current_dir().map_err(|e| ConfigError::InvalidValue {
                key: "NOTETODO_NOTES_DIR".to_string(),
                message: format!("not set and current directory is unavailable: {e}"),
            })?,
        };

        let store_path = match env::var("NOTETODO_STORE_PATH") {
            Ok(val) => PathBuf::from(val),
            Err(_) => default_store_path()?,
        };

        let extensions = match env::var("NOTETODO_EXTENSIONS") {
            Ok(val) => {
                let parsed = parse_extensions(&val);
                if parsed.is_empty() {
                    return Err(ConfigError::InvalidValue {
                        key: "NOTETODO_EXTENSIONS".to_string(),
                        message: "expected at least one extension".to_string(),
                    });
                }
                parsed
            }
            Err(_) => DEFAULT_EXTENSIONS.iter().map(|s| (*s).to_string()).collect(),
        };

        let debounce_ms = match env::var("NOTETODO_DEBOUNCE_MS") {
            Ok(val) => val.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: "NOTETODO_DEBOUNCE_MS".to_string(),
                message: format!("expected non-negative integer, got '{val}'"),
            })?,
            Err(_) => DEFAULT_DEBOUNCE_MS,
        };

        let base_url = env::var("NOTETODO_INFERENCE_URL")
            .map(|val| val.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| DEFAULT_INFERENCE_URL.to_string());

        let model = env::var("NOTETODO_INFERENCE_MODEL")
            .unwrap_or_else(|_| DEFAULT_INFERENCE_MODEL.to_string());

        let api_key = env::var("NOTETODO_API_KEY")
            .ok()
            .map(|val| val.trim().to_string())
            .filter(|val| !val.is_empty());

        let timeout_secs = match env::var("NOTETODO_INFERENCE_TIMEOUT_SECS") {
            Ok(val) => {
                let secs = val.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                    key: "NOTETODO_INFERENCE_TIMEOUT_SECS".to_string(),
                    message: format!("expected integer 1-600, got '{val}'"),
                })?;
                if !(MIN_INFERENCE_TIMEOUT_SECS..=MAX_INFERENCE_TIMEOUT_SECS).contains(&secs) {
                    return Err(ConfigError::InvalidValue {
                        key: "NOTETODO_INFERENCE_TIMEOUT_SECS".to_string(),
                        message: format!(
                            "timeout must be between {MIN_INFERENCE_TIMEOUT_SECS} and {MAX_INFERENCE_TIMEOUT_SECS}, got {secs}"
                        ),
                    });
                }
                secs
            }
            Err(_) => DEFAULT_INFERENCE_TIMEOUT_SECS,
        };

        let reconcile_policy = match env::var("NOTETODO_DEDUP_WITHIN_BATCH") {
            Ok(val) => {
                if parse_bool("NOTETODO_DEDUP_WITHIN_BATCH", &val)? {
                    ReconcilePolicy::WithinBatch
                } else {
                    ReconcilePolicy::AgainstExisting
                }
            }
            Err(_) => ReconcilePolicy::default(),
        };

        Ok(Self {
            notes_dir,
            store_path,
            extensions,
            debounce: Duration::from_millis(debounce_ms),
            inference: InferenceConfig {
                base_url,
                model,
                api_key,
                timeout: Duration::from_secs(timeout_secs),
            },
            reconcile_policy,
        })
    }
}

/// Returns `<data dir>/notetodo/todos.json` for the current user.
///
/// # Errors
///
/// Returns `ConfigError::NoHomeDirectory` if no home directory can be found.
pub fn default_store_path() -> Result<PathBuf, ConfigError> {
    let base_dirs = BaseDirs::new().ok_or(ConfigError::NoHomeDirectory)?;
    Ok(base_dirs
        .data_dir()
        .join(DATA_DIR_NAME)
        .join(STORE_FILE_NAME))
}

fn parse_extensions(val: &str) -> Vec<String> {
    val.split(',')
        .map(|s| s.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_bool(key: &str, val: &str) -> Result<bool, ConfigError> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean, got '{val}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    /// Helper to run tests with isolated environment variables.
    /// Clears all NOTETODO_* vars before the test and restores them after.
    fn with_clean_env<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let saved_vars: Vec<(String, String)> = env::vars()
            .filter(|(k, _)| k.starts_with("NOTETODO_"))
            .collect();

        for (key, _) in &saved_vars {
            env::remove_var(key);
        }

        let result = f();

        let leftover: Vec<String> = env::vars()
            .map(|(k, _)| k)
            .filter(|k| k.starts_with("NOTETODO_"))
            .collect();
        for key in leftover {
            env::remove_var(key);
        }
        for (key, value) in saved_vars {
            env::set_var(key, value);
        }

        result
    }

    #[test]
    #[serial]
    fn test_defaults() {
        with_clean_env(|| {
            let config = Config::from_env().expect("should parse empty environment");

            assert_eq!(config.notes_dir, env::current_dir().unwrap());
            assert!(config.store_path.ends_with("notetodo/todos.json"));
            assert_eq!(config.extensions, ["md", "markdown", "txt"]);
            assert_eq!(config.debounce, Duration::from_millis(500));
            assert_eq!(config.inference.base_url, DEFAULT_INFERENCE_URL);
            assert_eq!(config.inference.model, DEFAULT_INFERENCE_MODEL);
            assert!(config.inference.api_key.is_none());
            assert_eq!(config.inference.timeout, Duration::from_secs(30));
            assert_eq!(config.reconcile_policy, ReconcilePolicy::AgainstExisting);
        });
    }

    #[test]
    #[serial]
    fn test_full_config() {
        with_clean_env(|| {
            env::set_var("NOTETODO_NOTES_DIR", "/custom/notes");
            env::set_var("NOTETODO_STORE_PATH", "/custom/store.json");
            env::set_var("NOTETODO_EXTENSIONS", " .MD, org ,,");
            env::set_var("NOTETODO_DEBOUNCE_MS", "250");
            env::set_var("NOTETODO_INFERENCE_URL", "http://localhost:11434/v1/");
            env::set_var("NOTETODO_INFERENCE_MODEL", "llama3");
            env::set_var("NOTETODO_API_KEY", "sk-test");
            env::set_var("NOTETODO_INFERENCE_TIMEOUT_SECS", "5");
            env::set_var("NOTETODO_DEDUP_WITHIN_BATCH", "true");

            let config = Config::from_env().expect("should parse full config");

            assert_eq!(config.notes_dir, PathBuf::from("/custom/notes"));
            assert_eq!(config.store_path, PathBuf::from("/custom/store.json"));
            assert_eq!(config.extensions, ["md", "org"]);
            assert_eq!(config.debounce, Duration::from_millis(250));
            assert_eq!(config.inference.base_url, "http://localhost:11434/v1");
            assert_eq!(config.inference.model, "llama3");
            assert_eq!(config.inference.api_key.as_deref(), Some("sk-test"));
            assert_eq!(config.inference.timeout, Duration::from_secs(5));
            assert_eq!(config.reconcile_policy, ReconcilePolicy::WithinBatch);
        });
    }

    #[test]
    #[serial]
    fn test_blank_api_key_is_unset() {
        with_clean_env(|| {
            env::set_var("NOTETODO_API_KEY", "   ");
            let config = Config::from_env().unwrap();
            assert!(config.inference.api_key.is_none());
        });
    }

    #[test]
    #[serial]
    fn test_invalid_debounce() {
        with_clean_env(|| {
            env::set_var("NOTETODO_DEBOUNCE_MS", "soon");

            let err = Config::from_env().unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "NOTETODO_DEBOUNCE_MS")
            );
        });
    }

    #[test]
    #[serial]
    fn test_timeout_range() {
        with_clean_env(|| {
            for bad in ["0", "601", "-1", "ten"] {
                env::set_var("NOTETODO_INFERENCE_TIMEOUT_SECS", bad);
                let err = Config::from_env().unwrap_err();
                assert!(
                    matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "NOTETODO_INFERENCE_TIMEOUT_SECS"),
                    "{bad} should be rejected"
                );
            }

            for good in ["1", "600"] {
                env::set_var("NOTETODO_INFERENCE_TIMEOUT_SECS", good);
                assert!(Config::from_env().is_ok(), "{good} should be accepted");
            }
        });
    }

    #[test]
    #[serial]
    fn test_empty_extension_list_rejected() {
        with_clean_env(|| {
            env::set_var("NOTETODO_EXTENSIONS", " , ,");
            let err = Config::from_env().unwrap_err();
            assert!(err.to_string().contains("NOTETODO_EXTENSIONS"));
        });
    }

    #[test]
    #[serial]
    fn test_boolean_parsing() {
        with_clean_env(|| {
            env::set_var("NOTETODO_DEDUP_WITHIN_BATCH", "0");
            assert_eq!(
                Config::from_env().unwrap().reconcile_policy,
                ReconcilePolicy::AgainstExisting
            );

            env::set_var("NOTETODO_DEDUP_WITHIN_BATCH", "YES");
            assert_eq!(
                Config::from_env().unwrap().reconcile_policy,
                ReconcilePolicy::WithinBatch
            );

            env::set_var("NOTETODO_DEDUP_WITHIN_BATCH", "maybe");
            assert!(Config::from_env().is_err());
        });
    }

    #[test]
    fn test_inference_config_debug_redacts_key() {
        let config = InferenceConfig {
            api_key: Some("sk-secret".to_string()),
            ..InferenceConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_error_display() {
        let err = ConfigError::InvalidValue {
            key: "NOTETODO_DEBOUNCE_MS".to_string(),
            message: "bad".to_string(),
        };
        assert_eq!(err.to_string(), "invalid value for NOTETODO_DEBOUNCE_MS: bad");
        assert_eq!(
            ConfigError::NoHomeDirectory.to_string(),
            "failed to determine home directory"
        );
    }
}
