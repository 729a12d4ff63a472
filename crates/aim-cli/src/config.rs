//! Verification run configuration.
//!
//! Layered lowest to highest precedence:
//!
//! 1. YAML file given with `--config`.
//! 2. Environment:
//!    - `FERNET_KEY`: current key, used for both sides.
//!    - `OLD_FERNET_KEY`: previous key, tried after `FERNET_KEY`.
//!    - `AIM_SOURCE_KEYS`, `AIM_MIGRATED_KEYS`: comma-separated key lists
//!      for one side only.
//! 3. Command-line flags.
//!
//! Keys are parsed into [`KeyRing`]s when the configuration is resolved, so
//! a bad key is reported before any dataset is read.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use aim_crypto::{CryptoError, KeyRing};
use aim_schema::SchemaRevision;
use aim_verify::CompareOptions;

pub const ENV_CURRENT_KEY: &str = "FERNET_KEY";
pub const ENV_PREVIOUS_KEY: &str = "OLD_FERNET_KEY";
pub const ENV_SOURCE_KEYS: &str = "AIM_SOURCE_KEYS";
pub const ENV_MIGRATED_KEYS: &str = "AIM_MIGRATED_KEYS";

/// Contents of a `--config` YAML file. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub source: Option<PathBuf>,
    pub migrated: Option<PathBuf>,
    pub source_keys: Vec<String>,
    pub migrated_keys: Vec<String>,
    pub include_ids: Option<bool>,
    pub compare_timestamps: Option<bool>,
    pub revision: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Values given on the command line. Empty or `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct FlagOverrides {
    pub source: Option<PathBuf>,
    pub migrated: Option<PathBuf>,
    pub source_keys: Vec<String>,
    pub migrated_keys: Vec<String>,
    pub include_ids: bool,
    pub ignore_timestamps: bool,
    pub revision: Option<SchemaRevision>,
}

/// A fully resolved verification run.
#[derive(Clone)]
pub struct VerifyConfig {
    pub source: PathBuf,
    pub migrated: PathBuf,
    pub source_keys: KeyRing,
    pub migrated_keys: KeyRing,
    pub compare: CompareOptions,
    /// `None` detects the revision per dataset.
    pub revision: Option<SchemaRevision>,
}

impl std::fmt::Debug for VerifyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifyConfig")
            .field("source", &self.source)
            .field("migrated", &self.migrated)
            .field("source_keys", &format_args!("[REDACTED; {}]", self.source_keys.len()))
            .field("migrated_keys", &format_args!("[REDACTED; {}]", self.migrated_keys.len()))
            .field("compare", &self.compare)
            .field("revision", &self.revision)
            .finish()
    }
}

impl VerifyConfig {
    /// Resolve from the process environment.
    pub fn resolve(config_file: Option<&Path>, flags: FlagOverrides) -> Result<Self, ConfigError> {
        let file = match config_file {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::layer(file, |var| std::env::var(var).ok(), flags)
    }

    /// Combine the three layers. `env` looks up one variable.
    pub fn layer(
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
        flags: FlagOverrides,
    ) -> Result<Self, ConfigError> {
        let shared = shared_keys_from_env(&env);

        let source_keys = pick_keys([
            flags.source_keys,
            env_list(&env, ENV_SOURCE_KEYS),
            shared.clone(),
            file.source_keys,
        ]);
        let migrated_keys = pick_keys([
            flags.migrated_keys,
            env_list(&env, ENV_MIGRATED_KEYS),
            shared,
            file.migrated_keys,
        ]);

        let revision = match (flags.revision, file.revision) {
            (Some(r), _) => Some(r),
            (None, Some(text)) => Some(
                text.parse::<SchemaRevision>()
                    .map_err(|_| ConfigError::InvalidRevision(text))?,
            ),
            (None, None) => None,
        };

        let defaults = CompareOptions::default();
        let compare = CompareOptions {
            include_ids: flags.include_ids || file.include_ids.unwrap_or(defaults.include_ids),
            compare_timestamps: !flags.ignore_timestamps
                && file.compare_timestamps.unwrap_or(defaults.compare_timestamps),
        };

        Ok(Self {
            source: flags.source.or(file.source).ok_or(ConfigError::MissingInput("source"))?,
            migrated: flags
                .migrated
                .or(file.migrated)
                .ok_or(ConfigError::MissingInput("migrated"))?,
            source_keys: key_ring("source", &source_keys)?,
            migrated_keys: key_ring("migrated", &migrated_keys)?,
            compare,
            revision,
        })
    }
}

/// `FERNET_KEY` followed by `OLD_FERNET_KEY`, if set.
pub fn shared_keys_from_env(env: impl Fn(&str) -> Option<String>) -> Vec<String> {
    [ENV_CURRENT_KEY, ENV_PREVIOUS_KEY]
        .into_iter()
        .filter_map(|var| env(var))
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}

fn env_list(env: impl Fn(&str) -> Option<String>, var: &str) -> Vec<String> {
    env(var)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// The first non-empty layer wins; layers are given highest first.
fn pick_keys<const N: usize>(layers: [Vec<String>; N]) -> Vec<String> {
    layers.into_iter().find(|l| !l.is_empty()).unwrap_or_default()
}

/// Parse an ordered key list for one side.
pub fn key_ring(side: &'static str, keys: &[String]) -> Result<KeyRing, ConfigError> {
    if keys.is_empty() {
        return Err(ConfigError::MissingKeys(side));
    }
    KeyRing::from_base64_keys(keys).map_err(|source| ConfigError::InvalidKey { side, source })
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("no {0} dataset given (flag or config file)")]
    MissingInput(&'static str),
    #[error("no {0} keys given; set FERNET_KEY or pass keys explicitly")]
    MissingKeys(&'static str),
    #[error("invalid {side} key: {source}")]
    InvalidKey {
        side: &'static str,
        #[source]
        source: CryptoError,
    },
    #[error("unknown schema revision {0:?}")]
    InvalidRevision(String),
}
