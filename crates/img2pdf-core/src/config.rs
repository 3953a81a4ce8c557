use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const MIB: u64 = 1024 * 1024;

/// Default per-item upload cap (40 MiB)
pub const DEFAULT_MAX_ITEM_BYTES: u64 = 40 * MIB;
/// Default aggregate upload cap (50 MiB)
pub const DEFAULT_MAX_REQUEST_BYTES: u64 = 50 * MIB;
/// Default in-memory buffering threshold before an upload spills to disk (3 MiB)
pub const DEFAULT_MEMORY_THRESHOLD_BYTES: u64 = 3 * MIB;

/// Environment variable prefix for configuration overrides,
/// e.g. `IMG2PDF__LIMITS__MAX_ITEM_BYTES=1048576`.
pub const ENV_PREFIX: &str = "IMG2PDF";

/// What the assembler does when an image that passed the extension check
/// cannot be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodePolicy {
    /// Abort the whole batch on the first decode failure
    #[default]
    FailFast,
    /// Skip the undecodable item and keep going
    SkipInvalid,
}

/// Where staged request files live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagingBackend {
    /// Files in a shared directory on disk
    #[default]
    Disk,
    /// In-process map (tests, ephemeral deployments)
    Memory,
}

/// Upload size limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Largest accepted single item in bytes
    #[serde(default = "default_max_item_bytes")]
    pub max_item_bytes: u64,

    /// Largest accepted request (sum of all items) in bytes
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: u64,

    /// Upload bytes kept in memory before spooling to a temp file
    #[serde(default = "default_memory_threshold_bytes")]
    pub memory_threshold_bytes: u64,
}

const fn default_max_item_bytes() -> u64 {
    DEFAULT_MAX_ITEM_BYTES
}

const fn default_max_request_bytes() -> u64 {
    DEFAULT_MAX_REQUEST_BYTES
}

const fn default_memory_threshold_bytes() -> u64 {
    DEFAULT_MEMORY_THRESHOLD_BYTES
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_item_bytes: DEFAULT_MAX_ITEM_BYTES,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            memory_threshold_bytes: DEFAULT_MEMORY_THRESHOLD_BYTES,
        }
    }
}

/// Staging area configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StagingConfig {
    #[serde(default)]
    pub backend: StagingBackend,

    /// Staging directory for the disk backend (defaults to $TMPDIR/img2pdf-staging)
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl StagingConfig {
    /// Resolved staging directory for the disk backend.
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(crate::util::default_staging_dir)
    }
}

/// Conversion behaviour
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionConfig {
    #[serde(default)]
    pub decode_policy: DecodePolicy,
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub staging: StagingConfig,

    #[serde(default)]
    pub conversion: ConversionConfig,
}

impl AppConfig {
    /// Load configuration from a single TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::ConfigLoad(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::ConfigLoad(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load layered configuration.
    ///
    /// Sources, lowest priority first: built-in defaults,
    /// `~/.config/img2pdf/config.toml`, `./config.toml`, then `IMG2PDF__*`
    /// environment variables.
    pub fn load() -> Result<Self> {
        let defaults = config::Config::try_from(&Self::default())
            .map_err(|e| Error::ConfigLoad(format!("Failed to seed defaults: {e}")))?;

        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(config_dir) = crate::util::config_dir() {
            let user_config = config_dir.join("img2pdf").join("config.toml");
            tracing::debug!("Looking for config at {}", user_config.display());
            builder = builder.add_source(config::File::from(user_config).required(false));
        }

        let settings = builder
            .add_source(config::File::from(Path::new("config.toml")).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| Error::ConfigLoad(e.to_string()))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| Error::ConfigLoad(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject limits that would make every request fail.
    pub fn validate(&self) -> Result<()> {
        let limits = &self.limits;
        if limits.max_item_bytes == 0 {
            return Err(Error::ConfigInvalid {
                field: "limits.max_item_bytes".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if limits.max_request_bytes == 0 {
            return Err(Error::ConfigInvalid {
                field: "limits.max_request_bytes".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if limits.max_item_bytes > limits.max_request_bytes {
            return Err(Error::ConfigInvalid {
                field: "limits.max_item_bytes".to_string(),
                reason: format!(
                    "{} exceeds limits.max_request_bytes ({})",
                    limits.max_item_bytes, limits.max_request_bytes
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_limits() {
        let config = AppConfig::default();
        assert_eq!(config.limits.max_item_bytes, 40 * 1024 * 1024);
        assert_eq!(config.limits.max_request_bytes, 50 * 1024 * 1024);
        assert_eq!(config.limits.memory_threshold_bytes, 3 * 1024 * 1024);
        assert_eq!(config.conversion.decode_policy, DecodePolicy::FailFast);
        assert_eq!(config.staging.backend, StagingBackend::Disk);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[limits]\nmax_item_bytes = 1024\n\n[conversion]\ndecode_policy = \"skip_invalid\"\n\n[staging]\nbackend = \"memory\""
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.limits.max_item_bytes, 1024);
        assert_eq!(config.limits.max_request_bytes, DEFAULT_MAX_REQUEST_BYTES);
        assert_eq!(config.conversion.decode_policy, DecodePolicy::SkipInvalid);
        assert_eq!(config.staging.backend, StagingBackend::Memory);
    }

    #[test]
    fn test_from_file_rejects_item_cap_above_request_cap() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[limits]\nmax_item_bytes = 10\nmax_request_bytes = 5").unwrap();

        let err = AppConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid { .. }));
    }

    #[test]
    fn test_from_file_missing() {
        let err = AppConfig::from_file("/nonexistent/img2pdf.toml").unwrap_err();
        assert!(matches!(err, Error::ConfigLoad(_)));
    }

    #[test]
    fn test_resolved_staging_dir() {
        let staging = StagingConfig {
            backend: StagingBackend::Disk,
            dir: Some(PathBuf::from("/srv/staging")),
        };
        assert_eq!(staging.resolved_dir(), PathBuf::from("/srv/staging"));
        assert!(StagingConfig::default().resolved_dir().ends_with("img2pdf-staging"));
    }
}
