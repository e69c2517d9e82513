//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$ATTACHSPOOL_CONFIG` (environment variable)
//! 2. `~/.config/attachspool/config.toml` (Linux/macOS)
//!    `%APPDATA%\attachspool\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::codec::DEFAULT_ENCODE_CHUNK;
use crate::store::{SpoolOptions, DEFAULT_THRESHOLD};
use crate::version::ExchangeVersion;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Spooling of decoded payloads.
    pub spool: SpoolConfig,
    /// Base64 streaming.
    pub codec: CodecConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Server version documents are written for, e.g. "Exchange2010_SP2".
    pub server_version: String,
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
}

/// Spooling of decoded payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpoolConfig {
    /// Largest payload kept in memory, in bytes (default: 1048576 = 1 MB).
    pub threshold: usize,
    /// Directory for spool files (default: system temp dir).
    pub temp_dir: Option<PathBuf>,
}

/// Base64 streaming.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Raw bytes per encoded text segment (default: 49152 = 48 KB).
    pub encode_chunk_size: usize,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            server_version: ExchangeVersion::default().to_string(),
            cache_dir: None,
        }
    }
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            temp_dir: None,
        }
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            encode_chunk_size: DEFAULT_ENCODE_CHUNK,
        }
    }
}

impl Config {
    /// Spool options for readers built from this configuration.
    pub fn spool_options(&self) -> SpoolOptions {
        SpoolOptions {
            threshold: self.spool.threshold,
            temp_dir: self.spool.temp_dir.clone(),
        }
    }

    /// Configured server version, or the default when unparseable.
    pub fn server_version(&self) -> ExchangeVersion {
        self.general.server_version.parse().unwrap_or_else(|e| {
            tracing::warn!(
                value = %self.general.server_version,
                error = %e,
                "Invalid server version, using default"
            );
            ExchangeVersion::default()
        })
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    match config_file_path() {
        Some(path) if path.exists() => load_config_from(&path),
        _ => Config::default(),
    }
}

/// Load configuration from `path`, falling back to defaults on any error.
pub fn load_config_from(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(cfg) => {
                tracing::info!(path = %path.display(), "Loaded config");
                cfg
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to parse config, using defaults"
                );
                Config::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to read config file, using defaults"
            );
            Config::default()
        }
    }
}

/// Save configuration to the standard location and return where it went.
pub fn save_config(config: &Config) -> anyhow::Result<PathBuf> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;
    save_config_to(config, &path)?;
    Ok(path)
}

/// Save configuration to `path`, creating parent directories.
pub fn save_config_to(config: &Config, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("ATTACHSPOOL_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("attachspool").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("attachspool")
}
