//! Application configuration for meeplesync.
//!
//! User config lives at `~/.meeplesync/meeplesync.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MeeplesyncError, Result};
use crate::types::{TagFlag, default_output_columns, default_tag_flags};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "meeplesync.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".meeplesync";

// ---------------------------------------------------------------------------
// Config structs (matching meeplesync.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// XML API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Retry behavior for batch lookups.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Output CSV settings.
    #[serde(default)]
    pub output: OutputConfig,

    /// License report compiler settings.
    #[serde(default)]
    pub licenses: LicensesConfig,
}

/// `[api]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL for the XML API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Number of source records per lookup call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Whether to request the `stats` block (needed for complexity).
    #[serde(default = "default_true")]
    pub stats: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            batch_size: default_batch_size(),
            stats: default_true(),
        }
    }
}

fn default_base_url() -> String {
    "https://boardgamegeek.com/xmlapi2".into()
}
fn default_batch_size() -> usize {
    20
}
fn default_true() -> bool {
    true
}

/// `[retry]` section.
///
/// The defaults reproduce the long-standing importer behavior: retry
/// forever with a fixed 5-second delay. Set `max_attempts` to bound the
/// loop, or `backoff_cap_secs` to switch to capped exponential backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts per batch. Unset means unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,

    /// Seconds to wait before reissuing a failed request.
    #[serde(default = "default_retry_delay")]
    pub delay_secs: u64,

    /// When set, the delay doubles per attempt up to this cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_cap_secs: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            delay_secs: default_retry_delay(),
            backoff_cap_secs: None,
        }
    }
}

fn default_retry_delay() -> u64 {
    5
}

impl RetryConfig {
    /// Delay before the given retry (0-based attempt counter).
    pub fn delay(&self, attempt: u32) -> Duration {
        match self.backoff_cap_secs {
            Some(cap) => {
                let scaled = self
                    .delay_secs
                    .saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX))
                    .min(cap);
                Duration::from_secs(scaled)
            }
            None => Duration::from_secs(self.delay_secs),
        }
    }

    /// Whether another attempt is allowed after `attempt` failures.
    pub fn allows(&self, attempt: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempt < max,
            None => true,
        }
    }
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Accepted output columns; merged-row fields outside this set are dropped.
    #[serde(default = "default_output_columns")]
    pub columns: Vec<String>,

    /// Emit pipe-joined category/mechanic/family columns.
    #[serde(default = "default_true")]
    pub include_taxonomy: bool,

    /// Delimiter for the taxonomy columns.
    #[serde(default = "default_taxonomy_delimiter")]
    pub taxonomy_delimiter: String,

    /// Characters of the description to keep. The hosted database has a
    /// size limit, so the default keeps none.
    #[serde(default)]
    pub description_nchars: usize,

    /// Boolean tag columns derived from item links.
    #[serde(default = "default_tag_flags")]
    pub flags: Vec<TagFlag>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            columns: default_output_columns(),
            include_taxonomy: default_true(),
            taxonomy_delimiter: default_taxonomy_delimiter(),
            description_nchars: 0,
            flags: default_tag_flags(),
        }
    }
}

fn default_taxonomy_delimiter() -> String {
    "|".into()
}

/// `[licenses]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicensesConfig {
    /// Prefix for resolving relative repository URLs in the manifest.
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,

    /// Path to the package manifest JSON.
    #[serde(default = "default_manifest")]
    pub manifest: String,

    /// Path the compiled Markdown report is written to.
    #[serde(default = "default_licenses_output")]
    pub output: String,

    /// Directory holding installed packages, searched for LICENSE files.
    #[serde(default = "default_packages_dir")]
    pub packages_dir: String,
}

impl Default for LicensesConfig {
    fn default() -> Self {
        Self {
            url_prefix: default_url_prefix(),
            manifest: default_manifest(),
            output: default_licenses_output(),
            packages_dir: default_packages_dir(),
        }
    }
}

fn default_url_prefix() -> String {
    "https://github.com".into()
}
fn default_manifest() -> String {
    "licenses.json".into()
}
fn default_licenses_output() -> String {
    "licenses.md".into()
}
fn default_packages_dir() -> String {
    "node_modules".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.meeplesync/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| MeeplesyncError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.meeplesync/meeplesync.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| MeeplesyncError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| MeeplesyncError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| MeeplesyncError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| MeeplesyncError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| MeeplesyncError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("base_url"));
        assert!(toml_str.contains("boardgamegeek.com"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.api.batch_size, 20);
        assert_eq!(parsed.retry.delay_secs, 5);
        assert!(parsed.retry.max_attempts.is_none());
    }

    #[test]
    fn config_with_custom_flags() {
        let toml_str = r#"
[api]
batch_size = 10

[[output.flags]]
column = "is_legacy"
link_type = "boardgamemechanic"
link_value = "Legacy Game"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.api.batch_size, 10);
        assert_eq!(config.output.flags.len(), 1);
        assert_eq!(config.output.flags[0].column, "is_legacy");
    }

    #[test]
    fn fixed_delay_ignores_attempt() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay(0), Duration::from_secs(5));
        assert_eq!(retry.delay(7), Duration::from_secs(5));
        assert!(retry.allows(1_000_000));
    }

    #[test]
    fn exponential_backoff_caps() {
        let retry = RetryConfig {
            max_attempts: Some(4),
            delay_secs: 2,
            backoff_cap_secs: Some(10),
        };
        assert_eq!(retry.delay(0), Duration::from_secs(2));
        assert_eq!(retry.delay(1), Duration::from_secs(4));
        assert_eq!(retry.delay(2), Duration::from_secs(8));
        assert_eq!(retry.delay(3), Duration::from_secs(10));
        assert!(retry.allows(3));
        assert!(!retry.allows(4));
    }
}
