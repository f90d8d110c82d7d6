//! Configuration loading: defaults, optional settings file, and
//! `OFERO`-prefixed environment overrides.

use std::path::PathBuf;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

use crate::pdf::DEFAULT_RENDER_DPI;

const CONFIG_FILE: &str = "config/settings";
const ENV_PREFIX: &str = "OFERO";

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("unable to resolve a home directory for default paths")]
    MissingProjectDirs,

    #[error(transparent)]
    Build(#[from] config::ConfigError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub cache: CacheConfig,
    pub ocr: OcrProviderConfig,
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// SQLite database file holding cached transcriptions.
    pub db_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcrProviderConfig {
    /// OpenAI-compatible API root, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Empty means no provider is configured; scanned pages then fail
    /// instead of being transcribed.
    pub api_key: String,
    pub model: String,
    pub max_completion_tokens: u32,
    pub timeout_secs: u64,
}

impl OcrProviderConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    pub render_dpi: u32,
}

/// Load configuration with precedence: env overrides (`OFERO__...`,
/// `__` as separator) > `config/settings.*` file > built-in defaults.
/// `OPENAI_API_KEY` is honored as the default api key so existing
/// provider setups work without any ofero-specific configuration.
pub fn load() -> Result<AppConfig, AppConfigError> {
    let default_db_path = default_cache_db_path()?;
    let settings = Config::builder()
        .set_default(
            "cache.db_path",
            default_db_path.to_string_lossy().to_string(),
        )?
        .set_default("ocr.base_url", "https://api.openai.com/v1")?
        .set_default(
            "ocr.api_key",
            std::env::var("OPENAI_API_KEY").unwrap_or_default(),
        )?
        .set_default("ocr.model", "gpt-4o")?
        .set_default("ocr.max_completion_tokens", 4096_i64)?
        .set_default("ocr.timeout_secs", 120_i64)?
        .set_default("extraction.render_dpi", DEFAULT_RENDER_DPI as i64)?
        .add_source(File::with_name(CONFIG_FILE).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;
    Ok(settings.try_deserialize()?)
}

pub fn project_dirs() -> Result<ProjectDirs, AppConfigError> {
    ProjectDirs::from("dev", "ofero", "ofero").ok_or(AppConfigError::MissingProjectDirs)
}

fn default_cache_db_path() -> Result<PathBuf, AppConfigError> {
    Ok(project_dirs()?.data_dir().join("ocr_cache.db"))
}
