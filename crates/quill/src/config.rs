//! Client configuration.
//!
//! Layered the usual way: built-in defaults, then an optional TOML file,
//! then `QUILL__`-prefixed environment variables. A commented default file
//! is written on first run.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

const APP_NAME: &str = "quill";
const ENV_PREFIX: &str = "QUILL";

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. "info" or "quill=debug".
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Top-level client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the assistant backend.
    pub base_url: String,
    /// Deadline for non-streaming requests, in seconds.
    pub request_timeout_secs: u64,
    /// Where OAuth tokens and the active-session marker persist. Defaults to
    /// `credentials.json` next to the config file.
    pub credentials_file: Option<String>,
    /// Where generated share images land. Defaults to the user's downloads
    /// directory.
    pub downloads_dir: Option<String>,
    pub logging: LoggingConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8090".to_string(),
            request_timeout_secs: 30,
            credentials_file: None,
            downloads_dir: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration, layering defaults, the config file (created with
    /// defaults when missing), and environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_file = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_dir()?.join("config.toml"),
        };
        if !config_file.exists() {
            write_default_config(&config_file)?;
        }

        let built = Config::builder()
            .add_source(
                File::from(config_file.as_path())
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .context("building configuration")?;

        // Missing keys fall back through serde(default).
        let mut config: ClientConfig = built.try_deserialize().context("parsing configuration")?;

        if let Some(ref file) = config.credentials_file {
            config.credentials_file = Some(expand_str_path(file)?.display().to_string());
        }
        if let Some(ref dir) = config.downloads_dir {
            config.downloads_dir = Some(expand_str_path(dir)?.display().to_string());
        }
        Ok(config)
    }

    /// Resolved credentials file path.
    pub fn credentials_path(&self) -> Result<PathBuf> {
        match &self.credentials_file {
            Some(file) => Ok(PathBuf::from(file)),
            None => Ok(default_config_dir()?.join("credentials.json")),
        }
    }

    /// Resolved downloads directory.
    pub fn downloads_path(&self) -> PathBuf {
        match &self.downloads_dir {
            Some(dir) => PathBuf::from(dir),
            None => dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}

/// Initialize tracing with the configured filter, honoring `RUST_LOG`.
pub fn init_tracing(default_filter: &str) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter.to_string()));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {parent:?}"))?;
    }
    let config = ClientConfig::default();
    let toml = toml::to_string_pretty(&config).context("serializing default config to TOML")?;
    let mut body = String::new();
    body.push_str("# Configuration for ");
    body.push_str(APP_NAME);
    body.push('\n');
    body.push_str("# File: ");
    body.push_str(&path.display().to_string());
    body.push('\n');
    body.push('\n');
    body.push_str(&toml);
    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}

fn default_config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        let mut path = PathBuf::from(dir);
        path.push(APP_NAME);
        return Ok(path);
    }

    if let Some(mut dir) = dirs::config_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

fn expand_str_path(text: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(text).context("expanding path")?;
    Ok(PathBuf::from(expanded.to_string()))
}
