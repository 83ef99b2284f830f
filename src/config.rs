//! Service configuration.
//!
//! Thumbnail settings come from a JSON document, either inline in
//! `CONFIG_JSON` or in the file named by `CONFIG_PATH` (default
//! `config.json`). The listen address comes from `ADDR`/`PORT`.

use crate::error::ConfigError;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

fn default_max_processes() -> usize {
    4
}

fn default_frame_timeout_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    300
}

/// Thumbnail generation settings. Immutable once loaded.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Config {
    /// Number of snapshots to take
    pub n_snapshots: usize,
    /// Resize snapshots to this height
    pub thumb_height: u32,
    /// Framerate of the gif
    pub gif_framerate: u32,
    /// Path to the cache directory
    pub cache_dir: PathBuf,
    /// Hosts a source URL may point at
    #[serde(default)]
    pub allowed_hosts: Vec<String>,
    /// Ceiling on concurrent ffmpeg/ffprobe processes
    #[serde(default = "default_max_processes")]
    pub max_processes: usize,
    #[serde(default = "default_frame_timeout_secs")]
    pub frame_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Parent of per-run scratch directories (system temp dir if unset)
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

impl Config {
    /// Loads from `CONFIG_JSON`, then `CONFIG_PATH`, honouring `.env`.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let inline = env::var("CONFIG_JSON").ok().filter(|s| !s.is_empty());
        let path = env::var("CONFIG_PATH")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        Self::load_from(inline.as_deref(), Path::new(&path))
    }

    pub fn load_from(inline: Option<&str>, path: &Path) -> Result<Self, ConfigError> {
        if let Some(json) = inline {
            info!("using config from CONFIG_JSON environment variable");
            return Self::from_json(json);
        }

        info!(path = %path.display(), "using config from file");
        if !path.exists() {
            return Err(ConfigError::NotFound);
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, message: &str| {
            Err(ConfigError::Invalid {
                field,
                message: message.to_string(),
            })
        };

        if self.n_snapshots < 1 {
            return invalid("NSnapshots", "must be at least 1");
        }
        if self.thumb_height == 0 {
            return invalid("ThumbHeight", "must be greater than 0");
        }
        if self.gif_framerate == 0 {
            return invalid("GifFramerate", "must be greater than 0");
        }
        if self.cache_dir.as_os_str().is_empty() {
            return invalid("CacheDir", "must not be empty");
        }
        if self.max_processes == 0 {
            return invalid("MaxProcesses", "must be at least 1");
        }
        if self.frame_timeout_secs == 0 {
            return invalid("FrameTimeoutSecs", "must be greater than 0");
        }
        if self.request_timeout_secs == 0 {
            return invalid("RequestTimeoutSecs", "must be greater than 0");
        }
        Ok(())
    }

    /// Exact match against `AllowedHosts`. `host` includes an explicit port
    /// when the URL carries one.
    pub fn is_host_allowed(&self, host: &str) -> bool {
        self.allowed_hosts.iter().any(|h| h == host)
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_secs(self.frame_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Where the HTTP server listens.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub addr: String,
    pub port: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            addr: env::var("ADDR").unwrap_or_else(|_| String::from("0.0.0.0")),
            port: env::var("PORT").unwrap_or_else(|_| String::from("8080")),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }
}
