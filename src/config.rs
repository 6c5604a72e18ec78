//! Runtime configuration
//!
//! Values come from (highest first) command-line flags, an optional TOML
//! file, then built-in defaults. The result is a plain value built once at
//! startup and passed into the engines.

use crate::protocol::{clamp_chunk_size, CHUNK_SIZE, DEFAULT_IP, DEFAULT_PORT};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Jsonl,
}

/// Contents of the optional `--config` file.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub port: Option<u16>,
    pub ip: Option<String>,
    pub read_timeout_secs: Option<u64>,
    pub log_file: Option<PathBuf>,
    pub log_format: Option<LogFormat>,
    pub digest: bool,
    pub chunk_size: Option<usize>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::parse(&data).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn parse(data: &str) -> Result<Self> {
        let s: Settings = toml::from_str(data)?;
        if s.port == Some(0) {
            anyhow::bail!("port must be in 1-65535");
        }
        Ok(s)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size.map(clamp_chunk_size).unwrap_or(CHUNK_SIZE)
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Existing, writable output directory
    pub dir: PathBuf,
    pub bind_ip: String,
    pub port: u16,
    /// Applied to each accepted connection; `None` waits forever
    pub read_timeout: Option<Duration>,
    pub chunk_size: usize,
    pub digest: bool,
    pub verbose: bool,
}

impl ServerConfig {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            bind_ip: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            read_timeout: None,
            chunk_size: CHUNK_SIZE,
            digest: false,
            verbose: false,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_ip, self.port)
    }
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub file: PathBuf,
    pub ip: String,
    pub port: u16,
    pub connect_timeout: Option<Duration>,
    pub chunk_size: usize,
    pub digest: bool,
    pub progress: bool,
}

impl ClientConfig {
    pub fn new(file: PathBuf) -> Self {
        Self {
            file,
            ip: DEFAULT_IP.to_string(),
            port: DEFAULT_PORT,
            connect_timeout: None,
            chunk_size: CHUNK_SIZE,
            digest: false,
            progress: false,
        }
    }
}
