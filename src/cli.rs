//! Command-line surface for `hf`

use crate::config::{ClientConfig, LogFormat, ServerConfig, Settings};
use anyhow::Result;
use clap::{ArgGroup, Parser};
use std::path::PathBuf;
use std::time::Duration;

/// Send one file to an `hf` server, or receive files into a directory.
#[derive(Clone, Debug, Parser)]
#[command(
    name = "hf",
    version,
    about = "Single-file transfer over TCP",
    group(ArgGroup::new("mode").required(true).args(["server", "client"]))
)]
pub struct Args {
    /// Server mode: save received files into DIR
    #[arg(short = 's', long = "server", value_name = "DIR")]
    pub server: Option<PathBuf>,

    /// Client mode: send FILE
    #[arg(short = 'c', long = "client", value_name = "FILE")]
    pub client: Option<PathBuf>,

    /// Server address (client only) [default: 127.0.0.1]
    #[arg(short = 'i', long = "ip", conflicts_with = "server")]
    pub ip: Option<String>,

    /// TCP port, 1-65535 [default: 9000]
    #[arg(short = 'p', long, value_parser = clap::value_parser!(u16).range(1..))]
    pub port: Option<u16>,

    /// TOML file with default settings
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Append session records to FILE
    #[arg(long = "log-file", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Format of --log-file records
    #[arg(long = "log-format", value_enum)]
    pub log_format: Option<LogFormat>,

    /// Read timeout per connection (server) or connect timeout (client), in seconds
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Compute and print a BLAKE3 digest of the file body
    #[arg(long)]
    pub digest: bool,

    /// Show a progress bar while sending (client only)
    #[arg(long, conflicts_with = "server")]
    pub progress: bool,

    /// Use the tokio transport
    #[arg(long = "async")]
    pub use_async: bool,

    /// Show per-session details
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Clone, Debug)]
pub enum Mode {
    Server(ServerConfig),
    Client(ClientConfig),
}

/// Everything `main` needs, resolved once.
#[derive(Clone, Debug)]
pub struct Invocation {
    pub mode: Mode,
    pub log_file: Option<PathBuf>,
    pub log_format: LogFormat,
    pub use_async: bool,
}

impl Args {
    /// Merge flags over `settings`.
    pub fn resolve(self, settings: &Settings) -> Result<Invocation> {
        let port = self.port.or(settings.port);
        let timeout = self
            .timeout
            .or(settings.read_timeout_secs)
            .map(Duration::from_secs);
        let digest = self.digest || settings.digest;
        let chunk_size = settings.chunk_size();

        let mode = match (self.server, self.client) {
            (Some(dir), None) => {
                let mut cfg = ServerConfig::new(dir);
                if let Some(p) = port {
                    cfg.port = p;
                }
                cfg.read_timeout = timeout;
                cfg.chunk_size = chunk_size;
                cfg.digest = digest;
                cfg.verbose = self.verbose;
                Mode::Server(cfg)
            }
            (None, Some(file)) => {
                let mut cfg = ClientConfig::new(file);
                if let Some(ip) = self.ip.or_else(|| settings.ip.clone()) {
                    cfg.ip = ip;
                }
                if let Some(p) = port {
                    cfg.port = p;
                }
                cfg.connect_timeout = timeout;
                cfg.chunk_size = chunk_size;
                cfg.digest = digest;
                cfg.progress = self.progress;
                Mode::Client(cfg)
            }
            _ => anyhow::bail!("exactly one of --server or --client is required"),
        };

        Ok(Invocation {
            mode,
            log_file: self.log_file.or_else(|| settings.log_file.clone()),
            log_format: self.log_format.or(settings.log_format).unwrap_or_default(),
            use_async: self.use_async,
        })
    }
}
