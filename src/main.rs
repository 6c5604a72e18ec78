//! hf - send one file over TCP, or receive files into a directory
//!
//! Server: `hf -s <DIR> [-p PORT]`
//! Client: `hf -c <FILE> [-i IP] [-p PORT]`

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hfile::cli::{Args, Invocation, Mode};
use hfile::config::{ClientConfig, LogFormat, ServerConfig, Settings};
use hfile::logger::{JsonLogger, Logger, NoopLogger, TextLogger};
use hfile::session::SessionReport;
use hfile::transport::{Acceptor, TcpAcceptor, TcpDialer};

fn main() -> Result<()> {
    let args = Args::parse();
    let settings = match &args.config {
        Some(p) => Settings::load(p)?,
        None => Settings::default(),
    };
    let inv = args.resolve(&settings)?;
    let logger = make_logger(&inv);

    match inv.mode {
        Mode::Server(cfg) => server_main(cfg, logger, inv.use_async),
        Mode::Client(cfg) => client_main(cfg, logger, inv.use_async),
    }
}

// Choose logger once; NoopLogger when no log file is configured
fn make_logger(inv: &Invocation) -> Arc<dyn Logger> {
    let Some(path) = &inv.log_file else {
        return Arc::new(NoopLogger);
    };
    let made: Result<Arc<dyn Logger>> = match inv.log_format {
        LogFormat::Text => TextLogger::new(path).map(|l| Arc::new(l) as Arc<dyn Logger>),
        LogFormat::Jsonl => JsonLogger::new(path).map(|l| Arc::new(l) as Arc<dyn Logger>),
    };
    match made {
        Ok(l) => l,
        Err(e) => {
            eprintln!("warning: cannot open log file {}: {}", path.display(), e);
            Arc::new(NoopLogger)
        }
    }
}

fn check_output_dir(dir: &Path) -> Result<PathBuf> {
    if !dir.exists() {
        anyhow::bail!("output directory does not exist: {}", dir.display());
    }
    if !dir.is_dir() {
        anyhow::bail!("output path is not a directory: {}", dir.display());
    }
    std::fs::canonicalize(dir)
        .with_context(|| format!("failed to canonicalize output directory: {}", dir.display()))
}

fn server_main(mut cfg: ServerConfig, logger: Arc<dyn Logger>, use_async: bool) -> Result<()> {
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted. Exiting (Ctrl-C)...");
        // 128 + SIGINT
        std::process::exit(130);
    })
    .context("failed to set Ctrl-C handler")?;

    cfg.dir = check_output_dir(&cfg.dir)?;

    if use_async {
        return serve_async(&cfg, logger.as_ref());
    }

    let bind = cfg.bind_addr();
    let acceptor = TcpAcceptor::bind(&bind)
        .with_context(|| format!("bind {}", bind))?
        .with_read_timeout(cfg.read_timeout);
    let local = acceptor.local_addr()?;
    println!("listening on {} port {}...", cfg.dir.display(), local.port());
    if let Some(t) = cfg.read_timeout {
        println!("  read timeout: {}s", t.as_secs());
    }
    logger.listening(&bind, &cfg.dir);
    hfile::server::serve(&acceptor, &cfg, logger.as_ref())
}

fn client_main(cfg: ClientConfig, logger: Arc<dyn Logger>, use_async: bool) -> Result<()> {
    let report = if use_async {
        send_async(&cfg, logger.as_ref())?
    } else {
        let dialer = TcpDialer {
            connect_timeout: cfg.connect_timeout,
        };
        hfile::client::run(&dialer, &cfg, logger.as_ref())
    }
    .with_context(|| format!("send {} to {}:{}", cfg.file.display(), cfg.ip, cfg.port))?;

    println!(
        "sent {} ({} bytes in {:.2}s)",
        report.name,
        report.bytes,
        report.elapsed.as_secs_f64()
    );
    if let Some(d) = &report.digest {
        println!("  blake3 {}", d);
    }
    Ok(())
}

#[cfg(feature = "async")]
fn serve_async(cfg: &ServerConfig, logger: &dyn Logger) -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    rt.block_on(hfile::net_async::server::serve(cfg, logger))
}

#[cfg(feature = "async")]
fn send_async(cfg: &ClientConfig, logger: &dyn Logger) -> Result<hfile::Result<SessionReport>> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    Ok(rt.block_on(hfile::net_async::client::send(cfg, logger)))
}

#[cfg(not(feature = "async"))]
fn serve_async(_cfg: &ServerConfig, _logger: &dyn Logger) -> Result<()> {
    anyhow::bail!("--async requires the `async` feature")
}

#[cfg(not(feature = "async"))]
fn send_async(_cfg: &ClientConfig, _logger: &dyn Logger) -> Result<hfile::Result<SessionReport>> {
    anyhow::bail!("--async requires the `async` feature")
}
