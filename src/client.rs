//! Client transfer engine: one local file out over one connection

use crate::config::ClientConfig;
use crate::error::{IoContext, Result, TransferError};
use crate::frame::{base_name, encode_header};
use crate::logger::Logger;
use crate::protocol::MAX_NAME_LEN;
use crate::session::{BodyMeter, Role, SessionReport};
use crate::stream_io::{write_all, Chunks};
use crate::transport::{Dialer, Stream};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::Write;
use std::path::Path;

#[derive(Clone, Copy, Debug)]
pub struct SendOptions {
    pub chunk_size: usize,
    pub digest: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            chunk_size: crate::protocol::CHUNK_SIZE,
            digest: false,
        }
    }
}

/// Send `file_path` as header + body over `stream`.
///
/// Every chunk is fully written before the next one is read. The local file
/// is closed on every exit path. The caller is responsible for closing the
/// write side afterwards so the peer sees EOF.
pub fn send_file<W: Write + ?Sized>(
    stream: &mut W,
    file_path: &Path,
    opts: SendOptions,
) -> Result<SessionReport> {
    let path_str = file_path
        .to_str()
        .ok_or_else(|| TransferError::InvalidPath(file_path.to_string_lossy().into_owned()))?;
    let name = base_name(path_str)?;
    if name.len() > MAX_NAME_LEN {
        return Err(TransferError::NameTooLong(name.len()));
    }
    let file = File::open(file_path).step("open source file")?;

    let header = encode_header(name)?;
    write_all(stream, &header)?;

    let mut meter = BodyMeter::new(opts.digest);
    let mut chunks = Chunks::with_capacity(file, opts.chunk_size);
    while let Some(chunk) = chunks.next_chunk() {
        let chunk = chunk?;
        write_all(stream, chunk)?;
        meter.record(chunk);
    }
    stream.flush().step("flush")?;
    Ok(meter.finish(Role::Client, name, file_path.to_path_buf()))
}

/// Dial the server, send one file, close the write side.
pub fn run<D: Dialer>(
    dialer: &D,
    cfg: &ClientConfig,
    logger: &dyn Logger,
) -> Result<SessionReport> {
    let peer = format!("{}:{}", cfg.ip, cfg.port);
    let mut stream = dialer.dial(&cfg.ip, cfg.port)?;
    logger.session_start(&peer);

    let opts = SendOptions {
        chunk_size: cfg.chunk_size,
        digest: cfg.digest,
    };
    let result = if cfg.progress {
        let total = std::fs::metadata(&cfg.file).map(|m| m.len()).unwrap_or(0);
        let pb = progress_bar(total);
        let mut w = pb.wrap_write(&mut stream);
        let r = send_file(&mut w, &cfg.file, opts);
        pb.finish_and_clear();
        r
    } else {
        send_file(&mut stream, &cfg.file, opts)
    };

    match result {
        Ok(report) => match stream.finish_writes().step("shutdown") {
            Ok(()) => {
                logger.session_done(&peer, &report);
                Ok(report)
            }
            Err(e) => {
                logger.session_error(&peer, &e.to_string());
                Err(e)
            }
        },
        Err(e) => {
            logger.session_error(&peer, &e.to_string());
            Err(e)
        }
    }
}

fn progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40.green} {bytes}/{total_bytes} {bytes_per_sec} eta {eta}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb
}
