//! Async (Tokio) transport for the same wire format.
//!
//! Framing and filename rules are shared with the blocking engines. Every
//! socket read and write carries a deadline, so a stalled peer aborts its
//! session instead of holding the accept loop.

use crate::error::{Result, TransferError};
use crate::protocol::timeouts::{read_deadline_ms, write_deadline_ms, CONNECT_MS, HEADER_MS};
use std::future::Future;
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout, Duration};

async fn timed<T, F>(op: &'static str, ms: u64, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(Duration::from_millis(ms), fut).await {
        Ok(res) => res,
        Err(_) => Err(TransferError::Timeout { op, ms }),
    }
}

/// Async twin of [`crate::stream_io::write_all`].
pub async fn write_all<W: AsyncWrite + Unpin + ?Sized>(stream: &mut W, buf: &[u8]) -> Result<()> {
    let mut rest = buf;
    while !rest.is_empty() {
        match stream.write(rest).await {
            Ok(0) => return Err(TransferError::ConnectionClosed),
            Ok(n) => rest = &rest[n..],
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransferError::io("write", e)),
        }
    }
    Ok(())
}

/// Async twin of [`crate::stream_io::read_exact`].
pub async fn read_exact<R: AsyncRead + Unpin + ?Sized>(stream: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        match stream.read(&mut buf[filled..]).await {
            Ok(0) => {
                return Err(TransferError::UnexpectedEof {
                    got: filled,
                    expected: len,
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransferError::io("read", e)),
        }
    }
    Ok(buf)
}

/// One read into `buf`; `Ok(0)` means EOF.
async fn read_some<R: AsyncRead + Unpin + ?Sized>(
    stream: &mut R,
    buf: &mut [u8],
    context: &'static str,
) -> Result<usize> {
    loop {
        match stream.read(buf).await {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransferError::io(context, e)),
        }
    }
}

pub mod server {
    use super::*;
    use crate::config::ServerConfig;
    use crate::error::IoContext;
    use crate::frame::{decode_header, output_path};
    use crate::logger::Logger;
    use crate::protocol::HEADER_LEN;
    use crate::server::{Aborted, ReceiveOptions, State};
    use crate::session::{BodyMeter, Role, SessionReport};
    use anyhow::Context;
    use std::path::Path;
    use tokio::net::TcpListener;

    fn abort(state: State) -> impl FnOnce(TransferError) -> Aborted {
        move |error| Aborted { state, error }
    }

    /// Async twin of [`crate::server::receive_file`].
    ///
    /// `read_ms` bounds every socket read (header, filename, body); `None`
    /// uses the defaults from [`crate::protocol::timeouts`].
    pub async fn receive_file<R: AsyncRead + Unpin + ?Sized>(
        stream: &mut R,
        dir: &Path,
        opts: ReceiveOptions,
        read_ms: Option<u64>,
    ) -> std::result::Result<SessionReport, Aborted> {
        let header_ms = read_ms.unwrap_or(HEADER_MS);
        let field = timed("read header", header_ms, read_exact(stream, HEADER_LEN))
            .await
            .map_err(abort(State::AwaitHeaderLength))?;
        let len = decode_header([field[0], field[1]]).map_err(abort(State::AwaitHeaderLength))?;

        let raw = timed("read filename", header_ms, read_exact(stream, len))
            .await
            .map_err(abort(State::AwaitFilename))?;

        let (name, path) = output_path(dir, &raw).map_err(abort(State::ValidateFilename))?;

        let mut out = tokio::fs::File::create(&path)
            .await
            .step("open output")
            .map_err(abort(State::OpenOutput))?;

        let mut meter = BodyMeter::new(opts.digest);
        let mut buf = vec![0u8; opts.chunk_size.max(1)];
        let ms = read_ms.unwrap_or_else(|| read_deadline_ms(buf.len()));
        loop {
            let n = timed("read body", ms, read_some(stream, &mut buf, "read body"))
                .await
                .map_err(abort(State::ReceiveBody))?;
            if n == 0 {
                break;
            }
            write_all(&mut out, &buf[..n])
                .await
                .map_err(abort(State::ReceiveBody))?;
            meter.record(&buf[..n]);
        }
        out.flush()
            .await
            .step("flush output")
            .map_err(abort(State::ReceiveBody))?;

        Ok(meter.finish(Role::Server, name, path))
    }

    /// Accept and run one connection; see [`crate::server::accept_one`].
    pub async fn accept_one(
        listener: &TcpListener,
        cfg: &ServerConfig,
        logger: &dyn Logger,
    ) -> Result<std::result::Result<SessionReport, Aborted>> {
        let (mut stream, peer) = listener.accept().await.step("accept")?;
        let _ = stream.set_nodelay(true);
        let peer = peer.to_string();
        eprintln!("client connected: {}", peer);
        logger.session_start(&peer);

        let opts = ReceiveOptions {
            chunk_size: cfg.chunk_size,
            digest: cfg.digest,
        };
        let read_ms = cfg.read_timeout.map(|t| t.as_millis() as u64);
        let outcome = receive_file(&mut stream, &cfg.dir, opts, read_ms).await;
        drop(stream);

        match &outcome {
            Ok(report) => {
                eprintln!("received {} ({} bytes)", report.name, report.bytes);
                logger.session_done(&peer, report);
            }
            Err(e) => {
                eprintln!("session from {} {}", peer, e);
                logger.session_error(&peer, &e.to_string());
            }
        }
        Ok(outcome)
    }

    /// Bind and serve forever, one connection at a time.
    pub async fn serve(cfg: &ServerConfig, logger: &dyn Logger) -> anyhow::Result<()> {
        let bind = cfg.bind_addr();
        let listener = TcpListener::bind(&bind)
            .await
            .with_context(|| format!("bind {}", bind))?;
        eprintln!("hf async server listening on {} dir={}", bind, cfg.dir.display());
        logger.listening(&bind, &cfg.dir);
        loop {
            if let Err(e) = accept_one(&listener, cfg, logger).await {
                eprintln!("accept error: {}", e);
                logger.session_error("-", &e.to_string());
            }
        }
    }
}

pub mod client {
    use super::*;
    use crate::client::SendOptions;
    use crate::config::ClientConfig;
    use crate::error::IoContext;
    use crate::frame::{base_name, encode_header};
    use crate::logger::Logger;
    use crate::protocol::MAX_NAME_LEN;
    use crate::session::{BodyMeter, Role, SessionReport};
    use std::path::Path;
    use tokio::net::TcpStream;

    pub async fn connect(ip: &str, port: u16, ms: u64) -> Result<TcpStream> {
        let stream = timed("connect", ms, async {
            TcpStream::connect((ip, port)).await.step("connect")
        })
        .await?;
        let _ = stream.set_nodelay(true);
        Ok(stream)
    }

    /// Async twin of [`crate::client::send_file`].
    pub async fn send_file<W: AsyncWrite + Unpin + ?Sized>(
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
        let mut file = tokio::fs::File::open(file_path)
            .await
            .step("open source file")?;

        let header = encode_header(name)?;
        timed("write header", write_deadline_ms(header.len()), write_all(stream, &header)).await?;

        let mut meter = BodyMeter::new(opts.digest);
        let mut buf = vec![0u8; opts.chunk_size.max(1)];
        loop {
            let n = read_some(&mut file, &mut buf, "read source file").await?;
            if n == 0 {
                break;
            }
            timed("write body", write_deadline_ms(n), write_all(stream, &buf[..n])).await?;
            meter.record(&buf[..n]);
        }
        stream.flush().await.step("flush")?;
        Ok(meter.finish(Role::Client, name, file_path.to_path_buf()))
    }

    /// Connect, send `cfg.file`, then shut down the write side.
    pub async fn send(cfg: &ClientConfig, logger: &dyn Logger) -> Result<SessionReport> {
        let peer = format!("{}:{}", cfg.ip, cfg.port);
        let ms = cfg
            .connect_timeout
            .map(|t| t.as_millis() as u64)
            .unwrap_or(CONNECT_MS);
        let mut stream = connect(&cfg.ip, cfg.port, ms).await?;
        logger.session_start(&peer);

        let opts = SendOptions {
            chunk_size: cfg.chunk_size,
            digest: cfg.digest,
        };
        match send_file(&mut stream, &cfg.file, opts).await {
            Ok(report) => match stream.shutdown().await.step("shutdown") {
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
}
