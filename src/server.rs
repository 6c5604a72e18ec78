//! Server ingest engine and the sequential accept loop
//!
//! Each connection goes through
//! `AwaitHeaderLength -> AwaitFilename -> ValidateFilename -> OpenOutput -> ReceiveBody -> Done`.
//! A failure in any state aborts that session only; handles opened so far
//! are dropped before control returns to the accept loop.

use crate::config::ServerConfig;
use crate::error::{IoContext, TransferError};
use crate::frame::{decode_header, output_path};
use crate::logger::Logger;
use crate::protocol::HEADER_LEN;
use crate::session::{BodyMeter, Role, SessionReport};
use crate::stream_io::{read_exact, write_all, Chunks};
use crate::transport::Acceptor;
use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Per-connection protocol state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    AwaitHeaderLength,
    AwaitFilename,
    ValidateFilename,
    OpenOutput,
    ReceiveBody,
    Done,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            State::AwaitHeaderLength => "header length",
            State::AwaitFilename => "filename",
            State::ValidateFilename => "filename validation",
            State::OpenOutput => "open output",
            State::ReceiveBody => "body",
            State::Done => "done",
        };
        f.write_str(s)
    }
}

/// A session that ended before `Done`.
#[derive(Debug)]
pub struct Aborted {
    /// State the session was in when it failed
    pub state: State,
    pub error: TransferError,
}

impl fmt::Display for Aborted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "aborted during {}: {}", self.state, self.error)
    }
}

impl std::error::Error for Aborted {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

fn abort(state: State) -> impl FnOnce(TransferError) -> Aborted {
    move |error| Aborted { state, error }
}

#[derive(Clone, Copy, Debug)]
pub struct ReceiveOptions {
    pub chunk_size: usize,
    pub digest: bool,
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        Self {
            chunk_size: crate::protocol::CHUNK_SIZE,
            digest: false,
        }
    }
}

/// Run one session: read the header, validate the name, write the body to
/// `dir/<name>` (created or truncated).
///
/// A body cut short by the peer is indistinguishable from a short file.
/// A body that fails mid-stream leaves the partial file behind.
pub fn receive_file<R: Read + ?Sized>(
    stream: &mut R,
    dir: &Path,
    opts: ReceiveOptions,
) -> Result<SessionReport, Aborted> {
    let field = read_exact(stream, HEADER_LEN).map_err(abort(State::AwaitHeaderLength))?;
    let len = decode_header([field[0], field[1]]).map_err(abort(State::AwaitHeaderLength))?;

    let raw = read_exact(stream, len).map_err(abort(State::AwaitFilename))?;

    let (name, path) = output_path(dir, &raw).map_err(abort(State::ValidateFilename))?;

    let mut out = File::create(&path)
        .step("open output")
        .map_err(abort(State::OpenOutput))?;

    let mut meter = BodyMeter::new(opts.digest);
    let mut chunks = Chunks::with_capacity(stream, opts.chunk_size);
    while let Some(chunk) = chunks.next_chunk() {
        let chunk = chunk.map_err(abort(State::ReceiveBody))?;
        write_all(&mut out, chunk).map_err(abort(State::ReceiveBody))?;
        meter.record(chunk);
    }
    out.flush()
        .step("flush output")
        .map_err(abort(State::ReceiveBody))?;

    Ok(meter.finish(Role::Server, name, path))
}

/// Accept one connection and run it to completion.
///
/// Errors from `accept` itself are returned; session failures are logged and
/// reported as `Ok(Err(..))` so the caller keeps serving.
pub fn accept_one<A: Acceptor>(
    acceptor: &A,
    cfg: &ServerConfig,
    logger: &dyn Logger,
) -> crate::error::Result<Result<SessionReport, Aborted>> {
    let (mut conn, peer) = acceptor.accept()?;
    eprintln!("client connected: {}", peer);
    logger.session_start(&peer);

    let opts = ReceiveOptions {
        chunk_size: cfg.chunk_size,
        digest: cfg.digest,
    };
    let outcome = receive_file(&mut conn, &cfg.dir, opts);
    drop(conn);

    match &outcome {
        Ok(report) => {
            if cfg.verbose {
                eprintln!(
                    "received {} ({} bytes, {:.1} MB/s)",
                    report.path.display(),
                    report.bytes,
                    report.throughput_mb_s()
                );
            } else {
                eprintln!("received {} ({} bytes)", report.name, report.bytes);
            }
            if let Some(d) = &report.digest {
                eprintln!("  blake3 {}", d);
            }
            if cfg.verbose {
                eprintln!("session from {} {}", peer, State::Done);
            }
            logger.session_done(&peer, report);
        }
        Err(e) => {
            eprintln!("session from {} {}", peer, e);
            logger.session_error(&peer, &e.to_string());
        }
    }
    Ok(outcome)
}

/// Serve forever, one connection at a time.
pub fn serve<A: Acceptor>(acceptor: &A, cfg: &ServerConfig, logger: &dyn Logger) -> ! {
    loop {
        if let Err(e) = accept_one(acceptor, cfg, logger) {
            eprintln!("accept error: {}", e);
            logger.session_error("-", &e.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream_io::tests::Trickle;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn frame(name: &[u8], body: &[u8]) -> Vec<u8> {
        let mut v = (name.len() as u16).to_be_bytes().to_vec();
        v.extend_from_slice(name);
        v.extend_from_slice(body);
        v
    }

    fn recv(dir: &Path, wire: Vec<u8>) -> Result<SessionReport, Aborted> {
        receive_file(&mut Cursor::new(wire), dir, ReceiveOptions::default())
    }

    #[test]
    fn test_receive_writes_file() {
        let dir = TempDir::new().unwrap();
        let report = recv(dir.path(), frame(b"report.txt", b"hello\n")).unwrap();
        assert_eq!(report.bytes, 6);
        assert_eq!(report.path, dir.path().join("report.txt"));
        assert_eq!(std::fs::read(dir.path().join("report.txt")).unwrap(), b"hello\n");
    }

    #[test]
    fn test_receive_empty_body() {
        let dir = TempDir::new().unwrap();
        recv(dir.path(), frame(b"empty.bin", b"")).unwrap();
        let md = std::fs::metadata(dir.path().join("empty.bin")).unwrap();
        assert_eq!(md.len(), 0);
    }

    #[test]
    fn test_receive_truncates_existing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("same.txt"), b"old content that is longer").unwrap();
        recv(dir.path(), frame(b"same.txt", b"new")).unwrap();
        assert_eq!(std::fs::read(dir.path().join("same.txt")).unwrap(), b"new");
    }

    #[test]
    fn test_bad_length_rejected_before_name() {
        let dir = TempDir::new().unwrap();
        for field in [[0u8, 0u8], [0x01, 0x00]] {
            let mut wire = field.to_vec();
            wire.extend_from_slice(b"whatever");
            let mut cur = Cursor::new(wire);
            let err = receive_file(&mut cur, dir.path(), ReceiveOptions::default()).unwrap_err();
            assert_eq!(err.state, State::AwaitHeaderLength);
            assert!(matches!(err.error, TransferError::MalformedFrame(_)));
            // Nothing past the length field was consumed
            assert_eq!(cur.position(), 2);
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_short_header_and_short_name() {
        let dir = TempDir::new().unwrap();
        let err = recv(dir.path(), vec![0x00]).unwrap_err();
        assert_eq!(err.state, State::AwaitHeaderLength);
        assert!(matches!(err.error, TransferError::UnexpectedEof { .. }));

        let mut wire = 10u16.to_be_bytes().to_vec();
        wire.extend_from_slice(b"abc");
        let err = recv(dir.path(), wire).unwrap_err();
        assert_eq!(err.state, State::AwaitFilename);
        assert!(matches!(
            err.error,
            TransferError::UnexpectedEof { got: 3, expected: 10 }
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_traversal_names_rejected() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();
        let names: [&[u8]; 7] = [
            b"../etc/passwd",
            b"../pwned.txt",
            b"a/b",
            b"a\\b",
            b"..",
            b"C:evil.txt",
            b"a.txt:ads",
        ];
        for name in names {
            let err = recv(&out, frame(name, b"x")).unwrap_err();
            assert_eq!(err.state, State::ValidateFilename);
        }
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_dotted_name_accepted() {
        let dir = TempDir::new().unwrap();
        recv(dir.path(), frame(b"..foo", b"x")).unwrap();
        assert!(dir.path().join("..foo").is_file());
    }

    #[test]
    fn test_missing_output_dir_fails_open() {
        let dir = TempDir::new().unwrap();
        let err = recv(&dir.path().join("missing"), frame(b"a.txt", b"x")).unwrap_err();
        assert_eq!(err.state, State::OpenOutput);
        assert_eq!(err.error.io_kind(), Some(std::io::ErrorKind::NotFound));
    }

    #[test]
    fn test_receive_through_trickle_reader() {
        let dir = TempDir::new().unwrap();
        let name = "n".repeat(255);
        let body: Vec<u8> = (0..3000u32).map(|i| (i % 7) as u8).collect();
        let mut r = Trickle::new(Cursor::new(frame(name.as_bytes(), &body)));
        let opts = ReceiveOptions {
            chunk_size: 4096,
            digest: true,
        };
        let report = receive_file(&mut r, dir.path(), opts).unwrap();
        assert_eq!(std::fs::read(dir.path().join(&name)).unwrap(), body);
        assert_eq!(report.digest.unwrap(), blake3::hash(&body).to_hex().to_string());
    }

    #[test]
    fn test_aborted_display_names_step() {
        let dir = TempDir::new().unwrap();
        let err = recv(dir.path(), frame(b"a/b", b"")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("filename validation"), "{}", msg);
        assert!(msg.contains("a/b"), "{}", msg);
        assert_eq!(State::Done.to_string(), "done");
    }
}
