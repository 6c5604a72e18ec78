use anyhow::Result;
use hfile::config::{ClientConfig, ServerConfig};
use hfile::logger::NoopLogger;
use hfile::server::{accept_one, State};
use hfile::transport::{Acceptor, TcpAcceptor, TcpDialer};
use hfile::TransferError;
use std::io::Write;
use std::net::TcpStream;
use std::path::Path;
use std::thread;

fn write_file(path: &Path, size: usize) -> Result<()> {
    let mut f = std::fs::File::create(path)?;
    let mut val: u8 = 0;
    let buf: Vec<u8> = (0..size)
        .map(|_| {
            val = val.wrapping_add(7);
            val
        })
        .collect();
    f.write_all(&buf)?;
    Ok(())
}

/// Start a server that handles exactly `sessions` connections.
fn spawn_server(
    dir: &Path,
    sessions: usize,
) -> Result<(u16, thread::JoinHandle<Vec<Result<hfile::session::SessionReport, State>>>)> {
    let acceptor = TcpAcceptor::bind("127.0.0.1:0")?;
    let port = acceptor.local_addr()?.port();
    let mut cfg = ServerConfig::new(dir.to_path_buf());
    cfg.digest = true;
    let handle = thread::spawn(move || {
        (0..sessions)
            .map(|_| {
                accept_one(&acceptor, &cfg, &NoopLogger)
                    .unwrap()
                    .map_err(|a| a.state)
            })
            .collect()
    });
    Ok((port, handle))
}

fn send(port: u16, file: &Path) -> hfile::Result<hfile::session::SessionReport> {
    let mut cfg = ClientConfig::new(file.to_path_buf());
    cfg.port = port;
    cfg.digest = true;
    hfile::client::run(&TcpDialer::default(), &cfg, &NoopLogger)
}

fn raw_send(port: u16, bytes: &[u8]) -> Result<()> {
    let mut s = TcpStream::connect(("127.0.0.1", port))?;
    s.write_all(bytes)?;
    Ok(())
}

#[test]
fn report_scenario_round_trip() -> Result<()> {
    let out = tempfile::tempdir()?;
    let src_dir = tempfile::tempdir()?;
    let src = src_dir.path().join("report.txt");
    std::fs::write(&src, b"hello\nhello\n")?;

    let (port, server) = spawn_server(out.path(), 1)?;
    let sent = send(port, &src)?;
    let received = server.join().unwrap();

    let got = received[0].as_ref().unwrap();
    assert_eq!(got.name, "report.txt");
    assert_eq!(got.digest, sent.digest);
    assert_eq!(std::fs::read(out.path().join("report.txt"))?, b"hello\nhello\n");
    Ok(())
}

#[test]
fn large_and_empty_files_sequentially() -> Result<()> {
    let out = tempfile::tempdir()?;
    let src_dir = tempfile::tempdir()?;
    let big = src_dir.path().join("big.bin");
    let empty = src_dir.path().join("empty.bin");
    write_file(&big, 3 * 1024 * 1024 + 17)?; // crosses several 1 MiB chunks
    write_file(&empty, 0)?;

    let (port, server) = spawn_server(out.path(), 2)?;
    send(port, &big)?;
    send(port, &empty)?;
    let received = server.join().unwrap();
    assert!(received.iter().all(|r| r.is_ok()));

    assert_eq!(std::fs::read(out.path().join("big.bin"))?, std::fs::read(&big)?);
    assert_eq!(std::fs::metadata(out.path().join("empty.bin"))?.len(), 0);
    Ok(())
}

#[test]
fn same_name_twice_replaces_content() -> Result<()> {
    let out = tempfile::tempdir()?;
    let a = tempfile::tempdir()?;
    let b = tempfile::tempdir()?;
    std::fs::write(a.path().join("same.txt"), b"first version, longer")?;
    std::fs::write(b.path().join("same.txt"), b"second")?;

    let (port, server) = spawn_server(out.path(), 2)?;
    send(port, &a.path().join("same.txt"))?;
    send(port, &b.path().join("same.txt"))?;
    server.join().unwrap();

    assert_eq!(std::fs::read(out.path().join("same.txt"))?, b"second");
    Ok(())
}

#[test]
fn bad_sessions_do_not_stop_the_server() -> Result<()> {
    let root = tempfile::tempdir()?;
    let out = root.path().join("out");
    std::fs::create_dir(&out)?;
    let src_dir = tempfile::tempdir()?;
    let good = src_dir.path().join("a b.txt");
    std::fs::write(&good, b"space")?;

    let (port, server) = spawn_server(&out, 5)?;
    raw_send(port, b"\x00\x0c../pwned.txtx")?;
    raw_send(port, b"\x00\x00")?;
    raw_send(port, b"\x00\x0aabc")?; // claims 10 name bytes, sends 3
    raw_send(port, b"\x00\x03a/bx")?;
    send(port, &good)?;
    let received = server.join().unwrap();

    assert_eq!(received[0].as_ref().unwrap_err(), &State::ValidateFilename);
    assert_eq!(received[1].as_ref().unwrap_err(), &State::AwaitHeaderLength);
    assert_eq!(received[2].as_ref().unwrap_err(), &State::AwaitFilename);
    assert_eq!(received[3].as_ref().unwrap_err(), &State::ValidateFilename);
    assert!(received[4].is_ok());

    let names: Vec<_> = std::fs::read_dir(&out)?
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(names, vec!["a b.txt".to_string()]);
    assert_eq!(std::fs::read_dir(root.path())?.count(), 1);
    Ok(())
}

#[test]
fn client_reports_missing_file_and_refused_connection() -> Result<()> {
    let src_dir = tempfile::tempdir()?;
    let out = tempfile::tempdir()?;

    let (port, server) = spawn_server(out.path(), 1)?;
    let err = send(port, &src_dir.path().join("missing.txt")).unwrap_err();
    assert_eq!(err.io_kind(), Some(std::io::ErrorKind::NotFound));
    // The server saw the connection close before any header byte
    let received = server.join().unwrap();
    assert_eq!(received[0].as_ref().unwrap_err(), &State::AwaitHeaderLength);

    let err = send(port, &src_dir.path().join("missing.txt")).unwrap_err();
    assert!(matches!(err, TransferError::Io { context: "connect", .. }));
    Ok(())
}
