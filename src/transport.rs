//! Socket lifecycle behind small capability traits
//!
//! The engines only need a connected `Read + Write` stream. Dialing and
//! accepting live here so the engines never touch socket setup.

use crate::error::{IoContext, Result};
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// A connected, bidirectional byte stream.
pub trait Stream: Read + Write {
    /// Signal end-of-body to the peer; the read side stays open.
    fn finish_writes(&mut self) -> std::io::Result<()>;
}

impl Stream for TcpStream {
    fn finish_writes(&mut self) -> std::io::Result<()> {
        self.shutdown(Shutdown::Write)
    }
}

/// Client side: produce a connected stream.
pub trait Dialer {
    type Conn: Stream;
    fn dial(&self, ip: &str, port: u16) -> Result<Self::Conn>;
}

/// Server side: hand out connected streams one at a time.
pub trait Acceptor {
    type Conn: Stream;
    fn accept(&self) -> Result<(Self::Conn, String)>;
    fn local_addr(&self) -> Result<SocketAddr>;
}

#[derive(Clone, Debug, Default)]
pub struct TcpDialer {
    pub connect_timeout: Option<Duration>,
}

impl Dialer for TcpDialer {
    type Conn = TcpStream;

    fn dial(&self, ip: &str, port: u16) -> Result<TcpStream> {
        let stream = match self.connect_timeout {
            Some(t) => {
                let addr = (ip, port)
                    .to_socket_addrs()
                    .step("resolve")?
                    .next()
                    .ok_or_else(|| {
                        std::io::Error::new(std::io::ErrorKind::NotFound, "no address")
                    })
                    .step("resolve")?;
                TcpStream::connect_timeout(&addr, t).step("connect")?
            }
            None => TcpStream::connect((ip, port)).step("connect")?,
        };
        let _ = stream.set_nodelay(true);
        Ok(stream)
    }
}

pub struct TcpAcceptor {
    listener: TcpListener,
    read_timeout: Option<Duration>,
}

impl TcpAcceptor {
    pub fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).step("bind")?;
        Ok(Self {
            listener,
            read_timeout: None,
        })
    }

    /// Apply a read timeout to every accepted connection.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }
}

impl Acceptor for TcpAcceptor {
    type Conn = TcpStream;

    fn accept(&self) -> Result<(TcpStream, String)> {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    stream.set_read_timeout(self.read_timeout).step("set read timeout")?;
                    return Ok((stream, peer.to_string()));
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(crate::error::TransferError::io("accept", e)),
            }
        }
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().step("local addr")
    }
}
