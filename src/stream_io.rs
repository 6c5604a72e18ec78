//! Reliable stream primitives
//!
//! A single `read`/`write` call may move fewer bytes than asked for, or fail
//! with `Interrupted`. These helpers loop until the whole request is done,
//! so callers can treat "send N bytes" and "receive N bytes" as one step.

use crate::error::{Result, TransferError};
use crate::protocol::CHUNK_SIZE;
use std::io::{ErrorKind, Read, Write};

/// Write the whole buffer, retrying partial and interrupted writes.
///
/// `Ok(0)` from the underlying writer means the peer is gone and is reported
/// as [`TransferError::ConnectionClosed`].
pub fn write_all<W: Write + ?Sized>(stream: &mut W, buf: &[u8]) -> Result<()> {
    let mut rest = buf;
    while !rest.is_empty() {
        match stream.write(rest) {
            Ok(0) => return Err(TransferError::ConnectionClosed),
            Ok(n) => rest = &rest[n..],
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransferError::io("write", e)),
        }
    }
    Ok(())
}

/// Read exactly `len` bytes.
///
/// EOF before `len` bytes arrive is [`TransferError::UnexpectedEof`].
pub fn read_exact<R: Read + ?Sized>(stream: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        match stream.read(&mut buf[filled..]) {
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

/// Read the rest of the stream as a sequence of non-empty chunks.
pub fn read_until_eof<R: Read>(stream: R) -> Chunks<R> {
    Chunks::with_capacity(stream, CHUNK_SIZE)
}

/// Iterator over the remaining bytes of a stream, see [`read_until_eof`].
///
/// Ends cleanly when the reader returns `Ok(0)`. A hard error is yielded
/// once and ends the sequence.
pub struct Chunks<R> {
    reader: R,
    buf: Vec<u8>,
    done: bool,
}

impl<R: Read> Chunks<R> {
    pub fn with_capacity(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            buf: vec![0u8; chunk_size.max(1)],
            done: false,
        }
    }

    /// Next chunk as a borrowed slice; avoids an allocation per chunk.
    pub fn next_chunk(&mut self) -> Option<Result<&[u8]>> {
        if self.done {
            return None;
        }
        loop {
            match self.reader.read(&mut self.buf) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(n) => return Some(Ok(&self.buf[..n])),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(TransferError::io("read body", e)));
                }
            }
        }
    }
}

impl<R: Read> Iterator for Chunks<R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().map(|r| r.map(<[u8]>::to_vec))
    }
}
