//! Per-session bookkeeping shared by both engines

use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Which side of the connection produced a report
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Server,
}

/// Outcome of one completed transfer.
#[derive(Clone, Debug, Serialize)]
pub struct SessionReport {
    pub role: Role,
    /// Filename carried in the header
    pub name: String,
    /// Local file that was read (client) or written (server)
    pub path: PathBuf,
    /// Body bytes moved, header excluded
    pub bytes: u64,
    #[serde(serialize_with = "as_secs")]
    pub elapsed: Duration,
    /// BLAKE3 of the body, hex, when requested
    pub digest: Option<String>,
}

impl SessionReport {
    pub fn throughput_mb_s(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.bytes as f64 / secs / 1_048_576.0
    }
}

fn as_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Running byte count and optional digest over the body.
pub struct BodyMeter {
    started: Instant,
    bytes: u64,
    hasher: Option<blake3::Hasher>,
}

impl BodyMeter {
    pub fn new(digest: bool) -> Self {
        Self {
            started: Instant::now(),
            bytes: 0,
            hasher: digest.then(blake3::Hasher::new),
        }
    }

    pub fn record(&mut self, chunk: &[u8]) {
        self.bytes += chunk.len() as u64;
        if let Some(h) = self.hasher.as_mut() {
            h.update(chunk);
        }
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn finish(self, role: Role, name: &str, path: PathBuf) -> SessionReport {
        SessionReport {
            role,
            name: name.to_string(),
            path,
            bytes: self.bytes,
            elapsed: self.started.elapsed(),
            digest: self.hasher.map(|h| h.finalize().to_hex().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meter_counts_and_hashes() {
        let mut m = BodyMeter::new(true);
        m.record(b"hello ");
        m.record(b"world");
        assert_eq!(m.bytes(), 11);
        let r = m.finish(Role::Server, "a.txt", PathBuf::from("/out/a.txt"));
        assert_eq!(r.bytes, 11);
        assert_eq!(
            r.digest.as_deref(),
            Some(blake3::hash(b"hello world").to_hex().as_str())
        );
    }

    #[test]
    fn test_meter_without_digest() {
        let m = BodyMeter::new(false);
        let r = m.finish(Role::Client, "a.txt", PathBuf::from("a.txt"));
        assert_eq!(r.bytes, 0);
        assert!(r.digest.is_none());
    }
}
