use crate::session::SessionReport;
use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

pub trait Logger: Send + Sync {
    fn listening(&self, _bind: &str, _dir: &Path) {}
    fn session_start(&self, _peer: &str) {}
    fn session_done(&self, _peer: &str, _report: &SessionReport) {}
    fn session_error(&self, _peer: &str, _msg: &str) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            file: Mutex::new(open_append(path.as_ref())?),
        })
    }

    fn line(&self, s: &str) {
        let mut f = self.file.lock();
        let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
    }
}

impl Logger for TextLogger {
    fn listening(&self, bind: &str, dir: &Path) {
        self.line(&format!("LISTEN bind={} dir={}", bind, dir.display()));
    }
    fn session_start(&self, peer: &str) {
        self.line(&format!("CONNECT peer={}", peer));
    }
    fn session_done(&self, peer: &str, r: &SessionReport) {
        let mut s = format!(
            "DONE peer={} name={} path={} bytes={} seconds={:.3}",
            peer,
            r.name,
            r.path.display(),
            r.bytes,
            r.elapsed.as_secs_f64()
        );
        if let Some(d) = &r.digest {
            s.push_str(&format!(" blake3={}", d));
        }
        self.line(&s);
    }
    fn session_error(&self, peer: &str, msg: &str) {
        self.line(&format!("ERROR peer={} msg={}", peer, msg));
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "lowercase")]
enum Event<'a> {
    Listen { bind: &'a str, dir: &'a Path },
    Connect { peer: &'a str },
    Done { peer: &'a str, report: &'a SessionReport },
    Error { peer: &'a str, msg: &'a str },
}

#[derive(Serialize, Debug)]
struct Entry<'a> {
    timestamp: String,
    #[serde(flatten)]
    event: Event<'a>,
}

/// One JSON object per line.
pub struct JsonLogger {
    file: Mutex<File>,
}

impl JsonLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            file: Mutex::new(open_append(path.as_ref())?),
        })
    }

    fn entry(&self, event: Event<'_>) {
        let entry = Entry {
            timestamp: Utc::now().to_rfc3339(),
            event,
        };
        let mut f = self.file.lock();
        if serde_json::to_writer(&mut *f, &entry).is_ok() {
            let _ = f.write_all(b"\n");
        }
    }
}

impl Logger for JsonLogger {
    fn listening(&self, bind: &str, dir: &Path) {
        self.entry(Event::Listen { bind, dir });
    }
    fn session_start(&self, peer: &str) {
        self.entry(Event::Connect { peer });
    }
    fn session_done(&self, peer: &str, report: &SessionReport) {
        self.entry(Event::Done { peer, report });
    }
    fn session_error(&self, peer: &str, msg: &str) {
        self.entry(Event::Error { peer, msg });
    }
}
