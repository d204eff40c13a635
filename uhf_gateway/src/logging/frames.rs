// logging/frames.rs: optional CSV trail of every frame crossing the gateway
use std::fmt::Display;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chrono::Utc;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

const HEADER: &str = "ts,direction,frame_type,bytes\n";

static FRAMES: OnceCell<FrameLog> = OnceCell::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    RadioRx,
    RadioTx,
    NetRx,
    NetTx,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::RadioRx => "radio_rx",
            Direction::RadioTx => "radio_tx",
            Direction::NetRx => "net_rx",
            Direction::NetTx => "net_tx",
        }
    }
}

pub struct FrameLog {
    out: Mutex<BufWriter<File>>,
}

impl FrameLog {
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let fresh = !path.exists();
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        let mut w = BufWriter::new(f);
        if fresh {
            w.write_all(HEADER.as_bytes())?;
            w.flush()?;
        }
        Ok(Self { out: Mutex::new(w) })
    }

    pub fn record(&self, direction: Direction, frame_type: impl Display, bytes: usize) {
        let ts = Utc::now().to_rfc3339();
        let line = format!("{ts},{},{frame_type},{bytes}\n", direction.as_str());
        let mut f = self.out.lock();
        let _ = f.write_all(line.as_bytes());
        let _ = f.flush();
    }
}

/// Route [`record`] to `path` for the rest of the process.
pub fn init(path: &Path) -> io::Result<()> {
    let log = FrameLog::open(path)?;
    let _ = FRAMES.set(log);
    Ok(())
}

/// No-op unless [`init`] succeeded.
pub fn record(direction: Direction, frame_type: impl Display, bytes: usize) {
    if let Some(log) = FRAMES.get() {
        log.record(direction, frame_type, bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gs_protocol::FrameType;

    #[test]
    fn header_written_once_then_rows_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("frames.csv");

        let log = FrameLog::open(&path).unwrap();
        log.record(Direction::NetRx, FrameType::Poll, 12);
        drop(log);

        let log = FrameLog::open(&path).unwrap();
        log.record(Direction::RadioTx, "GST", 64);
        drop(log);

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "ts,direction,frame_type,bytes");
        assert!(lines[1].ends_with(",net_rx,POLL,12"));
        assert!(lines[2].ends_with(",radio_tx,GST,64"));
    }
}
