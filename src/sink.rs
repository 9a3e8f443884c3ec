//! Output sinks for periodic report flushes.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Destination for serialized snapshots.
pub trait ReportSink: Send {
    fn publish(&mut self, payload: &[u8]) -> io::Result<()>;
}

/// Writes each payload to standard output followed by a newline.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl ReportSink for StdoutSink {
    fn publish(&mut self, payload: &[u8]) -> io::Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        out.write_all(payload)?;
        if !payload.ends_with(b"\n") {
            out.write_all(b"\n")?;
        }
        out.flush()
    }
}

/// Keeps the latest snapshot in a file, replaced atomically on each flush.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportSink for FileSink {
    fn publish(&mut self, payload: &[u8]) -> io::Result<()> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, payload)?;
        fs::rename(&tmp, &self.path)
    }
}
