use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use crate::error::{Error, Result};
use crate::train::epoch_stats::EpochStats;

/// External run log. Failures are reported but never stop training.
pub trait RunSink: Send {
    fn record(&mut self, stats: &EpochStats) -> Result<()>;
}

/// Appends one JSON object per record to a file.
pub struct JsonLinesSink {
    path: PathBuf,
    out: BufWriter<File>,
}

impl JsonLinesSink {
    pub fn create(path: &Path) -> Result<JsonLinesSink> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| Error::io(path, e))?;
        Ok(JsonLinesSink { path: path.to_path_buf(), out: BufWriter::new(file) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RunSink for JsonLinesSink {
    fn record(&mut self, stats: &EpochStats) -> Result<()> {
        serde_json::to_writer(&mut self.out, stats).map_err(|e| Error::json(&self.path, e))?;
        self.out.write_all(b"\n").map_err(|e| Error::io(&self.path, e))?;
        self.out.flush().map_err(|e| Error::io(&self.path, e))
    }
}

/// Forwards records to an in-process receiver, e.g. a progress display.
///
/// A dropped receiver is not an error; records are simply discarded.
pub struct ChannelSink {
    tx: mpsc::Sender<EpochStats>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<EpochStats>) -> ChannelSink {
        ChannelSink { tx }
    }
}

impl RunSink for ChannelSink {
    fn record(&mut self, stats: &EpochStats) -> Result<()> {
        let _ = self.tx.send(stats.clone());
        Ok(())
    }
}
