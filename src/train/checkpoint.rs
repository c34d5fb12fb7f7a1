use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Serialize, Deserialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::network::state_dict::StateDict;

pub const CHECKPOINT_VERSION: u32 = 1;

/// Parameter snapshot tagged with the validation result that earned it.
///
/// The parameters sit under `state`, which is the payload key the native
/// pretrained loader unwraps, so a checkpoint can seed a later run as is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub model_name: String,
    pub epoch: usize,
    pub metric_name: String,
    pub metric_value: f64,
    pub state: StateDict,
}

impl Checkpoint {
    pub fn file_name(&self) -> String {
        format!(
            "{}_Epoch_{}_{}_{}.json",
            self.model_name, self.epoch, self.metric_name, self.metric_value
        )
    }

    /// Writes to a sibling temp file and renames it into place.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        let file = File::create(&tmp).map_err(|e| Error::io(&tmp, e))?;
        let mut out = BufWriter::new(file);
        serde_json::to_writer(&mut out, self).map_err(|e| Error::json(&tmp, e))?;
        out.flush().map_err(|e| Error::io(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| Error::io(path, e))
    }

    pub fn load_json(path: &Path) -> Result<Checkpoint> {
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        serde_json::from_reader(std::io::BufReader::new(file)).map_err(|e| Error::json(path, e))
    }
}

/// Best value seen for one metric and the file that holds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestEntry {
    pub value: f64,
    pub path: Option<PathBuf>,
}

/// Keeps at most one checkpoint file per tracked metric.
///
/// Only the training thread touches the registry, so replacement needs no
/// locking. Every metric starts at a best of `0.0`.
#[derive(Debug)]
pub struct BestMetricRegistry {
    dir: PathBuf,
    entries: BTreeMap<String, BestEntry>,
}

impl BestMetricRegistry {
    pub fn new(dir: impl Into<PathBuf>, metrics: &[&str]) -> BestMetricRegistry {
        let entries = metrics
            .iter()
            .map(|m| (m.to_string(), BestEntry { value: 0.0, path: None }))
            .collect();
        BestMetricRegistry { dir: dir.into(), entries }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn get(&self, metric: &str) -> Option<&BestEntry> {
        self.entries.get(metric)
    }

    /// Strictly better than the recorded best. Untracked metrics and NaN
    /// never improve.
    pub fn improves(&self, metric: &str, value: f64) -> bool {
        self.entries.get(metric).map_or(false, |e| value > e.value)
    }

    /// Persists `checkpoint` as the new best for its metric, then deletes
    /// the file it supersedes. A crash in between leaves two files, never
    /// zero.
    pub fn replace(&mut self, checkpoint: &Checkpoint) -> Result<PathBuf> {
        let entry = self.entries.get(&checkpoint.metric_name).ok_or_else(|| {
            Error::Config(format!("metric {} is not tracked", checkpoint.metric_name))
        })?;
        let previous = entry.path.clone();

        std::fs::create_dir_all(&self.dir).map_err(|e| Error::io(&self.dir, e))?;
        let path = self.dir.join(checkpoint.file_name());
        checkpoint.save_json(&path)?;
        info!(path = %path.display(), "model saved");

        if let Some(old) = previous.filter(|old| *old != path) {
            if let Err(e) = std::fs::remove_file(&old) {
                warn!(path = %old.display(), error = %e, "could not remove superseded checkpoint");
            }
        }

        self.entries.insert(
            checkpoint.metric_name.clone(),
            BestEntry { value: checkpoint.metric_value, path: Some(path.clone()) },
        );
        Ok(path)
    }

    pub fn snapshot(&self) -> BTreeMap<String, BestEntry> {
        self.entries.clone()
    }
}
