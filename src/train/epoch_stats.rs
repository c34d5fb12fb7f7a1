use serde::{Serialize, Deserialize};

use crate::metrics::MetricResults;

/// Which loop produced an [`EpochStats`] record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsKind {
    Train,
    Validation,
}

/// Summary of one train epoch or one validation pass.
///
/// The trainer keeps every record in its history and forwards each one to
/// the configured [`RunSink`](crate::train::RunSink)s as it is produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    pub kind: StatsKind,
    /// 1-based epoch number.
    pub epoch: usize,
    pub total_epochs: usize,
    /// Train batch index that triggered a mid-epoch validation pass;
    /// `None` for train records and end-of-epoch validation.
    pub batch: Option<usize>,
    /// Mean criterion value over the batches of this pass.
    pub loss: f64,
    pub learning_rate: f64,
    pub mean_accuracy: f64,
    pub mean_kappa: f64,
    pub class_accuracy: Vec<f64>,
    pub class_kappa: Vec<f64>,
    /// Labels outside the class range, left out of the metrics.
    pub ignored: u64,
    /// Wall-clock duration of the pass in milliseconds.
    pub elapsed_ms: u64,
}

impl EpochStats {
    pub(crate) fn from_results(kind: StatsKind, results: MetricResults) -> EpochStats {
        EpochStats {
            kind,
            epoch: 0,
            total_epochs: 0,
            batch: None,
            loss: 0.0,
            learning_rate: 0.0,
            mean_accuracy: results.mean_accuracy,
            mean_kappa: results.mean_kappa,
            class_accuracy: results.class_accuracy,
            class_kappa: results.class_kappa,
            ignored: 0,
            elapsed_ms: 0,
        }
    }

    pub fn is_mid_epoch(&self) -> bool {
        self.kind == StatsKind::Validation && self.batch.is_some()
    }
}
