use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::loss::loss_type::LossType;

/// Knobs the epoch loop itself reads.
///
/// - `train_fold`  : mid-epoch validation runs every `train_batches / fold`
///                    batches (at least 1); `None` validates at epoch end only.
/// - `log_interval`: the running loss is logged every
///                    `log_interval / batch_size` batches (at least 1).
/// - `run_name`    : sub-directory of `saved_model_directory` for this run;
///                    defaults to the start timestamp.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub model_name: String,
    pub epochs: usize,
    pub batch_size: usize,
    pub num_class: usize,
    pub loss_type: LossType,
    pub train_fold: Option<usize>,
    pub log_interval: usize,
    pub saved_model_directory: PathBuf,
    pub run_name: Option<String>,
}

impl TrainConfig {
    pub fn new(model_name: &str, epochs: usize, batch_size: usize, num_class: usize, loss_type: LossType) -> Self {
        TrainConfig {
            model_name: model_name.to_string(),
            epochs,
            batch_size,
            num_class,
            loss_type,
            train_fold: None,
            log_interval: 100,
            saved_model_directory: PathBuf::from("runs"),
            run_name: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::Config("epochs must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }
        if self.num_class == 0 {
            return Err(Error::Config("num_class must be at least 1".to_string()));
        }
        if self.train_fold == Some(0) {
            return Err(Error::Config("train_fold must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Batches between mid-epoch validation passes, if enabled.
    pub fn validate_interval(&self, train_batches: usize) -> Option<usize> {
        self.train_fold.map(|fold| (train_batches / fold.max(1)).max(1))
    }

    pub fn log_every(&self) -> usize {
        (self.log_interval / self.batch_size.max(1)).max(1)
    }
}
