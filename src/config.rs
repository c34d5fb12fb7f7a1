//! Run configuration: one JSON document that names every component of a
//! training run, and the code that builds the trainer from it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Serialize, Deserialize};
use tracing::info;

use crate::data::augment::{AugmentConfig, Augmenter, Mode};
use crate::data::loader::{BatchLoader, LoaderOptions};
use crate::data::manifest::{CsvDataset, TARGET_WIDTH};
use crate::data::paired::PairedDirDataset;
use crate::data::sample::Dataset;
use crate::error::{Error, Result};
use crate::loss::loss_type::LossType;
use crate::network::model_kind::ModelKind;
use crate::network::predictor::Predictor;
use crate::network::state_dict::CheckpointFormat;
use crate::optim::scheduler::{LrScheduler, SchedulerKind};
use crate::optim::OptimizerKind;
use crate::registry::name_registry;
use crate::train::sink::JsonLinesSink;
use crate::train::train_config::TrainConfig;
use crate::train::trainer::Trainer;

/// Dataset layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DataloaderKind {
    /// Paired input/label directories, per-pixel targets.
    Image2Image,
    /// CSV manifest, one target vector per image.
    Image2Vector,
}

name_registry!(DataloaderKind, "dataloader", {
    "Image2Image" => Image2Image,
    "Image2Vector" => Image2Vector,
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Selects the normalization preset (`ADE` uses ImageNet statistics).
    pub project_name: String,
    pub model_name: ModelKind,
    pub dataloader: DataloaderKind,
    pub criterion: LossType,
    pub optimizer: OptimizerKind,
    pub scheduler: Option<SchedulerKind>,
    pub lr: f64,
    pub epochs: usize,
    pub batch_size: usize,
    pub val_batch_size: usize,
    pub num_class: usize,
    /// Hidden layer widths of the built-in predictors.
    pub hidden: Vec<usize>,
    pub seed: u64,
    pub worker: usize,
    pub pin_memory: bool,
    pub prefetch_factor: usize,
    pub train_fold: Option<usize>,
    pub log_interval: usize,
    pub saved_model_directory: PathBuf,
    /// Parameters to start from; ImageNet layout when the path says so.
    pub model_path: Option<PathBuf>,
    /// Optional JSON-lines run log.
    pub log_jsonl: Option<PathBuf>,
    pub train_x_path: Option<PathBuf>,
    pub train_y_path: Option<PathBuf>,
    pub val_x_path: Option<PathBuf>,
    pub val_y_path: Option<PathBuf>,
    pub train_csv_path: Option<PathBuf>,
    pub val_csv_path: Option<PathBuf>,
    pub augment: AugmentConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            project_name: String::new(),
            model_name: ModelKind::PixelMlp,
            dataloader: DataloaderKind::Image2Image,
            criterion: LossType::CrossEntropy,
            optimizer: OptimizerKind::AdamW,
            scheduler: None,
            lr: 1e-3,
            epochs: 1,
            batch_size: 4,
            val_batch_size: 1,
            num_class: 2,
            hidden: vec![16],
            seed: 0,
            worker: 0,
            pin_memory: true,
            prefetch_factor: 2,
            train_fold: None,
            log_interval: 100,
            saved_model_directory: PathBuf::from("runs"),
            model_path: None,
            log_jsonl: None,
            train_x_path: None,
            train_y_path: None,
            val_x_path: None,
            val_y_path: None,
            train_csv_path: None,
            val_csv_path: None,
            augment: AugmentConfig::default(),
        }
    }
}

fn required<'a>(path: &'a Option<PathBuf>, name: &str, kind: DataloaderKind) -> Result<&'a Path> {
    path.as_deref()
        .ok_or_else(|| Error::Config(format!("{} is required for the {} dataloader", name, kind)))
}

impl RunConfig {
    pub fn load_json(path: &Path) -> Result<RunConfig> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        serde_json::from_str(&text).map_err(|e| match e.classify() {
            // Registry names fail inside `try_from`; surface them as config errors.
            serde_json::error::Category::Data => Error::Config(format!("{}: {}", path.display(), e)),
            _ => Error::json(path, e),
        })
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).map_err(|e| Error::json(path, e))?;
        std::fs::write(path, text).map_err(|e| Error::io(path, e))
    }

    /// Checks everything that can be checked before data is touched.
    pub fn validate(&self) -> Result<()> {
        self.train_config().validate()?;
        self.augment.validate()?;
        if self.val_batch_size == 0 {
            return Err(Error::Config("val_batch_size must be at least 1".to_string()));
        }
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return Err(Error::Config(format!("lr {} must be positive", self.lr)));
        }
        match (self.dataloader, self.model_name.is_dense()) {
            (DataloaderKind::Image2Image, false) | (DataloaderKind::Image2Vector, true) => {
                return Err(Error::Config(format!(
                    "model {} does not fit the {} dataloader",
                    self.model_name, self.dataloader
                )));
            }
            _ => {}
        }
        match self.dataloader {
            DataloaderKind::Image2Image => {
                for (path, name) in [
                    (&self.train_x_path, "train_x_path"),
                    (&self.train_y_path, "train_y_path"),
                    (&self.val_x_path, "val_x_path"),
                    (&self.val_y_path, "val_y_path"),
                ] {
                    required(path, name, self.dataloader)?;
                }
            }
            DataloaderKind::Image2Vector => {
                required(&self.train_csv_path, "train_csv_path", self.dataloader)?;
                required(&self.val_csv_path, "val_csv_path", self.dataloader)?;
                if self.num_class != TARGET_WIDTH {
                    return Err(Error::Config(format!(
                        "manifest targets are {} wide but num_class is {}",
                        TARGET_WIDTH, self.num_class
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn train_config(&self) -> TrainConfig {
        TrainConfig {
            model_name: self.model_name.to_string(),
            epochs: self.epochs,
            batch_size: self.batch_size,
            num_class: self.num_class,
            loss_type: self.criterion,
            train_fold: self.train_fold,
            log_interval: self.log_interval,
            saved_model_directory: self.saved_model_directory.clone(),
            run_name: None,
        }
    }

    pub fn in_channels(&self) -> usize {
        self.augment.input_space.channels()
    }

    fn augmenter(&self, mode: Mode) -> Augmenter {
        let mut augment = self.augment.clone();
        // Two-class label maps are stored as {0, 255}.
        if self.dataloader == DataloaderKind::Image2Image && self.num_class == 2 {
            augment.binary_target = true;
        }
        let normalization = augment.normalization(&self.project_name);
        Augmenter::new(augment, mode, normalization)
    }

    pub fn build_dataset(&self, mode: Mode) -> Result<Arc<dyn Dataset>> {
        let augmenter = self.augmenter(mode);
        let kind = self.dataloader;
        let (x, y, csv) = match mode {
            Mode::Train => (&self.train_x_path, &self.train_y_path, &self.train_csv_path),
            Mode::Validation => (&self.val_x_path, &self.val_y_path, &self.val_csv_path),
        };
        let dataset: Arc<dyn Dataset> = match kind {
            DataloaderKind::Image2Image => Arc::new(PairedDirDataset::new(
                required(x, "x_path", kind)?,
                required(y, "y_path", kind)?,
                augmenter,
            )?),
            DataloaderKind::Image2Vector => {
                Arc::new(CsvDataset::new(required(csv, "csv_path", kind)?, augmenter)?)
            }
        };
        Ok(dataset)
    }

    pub fn build_loader(&self, mode: Mode) -> Result<BatchLoader> {
        let (batch_size, seed) = match mode {
            Mode::Train => (self.batch_size, self.seed.wrapping_add(1)),
            Mode::Validation => (self.val_batch_size, self.seed.wrapping_add(2)),
        };
        let options = LoaderOptions {
            batch_size,
            workers: self.worker,
            pin_memory: self.pin_memory,
            prefetch_factor: self.prefetch_factor,
        };
        BatchLoader::new(self.build_dataset(mode)?, mode, options, seed)
    }

    /// Builds the predictor and restores `model_path` if one is set.
    pub fn build_model(&self) -> Result<Box<dyn Predictor>> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut model = self
            .model_name
            .build(self.in_channels(), &self.hidden, self.num_class, &mut rng);
        if let Some(path) = &self.model_path {
            match CheckpointFormat::detect(path) {
                CheckpointFormat::ImageNet => model.load_pretrained_imagenet(path)?,
                CheckpointFormat::Native => model.load_pretrained(path)?,
            }
        }
        Ok(model)
    }

    /// Validates, then assembles every component of the run.
    pub fn build_trainer(&self) -> Result<Trainer> {
        self.validate()?;
        let loader_train = self.build_loader(Mode::Train)?;
        let loader_val = self.build_loader(Mode::Validation)?;
        let model = self.build_model()?;
        let optimizer = self.optimizer.build(self.lr);
        let scheduler = self
            .scheduler
            .map(|kind| LrScheduler::new(kind, self.lr, loader_train.len(), self.batch_size));
        info!(
            model = %self.model_name,
            optimizer = %self.optimizer,
            scheduler = ?self.scheduler.map(|s| s.name()),
            train_samples = loader_train.num_samples(),
            val_samples = loader_val.num_samples(),
            "run assembled"
        );
        let mut trainer = Trainer::new(model, optimizer, scheduler, loader_train, loader_val, self.train_config())?;
        if let Some(path) = &self.log_jsonl {
            trainer = trainer.with_sink(Box::new(JsonLinesSink::create(path)?));
        }
        Ok(trainer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_registry_names_fail_at_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, r#"{ "model_name": "UNet9000" }"#).unwrap();
        let err = RunConfig::load_json(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)), "{err}");
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, r#"{ "criterion": "Dice", "scheduler": "WarmupCosine" }"#).unwrap();
        let cfg = RunConfig::load_json(&path).unwrap();
        assert_eq!(cfg.criterion, LossType::Dice);
        assert_eq!(cfg.scheduler, Some(SchedulerKind::WarmupCosine));
        assert_eq!(cfg.augment, AugmentConfig::default());
        assert_eq!(cfg.val_batch_size, 1);
    }

    #[test]
    fn save_and_load_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        let cfg = RunConfig { train_fold: Some(4), ..RunConfig::default() };
        cfg.save_json(&path).unwrap();
        assert_eq!(RunConfig::load_json(&path).unwrap(), cfg);
    }

    #[test]
    fn validate_requires_paths_for_the_dataloader() {
        let cfg = RunConfig::default();
        assert!(matches!(cfg.validate(), Err(Error::Config(msg)) if msg.contains("train_x_path")));
    }

    #[test]
    fn validate_rejects_model_dataloader_mismatch() {
        let cfg = RunConfig {
            dataloader: DataloaderKind::Image2Vector,
            train_csv_path: Some("a.csv".into()),
            val_csv_path: Some("b.csv".into()),
            ..RunConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }
}
