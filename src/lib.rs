pub mod activation;
pub mod config;
pub mod data;
pub mod error;
pub mod layers;
pub mod loss;
pub mod math;
pub mod metrics;
pub mod network;
pub mod optim;
pub mod train;

mod registry;

// Convenience re-exports
pub use activation::activation::ActivationFunction;
pub use config::{DataloaderKind, RunConfig};
pub use data::{AugmentConfig, Augmenter, BatchLoader, CsvDataset, Dataset, PairedDirDataset};
pub use error::{Error, Result};
pub use layers::dense::Dense;
pub use loss::loss_type::LossType;
pub use math::tensor::Tensor;
pub use metrics::{ConfusionMatrix, MetricResults};
pub use network::{ModelKind, Predictor};
pub use optim::{Optimizer, OptimizerKind, SchedulerKind};
pub use train::{TrainSummary, Trainer};
