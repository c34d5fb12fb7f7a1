pub mod augment;
pub mod color;
pub mod loader;
pub mod manifest;
pub mod paired;
pub mod sample;

pub use augment::{AugmentConfig, Augmenter, ColorSpace, Mode, Normalization, OffsetMode};
pub use loader::{Batch, BatchLoader, EpochBatches, LoaderOptions};
pub use manifest::CsvDataset;
pub use paired::PairedDirDataset;
pub use sample::{Dataset, Sample};
