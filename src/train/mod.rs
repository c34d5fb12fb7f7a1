pub mod checkpoint;
pub mod epoch_stats;
pub mod sink;
pub mod train_config;
pub mod trainer;

pub use checkpoint::{BestEntry, BestMetricRegistry, Checkpoint};
pub use epoch_stats::{EpochStats, StatsKind};
pub use sink::{ChannelSink, JsonLinesSink, RunSink};
pub use train_config::TrainConfig;
pub use trainer::{Phase, TrainSummary, Trainer};
