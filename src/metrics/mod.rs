pub mod confusion;
pub mod labels;

pub use confusion::{ConfusionMatrix, MetricResults};
pub use labels::class_labels;

/// Validation scalars tracked for best-checkpoint retention, in order.
pub const TRACKED_METRICS: &[&str] = &["mean_accuracy", "mean_kappa"];
