pub mod model_kind;
pub mod network;
pub mod pixel;
pub mod pooled;
pub mod predictor;
pub mod spec;
pub mod state_dict;

pub use model_kind::ModelKind;
pub use network::Network;
pub use pixel::PixelClassifier;
pub use pooled::PooledClassifier;
pub use predictor::Predictor;
pub use spec::LayerSpec;
pub use state_dict::{CheckpointFormat, KeyMapping, StateDict};
