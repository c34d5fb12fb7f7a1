pub mod bce;
pub mod cross_entropy;
pub mod dice;
pub mod huber;
pub mod loss_type;
pub mod mae;
pub mod mse;
pub mod target;

pub use cross_entropy::CrossEntropyLoss;
pub use loss_type::LossType;
pub use mse::MseLoss;
