use serde::{Serialize, Deserialize};

use crate::error::Result;
use crate::loss::bce::BceLoss;
use crate::loss::cross_entropy::CrossEntropyLoss;
use crate::loss::dice::DiceLoss;
use crate::loss::huber::HuberLoss;
use crate::loss::mae::MaeLoss;
use crate::loss::mse::MseLoss;
use crate::loss::target::dense_target;
use crate::math::tensor::Tensor;
use crate::registry::name_registry;

/// Selects which criterion the trainer uses, by the `criterion` config name.
///
/// - `CE`     : softmax cross-entropy over the class axis.
/// - `BCE`    : sigmoid + binary cross-entropy per element.
/// - `MSE`    : mean-squared error on raw outputs.
/// - `MAE`    : mean absolute error on raw outputs.
/// - `Huber`  : Huber loss (δ=1.0) on raw outputs.
/// - `Dice`   : soft Dice on class probabilities.
/// - `DiceBCE`: Dice plus BCE, gradients summed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LossType {
    CrossEntropy,
    BinaryCrossEntropy,
    Mse,
    Mae,
    Huber,
    Dice,
    DiceBce,
}

name_registry!(LossType, "criterion", {
    "CE" => CrossEntropy,
    "BCE" => BinaryCrossEntropy,
    "MSE" => Mse,
    "MAE" => Mae,
    "Huber" => Huber,
    "Dice" => Dice,
    "DiceBCE" => DiceBce,
});

impl LossType {
    /// Scalar loss and ∂L/∂prediction.
    ///
    /// `target` may be a class-index map/vector or already shaped like
    /// `prediction`; see [`dense_target`].
    pub fn compute(&self, prediction: &Tensor, target: &Tensor) -> Result<(f64, Tensor)> {
        let expected = dense_target(prediction, target)?;
        match self {
            LossType::CrossEntropy => CrossEntropyLoss::compute(prediction, &expected),
            LossType::BinaryCrossEntropy => Ok(BceLoss::compute(prediction, &expected)),
            LossType::Mse => Ok(MseLoss::compute(prediction, &expected)),
            LossType::Mae => Ok(MaeLoss::compute(prediction, &expected)),
            LossType::Huber => Ok(HuberLoss::compute(prediction, &expected)),
            LossType::Dice => DiceLoss::compute(prediction, &expected),
            LossType::DiceBce => {
                let (dice, mut grad) = DiceLoss::compute(prediction, &expected)?;
                let (bce, bce_grad) = BceLoss::compute(prediction, &expected);
                grad += &bce_grad;
                Ok((dice + bce, grad))
            }
        }
    }
}
