pub mod adamw;
pub mod scheduler;
pub mod sgd;

use serde::{Serialize, Deserialize};

use crate::network::predictor::Predictor;
use crate::registry::name_registry;

pub use adamw::AdamW;
pub use scheduler::{LrScheduler, SchedulerKind};
pub use sgd::Sgd;

/// Parameter update rule applied after each backward pass.
pub trait Optimizer: Send {
    fn step(&mut self, model: &mut dyn Predictor);
    fn learning_rate(&self) -> f64;
    fn set_learning_rate(&mut self, lr: f64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OptimizerKind {
    AdamW,
    Sgd,
}

name_registry!(OptimizerKind, "optimizer", {
    "AdamW" => AdamW,
    "SGD" => Sgd,
});

impl OptimizerKind {
    pub fn build(&self, learning_rate: f64) -> Box<dyn Optimizer> {
        match self {
            OptimizerKind::AdamW => Box::new(AdamW::new(learning_rate)),
            OptimizerKind::Sgd => Box::new(Sgd::new(learning_rate)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::tensor::Tensor;
    use crate::network::pixel::PixelClassifier;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn loss_after_steps(kind: OptimizerKind, steps: usize) -> (f64, f64) {
        let mut rng = StdRng::seed_from_u64(11);
        let mut model = PixelClassifier::new(2, &[8], 2, &mut rng);
        let mut optim = kind.build(0.05);
        let input = Tensor::from_vec(&[1, 2, 1, 2], vec![1.0, -1.0, -1.0, 1.0]).unwrap();
        let target = Tensor::from_vec(&[1, 1, 1, 2], vec![0.0, 1.0]).unwrap();
        let criterion = crate::loss::LossType::CrossEntropy;

        let mut first = 0.0;
        let mut last = 0.0;
        for i in 0..steps {
            model.zero_grad();
            let out = model.forward_train(&input).unwrap();
            let (loss, grad) = criterion.compute(&out, &target).unwrap();
            model.backward(&grad).unwrap();
            optim.step(&mut model);
            if i == 0 {
                first = loss;
            }
            last = loss;
        }
        (first, last)
    }

    #[test]
    fn both_optimizers_reduce_a_separable_loss() {
        for kind in [OptimizerKind::AdamW, OptimizerKind::Sgd] {
            let (first, last) = loss_after_steps(kind, 60);
            assert!(last < first, "{}: {} -> {}", kind, first, last);
        }
    }
}
