use serde::{Serialize, Deserialize};

use crate::math::tensor::Tensor;

/// A trainable tensor plus its accumulated gradient.
///
/// Only `value` is persisted; gradients are rebuilt as zeros on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub value: Tensor,
    #[serde(skip)]
    pub grad: Tensor,
}

impl Parameter {
    pub fn new(value: Tensor) -> Parameter {
        let grad = Tensor::zeros(value.shape());
        Parameter { value, grad }
    }

    pub fn zero_grad(&mut self) {
        if self.grad.shape() != self.value.shape() {
            self.grad = Tensor::zeros(self.value.shape());
        } else {
            self.grad.fill(0.0);
        }
    }
}
