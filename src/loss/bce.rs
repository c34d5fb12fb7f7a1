use crate::activation::activation::sigmoid;
use crate::math::tensor::Tensor;

/// Binary cross-entropy on sigmoid-squashed logits, mean over elements.
pub struct BceLoss;

const EPS: f32 = 1e-12;

impl BceLoss {
    /// Scalar BCE: -mean(y·log(p+ε) + (1-y)·log(1-p+ε)), with p = σ(logit).
    /// The gradient w.r.t. the logit collapses to (p - y) / n.
    pub fn compute(logits: &Tensor, expected: &Tensor) -> (f64, Tensor) {
        let n = logits.len().max(1) as f32;
        let mut total = 0.0f64;
        let mut grad = Tensor::zeros(logits.shape());
        for ((g, &z), &y) in grad.data_mut().iter_mut().zip(logits.data()).zip(expected.data()) {
            let p = sigmoid(z);
            total -= (y * (p + EPS).ln() + (1.0 - y) * (1.0 - p + EPS).ln()) as f64;
            *g = (p - y) / n;
        }
        (total / n as f64, grad)
    }
}
