use crate::math::tensor::Tensor;

pub struct MseLoss;

impl MseLoss {
    /// Scalar MSE: mean((predicted - expected)²); gradient 2·(p - y) / n.
    pub fn compute(predicted: &Tensor, expected: &Tensor) -> (f64, Tensor) {
        let n = predicted.len().max(1) as f32;
        let mut total = 0.0f64;
        let mut grad = Tensor::zeros(predicted.shape());
        for ((g, &p), &y) in grad.data_mut().iter_mut().zip(predicted.data()).zip(expected.data()) {
            let diff = p - y;
            total += (diff * diff) as f64;
            *g = 2.0 * diff / n;
        }
        (total / n as f64, grad)
    }
}
