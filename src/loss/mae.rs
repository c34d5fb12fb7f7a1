use crate::math::tensor::Tensor;

pub struct MaeLoss;

impl MaeLoss {
    /// Scalar MAE: mean(|predicted - expected|).
    /// Subgradient: sign(p - y) / n, 0 when equal.
    pub fn compute(predicted: &Tensor, expected: &Tensor) -> (f64, Tensor) {
        let n = predicted.len().max(1) as f32;
        let mut total = 0.0f64;
        let mut grad = Tensor::zeros(predicted.shape());
        for ((g, &p), &y) in grad.data_mut().iter_mut().zip(predicted.data()).zip(expected.data()) {
            let diff = p - y;
            total += diff.abs() as f64;
            *g = if diff > 0.0 { 1.0 / n } else if diff < 0.0 { -1.0 / n } else { 0.0 };
        }
        (total / n as f64, grad)
    }
}
