use crate::math::tensor::Tensor;

pub struct HuberLoss;

const DELTA: f32 = 1.0;

impl HuberLoss {
    /// Scalar Huber: mean(h(predicted − expected))
    /// where h(x) = 0.5·x²  if |x| ≤ δ
    ///              δ·(|x| − 0.5·δ)  otherwise
    pub fn compute(predicted: &Tensor, expected: &Tensor) -> (f64, Tensor) {
        let n = predicted.len().max(1) as f32;
        let mut total = 0.0f64;
        let mut grad = Tensor::zeros(predicted.shape());
        for ((g, &p), &y) in grad.data_mut().iter_mut().zip(predicted.data()).zip(expected.data()) {
            let x = p - y;
            if x.abs() <= DELTA {
                total += (0.5 * x * x) as f64;
                *g = x / n;
            } else {
                total += (DELTA * (x.abs() - 0.5 * DELTA)) as f64;
                *g = DELTA * x.signum() / n;
            }
        }
        (total / n as f64, grad)
    }
}
