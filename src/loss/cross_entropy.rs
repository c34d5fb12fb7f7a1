use crate::error::Result;
use crate::loss::target::class_layout;
use crate::math::tensor::Tensor;

/// Categorical cross-entropy over the class axis of raw logits.
pub struct CrossEntropyLoss;

/// Small epsilon added inside log() to prevent log(0) = -inf.
const EPS: f32 = 1e-12;

impl CrossEntropyLoss {
    /// Returns the mean loss over labelled positions and ∂L/∂logits.
    ///
    /// For softmax + cross-entropy the gradient per position simplifies to
    /// `p·Σy − y`, i.e. `p − y` for one-hot targets. Positions whose target
    /// row sums to zero are ignored.
    pub fn compute(logits: &Tensor, expected: &Tensor) -> Result<(f64, Tensor)> {
        let (n, k, plane) = class_layout(logits.shape())?;
        let probs = softmax_axis1(logits)?;
        let mut grad = Tensor::zeros(logits.shape());
        let mut total = 0.0f64;
        let mut counted = 0usize;

        for b in 0..n {
            for p in 0..plane {
                let idx = |c: usize| (b * k + c) * plane + p;
                let mass: f32 = (0..k).map(|c| expected.data()[idx(c)]).sum();
                if mass <= 0.0 {
                    continue;
                }
                counted += 1;
                for c in 0..k {
                    let y = expected.data()[idx(c)];
                    let prob = probs.data()[idx(c)];
                    total -= (y * (prob + EPS).ln()) as f64;
                    grad.data_mut()[idx(c)] = prob * mass - y;
                }
            }
        }

        let denom = counted.max(1);
        grad.scale(1.0 / denom as f32);
        Ok((total / denom as f64, grad))
    }
}

/// Numerically stable softmax over axis 1 of a `[N, K]` or `[N, K, H, W]` tensor.
pub fn softmax_axis1(logits: &Tensor) -> Result<Tensor> {
    let (n, k, plane) = class_layout(logits.shape())?;
    let mut out = logits.clone();
    let data = out.data_mut();
    for b in 0..n {
        for p in 0..plane {
            let idx = |c: usize| (b * k + c) * plane + p;
            let max = (0..k).map(|c| data[idx(c)]).fold(f32::NEG_INFINITY, f32::max);
            let mut sum = 0.0f32;
            for c in 0..k {
                let e = (data[idx(c)] - max).exp();
                data[idx(c)] = e;
                sum += e;
            }
            for c in 0..k {
                data[idx(c)] /= sum;
            }
        }
    }
    Ok(out)
}
