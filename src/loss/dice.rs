use crate::activation::activation::sigmoid;
use crate::error::Result;
use crate::loss::cross_entropy::softmax_axis1;
use crate::loss::target::class_layout;
use crate::math::tensor::Tensor;

/// Soft Dice loss, `1 − mean_c dice_c`, over the whole batch.
///
/// Multi-class logits go through a softmax over the class axis; a single
/// channel goes through a sigmoid.
pub struct DiceLoss;

const SMOOTH: f32 = 1.0;

impl DiceLoss {
    pub fn compute(logits: &Tensor, expected: &Tensor) -> Result<(f64, Tensor)> {
        let (n, k, plane) = class_layout(logits.shape())?;
        let probs = if k == 1 {
            logits.map(sigmoid)
        } else {
            softmax_axis1(logits)?
        };
        let idx = |b: usize, c: usize, p: usize| (b * k + c) * plane + p;

        // Per-class intersection and denominator.
        let mut inter = vec![0.0f32; k];
        let mut denom = vec![SMOOTH; k];
        for b in 0..n {
            for c in 0..k {
                for p in 0..plane {
                    let i = idx(b, c, p);
                    inter[c] += probs.data()[i] * expected.data()[i];
                    denom[c] += probs.data()[i] + expected.data()[i];
                }
            }
        }
        let dice: Vec<f32> = (0..k).map(|c| (2.0 * inter[c] + SMOOTH) / denom[c]).collect();
        let loss = 1.0 - dice.iter().map(|&d| d as f64).sum::<f64>() / k as f64;

        // ∂L/∂p for each element, then through the squashing function.
        let mut grad_p = Tensor::zeros(logits.shape());
        for b in 0..n {
            for c in 0..k {
                let numer = 2.0 * inter[c] + SMOOTH;
                for p in 0..plane {
                    let i = idx(b, c, p);
                    let y = expected.data()[i];
                    let d = (2.0 * y * denom[c] - numer) / (denom[c] * denom[c]);
                    grad_p.data_mut()[i] = -d / k as f32;
                }
            }
        }

        let mut grad = Tensor::zeros(logits.shape());
        if k == 1 {
            for ((g, &gp), &pr) in grad.data_mut().iter_mut().zip(grad_p.data()).zip(probs.data()) {
                *g = gp * pr * (1.0 - pr);
            }
        } else {
            for b in 0..n {
                for p in 0..plane {
                    let dot: f32 = (0..k)
                        .map(|c| probs.data()[idx(b, c, p)] * grad_p.data()[idx(b, c, p)])
                        .sum();
                    for c in 0..k {
                        let i = idx(b, c, p);
                        grad.data_mut()[i] = probs.data()[i] * (grad_p.data()[i] - dot);
                    }
                }
            }
        }
        Ok((loss, grad))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confident_correct_prediction_has_near_zero_loss() {
        let logits = Tensor::from_vec(&[1, 2, 1, 2], vec![20.0, -20.0, -20.0, 20.0]).unwrap();
        let target = Tensor::from_vec(&[1, 2, 1, 2], vec![1.0, 0.0, 0.0, 1.0]).unwrap();
        let (loss, _) = DiceLoss::compute(&logits, &target).unwrap();
        assert!(loss < 1e-3, "{}", loss);
    }

    #[test]
    fn gradient_matches_finite_difference() {
        let logits = Tensor::from_vec(&[1, 2, 1, 2], vec![0.3, -0.2, 0.1, 0.5]).unwrap();
        let target = Tensor::from_vec(&[1, 2, 1, 2], vec![1.0, 0.0, 0.0, 1.0]).unwrap();
        let (_, grad) = DiceLoss::compute(&logits, &target).unwrap();
        let h = 1e-3;
        let mut plus = logits.clone();
        plus.data_mut()[0] += h;
        let mut minus = logits.clone();
        minus.data_mut()[0] -= h;
        let (lp, _) = DiceLoss::compute(&plus, &target).unwrap();
        let (lm, _) = DiceLoss::compute(&minus, &target).unwrap();
        let numeric = ((lp - lm) / (2.0 * h as f64)) as f32;
        assert!((numeric - grad.data()[0]).abs() < 1e-3, "{} vs {}", numeric, grad.data()[0]);
    }
}
