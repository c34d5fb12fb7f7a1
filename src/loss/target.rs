use crate::error::{Error, Result};
use crate::math::tensor::Tensor;

/// Expands a target to the prediction's shape.
///
/// Same-shaped targets pass through. Class-index targets (`[N, 1, H, W]` or
/// `[N, H, W]` against `[N, K, H, W]`, and `[N]` or `[N, 1]` against `[N, K]`)
/// are one-hot encoded; indices outside `[0, K)` become all-zero rows, which
/// every criterion treats as ignored.
pub fn dense_target(prediction: &Tensor, target: &Tensor) -> Result<Tensor> {
    if prediction.shape() == target.shape() {
        return Ok(target.clone());
    }
    let (n, k, plane) = match prediction.shape() {
        &[n, k] => (n, k, 1),
        &[n, k, h, w] => (n, k, h * w),
        other => {
            return Err(Error::Shape(format!("unsupported prediction shape {:?}", other)));
        }
    };
    if target.len() != n * plane {
        return Err(Error::Shape(format!(
            "target {:?} cannot index prediction {:?}",
            target.shape(),
            prediction.shape()
        )));
    }
    let mut dense = vec![0.0f32; n * k * plane];
    for (pos, &label) in target.data().iter().enumerate() {
        let b = pos / plane;
        let p = pos % plane;
        let class = label.round();
        if class >= 0.0 && (class as usize) < k {
            dense[(b * k + class as usize) * plane + p] = 1.0;
        }
    }
    Tensor::from_vec(prediction.shape(), dense)
}

/// Splits a `[N, K]` or `[N, K, H, W]` shape into (N, K, positions per sample).
pub(crate) fn class_layout(shape: &[usize]) -> Result<(usize, usize, usize)> {
    match shape {
        &[n, k] => Ok((n, k, 1)),
        &[n, k, h, w] => Ok((n, k, h * w)),
        other => Err(Error::Shape(format!("expected [N, K] or [N, K, H, W], got {:?}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_map_is_one_hot_encoded_per_pixel() {
        let pred = Tensor::zeros(&[1, 3, 1, 2]);
        let target = Tensor::from_vec(&[1, 1, 1, 2], vec![2.0, 0.0]).unwrap();
        let dense = dense_target(&pred, &target).unwrap();
        // class 0 plane, class 1 plane, class 2 plane
        assert_eq!(dense.data(), &[0.0, 1.0, 0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn out_of_range_labels_become_empty_rows() {
        let pred = Tensor::zeros(&[2, 2]);
        let target = Tensor::from_vec(&[2], vec![1.0, 255.0]).unwrap();
        let dense = dense_target(&pred, &target).unwrap();
        assert_eq!(dense.data(), &[0.0, 1.0, 0.0, 0.0]);
    }
}
