use crate::error::Result;
use crate::math::tensor::Tensor;

/// Ground-truth and predicted class per position, ready for
/// [`ConfusionMatrix::update`](crate::metrics::ConfusionMatrix::update).
///
/// Predictions are the channel argmax. Targets shaped like the prediction,
/// and target vectors (`[N, K]` with `K > 1`), are reduced the same way;
/// anything else is read as class indices. Negative or non-finite labels map
/// to `usize::MAX` so the matrix ignores them.
pub fn class_labels(prediction: &Tensor, target: &Tensor) -> Result<(Vec<usize>, Vec<usize>)> {
    let predicted = prediction.argmax_axis1()?;
    let vector_target = target.rank() == 2 && target.shape()[1] > 1;
    let ground_truth = if vector_target || target.shape() == prediction.shape() {
        target.argmax_axis1()?
    } else {
        target
            .data()
            .iter()
            .map(|&v| if v.is_finite() && v >= 0.0 { v.round() as usize } else { usize::MAX })
            .collect()
    };
    Ok((ground_truth, predicted))
}
