use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};

/// Running confusion matrix with accuracy and one-vs-rest kappa read-outs.
///
/// Row = ground truth class, column = predicted class. Labels outside
/// `[0, num_classes)` are not counted in the matrix; they are tallied in
/// `ignored` instead.
#[derive(Debug, Clone)]
pub struct ConfusionMatrix {
    num_classes: usize,
    counts: Vec<u64>,
    ignored: u64,
}

/// Read-out of a [`ConfusionMatrix`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResults {
    pub mean_accuracy: f64,
    pub class_accuracy: Vec<f64>,
    pub mean_kappa: f64,
    pub class_kappa: Vec<f64>,
}

impl MetricResults {
    /// Looks up a tracked scalar by its registry name.
    pub fn scalar(&self, name: &str) -> Option<f64> {
        match name {
            "mean_accuracy" => Some(self.mean_accuracy),
            "mean_kappa" => Some(self.mean_kappa),
            _ => None,
        }
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 { 0.0 } else { num / den }
}

impl ConfusionMatrix {
    pub fn new(num_classes: usize) -> ConfusionMatrix {
        ConfusionMatrix {
            num_classes,
            counts: vec![0; num_classes * num_classes],
            ignored: 0,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Accumulates one batch of same-length ground-truth and prediction
    /// class indices (flattened label maps or per-sample labels).
    pub fn update(&mut self, ground_truth: &[usize], prediction: &[usize]) -> Result<()> {
        if ground_truth.len() != prediction.len() {
            return Err(Error::Shape(format!(
                "{} ground-truth labels vs {} predictions",
                ground_truth.len(),
                prediction.len()
            )));
        }
        let k = self.num_classes;
        for (&gt, &pred) in ground_truth.iter().zip(prediction) {
            if gt < k && pred < k {
                self.counts[gt * k + pred] += 1;
            } else {
                self.ignored += 1;
            }
        }
        Ok(())
    }

    pub fn get(&self, actual: usize, predicted: usize) -> u64 {
        self.counts[actual * self.num_classes + predicted]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn ignored(&self) -> u64 {
        self.ignored
    }

    pub fn reset(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = 0);
        self.ignored = 0;
    }

    fn row_sum(&self, c: usize) -> u64 {
        let k = self.num_classes;
        self.counts[c * k..(c + 1) * k].iter().sum()
    }

    fn col_sum(&self, c: usize) -> u64 {
        (0..self.num_classes).map(|r| self.get(r, c)).sum()
    }

    /// Cohen's kappa for class `c` against all other classes.
    fn class_kappa(&self, c: usize, total: f64) -> f64 {
        if total == 0.0 {
            return 0.0;
        }
        let tp = self.get(c, c) as f64;
        let row = self.row_sum(c) as f64;
        let col = self.col_sum(c) as f64;
        let tn = total - row - col + tp;
        let observed = (tp + tn) / total;
        let expected = (row * col + (total - row) * (total - col)) / (total * total);
        if (1.0 - expected).abs() < f64::EPSILON {
            return 0.0;
        }
        (observed - expected) / (1.0 - expected)
    }

    pub fn get_results(&self) -> MetricResults {
        let k = self.num_classes;
        let total = self.total() as f64;
        let class_accuracy: Vec<f64> = (0..k)
            .map(|c| ratio(self.get(c, c) as f64, self.row_sum(c) as f64))
            .collect();
        let class_kappa: Vec<f64> = (0..k).map(|c| self.class_kappa(c, total)).collect();
        let mean = |v: &[f64]| ratio(v.iter().sum(), v.len() as f64);
        MetricResults {
            mean_accuracy: mean(&class_accuracy),
            mean_kappa: mean(&class_kappa),
            class_accuracy,
            class_kappa,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_after_update_reads_all_zero() {
        let mut cm = ConfusionMatrix::new(3);
        cm.update(&[0, 1, 2, 2], &[0, 2, 2, 1]).unwrap();
        cm.reset();
        let r = cm.get_results();
        assert_eq!(r.mean_accuracy, 0.0);
        assert_eq!(r.mean_kappa, 0.0);
        assert!(r.class_accuracy.iter().chain(&r.class_kappa).all(|&v| v == 0.0));
    }

    #[test]
    fn perfect_predictions_score_one() {
        let mut cm = ConfusionMatrix::new(3);
        let labels = [0, 1, 2, 1, 0, 2, 2];
        cm.update(&labels, &labels).unwrap();
        let r = cm.get_results();
        assert!((r.mean_accuracy - 1.0).abs() < 1e-12);
        assert!((r.mean_kappa - 1.0).abs() < 1e-12);
        assert!(r.class_kappa.iter().all(|&k| (k - 1.0).abs() < 1e-12));
    }

    #[test]
    fn total_matches_labels_seen() {
        let mut cm = ConfusionMatrix::new(2);
        cm.update(&[0, 1, 1], &[1, 1, 0]).unwrap();
        cm.update(&[1, 0], &[1, 0]).unwrap();
        assert_eq!(cm.total(), 5);
    }

    #[test]
    fn out_of_range_labels_are_ignored_not_counted() {
        let mut cm = ConfusionMatrix::new(2);
        cm.update(&[0, 255, 1], &[0, 1, 1]).unwrap();
        assert_eq!(cm.total(), 2);
        assert_eq!(cm.ignored(), 1);
    }

    #[test]
    fn kappa_matches_hand_computation() {
        // Binary case: tp=20, fn=5, fp=10, tn=15 for class 0.
        let mut cm = ConfusionMatrix::new(2);
        let mut gt = Vec::new();
        let mut pred = Vec::new();
        for (g, p, n) in [(0, 0, 20), (0, 1, 5), (1, 0, 10), (1, 1, 15)] {
            gt.extend(std::iter::repeat(g).take(n));
            pred.extend(std::iter::repeat(p).take(n));
        }
        cm.update(&gt, &pred).unwrap();
        let r = cm.get_results();
        // po = 35/50 = 0.7; pe = (25*30 + 25*20)/2500 = 0.5; kappa = 0.4
        assert!((r.class_kappa[0] - 0.4).abs() < 1e-12);
        assert!((r.class_kappa[1] - 0.4).abs() < 1e-12);
        assert!((r.class_accuracy[0] - 0.8).abs() < 1e-12);
        assert!((r.class_accuracy[1] - 0.6).abs() < 1e-12);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let mut cm = ConfusionMatrix::new(2);
        assert!(cm.update(&[0, 1], &[0]).is_err());
    }
}
