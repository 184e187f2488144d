// metrics.rs
// Description: Classification metrics for epoch scoring.
//              ConfusionMatrix stores counts with rows = true class and columns = predicted
//              class. Per class TP/FN/FP/TN feed sensitivity, specificity, F1 and precision
//              with macro averages; a zero denominator yields 0. Also Cohen's kappa and
//              flat accuracy over accumulated batches.
// History:
// - 2026-10-16: Add ConfusionMatrix, ClassificationReport, kappa and accuracy.
// - 2026-10-17: Optional heatmap rendering from confusion_matrix().

use ndarray::Array2;

use crate::error::MetricsError;
use crate::math::argmax_rows;
use crate::plot::{plot_confusion_matrix, HeatmapOptions};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClassCounts {
    pub i_tp: u64,
    pub i_fn: u64,
    pub i_fp: u64,
    pub i_tn: u64,
}

impl ClassCounts {
    pub fn sensitivity(&self) -> f64 {
        ratio_or_zero(self.i_tp, self.i_tp + self.i_fn)
    }

    pub fn specificity(&self) -> f64 {
        ratio_or_zero(self.i_tn, self.i_tn + self.i_fp)
    }

    pub fn f1(&self) -> f64 {
        ratio_or_zero(2 * self.i_tp, 2 * self.i_tp + self.i_fp + self.i_fn)
    }

    pub fn precision(&self) -> f64 {
        ratio_or_zero(self.i_tp, self.i_tp + self.i_fp)
    }
}

fn ratio_or_zero(i_num: u64, i_den: u64) -> f64 {
    if i_den == 0 {
        0.0
    } else {
        i_num as f64 / i_den as f64
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassificationReport {
    pub v_sensitivity: Vec<f64>,
    pub v_specificity: Vec<f64>,
    pub v_f1: Vec<f64>,
    pub v_precision: Vec<f64>,
    pub d_avg_sensitivity: f64,
    pub d_avg_specificity: f64,
    pub d_avg_f1: f64,
    pub d_avg_precision: f64,
}

impl ClassificationReport {
    pub fn n_classes(&self) -> usize {
        self.v_sensitivity.len()
    }

    /// One line per class plus a macro line. Missing names fall back to `class_<i>`.
    pub fn to_ascii_lines(&self, v_names: &[&str]) -> Vec<String> {
        let mut v_out: Vec<String> = Vec::with_capacity(self.n_classes() + 2);
        v_out.push(format!(
            "{:<10} {:>11} {:>11} {:>9} {:>9}",
            "class", "sensitivity", "specificity", "f1", "precision"
        ));
        for i_c in 0..self.n_classes() {
            let s_name = v_names
                .get(i_c)
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("class_{}", i_c));
            v_out.push(format!(
                "{:<10} {:>11.4} {:>11.4} {:>9.4} {:>9.4}",
                s_name, self.v_sensitivity[i_c], self.v_specificity[i_c], self.v_f1[i_c], self.v_precision[i_c]
            ));
        }
        v_out.push(format!(
            "{:<10} {:>11.4} {:>11.4} {:>9.4} {:>9.4}",
            "macro", self.d_avg_sensitivity, self.d_avg_specificity, self.d_avg_f1, self.d_avg_precision
        ));
        v_out
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfusionMatrix {
    a_counts: Array2<u64>,
}

impl ConfusionMatrix {
    pub fn new(i_n_classes: usize) -> Result<Self, MetricsError> {
        if i_n_classes == 0 {
            return Err(MetricsError::NoClasses);
        }
        Ok(Self {
            a_counts: Array2::zeros((i_n_classes, i_n_classes)),
        })
    }

    /// Builds a matrix from existing counts, rows = true class.
    pub fn from_counts(a_counts: Array2<u64>) -> Result<Self, MetricsError> {
        let (i_rows, i_cols) = a_counts.dim();
        if i_rows == 0 {
            return Err(MetricsError::NoClasses);
        }
        if i_rows != i_cols {
            return Err(MetricsError::LengthMismatch {
                predictions: i_cols,
                labels: i_rows,
            });
        }
        Ok(Self { a_counts })
    }

    pub fn n_classes(&self) -> usize {
        self.a_counts.nrows()
    }

    pub fn counts(&self) -> &Array2<u64> {
        &self.a_counts
    }

    pub fn reset(&mut self) {
        self.a_counts.fill(0);
    }

    fn check_class(&self, i_c: usize) -> Result<(), MetricsError> {
        if i_c >= self.n_classes() {
            return Err(MetricsError::ClassOutOfRange {
                index: i_c,
                n_classes: self.n_classes(),
            });
        }
        Ok(())
    }

    pub fn add(&mut self, i_true: usize, i_pred: usize) -> Result<(), MetricsError> {
        self.check_class(i_true)?;
        self.check_class(i_pred)?;
        self.a_counts[[i_true, i_pred]] += 1;
        Ok(())
    }

    /// All pairs are validated before any count changes.
    pub fn add_batch(&mut self, v_preds: &[usize], v_labels: &[usize]) -> Result<(), MetricsError> {
        if v_preds.len() != v_labels.len() {
            return Err(MetricsError::LengthMismatch {
                predictions: v_preds.len(),
                labels: v_labels.len(),
            });
        }
        for (&i_p, &i_t) in v_preds.iter().zip(v_labels.iter()) {
            self.check_class(i_p)?;
            self.check_class(i_t)?;
        }
        for (&i_p, &i_t) in v_preds.iter().zip(v_labels.iter()) {
            self.a_counts[[i_t, i_p]] += 1;
        }
        Ok(())
    }

    /// Predictions are the row argmax of `[batch, classes]` logits.
    pub fn add_logits(&mut self, a_logits: &Array2<f32>, v_labels: &[usize]) -> Result<(), MetricsError> {
        self.add_batch(&argmax_rows(a_logits), v_labels)
    }

    pub fn total(&self) -> u64 {
        self.a_counts.sum()
    }

    pub fn correct(&self) -> u64 {
        self.a_counts.diag().sum()
    }

    pub fn misclassified(&self) -> u64 {
        self.total() - self.correct()
    }

    pub fn accuracy(&self) -> f64 {
        ratio_or_zero(self.correct(), self.total())
    }

    pub fn class_counts(&self, i_c: usize) -> Result<ClassCounts, MetricsError> {
        self.check_class(i_c)?;
        Ok(self.counts_of(i_c))
    }

    fn counts_of(&self, i_c: usize) -> ClassCounts {
        let i_tp = self.a_counts[[i_c, i_c]];
        let i_row = self.a_counts.row(i_c).sum();
        let i_col = self.a_counts.column(i_c).sum();
        let i_fn = i_row - i_tp;
        let i_fp = i_col - i_tp;
        ClassCounts {
            i_tp,
            i_fn,
            i_fp,
            i_tn: self.total() - i_tp - i_fn - i_fp,
        }
    }

    /// Proportions per true class; empty rows stay 0.
    pub fn normalized(&self) -> Array2<f64> {
        let mut a_out = self.a_counts.mapv(|i| i as f64);
        for mut row in a_out.rows_mut() {
            let d_sum = row.sum();
            if d_sum > 0.0 {
                row.mapv_inplace(|d| d / d_sum);
            }
        }
        a_out
    }

    pub fn report(&self) -> ClassificationReport {
        let i_n = self.n_classes();
        let mut rep = ClassificationReport {
            v_sensitivity: Vec::with_capacity(i_n),
            v_specificity: Vec::with_capacity(i_n),
            v_f1: Vec::with_capacity(i_n),
            v_precision: Vec::with_capacity(i_n),
            d_avg_sensitivity: 0.0,
            d_avg_specificity: 0.0,
            d_avg_f1: 0.0,
            d_avg_precision: 0.0,
        };
        for i_c in 0..i_n {
            let counts = self.counts_of(i_c);
            rep.v_sensitivity.push(counts.sensitivity());
            rep.v_specificity.push(counts.specificity());
            rep.v_f1.push(counts.f1());
            rep.v_precision.push(counts.precision());
        }
        let d_n = i_n as f64;
        rep.d_avg_sensitivity = rep.v_sensitivity.iter().sum::<f64>() / d_n;
        rep.d_avg_specificity = rep.v_specificity.iter().sum::<f64>() / d_n;
        rep.d_avg_f1 = rep.v_f1.iter().sum::<f64>() / d_n;
        rep.d_avg_precision = rep.v_precision.iter().sum::<f64>() / d_n;
        rep
    }

    /// Cohen's kappa. 0 for an empty matrix or when chance agreement is total.
    pub fn kappa(&self) -> f64 {
        let i_total = self.total();
        if i_total == 0 {
            return 0.0;
        }
        let d_total = i_total as f64;
        let d_po = self.correct() as f64 / d_total;
        let d_pe: f64 = (0..self.n_classes())
            .map(|i_c| {
                let d_true = self.a_counts.row(i_c).sum() as f64;
                let d_pred = self.a_counts.column(i_c).sum() as f64;
                d_true * d_pred
            })
            .sum::<f64>()
            / (d_total * d_total);
        if (1.0 - d_pe).abs() < f64::EPSILON {
            return 0.0;
        }
        (d_po - d_pe) / (1.0 - d_pe)
    }

    pub fn to_ascii_lines(&self, v_names: &[&str]) -> Vec<String> {
        let name_of = |i_c: usize| -> String {
            v_names
                .get(i_c)
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("class_{}", i_c))
        };
        let mut v_out: Vec<String> = Vec::with_capacity(self.n_classes() + 1);
        let mut s_header = format!("{:<10}", "true\\pred");
        for i_c in 0..self.n_classes() {
            s_header.push_str(&format!(" {:>8}", name_of(i_c)));
        }
        v_out.push(s_header);
        for (i_t, row) in self.a_counts.rows().into_iter().enumerate() {
            let mut s_line = format!("{:<10}", name_of(i_t));
            for &i_v in row.iter() {
                s_line.push_str(&format!(" {:>8}", i_v));
            }
            v_out.push(s_line);
        }
        v_out
    }
}

/// Builds the confusion matrix of one batch of logits, returns its report and,
/// when options are given, writes the heatmap image.
pub fn confusion_matrix(
    a_output: &Array2<f32>,
    v_labels: &[usize],
    i_n_classes: usize,
    opt_plot: Option<&HeatmapOptions>,
) -> Result<ClassificationReport, MetricsError> {
    let mut cm = ConfusionMatrix::new(i_n_classes)?;
    cm.add_logits(a_output, v_labels)?;
    if let Some(opts) = opt_plot {
        let p_saved = plot_confusion_matrix(&cm, opts)?;
        tracing::info!(path = %p_saved.display(), "confusion matrix heatmap saved");
    }
    Ok(cm.report())
}

pub fn kappa(a_output: &Array2<f32>, v_labels: &[usize], i_n_classes: usize) -> Result<f64, MetricsError> {
    let mut cm = ConfusionMatrix::new(i_n_classes)?;
    cm.add_logits(a_output, v_labels)?;
    Ok(cm.kappa())
}

/// Fraction of equal pairs over all batches concatenated.
pub fn accuracy(v_labels: &[Vec<usize>], v_preds: &[Vec<usize>]) -> Result<f64, MetricsError> {
    let v_l: Vec<usize> = v_labels.iter().flatten().copied().collect();
    let v_p: Vec<usize> = v_preds.iter().flatten().copied().collect();
    if v_l.len() != v_p.len() {
        return Err(MetricsError::LengthMismatch {
            predictions: v_p.len(),
            labels: v_l.len(),
        });
    }
    let i_hits = v_l.iter().zip(v_p.iter()).filter(|(a, b)| a == b).count();
    Ok(ratio_or_zero(i_hits as u64, v_l.len() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_two_class_example() {
        let cm = ConfusionMatrix::from_counts(array![[5, 1], [2, 7]]).unwrap();
        let c0 = cm.class_counts(0).unwrap();
        assert_eq!(c0, ClassCounts { i_tp: 5, i_fn: 1, i_fp: 2, i_tn: 7 });
        assert_abs_diff_eq!(c0.precision(), 5.0 / 7.0, epsilon = 1e-12);
        assert_abs_diff_eq!(c0.sensitivity(), 5.0 / 6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(c0.specificity(), 7.0 / 9.0, epsilon = 1e-12);
        assert_abs_diff_eq!(c0.f1(), 10.0 / 13.0, epsilon = 1e-12);

        let rep = cm.report();
        assert_abs_diff_eq!(rep.v_precision[1], 7.0 / 8.0, epsilon = 1e-12);
        assert_abs_diff_eq!(rep.d_avg_precision, (5.0 / 7.0 + 7.0 / 8.0) / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_all_zero_matrix_reports_zero() {
        let rep = ConfusionMatrix::new(3).unwrap().report();
        for v in [&rep.v_sensitivity, &rep.v_specificity, &rep.v_f1, &rep.v_precision] {
            assert!(v.iter().all(|&d| d == 0.0));
        }
        assert_eq!(rep.d_avg_f1, 0.0);
    }

    #[test]
    fn test_diagonal_and_off_diagonal_sums() {
        let mut cm = ConfusionMatrix::new(3).unwrap();
        cm.add_batch(&[0, 1, 2, 2, 1, 0], &[0, 1, 1, 2, 0, 0]).unwrap();
        assert_eq!(cm.total(), 6);
        assert_eq!(cm.correct(), 4);
        assert_eq!(cm.misclassified(), 2);
        assert_eq!(cm.counts()[[1, 2]], 1);
        assert_eq!(cm.counts()[[0, 1]], 1);
        assert_abs_diff_eq!(cm.accuracy(), 4.0 / 6.0, epsilon = 1e-12);

        cm.reset();
        assert_eq!(cm.total(), 0);
    }

    #[test]
    fn test_out_of_range_leaves_counts_untouched() {
        let mut cm = ConfusionMatrix::new(3).unwrap();
        let res = cm.add_batch(&[0, 3], &[0, 1]);
        assert!(matches!(res, Err(MetricsError::ClassOutOfRange { index: 3, n_classes: 3 })));
        assert_eq!(cm.total(), 0);
        assert!(matches!(
            cm.add_batch(&[0], &[0, 1]),
            Err(MetricsError::LengthMismatch { .. })
        ));
        assert!(matches!(ConfusionMatrix::new(0), Err(MetricsError::NoClasses)));
    }

    #[test]
    fn test_logits_use_row_argmax() {
        let a_logits = array![[0.1f32, 2.0, -1.0], [3.0, 0.0, 0.0], [0.0, 0.0, 0.5]];
        let rep = confusion_matrix(&a_logits, &[1, 0, 1], 3, None).unwrap();
        assert_abs_diff_eq!(rep.v_sensitivity[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(rep.v_sensitivity[1], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(rep.v_precision[2], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_normalized_rows() {
        let cm = ConfusionMatrix::from_counts(array![[1, 3, 0], [0, 0, 0], [2, 2, 4]]).unwrap();
        let a_norm = cm.normalized();
        assert_abs_diff_eq!(a_norm[[0, 1]], 0.75, epsilon = 1e-12);
        assert_eq!(a_norm.row(1).sum(), 0.0);
        assert_abs_diff_eq!(a_norm[[2, 2]], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_kappa() {
        let a_logits = array![[1.0f32, 0.0], [0.0, 1.0], [0.0, 1.0], [0.0, 1.0]];
        assert_abs_diff_eq!(kappa(&a_logits, &[0, 0, 1, 1], 2).unwrap(), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(kappa(&a_logits, &[0, 1, 1, 1], 2).unwrap(), 1.0, epsilon = 1e-12);

        let cm = ConfusionMatrix::from_counts(array![[4, 0], [0, 0]]).unwrap();
        assert_eq!(cm.kappa(), 0.0);
    }

    #[test]
    fn test_accuracy_over_batches() {
        let v_labels = vec![vec![0, 1], vec![2, 2, 1]];
        let v_preds = vec![vec![0, 2], vec![2, 2, 1]];
        assert_abs_diff_eq!(accuracy(&v_labels, &v_preds).unwrap(), 0.8, epsilon = 1e-12);
        assert_eq!(accuracy(&[], &[]).unwrap(), 0.0);
        assert!(accuracy(&[vec![0]], &[]).is_err());
    }

    #[test]
    fn test_ascii_lines() {
        let cm = ConfusionMatrix::from_counts(array![[5, 1], [2, 7]]).unwrap();
        let v_lines = cm.to_ascii_lines(&["Wake"]);
        assert_eq!(v_lines.len(), 3);
        assert!(v_lines[1].starts_with("Wake"));
        assert!(v_lines[2].starts_with("class_1"));
        assert_eq!(cm.report().to_ascii_lines(&[]).len(), 4);
    }
}
