use std::fmt;

use ndarray::ArrayView1;
use serde::Serialize;

use crate::dataset::{check_labels, FRAUDULENT};
use crate::error::{FraudError, Result};

/// Rows are the actual class, columns the predicted class, both in label order [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub counts: [[usize; 2]; 2],
}

impl ConfusionMatrix {
    pub fn true_negatives(&self) -> usize {
        self.counts[0][0]
    }

    pub fn false_positives(&self) -> usize {
        self.counts[0][1]
    }

    pub fn false_negatives(&self) -> usize {
        self.counts[1][0]
    }

    pub fn true_positives(&self) -> usize {
        self.counts[1][1]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub accuracy: f64,
    pub confusion: ConfusionMatrix,
    pub classes: [ClassMetrics; 2],
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
    pub roc_auc: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RocPoint {
    pub false_positive_rate: f64,
    pub true_positive_rate: f64,
    pub threshold: f64,
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn class_metrics(confusion: &ConfusionMatrix, class: usize) -> ClassMetrics {
    let tp = confusion.counts[class][class];
    let predicted = confusion.counts[0][class] + confusion.counts[1][class];
    let support = confusion.counts[class][0] + confusion.counts[class][1];
    let precision = ratio(tp, predicted);
    let recall = ratio(tp, support);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    ClassMetrics {
        precision,
        recall,
        f1,
        support,
    }
}

pub fn confusion_matrix(truth: ArrayView1<'_, usize>, predicted: ArrayView1<'_, usize>) -> Result<ConfusionMatrix> {
    if truth.len() != predicted.len() {
        return Err(FraudError::InvalidLabel(format!(
            "{} true labels but {} predictions",
            truth.len(),
            predicted.len()
        )));
    }
    check_labels(truth)?;
    check_labels(predicted)?;

    let mut counts = [[0usize; 2]; 2];
    for (&t, &p) in truth.iter().zip(predicted.iter()) {
        counts[t][p] += 1;
    }
    Ok(ConfusionMatrix { counts })
}

// Points ordered by decreasing threshold, starting at (0, 0). None unless both classes occur.
pub fn roc_curve(truth: ArrayView1<'_, usize>, scores: ArrayView1<'_, f64>) -> Option<Vec<RocPoint>> {
    let positives = truth.iter().filter(|&&l| l == FRAUDULENT).count();
    let negatives = truth.len() - positives;
    if positives == 0 || negatives == 0 || truth.len() != scores.len() {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&i, &j| scores[j].total_cmp(&scores[i]));

    let mut points = vec![RocPoint {
        false_positive_rate: 0.0,
        true_positive_rate: 0.0,
        threshold: f64::INFINITY,
    }];
    let (mut tp, mut fp) = (0usize, 0usize);
    for (position, &i) in order.iter().enumerate() {
        if truth[i] == FRAUDULENT {
            tp += 1;
        } else {
            fp += 1;
        }
        // emit one point per distinct score
        let last_of_tie = order
            .get(position + 1)
            .map_or(true, |&next| scores[next] != scores[i]);
        if last_of_tie {
            points.push(RocPoint {
                false_positive_rate: ratio(fp, negatives),
                true_positive_rate: ratio(tp, positives),
                threshold: scores[i],
            });
        }
    }
    Some(points)
}

// Trapezoidal area under a curve of (fpr, tpr) points.
pub fn auc(points: &[RocPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| {
            (w[1].false_positive_rate - w[0].false_positive_rate)
                * (w[1].true_positive_rate + w[0].true_positive_rate)
                / 2.0
        })
        .sum()
}

/// Scores hard predictions (and, when given, probabilities) against the truth.
pub fn evaluate(
    truth: ArrayView1<'_, usize>,
    predicted: ArrayView1<'_, usize>,
    probabilities: Option<ArrayView1<'_, f64>>,
) -> Result<EvaluationReport> {
    let confusion = confusion_matrix(truth, predicted)?;
    let total = confusion.total();
    let accuracy = ratio(confusion.true_negatives() + confusion.true_positives(), total);
    let classes = [class_metrics(&confusion, 0), class_metrics(&confusion, 1)];

    let macro_avg = ClassMetrics {
        precision: (classes[0].precision + classes[1].precision) / 2.0,
        recall: (classes[0].recall + classes[1].recall) / 2.0,
        f1: (classes[0].f1 + classes[1].f1) / 2.0,
        support: total,
    };
    let weight = |pick: fn(&ClassMetrics) -> f64| -> f64 {
        if total == 0 {
            return 0.0;
        }
        classes
            .iter()
            .map(|c| pick(c) * c.support as f64)
            .sum::<f64>()
            / total as f64
    };
    let weighted_avg = ClassMetrics {
        precision: weight(|c| c.precision),
        recall: weight(|c| c.recall),
        f1: weight(|c| c.f1),
        support: total,
    };

    let roc_auc = probabilities
        .and_then(|p| roc_curve(truth, p))
        .map(|points| auc(&points));

    Ok(EvaluationReport {
        accuracy,
        confusion,
        classes,
        macro_avg,
        weighted_avg,
        roc_auc,
    })
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>12} {:>10} {:>10}", "", "pred 0", "pred 1")?;
        writeln!(f, "{:>12} {:>10} {:>10}", "actual 0", self.counts[0][0], self.counts[0][1])?;
        write!(f, "{:>12} {:>10} {:>10}", "actual 1", self.counts[1][0], self.counts[1][1])
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Accuracy: {:.4}", self.accuracy)?;
        writeln!(f, "Confusion matrix:\n{}", self.confusion)?;
        writeln!(f)?;
        writeln!(
            f,
            "{:>12} {:>10} {:>10} {:>10} {:>10}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        for (label, m) in self.classes.iter().enumerate() {
            writeln!(
                f,
                "{:>12} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                label, m.precision, m.recall, m.f1, m.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>12} {:>10} {:>10} {:>10.2} {:>10}",
            "accuracy", "", "", self.accuracy, self.confusion.total()
        )?;
        for (name, m) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{:>12} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                name, m.precision, m.recall, m.f1, m.support
            )?;
        }
        if let Some(auc) = self.roc_auc {
            write!(f, "ROC AUC: {:.4}", auc)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_confusion_matrix_counts() {
        let truth = array![0, 0, 1, 1, 1];
        let predicted = array![0, 1, 1, 0, 1];
        let cm = confusion_matrix(truth.view(), predicted.view()).unwrap();
        assert_eq!(cm.counts, [[1, 1], [1, 2]]);
        assert_eq!(cm.total(), 5);
    }

    #[test]
    fn test_precision_recall_f1() {
        let truth = array![0, 0, 0, 1, 1];
        let predicted = array![0, 0, 1, 1, 0];
        let report = evaluate(truth.view(), predicted.view(), None).unwrap();
        assert!((report.accuracy - 0.6).abs() < 1e-12);
        let fraud = report.classes[1];
        assert!((fraud.precision - 0.5).abs() < 1e-12);
        assert!((fraud.recall - 0.5).abs() < 1e-12);
        assert!((fraud.f1 - 0.5).abs() < 1e-12);
        assert_eq!(fraud.support, 2);
        assert_eq!(report.classes[0].support, 3);
    }

    #[test]
    fn test_zero_division_yields_zero() {
        let truth = array![0, 0, 0];
        let predicted = array![0, 0, 0];
        let report = evaluate(truth.view(), predicted.view(), None).unwrap();
        assert_eq!(report.classes[1].precision, 0.0);
        assert_eq!(report.classes[1].f1, 0.0);
        assert_eq!(report.accuracy, 1.0);
    }

    #[test]
    fn test_roc_perfect_ranking() {
        let truth = array![0, 0, 1, 1];
        let scores = array![0.1, 0.2, 0.8, 0.9];
        let points = roc_curve(truth.view(), scores.view()).unwrap();
        assert!((auc(&points) - 1.0).abs() < 1e-12);
        assert_eq!(points.first().unwrap().true_positive_rate, 0.0);
        assert_eq!(points.last().unwrap().false_positive_rate, 1.0);
    }

    #[test]
    fn test_roc_needs_both_classes() {
        let truth = array![1, 1];
        let scores = array![0.3, 0.7];
        assert!(roc_curve(truth.view(), scores.view()).is_none());
    }

    #[test]
    fn test_rejects_non_binary_labels() {
        let truth = array![0, 2];
        let predicted = array![0, 1];
        assert!(matches!(
            evaluate(truth.view(), predicted.view(), None),
            Err(FraudError::InvalidLabel(_))
        ));
    }
}
