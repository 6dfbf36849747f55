// ============================================================
// Layer 5 — Evaluation Metrics
// ============================================================
// Pure functions over host-side vectors, computed once per test
// epoch on the full test split.
//
// Classification (binary, positive class = 1):
//   AUROC             Mann-Whitney U / (P · N), ties get average rank
//   AveragePrecision  Σ (Rₙ − Rₙ₋₁) · Pₙ over distinct thresholds
//   Accuracy          correct / total
//   F1                2·TP / (2·TP + FP + FN)
//
// Regression:
//   MAE   mean |y − ŷ|
//   MSE   mean (y − ŷ)²
//   RMSE  √MSE
//   R2    1 − SS_res / SS_tot
//
// Each function returns a MetricError instead of a made-up value
// when the metric is undefined for the input (one class only, no
// positives, constant targets, ...). The caller records NaN.
//
// Reference: Fawcett (2006) An introduction to ROC analysis
//            torchmetrics binary AUROC / AveragePrecision

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricError {
    #[error("No samples to evaluate")]
    Empty,

    #[error("Length mismatch: {labels} labels vs {predictions} predictions")]
    LengthMismatch { labels: usize, predictions: usize },

    #[error("Label {0} is not a binary class id")]
    NonBinaryLabel(i64),

    #[error("Only one class is present in the labels")]
    SingleClass,

    #[error("No positive samples in the labels")]
    NoPositives,

    #[error("At least two samples are needed, got {0}")]
    TooFewSamples(usize),

    #[error("Targets have zero variance")]
    ZeroVariance,
}

fn check_lengths(labels: usize, predictions: usize) -> Result<(), MetricError> {
    if labels != predictions {
        return Err(MetricError::LengthMismatch { labels, predictions });
    }
    if labels == 0 {
        return Err(MetricError::Empty);
    }
    Ok(())
}

/// Truncate float labels to class ids and check they are 0 or 1.
pub fn binary_labels(labels: &[f32]) -> Result<Vec<i64>, MetricError> {
    labels
        .iter()
        .map(|&l| {
            let id = l as i64;
            if id == 0 || id == 1 { Ok(id) } else { Err(MetricError::NonBinaryLabel(id)) }
        })
        .collect()
}

// ─── Classification ───────────────────────────────────────────────────────────

/// Area under the ROC curve from positive-class scores.
pub fn auroc(labels: &[i64], scores: &[f32]) -> Result<f64, MetricError> {
    check_lengths(labels.len(), scores.len())?;

    let positives = labels.iter().filter(|&&l| l == 1).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(MetricError::SingleClass);
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    // 1-based ranks, ties share the mean of their positions
    let mut ranks = vec![0.0f64; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = rank;
        }
        i = j + 1;
    }

    let rank_sum: f64 = labels
        .iter()
        .zip(&ranks)
        .filter(|(&l, _)| l == 1)
        .map(|(_, &r)| r)
        .sum();
    let p = positives as f64;
    let u = rank_sum - p * (p + 1.0) / 2.0;
    Ok(u / (p * negatives as f64))
}

/// Average precision (area under the precision-recall curve, step-wise).
pub fn average_precision(labels: &[i64], scores: &[f32]) -> Result<f64, MetricError> {
    check_lengths(labels.len(), scores.len())?;

    let positives = labels.iter().filter(|&&l| l == 1).count();
    if positives == 0 {
        return Err(MetricError::NoPositives);
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut prev_recall = 0.0f64;
    let mut ap = 0.0f64;

    let mut i = 0;
    while i < order.len() {
        let threshold = scores[order[i]];
        while i < order.len() && scores[order[i]] == threshold {
            if labels[order[i]] == 1 { tp += 1 } else { fp += 1 }
            i += 1;
        }
        let recall    = tp as f64 / positives as f64;
        let precision = tp as f64 / (tp + fp) as f64;
        ap += (recall - prev_recall) * precision;
        prev_recall = recall;
    }
    Ok(ap)
}

pub fn accuracy(labels: &[i64], predicted: &[i64]) -> Result<f64, MetricError> {
    check_lengths(labels.len(), predicted.len())?;
    let correct = labels.iter().zip(predicted).filter(|(a, b)| a == b).count();
    Ok(correct as f64 / labels.len() as f64)
}

/// Binary F1 for the positive class; 0 when there are no positives at all.
pub fn f1_score(labels: &[i64], predicted: &[i64]) -> Result<f64, MetricError> {
    check_lengths(labels.len(), predicted.len())?;

    let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
    for (&l, &p) in labels.iter().zip(predicted) {
        match (l == 1, p == 1) {
            (true, true)   => tp += 1,
            (false, true)  => fp += 1,
            (true, false)  => fn_ += 1,
            (false, false) => {}
        }
    }

    let denom = 2 * tp + fp + fn_;
    if denom == 0 {
        return Ok(0.0);
    }
    Ok(2.0 * tp as f64 / denom as f64)
}

// ─── Regression ───────────────────────────────────────────────────────────────

pub fn mean_absolute_error(targets: &[f32], predictions: &[f32]) -> Result<f64, MetricError> {
    check_lengths(targets.len(), predictions.len())?;
    let sum: f64 = targets
        .iter()
        .zip(predictions)
        .map(|(&t, &p)| (t as f64 - p as f64).abs())
        .sum();
    Ok(sum / targets.len() as f64)
}

pub fn mean_squared_error(targets: &[f32], predictions: &[f32]) -> Result<f64, MetricError> {
    check_lengths(targets.len(), predictions.len())?;
    let sum: f64 = targets
        .iter()
        .zip(predictions)
        .map(|(&t, &p)| (t as f64 - p as f64).powi(2))
        .sum();
    Ok(sum / targets.len() as f64)
}

pub fn root_mean_squared_error(targets: &[f32], predictions: &[f32]) -> Result<f64, MetricError> {
    mean_squared_error(targets, predictions).map(f64::sqrt)
}

pub fn r2_score(targets: &[f32], predictions: &[f32]) -> Result<f64, MetricError> {
    check_lengths(targets.len(), predictions.len())?;
    if targets.len() < 2 {
        return Err(MetricError::TooFewSamples(targets.len()));
    }

    let mean = targets.iter().map(|&t| t as f64).sum::<f64>() / targets.len() as f64;
    let ss_tot: f64 = targets.iter().map(|&t| (t as f64 - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return Err(MetricError::ZeroVariance);
    }
    let ss_res: f64 = targets
        .iter()
        .zip(predictions)
        .map(|(&t, &p)| (t as f64 - p as f64).powi(2))
        .sum();
    Ok(1.0 - ss_res / ss_tot)
}
