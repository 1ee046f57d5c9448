use crate::error::{Result, TrainError};
use crate::math::Tensor;

/// Sparse categorical cross-entropy over raw logits, mean-reduced over the batch.
pub struct CrossEntropyLoss;

impl CrossEntropyLoss {
    /// Computes the scalar loss:
    ///   L = -1/B · sum_b log softmax(logits_b)[label_b]
    ///
    /// `logits`: `(B, classes)`
    /// `labels`: `B` class indices
    pub fn loss(logits: &Tensor, labels: &[u8]) -> Result<f64> {
        Ok(CrossEntropyLoss::loss_sum(logits, labels)? / labels.len() as f64)
    }

    /// Summed (not averaged) loss, for accumulating over evaluation chunks.
    pub fn loss_sum(logits: &Tensor, labels: &[u8]) -> Result<f64> {
        let classes = check(logits, labels)?;
        let mut total = 0.0;
        for (row, &label) in logits.data().chunks_exact(classes).zip(labels) {
            total -= log_softmax(row)[label as usize];
        }
        Ok(total)
    }

    /// Mean loss plus its gradient with respect to the logits.
    ///
    /// For softmax composed with cross-entropy the gradient simplifies to
    ///   ∂L/∂z_i = (softmax(z)_i - onehot_i) / B
    pub fn loss_and_grad(logits: &Tensor, labels: &[u8]) -> Result<(f64, Tensor)> {
        let classes = check(logits, labels)?;
        let batch = labels.len() as f64;
        let mut total = 0.0;
        let mut grad = Vec::with_capacity(logits.len());
        for (row, &label) in logits.data().chunks_exact(classes).zip(labels) {
            let log_probs = log_softmax(row);
            total -= log_probs[label as usize];
            for (k, lp) in log_probs.iter().enumerate() {
                let target = if k == label as usize { 1.0 } else { 0.0 };
                grad.push(((lp.exp() - target) / batch) as f32);
            }
        }
        Ok((total / batch, Tensor::from_vec(logits.shape(), grad)?))
    }
}

/// Number of `labels` whose logit row peaks at the label.
pub fn correct_count(logits: &Tensor, labels: &[u8]) -> Result<usize> {
    let classes = check(logits, labels)?;
    Ok(logits
        .data()
        .chunks_exact(classes)
        .zip(labels)
        .filter(|(row, &label)| argmax(row) == label as usize)
        .count())
}

/// Argmax accuracy in percent.
pub fn accuracy(logits: &Tensor, labels: &[u8]) -> Result<f64> {
    Ok(correct_count(logits, labels)? as f64 * 100.0 / labels.len() as f64)
}

/// Index of the maximum element; the first one on ties.
pub fn argmax(v: &[f32]) -> usize {
    v.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(bi, bv), (i, &x)| if x > bv { (i, x) } else { (bi, bv) })
        .0
}

fn check(logits: &Tensor, labels: &[u8]) -> Result<usize> {
    if logits.rank() != 2 || logits.dim(0) != labels.len() || labels.is_empty() {
        return Err(TrainError::shape(format!(
            "logits {:?} do not match {} labels",
            logits.shape(),
            labels.len()
        )));
    }
    let classes = logits.dim(1);
    if let Some(&bad) = labels.iter().find(|&&l| l as usize >= classes) {
        return Err(TrainError::shape(format!(
            "label {} out of range for {} classes",
            bad, classes
        )));
    }
    Ok(classes)
}

/// Numerically stable: the row max is subtracted before exponentiation.
fn log_softmax(row: &[f32]) -> Vec<f64> {
    let max = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b)) as f64;
    let log_sum = row.iter().map(|&x| (x as f64 - max).exp()).sum::<f64>().ln();
    row.iter().map(|&x| x as f64 - max - log_sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_logits_give_log_classes() {
        let logits = Tensor::zeros(&[4, 10]);
        let loss = CrossEntropyLoss::loss(&logits, &[0, 3, 7, 9]).unwrap();
        assert!((loss - 10f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn large_logits_stay_finite() {
        let logits = Tensor::from_vec(&[1, 3], vec![1000.0, -1000.0, 0.0]).unwrap();
        let (loss, grad) = CrossEntropyLoss::loss_and_grad(&logits, &[0]).unwrap();
        assert!(loss.abs() < 1e-9);
        assert!(grad.is_finite());
    }

    #[test]
    fn gradient_rows_sum_to_zero() {
        let logits = Tensor::from_vec(&[2, 3], vec![0.5, -1.0, 2.0, 0.1, 0.2, 0.3]).unwrap();
        let (_, grad) = CrossEntropyLoss::loss_and_grad(&logits, &[2, 0]).unwrap();
        for row in grad.data().chunks(3) {
            assert!(row.iter().sum::<f32>().abs() < 1e-6);
        }
        // Target logit gradient is negative.
        assert!(grad.data()[2] < 0.0 && grad.data()[3] < 0.0);
    }

    #[test]
    fn accuracy_in_percent() {
        let logits = Tensor::from_vec(&[4, 2], vec![1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0]).unwrap();
        assert_eq!(accuracy(&logits, &[0, 1, 1, 1]).unwrap(), 50.0);
    }

    #[test]
    fn rejects_out_of_range_labels() {
        let logits = Tensor::zeros(&[1, 10]);
        assert!(CrossEntropyLoss::loss(&logits, &[10]).is_err());
    }
}
