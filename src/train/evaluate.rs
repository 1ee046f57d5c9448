use crate::augment::normalize;
use crate::error::{Result, TrainError};
use crate::loss::{correct_count, CrossEntropyLoss};
use crate::math::Tensor;
use crate::network::Classifier;

/// Test-set samples per forward pass.
pub const EVAL_CHUNK: usize = 1000;

/// Result of one full pass over a held-out split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub loss: f64,
    /// Percent of argmax predictions equal to the label.
    pub accuracy: f64,
}

/// Mean loss and accuracy over every sample, in eval mode, without augmentation.
///
/// The model is left in training mode afterwards.
pub fn evaluate<M: Classifier + ?Sized>(
    model: &mut M,
    images: &Tensor,
    labels: &[u8],
) -> Result<Evaluation> {
    let n = labels.len();
    if n == 0 || images.dim(0) != n {
        return Err(TrainError::shape(format!(
            "cannot evaluate {:?} images against {} labels",
            images.shape(),
            n
        )));
    }

    model.set_training(false);
    let result = (|| -> Result<Evaluation> {
        let mut loss_sum = 0.0;
        let mut correct = 0;
        for start in (0..n).step_by(EVAL_CHUNK) {
            let end = (start + EVAL_CHUNK).min(n);
            let x = normalize(&images.slice_rows(start, end)?);
            let logits = model.forward(&x)?;
            loss_sum += CrossEntropyLoss::loss_sum(&logits, &labels[start..end])?;
            correct += correct_count(&logits, &labels[start..end])?;
        }
        Ok(Evaluation {
            loss: loss_sum / n as f64,
            accuracy: correct as f64 * 100.0 / n as f64,
        })
    })();
    model.set_training(true);
    result
}
