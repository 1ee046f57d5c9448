use std::collections::HashSet;

use crate::checkpoint::StateDict;
use crate::error::{Result, TrainError};
use crate::layers::Param;
use crate::math::Tensor;

/// Anything the training loop can fit: logits out, gradients back, named
/// parameters for the optimizer and the checkpoint store.
///
/// `forward` must be called before `backward`; layers cache what they need.
pub trait Classifier {
    /// `(B, C, H, W)` images to `(B, classes)` logits.
    fn forward(&mut self, input: &Tensor) -> Result<Tensor>;

    /// Accumulates parameter gradients from `dL/dlogits`.
    fn backward(&mut self, grad_logits: &Tensor) -> Result<()>;

    /// Every trainable tensor with a stable name, in a stable order.
    fn named_parameters(&self) -> Vec<(String, &Param)>;

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Param)>;

    /// Toggles training mode. Evaluation runs with `false`.
    fn set_training(&mut self, training: bool);

    fn parameters_mut(&mut self) -> Vec<&mut Param> {
        self.named_parameters_mut()
            .into_iter()
            .map(|(_, p)| p)
            .collect()
    }

    fn zero_grad(&mut self) {
        for param in self.parameters_mut() {
            param.zero_grad();
        }
    }

    fn state_dict(&self) -> StateDict {
        self.named_parameters()
            .into_iter()
            .map(|(name, p)| (name, p.value.clone()))
            .collect()
    }

    /// Replaces every parameter with the tensor of the same name.
    ///
    /// The state must cover the model exactly: a missing name, an extra name
    /// or a shape mismatch is an error and leaves the model untouched.
    fn load_state_dict(&mut self, state: &StateDict) -> Result<()> {
        let mut seen = HashSet::new();
        for (name, param) in self.named_parameters() {
            let tensor = state.get(&name).ok_or_else(|| {
                TrainError::Checkpoint(format!("missing tensor '{}'", name))
            })?;
            if tensor.shape() != param.value.shape() {
                return Err(TrainError::Checkpoint(format!(
                    "tensor '{}' has shape {:?}, model expects {:?}",
                    name,
                    tensor.shape(),
                    param.value.shape()
                )));
            }
            seen.insert(name);
        }
        if let Some(extra) = state.names().find(|n| !seen.contains(*n)) {
            return Err(TrainError::Checkpoint(format!("unused tensor '{}'", extra)));
        }

        for (name, param) in self.named_parameters_mut() {
            if let Some(tensor) = state.get(&name) {
                param.value = tensor.clone();
            }
        }
        Ok(())
    }
}
