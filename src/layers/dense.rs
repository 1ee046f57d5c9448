use rand::Rng;

use crate::error::{Result, TrainError};
use crate::layers::param::Param;
use crate::math::Tensor;

/// Fully connected layer: `y = x · W + b`.
///
/// `weights` has shape `(input_size, size)` so a batch `(B, input_size)` maps
/// straight to `(B, size)` without a transpose in the forward pass.
#[derive(Debug, Clone)]
pub struct Dense {
    pub size: usize,
    pub input_size: usize,
    pub weights: Param,
    pub biases: Param,
    // Forward input, needed for the weight gradient.
    input: Option<Tensor>,
}

impl Dense {
    /// He-initialised hidden layer.
    pub fn new<R: Rng + ?Sized>(size: usize, input_size: usize, rng: &mut R) -> Dense {
        Dense::with_weights(size, input_size, Tensor::he(&[input_size, size], input_size, rng))
    }

    /// Xavier-initialised layer, for logits that feed the loss directly.
    pub fn output<R: Rng + ?Sized>(size: usize, input_size: usize, rng: &mut R) -> Dense {
        Dense::with_weights(size, input_size, Tensor::xavier(&[input_size, size], input_size, rng))
    }

    fn with_weights(size: usize, input_size: usize, weights: Tensor) -> Dense {
        Dense {
            size,
            input_size,
            weights: Param::new(weights),
            biases: Param::new(Tensor::zeros(&[size])),
            input: None,
        }
    }

    pub fn forward(&mut self, input: &Tensor) -> Result<Tensor> {
        if input.rank() != 2 || input.dim(1) != self.input_size {
            return Err(TrainError::shape(format!(
                "dense layer expects (batch, {}), got {:?}",
                self.input_size,
                input.shape()
            )));
        }
        let mut z = input.matmul(&self.weights.value)?;
        let bias = self.biases.value.data();
        for row in z.data_mut().chunks_exact_mut(self.size) {
            for (v, &b) in row.iter_mut().zip(bias) {
                *v += b;
            }
        }
        self.input = Some(input.clone());
        Ok(z)
    }

    /// Accumulates `dL/dW` and `dL/db`, returns `dL/dx`.
    ///
    /// `grad_output` is `dL/dy` with shape `(batch, size)`.
    pub fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor> {
        let input = self
            .input
            .as_ref()
            .ok_or_else(|| TrainError::shape("dense backward called before forward"))?;

        let weights_grad = input.transpose()?.matmul(grad_output)?;
        self.weights.grad.add_scaled(&weights_grad, 1.0)?;

        let bias_grad = self.biases.grad.data_mut();
        for row in grad_output.data().chunks_exact(self.size) {
            for (g, &d) in bias_grad.iter_mut().zip(row) {
                *g += d;
            }
        }

        grad_output.matmul(&self.weights.value.transpose()?)
    }

    pub fn params(&self) -> [&Param; 2] {
        [&self.weights, &self.biases]
    }

    pub fn params_mut(&mut self) -> [&mut Param; 2] {
        [&mut self.weights, &mut self.biases]
    }
}
