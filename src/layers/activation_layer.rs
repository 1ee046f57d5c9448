use crate::activation::ActivationFunction;
use crate::error::{Result, TrainError};
use crate::math::Tensor;

/// Element-wise nonlinearity as a standalone layer.
#[derive(Debug, Clone)]
pub struct ActivationLayer {
    pub activator: ActivationFunction,
    // Pre-activation values, so derivative(z) is evaluated at the right point.
    pre_activation: Option<Tensor>,
}

impl ActivationLayer {
    pub fn new(activator: ActivationFunction) -> ActivationLayer {
        ActivationLayer {
            activator,
            pre_activation: None,
        }
    }

    pub fn forward(&mut self, input: &Tensor) -> Result<Tensor> {
        let activator = self.activator;
        let out = input.map(|x| activator.function(x));
        self.pre_activation = Some(input.clone());
        Ok(out)
    }

    pub fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor> {
        let z = self
            .pre_activation
            .as_ref()
            .ok_or_else(|| TrainError::shape("activation backward called before forward"))?;
        if z.shape() != grad_output.shape() {
            return Err(TrainError::shape(format!(
                "activation gradient {:?} does not match input {:?}",
                grad_output.shape(),
                z.shape()
            )));
        }
        // Hadamard product: δ = error ⊙ σ'(z)
        let data = grad_output
            .data()
            .iter()
            .zip(z.data())
            .map(|(&g, &x)| g * self.activator.derivative(x))
            .collect();
        Tensor::from_vec(z.shape(), data)
    }
}

/// Collapses everything after the batch axis: `(B, ...) -> (B, features)`.
#[derive(Debug, Clone, Default)]
pub struct Flatten {
    input_shape: Vec<usize>,
}

impl Flatten {
    pub fn forward(&mut self, input: &Tensor) -> Result<Tensor> {
        if input.rank() < 2 {
            return Err(TrainError::shape(format!(
                "flatten needs a batch axis, got {:?}",
                input.shape()
            )));
        }
        self.input_shape = input.shape().to_vec();
        input.clone().reshape(&[input.dim(0), input.row_len()])
    }

    pub fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor> {
        grad_output.clone().reshape(&self.input_shape)
    }
}
