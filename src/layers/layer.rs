use crate::error::Result;
use crate::layers::{
    activation_layer::{ActivationLayer, Flatten},
    conv::Conv2d,
    dense::Dense,
    dropout::Dropout,
    param::Param,
    pool::MaxPool2d,
};
use crate::math::Tensor;

/// One stage of a sequential network.
#[derive(Debug, Clone)]
pub enum Layer {
    Dense(Dense),
    Conv2d(Conv2d),
    MaxPool2d(MaxPool2d),
    Activation(ActivationLayer),
    Flatten(Flatten),
    Dropout(Dropout),
}

impl Layer {
    pub fn forward(&mut self, input: &Tensor) -> Result<Tensor> {
        match self {
            Layer::Dense(l) => l.forward(input),
            Layer::Conv2d(l) => l.forward(input),
            Layer::MaxPool2d(l) => l.forward(input),
            Layer::Activation(l) => l.forward(input),
            Layer::Flatten(l) => l.forward(input),
            Layer::Dropout(l) => l.forward(input),
        }
    }

    pub fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor> {
        match self {
            Layer::Dense(l) => l.backward(grad_output),
            Layer::Conv2d(l) => l.backward(grad_output),
            Layer::MaxPool2d(l) => l.backward(grad_output),
            Layer::Activation(l) => l.backward(grad_output),
            Layer::Flatten(l) => l.backward(grad_output),
            Layer::Dropout(l) => l.backward(grad_output),
        }
    }

    /// Only dropout behaves differently between training and evaluation.
    pub fn set_training(&mut self, training: bool) {
        if let Layer::Dropout(l) = self {
            l.set_training(training);
        }
    }

    /// `(suffix, param)` pairs in a stable order; the suffix is `weight` or `bias`.
    pub fn named_params(&self) -> Vec<(&'static str, &Param)> {
        match self {
            Layer::Dense(l) => {
                let [w, b] = l.params();
                vec![("weight", w), ("bias", b)]
            }
            Layer::Conv2d(l) => {
                let [w, b] = l.params();
                vec![("weight", w), ("bias", b)]
            }
            _ => Vec::new(),
        }
    }

    pub fn named_params_mut(&mut self) -> Vec<(&'static str, &mut Param)> {
        match self {
            Layer::Dense(l) => {
                let [w, b] = l.params_mut();
                vec![("weight", w), ("bias", b)]
            }
            Layer::Conv2d(l) => {
                let [w, b] = l.params_mut();
                vec![("weight", w), ("bias", b)]
            }
            _ => Vec::new(),
        }
    }
}
