use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Hidden-layer nonlinearity, selected by name in `HPConfig`.
///
/// The output layer never carries one: the network emits raw logits and the
/// loss applies the softmax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationFunction {
    ReLU,
    /// x * sigmoid(x), also known as Swish.
    SiLU,
}

impl ActivationFunction {
    pub fn function(&self, x: f32) -> f32 {
        match self {
            ActivationFunction::ReLU => if x > 0.0 { x } else { 0.0 },
            ActivationFunction::SiLU => x * sigmoid(x),
        }
    }

    /// Derivative with respect to the pre-activation input `x`.
    pub fn derivative(&self, x: f32) -> f32 {
        match self {
            ActivationFunction::ReLU => if x > 0.0 { 1.0 } else { 0.0 },
            ActivationFunction::SiLU => {
                let sig = sigmoid(x);
                sig + x * sig * (1.0 - sig)
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ActivationFunction::ReLU => "relu",
            ActivationFunction::SiLU => "silu",
        }
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

impl fmt::Display for ActivationFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ActivationFunction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "relu" => Ok(ActivationFunction::ReLU),
            "silu" | "swish" => Ok(ActivationFunction::SiLU),
            other => Err(format!("unknown activation '{}' (expected relu or silu)", other)),
        }
    }
}
