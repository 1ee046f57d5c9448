use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::layers::Param;
use crate::optim::{adam::Adam, sgd::Sgd};

/// Updates parameters in place from their accumulated gradients.
///
/// `params` must be passed in the same order on every call; stateful
/// optimizers key their moment buffers by position.
pub trait Optimizer {
    fn step(&mut self, params: &mut [&mut Param]);

    fn learning_rate(&self) -> f64;

    fn set_learning_rate(&mut self, lr: f64);

    /// Short display name, recorded in every log line.
    fn name(&self) -> &'static str;

    fn zero_grad(&self, params: &mut [&mut Param]) {
        for p in params.iter_mut() {
            p.zero_grad();
        }
    }
}

/// Optimizer selection in `HPConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerKind {
    Adam,
    #[serde(rename = "SGD", alias = "Sgd", alias = "sgd")]
    Sgd,
}

impl OptimizerKind {
    pub fn build(self, lr: f64) -> Box<dyn Optimizer> {
        match self {
            OptimizerKind::Adam => Box::new(Adam::new(lr)),
            OptimizerKind::Sgd => Box::new(Sgd::new(lr)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OptimizerKind::Adam => "Adam",
            OptimizerKind::Sgd => "SGD",
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OptimizerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "adam" => Ok(OptimizerKind::Adam),
            "sgd" => Ok(OptimizerKind::Sgd),
            other => Err(format!("unknown optimizer '{}' (expected adam or sgd)", other)),
        }
    }
}
