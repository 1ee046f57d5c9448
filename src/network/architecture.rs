use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The two model families the trainer knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Mlp,
    Conv,
}

impl Architecture {
    /// Checkpoint and export file stem.
    pub fn model_name(&self) -> &'static str {
        match self {
            Architecture::Mlp => "mnist_mlp",
            Architecture::Conv => "mnist_convnet",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::Mlp => f.write_str("mlp"),
            Architecture::Conv => f.write_str("conv"),
        }
    }
}

impl FromStr for Architecture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mlp" => Ok(Architecture::Mlp),
            "conv" | "convnet" | "cnn" => Ok(Architecture::Conv),
            other => Err(format!("unknown architecture '{}' (expected mlp or conv)", other)),
        }
    }
}
