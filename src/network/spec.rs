use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::activation::ActivationFunction;
use crate::error::{Result, TrainError};
use crate::network::metadata::ModelMetadata;

/// Describes one layer of an exported network.
///
/// Parameterised layers reference their tensors by name in the accompanying
/// safetensors file instead of carrying the values inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerSpec {
    Flatten,
    /// `weight` is stored `(size, input_size)` in the exported file.
    Dense {
        size: usize,
        input_size: usize,
        weight: String,
        bias: String,
    },
    /// `weight` is `(out_channels, in_channels, kernel, kernel)`; stride 1, no padding.
    Conv2d {
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        weight: String,
        bias: String,
    },
    MaxPool2d {
        window: usize,
    },
    Activation {
        activation: ActivationFunction,
    },
    /// Training-only; a runtime evaluates it as identity.
    Dropout {
        p: f32,
    },
}

/// A serializable description of a network's layer graph.
///
/// Together with a parameter file it is everything a runtime needs to
/// evaluate the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    /// Model name, also the file stem of every artifact.
    pub name: String,
    /// Per-sample input shape `(C, H, W)`.
    pub input_shape: Vec<usize>,
    pub num_classes: usize,
    /// Ordered list of layers (input to logits).
    pub layers: Vec<LayerSpec>,
    #[serde(default)]
    pub metadata: Option<ModelMetadata>,
}

impl NetworkSpec {
    /// Every tensor name the graph references, in layer order.
    pub fn tensor_names(&self) -> Vec<&str> {
        self.layers
            .iter()
            .flat_map(|layer| match layer {
                LayerSpec::Dense { weight, bias, .. } | LayerSpec::Conv2d { weight, bias, .. } => {
                    vec![weight.as_str(), bias.as_str()]
                }
                _ => Vec::new(),
            })
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Serializes the spec to a pretty-printed JSON file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| TrainError::io(path, e))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<NetworkSpec> {
        let file = File::open(path).map_err(|e| TrainError::io(path, e))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}
