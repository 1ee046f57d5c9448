use std::collections::{BTreeMap, HashMap};

use safetensors::tensor::{Dtype, SafeTensors, TensorView};

use crate::error::{Result, TrainError};
use crate::math::Tensor;

/// Complete parameter set of a model, keyed by parameter name.
///
/// Ordered by name so serialisation is deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDict {
    tensors: BTreeMap<String, Tensor>,
}

impl StateDict {
    pub fn new() -> StateDict {
        StateDict::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) {
        self.tensors.insert(name.into(), tensor);
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Tensor> {
        self.tensors.remove(name)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.tensors.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Encodes every tensor as little-endian F32 in the safetensors layout.
    ///
    /// `metadata` lands in the `__metadata__` header entry.
    pub fn to_safetensors(&self, metadata: Option<HashMap<String, String>>) -> Result<Vec<u8>> {
        let encoded: Vec<(&str, Vec<usize>, Vec<u8>)> = self
            .tensors
            .iter()
            .map(|(name, tensor)| {
                let bytes = tensor.data().iter().flat_map(|v| v.to_le_bytes()).collect();
                (name.as_str(), tensor.shape().to_vec(), bytes)
            })
            .collect();

        let mut views = Vec::with_capacity(encoded.len());
        for (name, shape, bytes) in &encoded {
            views.push((*name, TensorView::new(Dtype::F32, shape.clone(), bytes)?));
        }
        Ok(safetensors::serialize(views, &metadata)?)
    }

    /// Decodes a buffer written by `to_safetensors`. Only F32 tensors are accepted.
    pub fn from_safetensors(bytes: &[u8]) -> Result<StateDict> {
        let file = SafeTensors::deserialize(bytes)?;
        let mut state = StateDict::new();
        for (name, view) in file.tensors() {
            if view.dtype() != Dtype::F32 {
                return Err(TrainError::Checkpoint(format!(
                    "tensor '{}' has dtype {:?}, only F32 is supported",
                    name,
                    view.dtype()
                )));
            }
            let data = view
                .data()
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            state.insert(name, Tensor::from_vec(view.shape(), data)?);
        }
        Ok(state)
    }

    /// Header metadata of a safetensors buffer, without decoding tensors.
    pub fn read_metadata(bytes: &[u8]) -> Result<HashMap<String, String>> {
        let (_, metadata) = SafeTensors::read_metadata(bytes)?;
        Ok(metadata.metadata().clone().unwrap_or_default())
    }
}

impl FromIterator<(String, Tensor)> for StateDict {
    fn from_iter<I: IntoIterator<Item = (String, Tensor)>>(iter: I) -> Self {
        StateDict {
            tensors: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safetensors_round_trip_is_bit_exact() {
        let awkward = vec![
            0.0,
            -0.0,
            f32::MIN_POSITIVE / 8.0,
            1.0e-38,
            std::f32::consts::PI,
            f32::MAX,
            -123.456,
        ];
        let mut state = StateDict::new();
        state.insert("layers.1.weight", Tensor::from_vec(&[7, 1], awkward.clone()).unwrap());
        state.insert("layers.1.bias", Tensor::from_vec(&[1], vec![0.25]).unwrap());

        let bytes = state.to_safetensors(None).unwrap();
        let back = StateDict::from_safetensors(&bytes).unwrap();

        let restored = back.get("layers.1.weight").unwrap();
        assert_eq!(restored.shape(), &[7, 1]);
        let original_bits: Vec<u32> = awkward.iter().map(|v| v.to_bits()).collect();
        let restored_bits: Vec<u32> = restored.data().iter().map(|v| v.to_bits()).collect();
        assert_eq!(original_bits, restored_bits);
        assert_eq!(back, state);
    }

    #[test]
    fn metadata_is_readable_without_decoding() {
        let mut state = StateDict::new();
        state.insert("w", Tensor::zeros(&[2]));
        let meta = HashMap::from([("step".to_string(), "19".to_string())]);
        let bytes = state.to_safetensors(Some(meta)).unwrap();
        assert_eq!(StateDict::read_metadata(&bytes).unwrap()["step"], "19");
    }
}
