use std::collections::HashMap;
use std::path::PathBuf;

use rand::Rng;
use tracing::info;

use crate::checkpoint::{CheckpointInfo, CheckpointStore, StateDict};
use crate::error::{Result, TrainError};
use crate::math::Tensor;
use crate::network::{Classifier, LayerSpec, ModelMetadata, Network, IMAGE_SHAPE, NUM_CLASSES};

/// What an exporter hands back: the program text and the parameters laid out
/// the way that program expects them.
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub program: String,
    pub state: StateDict,
}

/// Converts a trained network into a runtime-specific representation.
pub trait Exporter {
    /// Target identifier; also the infix of the parameter file name.
    fn target(&self) -> &str;

    /// Extension of the program file, without the dot.
    fn program_extension(&self) -> &str;

    /// `input` is a representative single-sample batch the exporter may run
    /// through the model to trace it. `info` identifies the checkpoint the
    /// weights were loaded from, when it was annotated.
    fn export(
        &self,
        model: &mut Network,
        model_name: &str,
        input: &Tensor,
        info: Option<CheckpointInfo>,
    ) -> Result<ExportArtifact>;
}

/// Writes the layer graph as JSON. Dense weights are stored `(out, in)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphExporter;

impl Exporter for GraphExporter {
    fn target(&self) -> &str {
        "graph"
    }

    fn program_extension(&self) -> &str {
        "json"
    }

    fn export(
        &self,
        model: &mut Network,
        model_name: &str,
        input: &Tensor,
        info: Option<CheckpointInfo>,
    ) -> Result<ExportArtifact> {
        let traced = model.forward(input)?;
        if traced.shape() != [input.dim(0), NUM_CLASSES] || !traced.is_finite() {
            return Err(TrainError::Export(format!(
                "tracing produced {:?} (finite: {})",
                traced.shape(),
                traced.is_finite()
            )));
        }

        let mut spec = model.spec(model_name);
        let mut metadata = ModelMetadata::digits(IMAGE_SHAPE[2] as u32, IMAGE_SHAPE[1] as u32);
        if let Some(ckpt) = info {
            metadata = metadata.with_checkpoint(ckpt.step, ckpt.test_acc);
        }
        spec.metadata = Some(metadata);

        let mut state = model.state_dict();
        for layer in &spec.layers {
            if let LayerSpec::Dense { weight, .. } = layer {
                let transposed = state
                    .get(weight)
                    .ok_or_else(|| TrainError::Export(format!("no tensor '{}'", weight)))?
                    .transpose()?;
                state.insert(weight.clone(), transposed);
            }
        }
        if let Some(missing) = spec.tensor_names().into_iter().find(|n| state.get(n).is_none()) {
            return Err(TrainError::Export(format!("graph references unknown tensor '{}'", missing)));
        }

        Ok(ExportArtifact {
            program: spec.to_json()?,
            state,
        })
    }
}

/// Files written by `export_best`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportPaths {
    pub program: PathBuf,
    pub params: PathBuf,
}

/// Loads the best checkpoint of `model_name` into `model`, traces it on a
/// random `(1, 1, 28, 28)` input and writes `<name>.<ext>` and
/// `<name>.<target>.safetensors` next to the checkpoint.
pub fn export_best<R: Rng + ?Sized>(
    model: &mut Network,
    store: &CheckpointStore,
    model_name: &str,
    exporter: &dyn Exporter,
    rng: &mut R,
) -> Result<ExportPaths> {
    model.load_state_dict(&store.load(model_name)?)?;
    model.set_training(false);

    let mut input_shape = vec![1];
    input_shape.extend_from_slice(&IMAGE_SHAPE);
    let input = Tensor::randn(&input_shape, rng);
    let info = store.info(model_name)?;
    let artifact = exporter.export(model, model_name, &input, info)?;

    let mut metadata = HashMap::from([("target".to_string(), exporter.target().to_string())]);
    if let Some(ckpt) = info {
        metadata.insert("step".to_string(), ckpt.step.to_string());
        metadata.insert("test_acc".to_string(), ckpt.test_acc.to_string());
    }

    let dir = store.model_dir(model_name)?;
    let paths = ExportPaths {
        program: dir.join(format!("{}.{}", model_name, exporter.program_extension())),
        params: dir.join(format!("{}.{}.safetensors", model_name, exporter.target())),
    };
    CheckpointStore::write_atomic(&paths.program, artifact.program.as_bytes())?;
    CheckpointStore::write_atomic(&paths.params, &artifact.state.to_safetensors(Some(metadata))?)?;

    info!(
        model = model_name,
        target = exporter.target(),
        program = %paths.program.display(),
        params = %paths.params.display(),
        "model exported"
    );
    Ok(paths)
}
