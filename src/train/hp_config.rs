use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::activation::ActivationFunction;
use crate::augment::{AugmentRanges, SamplingMode};
use crate::error::{Result, TrainError};
use crate::optim::OptimizerKind;

/// Hyperparameters of one training run.
///
/// Every field has a default, so a JSON file only needs the overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HPConfig {
    pub batch_size: usize,
    pub lr: f64,
    pub optimizer: OptimizerKind,
    /// Hidden units per MLP layer.
    pub width: usize,
    /// Number of hidden MLP layers.
    pub depth: usize,
    pub activation: ActivationFunction,
    pub epochs: usize,
    /// Factor applied to `lr` on every plateau.
    pub lr_decay: f64,
    /// Plateau period in steps. Every step without an improvement counts,
    /// evaluated or not; see `PlateauTracker`.
    pub patience: usize,
    /// Max rotation in degrees.
    pub angle: f32,
    /// Max fractional deviation of the scale from 1.
    pub scale: f32,
    /// Max shift as a fraction of the image size.
    pub shift: f32,
    pub sampling: SamplingMode,
    pub seed: Option<u64>,
}

impl Default for HPConfig {
    fn default() -> HPConfig {
        HPConfig {
            batch_size: 128,
            lr: 1e-3,
            optimizer: OptimizerKind::Adam,
            width: 512,
            depth: 2,
            activation: ActivationFunction::SiLU,
            epochs: 1,
            lr_decay: 0.9,
            patience: 50,
            angle: 15.0,
            scale: 0.1,
            shift: 0.1,
            sampling: SamplingMode::Nearest,
            seed: None,
        }
    }
}

impl HPConfig {
    /// Rejects values no run could use. Called before the first step.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("batch_size", self.batch_size),
            ("width", self.width),
            ("depth", self.depth),
            ("epochs", self.epochs),
            ("patience", self.patience),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(TrainError::Config(format!("{} must be at least 1", name)));
        }
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return Err(TrainError::Config(format!("lr must be positive, got {}", self.lr)));
        }
        if !(self.lr_decay > 0.0 && self.lr_decay <= 1.0) {
            return Err(TrainError::Config(format!(
                "lr_decay must be in (0, 1], got {}",
                self.lr_decay
            )));
        }
        for (name, v) in [("angle", self.angle), ("scale", self.scale), ("shift", self.shift)] {
            if !(v.is_finite() && v >= 0.0) {
                return Err(TrainError::Config(format!(
                    "{} must be a non-negative number, got {}",
                    name, v
                )));
            }
        }
        if self.scale >= 1.0 {
            return Err(TrainError::Config(format!(
                "scale must be below 1 so the sampled scale stays positive, got {}",
                self.scale
            )));
        }
        Ok(())
    }

    /// `ceil(train_len / batch_size * epochs)`
    pub fn total_steps(&self, train_len: usize) -> usize {
        (train_len * self.epochs).div_ceil(self.batch_size)
    }

    pub fn augment_ranges(&self) -> AugmentRanges {
        AugmentRanges {
            angle: self.angle,
            scale: self.scale,
            shift: self.shift,
        }
    }

    pub fn load_json(path: &Path) -> Result<HPConfig> {
        let file = File::open(path).map_err(|e| TrainError::io(path, e))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| TrainError::io(path, e))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }
}
