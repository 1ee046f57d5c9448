use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Result, TrainError};
use crate::math::Tensor;

/// Inverted dropout: in training mode each activation is zeroed with
/// probability `p` and survivors are scaled by `1 / (1 - p)`, so eval mode is
/// a plain identity.
///
/// The layer owns its RNG, seeded once at construction, so a seeded network
/// draws the same masks run after run.
#[derive(Debug, Clone)]
pub struct Dropout {
    pub p: f32,
    training: bool,
    rng: StdRng,
    // Per-element multiplier of the last training forward (0 or 1/(1-p)).
    mask: Option<Vec<f32>>,
}

impl Dropout {
    pub fn new<R: Rng + ?Sized>(p: f32, rng: &mut R) -> Dropout {
        Dropout {
            p,
            training: true,
            rng: StdRng::seed_from_u64(rng.gen()),
            mask: None,
        }
    }

    pub fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    pub fn forward(&mut self, input: &Tensor) -> Result<Tensor> {
        if !self.training || self.p <= 0.0 {
            self.mask = None;
            return Ok(input.clone());
        }
        let keep = 1.0 - self.p;
        let scale = if keep > 0.0 { 1.0 / keep } else { 0.0 };
        let mask: Vec<f32> = (0..input.len())
            .map(|_| if self.rng.gen::<f32>() < keep { scale } else { 0.0 })
            .collect();
        let data = input.data().iter().zip(&mask).map(|(&x, &m)| x * m).collect();
        self.mask = Some(mask);
        Tensor::from_vec(input.shape(), data)
    }

    pub fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor> {
        let Some(mask) = &self.mask else {
            return Ok(grad_output.clone());
        };
        if mask.len() != grad_output.len() {
            return Err(TrainError::shape(format!(
                "dropout gradient {:?} does not match the last mask ({} elements)",
                grad_output.shape(),
                mask.len()
            )));
        }
        let data = grad_output.data().iter().zip(mask).map(|(&g, &m)| g * m).collect();
        Tensor::from_vec(grad_output.shape(), data)
    }
}
