use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::augment::affine::AffineBatch;

/// Bounds of the random transform drawn for every training sample.
///
/// `angle` is in degrees. `scale` and `shift` are fractions: scale is drawn
/// from `[1 - scale, 1 + scale]` and shift from `[-shift, shift]` of the image
/// width (x) or height (y).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AugmentRanges {
    pub angle: f32,
    pub scale: f32,
    pub shift: f32,
}

impl AugmentRanges {
    pub fn none() -> AugmentRanges {
        AugmentRanges {
            angle: 0.0,
            scale: 0.0,
            shift: 0.0,
        }
    }

    /// Draws one transform per sample, with shifts converted to pixels.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        batch: usize,
        height: usize,
        width: usize,
        rng: &mut R,
    ) -> AffineBatch {
        let max_x = self.shift * width as f32;
        let max_y = self.shift * height as f32;
        let mut out = AffineBatch {
            angle_deg: Vec::with_capacity(batch),
            scale: Vec::with_capacity(batch),
            shift_x: Vec::with_capacity(batch),
            shift_y: Vec::with_capacity(batch),
        };
        for _ in 0..batch {
            out.angle_deg.push(symmetric(rng, self.angle));
            out.scale.push(1.0 + symmetric(rng, self.scale));
            out.shift_x.push(symmetric(rng, max_x));
            out.shift_y.push(symmetric(rng, max_y));
        }
        out
    }
}

/// Uniform in `[-bound, bound]`; exactly 0 when `bound` is 0.
fn symmetric<R: Rng + ?Sized>(rng: &mut R, bound: f32) -> f32 {
    if bound > 0.0 {
        rng.gen_range(-bound..=bound)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn draws_stay_within_bounds() {
        let mut rng = StdRng::seed_from_u64(11);
        let ranges = AugmentRanges { angle: 15.0, scale: 0.1, shift: 0.1 };
        let t = ranges.sample(500, 28, 28, &mut rng);
        assert_eq!(t.len(), 500);
        assert!(t.angle_deg.iter().all(|a| a.abs() <= 15.0));
        assert!(t.scale.iter().all(|s| (0.9..=1.1).contains(s)));
        assert!(t.shift_x.iter().chain(&t.shift_y).all(|s| s.abs() <= 2.8 + 1e-5));
        // Not degenerate.
        assert!(t.shift_x.iter().any(|s| s.abs() > 1.0));
    }

    #[test]
    fn zero_ranges_give_identity() {
        let mut rng = StdRng::seed_from_u64(12);
        assert_eq!(AugmentRanges::none().sample(4, 28, 28, &mut rng), AffineBatch::identity(4));
    }
}
