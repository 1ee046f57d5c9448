use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TrainError};
use crate::math::Tensor;

/// How source coordinates are turned into pixel values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingMode {
    #[default]
    Nearest,
    Bilinear,
}

impl fmt::Display for SamplingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplingMode::Nearest => f.write_str("nearest"),
            SamplingMode::Bilinear => f.write_str("bilinear"),
        }
    }
}

impl FromStr for SamplingMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" => Ok(SamplingMode::Nearest),
            "bilinear" => Ok(SamplingMode::Bilinear),
            other => Err(format!("unknown sampling mode '{}' (expected nearest or bilinear)", other)),
        }
    }
}

/// Per-sample transform parameters for one batch. All four vectors have
/// one entry per image.
///
/// Shifts are in pixels of the coordinate grid.
#[derive(Debug, Clone, PartialEq)]
pub struct AffineBatch {
    pub angle_deg: Vec<f32>,
    pub scale: Vec<f32>,
    pub shift_x: Vec<f32>,
    pub shift_y: Vec<f32>,
}

impl AffineBatch {
    /// Angle 0, scale 1, no shift for each of `n` samples.
    pub fn identity(n: usize) -> AffineBatch {
        AffineBatch {
            angle_deg: vec![0.0; n],
            scale: vec![1.0; n],
            shift_x: vec![0.0; n],
            shift_y: vec![0.0; n],
        }
    }

    pub fn len(&self) -> usize {
        self.angle_deg.len()
    }

    pub fn is_empty(&self) -> bool {
        self.angle_deg.is_empty()
    }

    fn check(&self, batch: usize) -> Result<()> {
        let lens = [
            self.angle_deg.len(),
            self.scale.len(),
            self.shift_x.len(),
            self.shift_y.len(),
        ];
        if lens.iter().any(|&l| l != batch) {
            return Err(TrainError::shape(format!(
                "affine parameters {:?} do not match batch of {}",
                lens, batch
            )));
        }
        Ok(())
    }
}

/// `[[cosθ·s, -sinθ·s, tx], [sinθ·s, cosθ·s, ty]]`
pub fn affine_matrix(angle_deg: f32, scale: f32, shift_x: f32, shift_y: f32) -> [[f32; 3]; 2] {
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    [
        [cos * scale, -sin * scale, shift_x],
        [sin * scale, cos * scale, shift_y],
    ]
}

/// Resamples every image of a `(B, C, H, W)` batch through its own affine map.
///
/// Destination pixel `(x, y)` (column, row) reads from `M · (x, y, 1)`.
/// Coordinates outside the image are clamped to the nearest edge pixel, and
/// all channels of a sample read from the same coordinates.
pub fn geometric_transform(
    images: &Tensor,
    transforms: &AffineBatch,
    mode: SamplingMode,
) -> Result<Tensor> {
    let (batch, channels, height, width) = match images.shape() {
        &[b, c, h, w] if h > 0 && w > 0 => (b, c, h, w),
        other => {
            return Err(TrainError::shape(format!(
                "geometric_transform expects (B, C, H, W), got {:?}",
                other
            )))
        }
    };
    transforms.check(batch)?;

    let plane = height * width;
    let mut out = vec![0.0f32; images.len()];
    let mut taps = Vec::with_capacity(plane);
    for b in 0..batch {
        let m = affine_matrix(
            transforms.angle_deg[b],
            transforms.scale[b],
            transforms.shift_x[b],
            transforms.shift_y[b],
        );
        taps.clear();
        match mode {
            SamplingMode::Nearest => nearest_taps(&m, height, width, &mut taps),
            SamplingMode::Bilinear => bilinear_taps(&m, height, width, &mut taps),
        }

        let sample = images.row(b);
        let dst = &mut out[b * channels * plane..(b + 1) * channels * plane];
        for c in 0..channels {
            let src = &sample[c * plane..(c + 1) * plane];
            for (pixel, tap) in dst[c * plane..(c + 1) * plane].iter_mut().zip(&taps) {
                *pixel = tap.iter().map(|&(idx, w)| src[idx] * w).sum();
            }
        }
    }
    Tensor::from_vec(images.shape(), out)
}

/// Maps raw intensities in `[0, 255]` to `[-1, 1]`: `x * 2 / 255 - 1`.
pub fn normalize(images: &Tensor) -> Tensor {
    images.map(|x| x * 2.0 / 255.0 - 1.0)
}

// ---------------------------------------------------------------------------
// Source taps
// ---------------------------------------------------------------------------

// Every destination pixel reads four weighted source indices. Nearest uses a
// single full-weight tap and three zero-weight ones so both modes share the
// gather loop above.
type Tap = [(usize, f32); 4];

fn source_coords(m: &[[f32; 3]; 2], height: usize, width: usize) -> impl Iterator<Item = (f32, f32)> + '_ {
    (0..height).flat_map(move |y| {
        (0..width).map(move |x| {
            let (x, y) = (x as f32, y as f32);
            (
                m[0][0] * x + m[0][1] * y + m[0][2],
                m[1][0] * x + m[1][1] * y + m[1][2],
            )
        })
    })
}

fn clamp_index(v: f32, len: usize) -> usize {
    v.clamp(0.0, (len - 1) as f32) as usize
}

fn nearest_taps(m: &[[f32; 3]; 2], height: usize, width: usize, taps: &mut Vec<Tap>) {
    taps.extend(source_coords(m, height, width).map(|(sx, sy)| {
        let x = clamp_index(sx.round_ties_even(), width);
        let y = clamp_index(sy.round_ties_even(), height);
        let idx = y * width + x;
        [(idx, 1.0), (idx, 0.0), (idx, 0.0), (idx, 0.0)]
    }));
}

fn bilinear_taps(m: &[[f32; 3]; 2], height: usize, width: usize, taps: &mut Vec<Tap>) {
    taps.extend(source_coords(m, height, width).map(|(sx, sy)| {
        let (fx, fy) = (sx.floor(), sy.floor());
        let (dx, dy) = (sx - fx, sy - fy);
        // Each neighbour is clamped on its own, so edges duplicate.
        let x0 = clamp_index(fx, width);
        let x1 = clamp_index(fx + 1.0, width);
        let y0 = clamp_index(fy, height);
        let y1 = clamp_index(fy + 1.0, height);
        [
            (y0 * width + x0, (1.0 - dx) * (1.0 - dy)),
            (y0 * width + x1, dx * (1.0 - dy)),
            (y1 * width + x0, (1.0 - dx) * dy),
            (y1 * width + x1, dx * dy),
        ]
    }));
}
