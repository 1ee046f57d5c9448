use rand::Rng;

use crate::error::{Result, TrainError};
use crate::layers::param::Param;
use crate::math::Tensor;

/// 2-D convolution, stride 1, no padding.
///
/// Input `(B, in_channels, H, W)` becomes
/// `(B, out_channels, H - kernel + 1, W - kernel + 1)`.
#[derive(Debug, Clone)]
pub struct Conv2d {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel: usize,
    /// `(out_channels, in_channels, kernel, kernel)`
    pub weights: Param,
    pub biases: Param,
    input: Option<Tensor>,
}

/// Cached geometry of one forward call.
struct Geometry {
    batch: usize,
    in_h: usize,
    in_w: usize,
    out_h: usize,
    out_w: usize,
}

impl Conv2d {
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        rng: &mut R,
    ) -> Conv2d {
        let fan_in = in_channels * kernel * kernel;
        Conv2d {
            in_channels,
            out_channels,
            kernel,
            weights: Param::new(Tensor::he(
                &[out_channels, in_channels, kernel, kernel],
                fan_in,
                rng,
            )),
            biases: Param::new(Tensor::zeros(&[out_channels])),
            input: None,
        }
    }

    fn geometry(&self, input: &Tensor) -> Result<Geometry> {
        match input.shape() {
            &[batch, c, in_h, in_w] if c == self.in_channels && in_h >= self.kernel && in_w >= self.kernel => {
                Ok(Geometry {
                    batch,
                    in_h,
                    in_w,
                    out_h: in_h - self.kernel + 1,
                    out_w: in_w - self.kernel + 1,
                })
            }
            other => Err(TrainError::shape(format!(
                "conv2d({} -> {}, k={}) cannot take input {:?}",
                self.in_channels, self.out_channels, self.kernel, other
            ))),
        }
    }

    pub fn forward(&mut self, input: &Tensor) -> Result<Tensor> {
        let g = self.geometry(input)?;
        let k = self.kernel;
        let x = input.data();
        let w = self.weights.value.data();
        let bias = self.biases.value.data();
        let out_plane = g.out_h * g.out_w;
        let in_plane = g.in_h * g.in_w;
        let mut out = vec![0.0f32; g.batch * self.out_channels * out_plane];

        for b in 0..g.batch {
            for o in 0..self.out_channels {
                let out_base = (b * self.out_channels + o) * out_plane;
                let plane = &mut out[out_base..out_base + out_plane];
                plane.iter_mut().for_each(|v| *v = bias[o]);

                for c in 0..self.in_channels {
                    let in_base = (b * self.in_channels + c) * in_plane;
                    for ky in 0..k {
                        for kx in 0..k {
                            let wv = w[((o * self.in_channels + c) * k + ky) * k + kx];
                            for oy in 0..g.out_h {
                                let src = in_base + (oy + ky) * g.in_w + kx;
                                let dst = oy * g.out_w;
                                for ox in 0..g.out_w {
                                    plane[dst + ox] += wv * x[src + ox];
                                }
                            }
                        }
                    }
                }
            }
        }

        self.input = Some(input.clone());
        Tensor::from_vec(&[g.batch, self.out_channels, g.out_h, g.out_w], out)
    }

    /// Accumulates kernel and bias gradients, returns `dL/dx`.
    pub fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor> {
        let input = self
            .input
            .as_ref()
            .ok_or_else(|| TrainError::shape("conv2d backward called before forward"))?;
        let g = self.geometry(input)?;
        let expected = [g.batch, self.out_channels, g.out_h, g.out_w];
        if grad_output.shape() != expected {
            return Err(TrainError::shape(format!(
                "conv2d gradient {:?} does not match output {:?}",
                grad_output.shape(),
                expected
            )));
        }

        let k = self.kernel;
        let x = input.data();
        let dy = grad_output.data();
        let w = self.weights.value.data();
        let w_grad = self.weights.grad.data_mut();
        let b_grad = self.biases.grad.data_mut();
        let out_plane = g.out_h * g.out_w;
        let in_plane = g.in_h * g.in_w;
        let mut dx = vec![0.0f32; input.len()];

        for b in 0..g.batch {
            for o in 0..self.out_channels {
                let out_base = (b * self.out_channels + o) * out_plane;
                let plane = &dy[out_base..out_base + out_plane];
                b_grad[o] += plane.iter().sum::<f32>();

                for c in 0..self.in_channels {
                    let in_base = (b * self.in_channels + c) * in_plane;
                    for ky in 0..k {
                        for kx in 0..k {
                            let wi = ((o * self.in_channels + c) * k + ky) * k + kx;
                            let wv = w[wi];
                            let mut acc = 0.0f32;
                            for oy in 0..g.out_h {
                                let src = in_base + (oy + ky) * g.in_w + kx;
                                let row = oy * g.out_w;
                                for ox in 0..g.out_w {
                                    let d = plane[row + ox];
                                    acc += d * x[src + ox];
                                    dx[src + ox] += d * wv;
                                }
                            }
                            w_grad[wi] += acc;
                        }
                    }
                }
            }
        }

        Tensor::from_vec(input.shape(), dx)
    }

    pub fn params(&self) -> [&Param; 2] {
        [&self.weights, &self.biases]
    }

    pub fn params_mut(&mut self) -> [&mut Param; 2] {
        [&mut self.weights, &mut self.biases]
    }
}
