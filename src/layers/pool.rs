use crate::error::{Result, TrainError};
use crate::math::Tensor;

/// Non-overlapping max pooling with a square window (stride = window).
///
/// Trailing rows/columns that do not fill a whole window are dropped.
#[derive(Debug, Clone)]
pub struct MaxPool2d {
    pub window: usize,
    // Flat input index of the winner for every output value.
    argmax: Vec<usize>,
    input_shape: Vec<usize>,
}

impl MaxPool2d {
    pub fn new(window: usize) -> MaxPool2d {
        MaxPool2d {
            window,
            argmax: Vec::new(),
            input_shape: Vec::new(),
        }
    }

    pub fn forward(&mut self, input: &Tensor) -> Result<Tensor> {
        let &[batch, channels, in_h, in_w] = input.shape() else {
            return Err(TrainError::shape(format!(
                "max pool expects (B, C, H, W), got {:?}",
                input.shape()
            )));
        };
        let p = self.window;
        let (out_h, out_w) = (in_h / p, in_w / p);
        let x = input.data();
        let mut out = Vec::with_capacity(batch * channels * out_h * out_w);
        let mut argmax = Vec::with_capacity(out.capacity());

        for plane in 0..batch * channels {
            let base = plane * in_h * in_w;
            for py in 0..out_h {
                for px in 0..out_w {
                    // Track the winner to route gradients during backprop.
                    let mut best = f32::NEG_INFINITY;
                    let mut best_idx = base + py * p * in_w + px * p;
                    for dy in 0..p {
                        for dx in 0..p {
                            let idx = base + (py * p + dy) * in_w + px * p + dx;
                            if x[idx] > best {
                                best = x[idx];
                                best_idx = idx;
                            }
                        }
                    }
                    out.push(best);
                    argmax.push(best_idx);
                }
            }
        }

        self.argmax = argmax;
        self.input_shape = input.shape().to_vec();
        Tensor::from_vec(&[batch, channels, out_h, out_w], out)
    }

    /// Scatters each output gradient back to the input position that won.
    pub fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor> {
        if self.input_shape.is_empty() {
            return Err(TrainError::shape("max pool backward called before forward"));
        }
        if grad_output.len() != self.argmax.len() {
            return Err(TrainError::shape(format!(
                "max pool gradient has {} values, forward produced {}",
                grad_output.len(),
                self.argmax.len()
            )));
        }
        let mut dx = Tensor::zeros(&self.input_shape);
        let dx_data = dx.data_mut();
        for (&idx, &g) in self.argmax.iter().zip(grad_output.data()) {
            dx_data[idx] += g;
        }
        Ok(dx)
    }
}
