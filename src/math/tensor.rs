use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

use crate::error::{Result, TrainError};

/// Dense row-major `f32` array with an explicit shape.
///
/// Images travel as `(batch, channels, height, width)`, activations as
/// `(batch, features)`, parameters in whatever shape their layer declares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    pub fn zeros(shape: &[usize]) -> Tensor {
        Tensor::full(shape, 0.0)
    }

    pub fn full(shape: &[usize], value: f32) -> Tensor {
        Tensor {
            shape: shape.to_vec(),
            data: vec![value; shape.iter().product()],
        }
    }

    /// Wraps `data`, checking that it holds exactly `product(shape)` values.
    pub fn from_vec(shape: &[usize], data: Vec<f32>) -> Result<Tensor> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(TrainError::shape(format!(
                "shape {:?} needs {} values, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Tensor {
            shape: shape.to_vec(),
            data,
        })
    }

    /// Samples a single value from N(0, 1) using the Box-Muller transform.
    fn sample_standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f32 {
        // Both uniforms live in (0, 1] so ln() never sees zero.
        let u1: f32 = 1.0 - rng.gen::<f32>();
        let u2: f32 = 1.0 - rng.gen::<f32>();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }

    /// Standard normal samples, used for synthetic trace inputs.
    pub fn randn<R: Rng + ?Sized>(shape: &[usize], rng: &mut R) -> Tensor {
        let len = shape.iter().product();
        Tensor {
            shape: shape.to_vec(),
            data: (0..len).map(|_| Tensor::sample_standard_normal(rng)).collect(),
        }
    }

    /// He initialization: N(0, sqrt(2 / fan_in)).
    ///
    /// Recommended before ReLU-family layers; SiLU behaves close enough.
    pub fn he<R: Rng + ?Sized>(shape: &[usize], fan_in: usize, rng: &mut R) -> Tensor {
        Tensor::scaled_normal(shape, (2.0 / fan_in as f32).sqrt(), rng)
    }

    /// Xavier (Glorot) initialization: N(0, sqrt(1 / fan_in)).
    ///
    /// Used for the final logit layer, which has no activation after it.
    pub fn xavier<R: Rng + ?Sized>(shape: &[usize], fan_in: usize, rng: &mut R) -> Tensor {
        Tensor::scaled_normal(shape, (1.0 / fan_in as f32).sqrt(), rng)
    }

    fn scaled_normal<R: Rng + ?Sized>(shape: &[usize], std_dev: f32, rng: &mut R) -> Tensor {
        let mut res = Tensor::randn(shape, rng);
        res.data.iter_mut().for_each(|x| *x *= std_dev);
        res
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Size of axis `axis`; panics on an out-of-range axis like slice indexing does.
    pub fn dim(&self, axis: usize) -> usize {
        self.shape[axis]
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Same values, new shape. Element count must not change.
    pub fn reshape(self, shape: &[usize]) -> Result<Tensor> {
        Tensor::from_vec(shape, self.data)
    }

    pub fn map<F>(&self, functor: F) -> Tensor
    where
        F: Fn(f32) -> f32,
    {
        Tensor {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&x| functor(x)).collect(),
        }
    }

    pub fn fill(&mut self, value: f32) {
        self.data.iter_mut().for_each(|x| *x = value);
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|x| x.is_finite())
    }

    /// First non-finite value, if any; used to report what blew up.
    pub fn first_non_finite(&self) -> Option<f32> {
        self.data.iter().copied().find(|x| !x.is_finite())
    }

    /// Number of values per entry of the leading axis.
    pub fn row_len(&self) -> usize {
        self.shape.iter().skip(1).product()
    }

    /// Entry `index` of the leading axis as a flat slice.
    pub fn row(&self, index: usize) -> &[f32] {
        let n = self.row_len();
        &self.data[index * n..(index + 1) * n]
    }

    /// Gathers entries of the leading axis, keeping the trailing shape.
    pub fn select_rows(&self, indices: &[usize]) -> Result<Tensor> {
        let rows = self.shape.first().copied().unwrap_or(0);
        let n = self.row_len();
        let mut data = Vec::with_capacity(indices.len() * n);
        for &idx in indices {
            if idx >= rows {
                return Err(TrainError::shape(format!(
                    "row index {} out of range for leading axis {}",
                    idx, rows
                )));
            }
            data.extend_from_slice(self.row(idx));
        }
        let mut shape = self.shape.clone();
        shape[0] = indices.len();
        Ok(Tensor { shape, data })
    }

    /// Contiguous range `[start, end)` of the leading axis.
    pub fn slice_rows(&self, start: usize, end: usize) -> Result<Tensor> {
        let rows = self.shape.first().copied().unwrap_or(0);
        if start > end || end > rows {
            return Err(TrainError::shape(format!(
                "row range {}..{} out of bounds for leading axis {}",
                start, end, rows
            )));
        }
        let n = self.row_len();
        let mut shape = self.shape.clone();
        shape[0] = end - start;
        Ok(Tensor {
            shape,
            data: self.data[start * n..end * n].to_vec(),
        })
    }

    fn expect_matrix(&self, what: &str) -> Result<(usize, usize)> {
        match self.shape.as_slice() {
            &[rows, cols] => Ok((rows, cols)),
            other => Err(TrainError::shape(format!(
                "{} expects a 2-D tensor, got shape {:?}",
                what, other
            ))),
        }
    }

    pub fn transpose(&self) -> Result<Tensor> {
        let (rows, cols) = self.expect_matrix("transpose")?;
        let mut res = vec![0.0; rows * cols];
        for i in 0..rows {
            for j in 0..cols {
                res[j * rows + i] = self.data[i * cols + j];
            }
        }
        Tensor::from_vec(&[cols, rows], res)
    }

    /// Matrix product of two 2-D tensors.
    pub fn matmul(&self, rhs: &Tensor) -> Result<Tensor> {
        let (m, k) = self.expect_matrix("matmul")?;
        let (k2, n) = rhs.expect_matrix("matmul")?;
        if k != k2 {
            return Err(TrainError::shape(format!(
                "matmul of {:?} by {:?}",
                self.shape, rhs.shape
            )));
        }

        // i-k-j order keeps the inner loop on contiguous rows of both operands.
        let mut res = vec![0.0f32; m * n];
        for i in 0..m {
            let out_row = &mut res[i * n..(i + 1) * n];
            for p in 0..k {
                let a = self.data[i * k + p];
                let rhs_row = &rhs.data[p * n..(p + 1) * n];
                for (o, &b) in out_row.iter_mut().zip(rhs_row) {
                    *o += a * b;
                }
            }
        }
        Tensor::from_vec(&[m, n], res)
    }

    /// `self += other * factor`, element-wise over equal shapes.
    pub fn add_scaled(&mut self, other: &Tensor, factor: f32) -> Result<()> {
        if self.shape != other.shape {
            return Err(TrainError::shape(format!(
                "cannot add {:?} into {:?}",
                other.shape, self.shape
            )));
        }
        for (a, &b) in self.data.iter_mut().zip(&other.data) {
            *a += b * factor;
        }
        Ok(())
    }
}

impl Default for Tensor {
    fn default() -> Self {
        Tensor {
            shape: vec![0],
            data: vec![],
        }
    }
}
