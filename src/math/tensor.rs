use rand::Rng;
use serde::{Serialize, Deserialize};
use std::f64::consts::PI;
use std::ops::{AddAssign, SubAssign};

use crate::error::{Error, Result};

/// Dense row-major `f32` array.
///
/// Image tensors use `[channels, height, width]` per sample and
/// `[batch, channels, height, width]` once stacked; dense layers work on
/// 2-D `[rows, cols]` tensors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    pub fn zeros(shape: &[usize]) -> Tensor {
        Tensor::filled(shape, 0.0)
    }

    pub fn filled(shape: &[usize], value: f32) -> Tensor {
        Tensor {
            shape: shape.to_vec(),
            data: vec![value; shape.iter().product()],
        }
    }

    pub fn from_vec(shape: &[usize], data: Vec<f32>) -> Result<Tensor> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(Error::Shape(format!(
                "shape {:?} needs {} elements, got {}",
                shape, expected, data.len()
            )));
        }
        Ok(Tensor { shape: shape.to_vec(), data })
    }

    /// Samples a single value from N(0, 1) using the Box-Muller transform.
    fn sample_standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
        // Both uniforms live in (0, 1] to avoid log(0).
        let u1: f64 = 1.0 - rng.gen::<f64>();
        let u2: f64 = 1.0 - rng.gen::<f64>();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }

    /// He initialization: samples from N(0, sqrt(2 / rows)).
    ///
    /// Shape: (rows, cols). `rows` is the fan-in; weights are applied as
    /// `input[n, rows] x weights[rows, cols]`.
    pub fn he<R: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut R) -> Tensor {
        Tensor::normal(rows, cols, (2.0 / rows.max(1) as f64).sqrt(), rng)
    }

    /// Xavier (Glorot) initialization: samples from N(0, sqrt(1 / rows)).
    pub fn xavier<R: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut R) -> Tensor {
        Tensor::normal(rows, cols, (1.0 / rows.max(1) as f64).sqrt(), rng)
    }

    fn normal<R: Rng + ?Sized>(rows: usize, cols: usize, std_dev: f64, rng: &mut R) -> Tensor {
        let data = (0..rows * cols)
            .map(|_| (Tensor::sample_standard_normal(rng) * std_dev) as f32)
            .collect();
        Tensor { shape: vec![rows, cols], data }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
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

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn reshape(&self, shape: &[usize]) -> Result<Tensor> {
        Tensor::from_vec(shape, self.data.clone())
    }

    /// Adds a leading axis of size 1.
    pub fn unsqueeze0(mut self) -> Tensor {
        self.shape.insert(0, 1);
        self
    }

    /// Stacks equally shaped tensors along a new leading batch axis.
    pub fn stack(items: &[Tensor]) -> Result<Tensor> {
        let first = items
            .first()
            .ok_or_else(|| Error::Shape("cannot stack an empty list".into()))?;
        let mut data = Vec::with_capacity(first.len() * items.len());
        for item in items {
            if item.shape != first.shape {
                return Err(Error::Shape(format!(
                    "cannot stack {:?} with {:?}",
                    item.shape, first.shape
                )));
            }
            data.extend_from_slice(&item.data);
        }
        let mut shape = Vec::with_capacity(first.rank() + 1);
        shape.push(items.len());
        shape.extend_from_slice(&first.shape);
        Ok(Tensor { shape, data })
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

    pub fn scale(&mut self, factor: f32) {
        for v in &mut self.data {
            *v *= factor;
        }
    }

    pub fn fill(&mut self, value: f32) {
        for v in &mut self.data {
            *v = value;
        }
    }

    pub fn transpose(&self) -> Result<Tensor> {
        let (rows, cols) = self.dims2()?;
        let mut res = vec![0.0; rows * cols];
        for i in 0..rows {
            for j in 0..cols {
                res[j * rows + i] = self.data[i * cols + j];
            }
        }
        Ok(Tensor { shape: vec![cols, rows], data: res })
    }

    /// Row-major 2-D matrix product.
    pub fn matmul(&self, rhs: &Tensor) -> Result<Tensor> {
        let (rows, inner) = self.dims2()?;
        let (rhs_rows, cols) = rhs.dims2()?;
        if inner != rhs_rows {
            return Err(Error::Shape(format!(
                "matmul {:?} x {:?}",
                self.shape, rhs.shape
            )));
        }
        let mut res = vec![0.0f32; rows * cols];
        for i in 0..rows {
            let out_row = &mut res[i * cols..(i + 1) * cols];
            for k in 0..inner {
                let a = self.data[i * inner + k];
                if a == 0.0 {
                    continue;
                }
                let rhs_row = &rhs.data[k * cols..(k + 1) * cols];
                for (o, &b) in out_row.iter_mut().zip(rhs_row) {
                    *o += a * b;
                }
            }
        }
        Ok(Tensor { shape: vec![rows, cols], data: res })
    }

    /// Adds a `[1, cols]` (or `[cols]`) row vector to every row.
    pub fn add_row(&mut self, row: &Tensor) -> Result<()> {
        let (_, cols) = self.dims2()?;
        if row.len() != cols {
            return Err(Error::Shape(format!(
                "row of {} elements added to {:?}",
                row.len(), self.shape
            )));
        }
        for chunk in self.data.chunks_mut(cols) {
            for (v, &b) in chunk.iter_mut().zip(&row.data) {
                *v += b;
            }
        }
        Ok(())
    }

    /// Column sums of a 2-D tensor, returned as `[1, cols]`.
    pub fn sum_rows(&self) -> Result<Tensor> {
        let (_, cols) = self.dims2()?;
        let mut res = vec![0.0f32; cols];
        for chunk in self.data.chunks(cols) {
            for (r, &v) in res.iter_mut().zip(chunk) {
                *r += v;
            }
        }
        Ok(Tensor { shape: vec![1, cols], data: res })
    }

    pub fn dims2(&self) -> Result<(usize, usize)> {
        match self.shape.as_slice() {
            &[rows, cols] => Ok((rows, cols)),
            other => Err(Error::Shape(format!("expected a 2-D tensor, got {:?}", other))),
        }
    }

    pub fn dims4(&self) -> Result<(usize, usize, usize, usize)> {
        match self.shape.as_slice() {
            &[n, c, h, w] => Ok((n, c, h, w)),
            other => Err(Error::Shape(format!("expected a 4-D tensor, got {:?}", other))),
        }
    }

    /// `[N, C, H, W]` to `[N*H*W, C]`: one row per pixel.
    pub fn nchw_to_rows(&self) -> Result<Tensor> {
        let (n, c, h, w) = self.dims4()?;
        let plane = h * w;
        let mut rows = vec![0.0f32; n * plane * c];
        for b in 0..n {
            for ch in 0..c {
                let src = &self.data[(b * c + ch) * plane..(b * c + ch + 1) * plane];
                for (p, &v) in src.iter().enumerate() {
                    rows[(b * plane + p) * c + ch] = v;
                }
            }
        }
        Ok(Tensor { shape: vec![n * plane, c], data: rows })
    }

    /// Inverse of [`Tensor::nchw_to_rows`].
    pub fn rows_to_nchw(&self, n: usize, h: usize, w: usize) -> Result<Tensor> {
        let (rows, c) = self.dims2()?;
        let plane = h * w;
        if rows != n * plane {
            return Err(Error::Shape(format!(
                "{} rows cannot form [{}, {}, {}, {}]",
                rows, n, c, h, w
            )));
        }
        let mut out = vec![0.0f32; n * c * plane];
        for b in 0..n {
            for p in 0..plane {
                let row = &self.data[(b * plane + p) * c..(b * plane + p + 1) * c];
                for (ch, &v) in row.iter().enumerate() {
                    out[(b * c + ch) * plane + p] = v;
                }
            }
        }
        Ok(Tensor { shape: vec![n, c, h, w], data: out })
    }

    /// Argmax over axis 1 for `[N, K]` or `[N, K, H, W]` tensors.
    ///
    /// Returns one class index per sample (2-D) or per pixel (4-D), in
    /// row-major order of the remaining axes.
    pub fn argmax_axis1(&self) -> Result<Vec<usize>> {
        let (n, k, plane) = match self.shape.as_slice() {
            &[n, k] => (n, k, 1),
            &[n, k, h, w] => (n, k, h * w),
            other => {
                return Err(Error::Shape(format!(
                    "argmax over axis 1 needs a 2-D or 4-D tensor, got {:?}",
                    other
                )))
            }
        };
        let mut out = Vec::with_capacity(n * plane);
        for b in 0..n {
            for p in 0..plane {
                let mut best = 0;
                let mut best_val = f32::NEG_INFINITY;
                for c in 0..k {
                    let v = self.data[(b * k + c) * plane + p];
                    if v > best_val {
                        best_val = v;
                        best = c;
                    }
                }
                out.push(best);
            }
        }
        Ok(out)
    }
}

impl Default for Tensor {
    fn default() -> Self {
        Tensor { shape: vec![0], data: vec![] }
    }
}

impl AddAssign<&Tensor> for Tensor {
    fn add_assign(&mut self, rhs: &Tensor) {
        if self.shape != rhs.shape {
            panic!("Tensors are of incorrect sizes: {:?} += {:?}", self.shape, rhs.shape)
        }
        for (a, &b) in self.data.iter_mut().zip(&rhs.data) {
            *a += b;
        }
    }
}

impl SubAssign<&Tensor> for Tensor {
    fn sub_assign(&mut self, rhs: &Tensor) {
        if self.shape != rhs.shape {
            panic!("Tensors are of incorrect sizes: {:?} -= {:?}", self.shape, rhs.shape)
        }
        for (a, &b) in self.data.iter_mut().zip(&rhs.data) {
            *a -= b;
        }
    }
}
