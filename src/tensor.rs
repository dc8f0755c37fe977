//! Tensor Operations for Layer Evaluation
//!
//! A minimal dense tensor covering exactly what the layer protocol needs:
//! creation from raw arrays, coercion to `f32`, matrix multiplication,
//! broadcast element-wise arithmetic, transpose, and axis reduction.
//!
//! ## Core Concepts
//!
//! - **Data**: Flat `Vec<f32>` storing all elements in row-major order
//! - **Shape**: Dimensions of the tensor (e.g., `[batch, features]`)
//! - **Strides**: Step sizes for each dimension to compute flat indices
//!
//! ## Example
//!
//! ```rust
//! use knets::Tensor;
//!
//! let x = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]);
//! let w = Tensor::new(vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0], vec![3, 2]);
//! let y = x.matmul(&w).unwrap();
//! assert_eq!(y.shape, vec![2, 2]);
//! ```
//!
//! ## Fallible Operations
//!
//! Every operation whose validity depends on runtime shapes returns
//! [`Result`](crate::Result) with [`LayerError::ShapeMismatch`]. Layers forward
//! these errors unchanged, so a bad shape fails the call that caused it.
//!
//! ## Parallelism
//!
//! Element-wise operations iterate with Rayon, and matrix products above a
//! small work threshold use a parallel cache-blocked kernel. Results are
//! identical to the sequential versions.

use crate::error::{LayerError, Result};
use rayon::prelude::*;

/// A multi-dimensional array of `f32` values in row-major layout.
///
/// For shape `[2, 3]`, data is stored as
/// `[r0c0, r0c1, r0c2, r1c0, r1c1, r1c2]` and strides are `[3, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    /// Flat storage of all tensor elements
    pub data: Vec<f32>,
    /// Shape of the tensor (dimensions)
    pub shape: Vec<usize>,
    /// Strides for each dimension (computed from shape)
    pub strides: Vec<usize>,
}

impl Tensor {
    /// Create a new tensor with given data and shape
    ///
    /// # Panics
    ///
    /// Panics if the product of shape dimensions doesn't equal data length.
    /// Use [`Tensor::try_new`] for untrusted input.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use knets::Tensor;
    /// let tensor = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]);
    /// assert_eq!(tensor.shape, vec![2, 2]);
    /// ```
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Self {
        let expected_size: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            expected_size,
            "Data length ({}) doesn't match shape {:?} (expected {})",
            data.len(),
            shape,
            expected_size
        );

        let strides = Self::compute_strides(&shape);
        Self {
            data,
            shape,
            strides,
        }
    }

    /// Create a tensor, reporting a length/shape disagreement as an error
    pub fn try_new(data: Vec<f32>, shape: Vec<usize>) -> Result<Self> {
        let expected_size: usize = shape.iter().product();
        if data.len() != expected_size {
            return Err(LayerError::shape("tensor", &shape, &[data.len()]));
        }
        Ok(Self::new(data, shape))
    }

    /// Build a 2-D tensor from row vectors
    ///
    /// Ragged rows are rejected with `ShapeMismatch`.
    ///
    /// ```rust
    /// # use knets::Tensor;
    /// let t = Tensor::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
    /// assert_eq!(t.shape, vec![2, 2]);
    /// assert_eq!(t.data, vec![1.0, 2.0, 3.0, 4.0]);
    /// ```
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            if row.len() != cols {
                return Err(LayerError::shape("from_rows", &[cols], &[row.len()]));
            }
            data.extend_from_slice(row);
        }
        Ok(Self::new(data, vec![rows.len(), cols]))
    }

    /// Coerce double-precision data to the tensor's `f32` precision
    pub fn from_f64(data: &[f64], shape: Vec<usize>) -> Result<Self> {
        Self::try_new(data.iter().map(|&v| v as f32).collect(), shape)
    }

    /// Create a tensor filled with zeros
    ///
    /// ```rust
    /// # use knets::Tensor;
    /// let tensor = Tensor::zeros(vec![3, 4]);
    /// assert_eq!(tensor.data.len(), 12);
    /// assert!(tensor.data.iter().all(|&x| x == 0.0));
    /// ```
    pub fn zeros(shape: Vec<usize>) -> Self {
        Self::full(shape, 0.0)
    }

    /// Create a tensor with every element set to `value`
    pub fn full(shape: Vec<usize>, value: f32) -> Self {
        let size: usize = shape.iter().product();
        Self::new(vec![value; size], shape)
    }

    /// Identity matrix of shape `[n, n]`
    pub fn eye(n: usize) -> Self {
        let mut data = vec![0.0; n * n];
        for i in 0..n {
            data[i * n + i] = 1.0;
        }
        Self::new(data, vec![n, n])
    }

    /// Compute strides from shape (row-major layout)
    ///
    /// For shape `[d0, d1, d2]`, strides are `[d1*d2, d2, 1]`
    fn compute_strides(shape: &[usize]) -> Vec<usize> {
        let mut strides = vec![1; shape.len()];
        for i in (0..shape.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * shape[i + 1];
        }
        strides
    }

    /// Number of dimensions
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Leading dimension of a 2-D tensor (batch size for activations)
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(1)
    }

    /// Trailing dimension (feature count)
    pub fn cols(&self) -> usize {
        self.shape.last().copied().unwrap_or(1)
    }

    /// Element at `(row, col)` of a 2-D tensor
    pub fn at(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.strides[0] + col]
    }

    /// Inner loop of the blocked matmul: `result[j] += a_val * b[j]`.
    /// Written as a plain zip so LLVM can auto-vectorize it.
    #[inline(always)]
    fn matmul_inner_simd(a_val: f32, b: &[f32], result: &mut [f32]) {
        for (r, &b_val) in result.iter_mut().zip(b.iter()) {
            *r += a_val * b_val;
        }
    }

    /// Matrix multiplication of two 2-D tensors
    ///
    /// For `A @ B` with `A: [m, k]` and `B: [k, n]`, returns `[m, n]`.
    /// Small products run sequentially; from 1K multiply-adds upward the
    /// parallel cache-blocked kernel is used.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if either operand is not 2-D or the inner
    /// dimensions differ.
    ///
    /// ```rust
    /// # use knets::Tensor;
    /// let a = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]);
    /// let c = a.matmul(&Tensor::eye(2)).unwrap();
    /// assert_eq!(c, a);
    /// ```
    pub fn matmul(&self, other: &Tensor) -> Result<Tensor> {
        if self.ndim() != 2 {
            return Err(LayerError::shape("matmul", &[self.rows(), self.cols()], &self.shape));
        }
        if other.ndim() != 2 || self.shape[1] != other.shape[0] {
            return Err(LayerError::shape(
                "matmul",
                &[self.shape[1], other.cols()],
                &other.shape,
            ));
        }

        let m = self.shape[0];
        let n = other.shape[1];
        let k = self.shape[1];

        if m * n * k >= 1_000 {
            return Ok(self.matmul_parallel_blocked(other, m, n, k));
        }

        let mut result = vec![0.0; m * n];
        for i in 0..m {
            for j in 0..n {
                let mut sum = 0.0;
                for l in 0..k {
                    sum += self.data[i * k + l] * other.data[l * n + j];
                }
                result[i * n + j] = sum;
            }
        }

        Ok(Tensor::new(result, vec![m, n]))
    }

    /// Parallel cache-blocked matrix multiplication
    ///
    /// Output rows are split into 8-row blocks, one Rayon task each; inside
    /// a block the column and inner dimensions are walked in 8×8 tiles so
    /// the working set stays in L1.
    fn matmul_parallel_blocked(&self, other: &Tensor, m: usize, n: usize, k: usize) -> Tensor {
        const BLOCK_SIZE: usize = 8;

        let mut result = vec![0.0; m * n];
        if n == 0 {
            return Tensor::new(result, vec![m, n]);
        }

        result
            .par_chunks_mut(BLOCK_SIZE * n)
            .enumerate()
            .for_each(|(block_i, result_block)| {
                let i_start = block_i * BLOCK_SIZE;
                let i_end = (i_start + BLOCK_SIZE).min(m);

                for j_start in (0..n).step_by(BLOCK_SIZE) {
                    let j_end = (j_start + BLOCK_SIZE).min(n);

                    for k_start in (0..k).step_by(BLOCK_SIZE) {
                        let k_end = (k_start + BLOCK_SIZE).min(k);

                        for i in i_start..i_end {
                            let row_offset = (i - i_start) * n;
                            for k_idx in k_start..k_end {
                                let a_val = self.data[i * k + k_idx];
                                Self::matmul_inner_simd(
                                    a_val,
                                    &other.data[k_idx * n + j_start..k_idx * n + j_end],
                                    &mut result_block[row_offset + j_start..row_offset + j_end],
                                );
                            }
                        }
                    }
                }
            });

        Tensor::new(result, vec![m, n])
    }

    /// Shared broadcasting rule for binary element-wise operations
    ///
    /// Accepted patterns:
    ///
    /// 1. **Exact match**: same shape
    /// 2. **Row broadcast**: `[m, n] ∘ [1, n]` (bias over the batch)
    /// 3. **Last-dim broadcast**: `[*, n] ∘ [n]`
    fn broadcast_with<F>(&self, other: &Tensor, op: &'static str, f: F) -> Result<Tensor>
    where
        F: Fn(f32, f32) -> f32 + Sync + Send,
    {
        if self.shape == other.shape {
            let result = self
                .data
                .par_iter()
                .zip(&other.data)
                .map(|(&a, &b)| f(a, b))
                .collect();
            return Ok(Tensor::new(result, self.shape.clone()));
        }

        let last_dim = self.cols();
        let other_is_row = other.ndim() <= self.ndim()
            && other.cols() == last_dim
            && other.data.len() == last_dim;

        if other_is_row && !self.shape.is_empty() {
            let result = self
                .data
                .par_iter()
                .enumerate()
                .map(|(i, &a)| f(a, other.data[i % last_dim]))
                .collect();
            return Ok(Tensor::new(result, self.shape.clone()));
        }

        Err(LayerError::shape(op, &self.shape, &other.shape))
    }

    /// Element-wise addition with row broadcasting
    ///
    /// ```rust
    /// # use knets::Tensor;
    /// let a = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]);
    /// let b = Tensor::new(vec![10.0, 20.0], vec![1, 2]);
    /// assert_eq!(a.add(&b).unwrap().data, vec![11.0, 22.0, 13.0, 24.0]);
    /// ```
    pub fn add(&self, other: &Tensor) -> Result<Tensor> {
        self.broadcast_with(other, "add", |a, b| a + b)
    }

    /// Element-wise (Hadamard) product with row broadcasting
    pub fn mul(&self, other: &Tensor) -> Result<Tensor> {
        self.broadcast_with(other, "mul", |a, b| a * b)
    }

    /// Element-wise subtraction (shapes must match exactly)
    pub fn sub(&self, other: &Tensor) -> Result<Tensor> {
        if self.shape != other.shape {
            return Err(LayerError::shape("sub", &self.shape, &other.shape));
        }
        let result = self
            .data
            .par_iter()
            .zip(&other.data)
            .map(|(a, b)| a - b)
            .collect();
        Ok(Tensor::new(result, self.shape.clone()))
    }

    /// Multiply all elements by scalar
    pub fn mul_scalar(&self, scalar: f32) -> Tensor {
        self.map(|x| x * scalar)
    }

    /// Apply `f` to every element
    pub fn map<F>(&self, f: F) -> Tensor
    where
        F: Fn(f32) -> f32 + Sync + Send,
    {
        let result = self.data.par_iter().map(|&x| f(x)).collect();
        Tensor::new(result, self.shape.clone())
    }

    /// Transpose two dimensions (negative indices count from the end)
    ///
    /// # Panics
    ///
    /// Panics if either dimension is out of range for the tensor's rank,
    /// including `t()` on a tensor with fewer than two dimensions.
    ///
    /// ```rust
    /// # use knets::Tensor;
    /// let tensor = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]);
    /// let transposed = tensor.transpose(0, 1);
    /// assert_eq!(transposed.shape, vec![3, 2]);
    /// assert_eq!(transposed.data, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    /// ```
    pub fn transpose(&self, dim1: isize, dim2: isize) -> Tensor {
        let ndim = self.shape.len() as isize;
        let resolve = |dim: isize| {
            let d = if dim < 0 { ndim + dim } else { dim };
            assert!(
                (0..ndim).contains(&d),
                "dimension {} out of range for shape {:?}",
                dim,
                self.shape
            );
            d as usize
        };
        let (d1, d2) = (resolve(dim1), resolve(dim2));

        let mut new_shape = self.shape.clone();
        new_shape.swap(d1, d2);

        if self.shape.len() == 2 {
            let rows = self.shape[0];
            let cols = self.shape[1];
            let mut result = vec![0.0; rows * cols];

            for i in 0..rows {
                for j in 0..cols {
                    result[j * rows + i] = self.data[i * cols + j];
                }
            }

            return Tensor::new(result, new_shape);
        }

        // Higher ranks: walk the output in row-major order, remapping strides
        let old_strides = &self.strides;
        let new_strides = Self::compute_strides(&new_shape);
        let mut perm_strides = old_strides.clone();
        perm_strides.swap(d1, d2);

        let mut result = vec![0.0; self.data.len()];
        for (i, item) in result.iter_mut().enumerate() {
            let mut old_idx = 0;
            let mut remaining = i;
            for (dim_idx, &stride) in new_strides.iter().enumerate() {
                let coord = remaining / stride;
                remaining %= stride;
                old_idx += coord * perm_strides[dim_idx];
            }
            *item = self.data[old_idx];
        }

        Tensor::new(result, new_shape)
    }

    /// Transpose of a matrix (swap the last two axes)
    ///
    /// # Panics
    ///
    /// Panics on tensors with fewer than two dimensions.
    pub fn t(&self) -> Tensor {
        self.transpose(-2, -1)
    }

    /// Sum along `axis`, optionally keeping it as a size-1 dimension
    ///
    /// # Panics
    ///
    /// Panics if `axis` is out of range.
    ///
    /// ```rust
    /// # use knets::Tensor;
    /// let t = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]);
    /// let col_sums = t.sum_axis(0, true);
    /// assert_eq!(col_sums.shape, vec![1, 3]);
    /// assert_eq!(col_sums.data, vec![5.0, 7.0, 9.0]);
    /// ```
    pub fn sum_axis(&self, axis: usize, keepdim: bool) -> Tensor {
        assert!(
            axis < self.ndim(),
            "axis {} out of range for shape {:?}",
            axis,
            self.shape
        );

        let outer: usize = self.shape[..axis].iter().product();
        let len = self.shape[axis];
        let inner: usize = self.shape[axis + 1..].iter().product();

        let result: Vec<f32> = (0..outer * inner)
            .into_par_iter()
            .map(|idx| {
                let o = idx / inner.max(1);
                let i = idx % inner.max(1);
                (0..len)
                    .map(|k| self.data[(o * len + k) * inner + i])
                    .sum()
            })
            .collect();

        let mut new_shape = self.shape.clone();
        if keepdim {
            new_shape[axis] = 1;
        } else {
            new_shape.remove(axis);
        }
        Tensor::new(result, new_shape)
    }

    /// Sum of squares of all elements
    pub fn sum_squares(&self) -> f32 {
        self.data.par_iter().map(|&v| v * v).sum()
    }

    /// True when shapes match and every element is within `tolerance`
    pub fn approx_eq(&self, other: &Tensor, tolerance: f32) -> bool {
        self.shape == other.shape
            && self
                .data
                .iter()
                .zip(&other.data)
                .all(|(a, b)| (a - b).abs() <= tolerance)
    }
}
