use dyn_stack::{MemBuffer, MemStack};
use faer::diag::{Diag, DiagRef};
use faer::linalg::matmul::matmul;
use faer::linalg::svd::{self, ComputeSvdVectors};
use faer::{Accum, Mat, MatRef, Par, get_global_parallelism};
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix2};
use std::marker::PhantomData;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FaerLinalgError {
    #[error("SVD failed to converge")]
    SvdNoConvergence,
    #[error(
        "Least-squares system is inconsistent: design has {design_rows} rows but target has {target_rows}."
    )]
    RowMismatch {
        design_rows: usize,
        target_rows: usize,
    },
    #[error("Least-squares input contains non-finite values")]
    NonFiniteInput,
}

#[inline]
fn should_use_faer_matmul(m: usize, n: usize, k: usize) -> bool {
    // Tiny products stay on ndarray; faer GEMM pays off from moderate sizes up.
    const MIN_DIM: usize = 32;
    const MIN_FLOP_SCALE: usize = 64 * 64;
    (m >= MIN_DIM || n >= MIN_DIM || k >= MIN_DIM)
        && m.saturating_mul(n).saturating_mul(k) >= MIN_FLOP_SCALE
}

#[inline]
fn matmul_parallelism(m: usize, n: usize, k: usize) -> Par {
    if m < 128 || n < 128 || k < 128 {
        Par::Seq
    } else {
        get_global_parallelism()
    }
}

/// Compute A^T * B. For A of shape (n, p) and B of shape (n, q) the result is (p, q).
#[inline]
pub fn fast_atb<S1: Data<Elem = f64>, S2: Data<Elem = f64>>(
    a: &ArrayBase<S1, Ix2>,
    b: &ArrayBase<S2, Ix2>,
) -> Array2<f64> {
    let (n_a, p) = a.dim();
    let (n_b, q) = b.dim();
    debug_assert_eq!(n_a, n_b, "A and B must have same number of rows");

    if !should_use_faer_matmul(p, q, n_a) {
        return a.t().dot(b);
    }

    let mut result = Mat::<f64>::zeros(p, q);
    let a_view = FaerArrayView::new(a);
    let b_view = FaerArrayView::new(b);
    matmul(
        result.as_mut(),
        Accum::Replace,
        a_view.as_ref().transpose(),
        b_view.as_ref(),
        1.0,
        matmul_parallelism(p, q, n_a),
    );
    mat_to_array(result.as_ref())
}

/// Compute A * B. For A of shape (n, p) and B of shape (p, q) the result is (n, q).
#[inline]
pub fn fast_ab<S1: Data<Elem = f64>, S2: Data<Elem = f64>>(
    a: &ArrayBase<S1, Ix2>,
    b: &ArrayBase<S2, Ix2>,
) -> Array2<f64> {
    let (n, p) = a.dim();
    let (p_b, q) = b.dim();
    debug_assert_eq!(p, p_b, "A and B must have compatible inner dimensions");

    if !should_use_faer_matmul(n, q, p) {
        return a.dot(b);
    }

    let mut result = Mat::<f64>::zeros(n, q);
    let a_view = FaerArrayView::new(a);
    let b_view = FaerArrayView::new(b);
    matmul(
        result.as_mut(),
        Accum::Replace,
        a_view.as_ref(),
        b_view.as_ref(),
        1.0,
        matmul_parallelism(n, q, p),
    );
    mat_to_array(result.as_ref())
}

fn mat_to_array(mat: MatRef<'_, f64>) -> Array2<f64> {
    Array2::from_shape_fn((mat.nrows(), mat.ncols()), |(i, j)| mat[(i, j)])
}

fn diag_to_array(diag: DiagRef<'_, f64>) -> Array1<f64> {
    let mat = diag.column_vector().as_mat();
    Array1::from_shape_fn(mat.nrows(), |i| mat[(i, 0)])
}

/// Borrowed faer view over an ndarray matrix.
///
/// Arrays with non-positive strides (reversed or broadcast views) are copied into
/// a compact owned buffer first; everything else is viewed in place.
pub struct FaerArrayView<'a> {
    ptr: *const f64,
    rows: usize,
    cols: usize,
    row_stride: isize,
    col_stride: isize,
    owned: Option<Array2<f64>>,
    _marker: PhantomData<&'a f64>,
}

impl<'a> FaerArrayView<'a> {
    pub fn new<S: Data<Elem = f64>>(array: &'a ArrayBase<S, Ix2>) -> Self {
        let (rows, cols) = array.dim();
        let strides = array.strides();
        if strides[0] <= 0 || strides[1] <= 0 {
            let owned = array.as_standard_layout().into_owned();
            let owned_strides = owned.strides();
            return Self {
                ptr: owned.as_ptr(),
                rows,
                cols,
                row_stride: owned_strides[0],
                col_stride: owned_strides[1],
                owned: Some(owned),
                _marker: PhantomData,
            };
        }

        Self {
            ptr: array.as_ptr(),
            rows,
            cols,
            row_stride: strides[0],
            col_stride: strides[1],
            owned: None,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn as_ref(&self) -> MatRef<'_, f64> {
        let (ptr, row_stride, col_stride) = match &self.owned {
            Some(owned) => {
                let strides = owned.strides();
                (owned.as_ptr(), strides[0], strides[1])
            }
            None => (self.ptr, self.row_stride, self.col_stride),
        };
        // SAFETY: pointer/shape/strides either come from a live ndarray view with
        // positive strides, or from the owned compact copy held by this wrapper.
        unsafe { MatRef::from_raw_parts(ptr, self.rows, self.cols, row_stride, col_stride) }
    }
}

/// Thin singular value decomposition `A = U diag(s) V^T`.
pub trait FaerThinSvd {
    /// Returns `(U, s, V)` with `U: (rows, k)`, `s: (k,)`, `V: (cols, k)` and
    /// `k = min(rows, cols)`.
    fn thin_svd(&self) -> Result<(Array2<f64>, Array1<f64>, Array2<f64>), FaerLinalgError>;
}

impl<S: Data<Elem = f64>> FaerThinSvd for ArrayBase<S, Ix2> {
    fn thin_svd(&self) -> Result<(Array2<f64>, Array1<f64>, Array2<f64>), FaerLinalgError> {
        let (rows, cols) = self.dim();
        let k = rows.min(cols);
        if k == 0 {
            return Ok((
                Array2::zeros((rows, 0)),
                Array1::zeros(0),
                Array2::zeros((cols, 0)),
            ));
        }

        let faer_view = FaerArrayView::new(self);
        let mut singular = Diag::<f64>::zeros(k);
        let mut u = Mat::<f64>::zeros(rows, k);
        let mut v = Mat::<f64>::zeros(cols, k);

        let par = get_global_parallelism();
        let mut mem = MemBuffer::new(svd::svd_scratch::<f64>(
            rows,
            cols,
            ComputeSvdVectors::Thin,
            ComputeSvdVectors::Thin,
            par,
            Default::default(),
        ));
        let stack = MemStack::new(&mut mem);

        svd::svd(
            faer_view.as_ref(),
            singular.as_mut(),
            Some(u.as_mut()),
            Some(v.as_mut()),
            par,
            stack,
            Default::default(),
        )
        .map_err(|_| FaerLinalgError::SvdNoConvergence)?;

        Ok((
            mat_to_array(u.as_ref()),
            diag_to_array(singular.as_ref()),
            mat_to_array(v.as_ref()),
        ))
    }
}

/// Minimum-norm least-squares solution of `design * coefficients ≈ target`.
#[derive(Debug, Clone)]
pub struct LeastSquaresSolution {
    /// `(design.ncols(), target.ncols())`
    pub coefficients: Array2<f64>,
    /// Number of singular values above the cutoff.
    pub rank: usize,
    pub singular_values: Array1<f64>,
}

impl LeastSquaresSolution {
    pub fn is_rank_deficient(&self) -> bool {
        self.rank < self.singular_values.len()
    }
}

/// Ordinary least squares with no intercept and no column scaling.
///
/// Every column of `target` is an independent right-hand side. Singular values
/// below `eps * max(rows, cols) * s_max` are treated as zero, so rank-deficient
/// designs get the minimum-norm solution.
pub fn least_squares<S1: Data<Elem = f64>, S2: Data<Elem = f64>>(
    design: &ArrayBase<S1, Ix2>,
    target: &ArrayBase<S2, Ix2>,
) -> Result<LeastSquaresSolution, FaerLinalgError> {
    let (n, p) = design.dim();
    let (n_target, q) = target.dim();
    if n != n_target {
        return Err(FaerLinalgError::RowMismatch {
            design_rows: n,
            target_rows: n_target,
        });
    }
    if !design.iter().chain(target.iter()).all(|v| v.is_finite()) {
        return Err(FaerLinalgError::NonFiniteInput);
    }

    let (u, singular_values, v) = design.thin_svd()?;
    let s_max = singular_values.iter().copied().fold(0.0_f64, f64::max);
    let cutoff = f64::EPSILON * n.max(p) as f64 * s_max;

    // coefficients = V * diag(1/s) * U^T * target, dropping directions below cutoff.
    let mut projected = fast_atb(&u, target);
    let mut rank = 0usize;
    for (mut row, &s) in projected.axis_iter_mut(Axis(0)).zip(singular_values.iter()) {
        if s > cutoff {
            row.mapv_inplace(|x| x / s);
            rank += 1;
        } else {
            row.fill(0.0);
        }
    }
    let coefficients = if singular_values.is_empty() {
        Array2::zeros((p, q))
    } else {
        fast_ab(&v, &projected)
    };

    Ok(LeastSquaresSolution {
        coefficients,
        rank,
        singular_values,
    })
}
