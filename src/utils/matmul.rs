//! Row-major GEMM helpers on top of cblas.
//!
//! Dense and per-step projections are plain matrix products, so they go
//! through BLAS; convolutions and recurrent cells keep explicit loops.

use cblas::{sgemm, Layout, Transpose};

/// C = alpha * op(A) * op(B) + beta * C, row-major.
///
/// `m`, `n`, `k` are the dimensions after transposition: op(A) is m x k,
/// op(B) is k x n, C is m x n. Leading dimensions are those of the stored
/// (untransposed) matrices.
#[allow(clippy::too_many_arguments)]
pub fn matmul(
    m: usize,
    n: usize,
    k: usize,
    a: &[f32],
    lda: usize,
    b: &[f32],
    ldb: usize,
    c: &mut [f32],
    ldc: usize,
    transpose_a: bool,
    transpose_b: bool,
    alpha: f32,
    beta: f32,
) {
    let trans_a = if transpose_a {
        Transpose::Ordinary
    } else {
        Transpose::None
    };
    let trans_b = if transpose_b {
        Transpose::Ordinary
    } else {
        Transpose::None
    };

    unsafe {
        sgemm(
            Layout::RowMajor,
            trans_a,
            trans_b,
            m as i32,
            n as i32,
            k as i32,
            alpha,
            a,
            lda as i32,
            b,
            ldb as i32,
            beta,
            c,
            ldc as i32,
        );
    }
}

/// Add a bias vector to every row of a row-major `rows x cols` matrix.
pub fn add_bias_rows(data: &mut [f32], rows: usize, cols: usize, bias: &[f32]) {
    assert_eq!(bias.len(), cols, "bias length mismatch in add_bias_rows");
    for row in data.chunks_exact_mut(cols).take(rows) {
        for (value, b) in row.iter_mut().zip(bias) {
            *value += *b;
        }
    }
}
