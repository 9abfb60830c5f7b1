// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Dense least-squares kernels for the oxygen-cost fit
//!
//! Matrices here are small (tens to hundreds of rows, seven columns), so the
//! routines favour numerical stability over speed: Householder QR for the
//! unconstrained problem and Lawson-Hanson active-set iterations for the
//! non-negative one.

use ndarray::{s, Array1, ArrayView1, ArrayView2, Axis};
use std::cmp::Ordering;

use super::ModelError;

/// Linear algebra failures
#[derive(Debug, thiserror::Error)]
pub enum LinalgError {
    #[error("Dimension mismatch: {0}")]
    Dimension(String),

    #[error("Matrix is rank deficient at column {0}")]
    RankDeficient(usize),
}

impl From<LinalgError> for ModelError {
    fn from(err: LinalgError) -> Self {
        ModelError::Numerical(err.to_string())
    }
}

/// Result of screening design-matrix columns for linear independence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnScreen {
    /// Accepted columns, in the order they were examined
    pub kept: Vec<usize>,
    /// Columns with no component outside the span of the accepted ones
    pub dropped: Vec<usize>,
}

/// Examine columns in `order`, keeping each one that adds a well-conditioned direction
///
/// Each column is scaled to unit norm and dropped when its component
/// orthogonal to the columns already kept is at most `rel_tol · √rows`. Nearly
/// collinear columns therefore go with the exactly collinear ones instead of
/// reaching the solver as an ill-conditioned pair. All-zero and non-finite
/// columns are always dropped.
pub fn screen_columns(a: ArrayView2<f64>, order: &[usize], rel_tol: f64) -> ColumnScreen {
    let rows = a.nrows();
    let tolerance = rel_tol * (rows as f64).sqrt();
    let mut reflectors: Vec<Array1<f64>> = Vec::new();
    let mut kept = Vec::new();
    let mut dropped = Vec::new();

    for &column in order {
        let original = a.column(column);
        let norm = original.dot(&original).sqrt();
        if !norm.is_finite() || norm == 0.0 || reflectors.len() >= rows {
            dropped.push(column);
            continue;
        }

        let mut projected = original.mapv(|value| value / norm);
        for (k, reflector) in reflectors.iter().enumerate() {
            apply_reflector(reflector, &mut projected, k);
        }

        let k = reflectors.len();
        let mut tail = projected.slice(s![k..]).to_owned();
        let remaining = tail.dot(&tail).sqrt();
        if remaining <= tolerance {
            dropped.push(column);
            continue;
        }

        let alpha = if tail[0] > 0.0 { -remaining } else { remaining };
        tail[0] -= alpha;
        reflectors.push(tail);
        kept.push(column);
    }

    ColumnScreen { kept, dropped }
}

/// Minimise ||a·x − b||₂ with Householder QR
///
/// `a` must have full column rank and at least as many rows as columns.
pub fn least_squares(a: ArrayView2<f64>, b: ArrayView1<f64>) -> Result<Array1<f64>, LinalgError> {
    let (rows, cols) = a.dim();
    if b.len() != rows {
        return Err(LinalgError::Dimension(format!(
            "{} rows in matrix, {} entries in target",
            rows,
            b.len()
        )));
    }
    if rows < cols {
        return Err(LinalgError::Dimension(format!(
            "{} rows cannot determine {} unknowns",
            rows, cols
        )));
    }

    let mut r = a.to_owned();
    let mut qtb = b.to_owned();

    for k in 0..cols {
        let column = r.slice(s![k.., k]);
        let norm = column.dot(&column).sqrt();
        if norm == 0.0 || !norm.is_finite() {
            return Err(LinalgError::RankDeficient(k));
        }
        let alpha = if r[[k, k]] > 0.0 { -norm } else { norm };
        let mut reflector = r.slice(s![k.., k]).to_owned();
        reflector[0] -= alpha;

        for j in k..cols {
            let mut target = r.slice(s![.., j]).to_owned();
            apply_reflector(&reflector, &mut target, k);
            r.slice_mut(s![.., j]).assign(&target);
        }
        apply_reflector(&reflector, &mut qtb, k);
    }

    let max_diagonal = (0..cols).map(|i| r[[i, i]].abs()).fold(0.0, f64::max);
    let threshold = f64::EPSILON * max_diagonal * rows.max(cols) as f64;

    let mut x = Array1::<f64>::zeros(cols);
    for i in (0..cols).rev() {
        let diagonal = r[[i, i]];
        if diagonal.abs() <= threshold {
            return Err(LinalgError::RankDeficient(i));
        }
        let mut sum = qtb[i];
        for j in (i + 1)..cols {
            sum -= r[[i, j]] * x[j];
        }
        x[i] = sum / diagonal;
    }

    Ok(x)
}

/// Outcome of a non-negative least-squares solve
#[derive(Debug, Clone)]
pub struct NnlsSolution {
    pub x: Array1<f64>,
    pub iterations: usize,
    /// False when the iteration cap stopped the active-set loop
    pub converged: bool,
}

/// Minimise ||a·x − b||₂ subject to x ≥ 0 (Lawson-Hanson)
pub fn nnls(
    a: ArrayView2<f64>,
    b: ArrayView1<f64>,
    max_iterations: usize,
) -> Result<NnlsSolution, LinalgError> {
    let (rows, cols) = a.dim();
    if b.len() != rows {
        return Err(LinalgError::Dimension(format!(
            "{} rows in matrix, {} entries in target",
            rows,
            b.len()
        )));
    }

    let dual_tolerance = 10.0 * f64::EPSILON * column_norm_1(a) * rows.max(cols) as f64;
    let mut x = Array1::<f64>::zeros(cols);
    let mut passive = vec![false; cols];
    let mut iterations = 0;

    loop {
        let residual = &b - &a.dot(&x);
        let gradient = a.t().dot(&residual);

        let candidate = (0..cols)
            .filter(|&j| !passive[j])
            .max_by(|&i, &j| gradient[i].partial_cmp(&gradient[j]).unwrap_or(Ordering::Equal));
        let entering = match candidate {
            Some(j) if gradient[j] > dual_tolerance => j,
            _ => break,
        };
        passive[entering] = true;

        loop {
            iterations += 1;
            if iterations > max_iterations {
                return Ok(NnlsSolution {
                    x,
                    iterations: max_iterations,
                    converged: false,
                });
            }

            let indices: Vec<usize> = (0..cols).filter(|&j| passive[j]).collect();
            let sub = a.select(Axis(1), &indices);
            let z_passive = least_squares(sub.view(), b)?;

            if z_passive.iter().all(|&z| z > 0.0) {
                x.fill(0.0);
                for (slot, &j) in indices.iter().enumerate() {
                    x[j] = z_passive[slot];
                }
                break;
            }

            // Step from x toward z until the first passive coefficient hits zero
            let mut alpha = f64::INFINITY;
            for (slot, &j) in indices.iter().enumerate() {
                let z = z_passive[slot];
                if z <= 0.0 {
                    let step = x[j] / (x[j] - z);
                    if step < alpha {
                        alpha = step;
                    }
                }
            }
            if !alpha.is_finite() {
                alpha = 0.0;
            }

            let mut z_full = Array1::<f64>::zeros(cols);
            for (slot, &j) in indices.iter().enumerate() {
                z_full[j] = z_passive[slot];
            }
            x = &x + &((&z_full - &x) * alpha);

            let scale = x.iter().fold(1.0_f64, |acc, value| acc.max(value.abs()));
            for j in 0..cols {
                if passive[j] && x[j] <= 1e-12 * scale {
                    passive[j] = false;
                    x[j] = 0.0;
                }
            }
            if !passive.iter().any(|&p| p) {
                break;
            }
        }
    }

    Ok(NnlsSolution {
        x,
        iterations,
        converged: true,
    })
}

/// Apply the Householder reflector `v` to rows `offset..` of `target`
fn apply_reflector(v: &Array1<f64>, target: &mut Array1<f64>, offset: usize) {
    let v_norm2 = v.dot(v);
    if v_norm2 == 0.0 {
        return;
    }
    let mut tail = target.slice_mut(s![offset..]);
    let factor = 2.0 * v.dot(&tail) / v_norm2;
    tail.scaled_add(-factor, v);
}

fn column_norm_1(a: ArrayView2<f64>) -> f64 {
    a.columns()
        .into_iter()
        .map(|column| column.iter().map(|value| value.abs()).sum::<f64>())
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn assert_close(actual: &Array1<f64>, expected: &[f64], tolerance: f64) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < tolerance, "{} vs {}", a, e);
        }
    }

    #[test]
    fn test_least_squares_exact_system() {
        let a = array![[2.0, 1.0], [1.0, 3.0], [0.0, 1.0]];
        let x_true = array![1.5, -0.5];
        let b = a.dot(&x_true);

        let x = least_squares(a.view(), b.view()).unwrap();
        assert_close(&x, &[1.5, -0.5], 1e-12);
    }

    #[test]
    fn test_least_squares_overdetermined_line() {
        // y = 2x + 1 with symmetric noise
        let a = array![[0.0, 1.0], [1.0, 1.0], [2.0, 1.0], [3.0, 1.0]];
        let b = array![1.1, 2.9, 5.1, 6.9];

        let x = least_squares(a.view(), b.view()).unwrap();
        assert_close(&x, &[1.96, 1.06], 1e-9);
    }

    #[test]
    fn test_least_squares_rejects_rank_deficiency() {
        let a = array![[1.0, 2.0], [2.0, 4.0], [3.0, 6.0]];
        let b = array![1.0, 2.0, 3.0];
        assert!(matches!(
            least_squares(a.view(), b.view()),
            Err(LinalgError::RankDeficient(_))
        ));
    }

    #[test]
    fn test_screen_columns_drops_zero_and_collinear() {
        let a = array![
            [1.0, 0.0, -1.0, 2.0],
            [2.0, 0.0, -2.0, 1.0],
            [3.0, 0.0, -3.0, 0.0],
            [4.0, 0.0, -4.0, 5.0]
        ];
        let screen = screen_columns(a.view(), &[0, 1, 2, 3], 1e-9);

        assert_eq!(screen.kept, vec![0, 3]);
        assert_eq!(screen.dropped, vec![1, 2]);
    }

    #[test]
    fn test_screen_columns_drops_nearly_collinear() {
        // Second column is the first scaled by 1 + 1e-6·δ
        let rows = 12;
        let base: Vec<f64> = (0..rows).map(|i| 100.0 + 12.0 * i as f64).collect();
        let a = Array2::from_shape_fn((rows, 3), |(i, j)| match j {
            0 => base[i],
            1 => base[i] * (1.0 + 1e-6 * ((7 * i) % 5) as f64),
            _ => (i % 3) as f64 + 1.0,
        });

        let screen = screen_columns(a.view(), &[0, 2, 1], 1e-5);
        assert_eq!(screen.kept, vec![0, 2]);
        assert_eq!(screen.dropped, vec![1]);

        // Genuinely different scaling survives the same tolerance
        let b = Array2::from_shape_fn((rows, 2), |(i, j)| match j {
            0 => base[i],
            _ => base[i] * (0.8 + 0.05 * i as f64),
        });
        assert_eq!(screen_columns(b.view(), &[0, 1], 1e-5).kept, vec![0, 1]);
    }

    #[test]
    fn test_screen_columns_respects_priority() {
        let a = array![[1.0, -1.0], [2.0, -2.0], [3.0, -3.0]];
        let screen = screen_columns(a.view(), &[1, 0], 1e-9);
        assert_eq!(screen.kept, vec![1]);
        assert_eq!(screen.dropped, vec![0]);
    }

    #[test]
    fn test_nnls_matches_unconstrained_when_feasible() {
        let a = array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
        let b = a.dot(&array![2.0, 3.0]);

        let solution = nnls(a.view(), b.view(), 100).unwrap();
        assert!(solution.converged);
        assert_close(&solution.x, &[2.0, 3.0], 1e-10);
    }

    #[test]
    fn test_nnls_clamps_negative_direction() {
        // Unconstrained optimum is (2, -1); constrained optimum lies on x2 = 0
        let a = array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
        let b = a.dot(&array![2.0, -1.0]);

        let unconstrained = least_squares(a.view(), b.view()).unwrap();
        assert!(unconstrained[1] < 0.0);

        let solution = nnls(a.view(), b.view(), 100).unwrap();
        assert!(solution.x.iter().all(|&v| v >= 0.0));
        assert_eq!(solution.x[1], 0.0);
        // minimise (x-2)^2 + 1 + (x-1)^2 -> x = 1.5
        assert!((solution.x[0] - 1.5).abs() < 1e-10);
    }

    #[test]
    fn test_nnls_all_negative_target_gives_zero() {
        let a = Array2::from_shape_vec((3, 2), vec![1.0, 2.0, 1.0, 0.5, 2.0, 1.0]).unwrap();
        let b = array![-1.0, -2.0, -3.0];

        let solution = nnls(a.view(), b.view(), 100).unwrap();
        assert_close(&solution.x, &[0.0, 0.0], 1e-15);
    }
}
