// Small dense solvers and design-matrix helpers for the online fits

use ndarray::{Array1, Array2, Axis};

/// Solve `a * x = b` by Gaussian elimination with partial pivoting.
///
/// Returns `None` when a pivot falls below `1e-10` times the largest
/// diagonal magnitude, i.e. the system is singular for our purposes.
pub fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Option<Array1<f64>> {
    let n = b.len();
    if a.nrows() != n || a.ncols() != n || n == 0 {
        return None;
    }

    let scale = a.diag().iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    if !(scale > 0.0) || !scale.is_finite() {
        return None;
    }
    let tolerance = 1e-10 * scale;

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))?;
        if a[[pivot_row, col]].abs() < tolerance {
            return None;
        }

        if pivot_row != col {
            for k in 0..n {
                a.swap([col, k], [pivot_row, k]);
            }
            b.swap(col, pivot_row);
        }

        for row in (col + 1)..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = Array1::<f64>::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|k| a[[row, k]] * x[k]).sum();
        x[row] = (b[row] - tail) / a[[row, row]];
    }

    if x.iter().all(|v| v.is_finite()) {
        Some(x)
    } else {
        None
    }
}

/// Column-standardized design matrix with a leading intercept column.
///
/// Columns with (near) zero variance are left out; their coefficient is
/// reported as 0 after un-standardizing.
#[derive(Debug, Clone)]
pub struct Standardized {
    pub design: Array2<f64>,
    means: Vec<f64>,
    stds: Vec<f64>,
    active: Vec<usize>,
    n_features: usize,
}

impl Standardized {
    pub fn new(raw: &Array2<f64>) -> Self {
        let n_features = raw.ncols();
        let means: Vec<f64> = raw
            .mean_axis(Axis(0))
            .map(|m| m.to_vec())
            .unwrap_or_else(|| vec![0.0; n_features]);
        let stds: Vec<f64> = raw.std_axis(Axis(0), 0.0).to_vec();
        let active: Vec<usize> = (0..n_features)
            .filter(|&j| stds[j] > 1e-12 * means[j].abs().max(1.0))
            .collect();

        let mut design = Array2::<f64>::ones((raw.nrows(), active.len() + 1));
        for (c, &j) in active.iter().enumerate() {
            for i in 0..raw.nrows() {
                design[[i, c + 1]] = (raw[[i, j]] - means[j]) / stds[j];
            }
        }

        Self {
            design,
            means,
            stds,
            active,
            n_features,
        }
    }

    /// Map coefficients fitted on the standardized design back to raw
    /// feature units. Returns `(intercept, coefficients)`.
    pub fn unstandardize(&self, beta: &Array1<f64>) -> (f64, Vec<f64>) {
        let mut coefficients = vec![0.0; self.n_features];
        let mut intercept = beta[0];
        for (c, &j) in self.active.iter().enumerate() {
            let coef = beta[c + 1] / self.stds[j];
            coefficients[j] = coef;
            intercept -= coef * self.means[j];
        }
        (intercept, coefficients)
    }

    pub fn width(&self) -> usize {
        self.design.ncols()
    }
}
