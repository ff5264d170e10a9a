//! Polynomial Regression
//!
//! Least-squares polynomial fit used to turn a sparse acceleration sample
//! table into a smooth gain curve.
//!
//! # Algorithm
//!
//! For samples `(x_i, y_i)` and degree `D` the normal equations
//!
//! ```text
//! (VᵀV) c = Vᵀy        V[i][j] = x_i^j
//! ```
//!
//! are assembled directly from power sums and solved with Gaussian
//! elimination using partial pivoting. A pivot that collapses relative to the
//! largest diagonal entry means the system is singular (typically duplicate
//! x-values leaving fewer than `D + 1` distinct points).

use thiserror::Error;

/// Relative pivot tolerance below which the system is treated as singular
const SINGULAR_TOLERANCE: f64 = 1e-12;

/// Curve fitting failure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    /// Not enough samples for the requested degree
    #[error("{samples} samples cannot determine a degree-{degree} polynomial")]
    TooFewSamples {
        /// Number of samples supplied
        samples: usize,
        /// Requested degree
        degree: usize,
    },

    /// Normal equations are singular
    #[error("sample matrix is singular")]
    Singular,

    /// Input or result contained NaN/infinity
    #[error("non-finite value in fit")]
    NonFinite,
}

/// Fitted polynomial `c0 + c1·x + … + cD·x^D`
#[derive(Debug, Clone, PartialEq)]
pub struct PolynomialRegression {
    /// Coefficients in ascending powers
    coefficients: Vec<f64>,
}

impl PolynomialRegression {
    /// Fit a degree-`degree` polynomial to `points`
    pub fn fit(points: &[(f64, f64)], degree: usize) -> Result<Self, FitError> {
        let n = points.len();
        if n < 2 || n < degree + 1 {
            return Err(FitError::TooFewSamples {
                samples: n,
                degree,
            });
        }
        if points.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(FitError::NonFinite);
        }

        let size = degree + 1;

        // Power sums Σx^k for k in 0..=2D and Σx^k·y for k in 0..=D
        let mut power_sums = vec![0.0; 2 * degree + 1];
        let mut rhs = vec![0.0; size];
        for &(x, y) in points {
            let mut p = 1.0;
            for (k, sum) in power_sums.iter_mut().enumerate() {
                *sum += p;
                if k < size {
                    rhs[k] += p * y;
                }
                p *= x;
            }
        }

        let mut matrix: Vec<Vec<f64>> = (0..size)
            .map(|row| (0..size).map(|col| power_sums[row + col]).collect())
            .collect();

        let coefficients = solve(&mut matrix, &mut rhs)?;
        if coefficients.iter().any(|c| !c.is_finite()) {
            return Err(FitError::NonFinite);
        }

        Ok(Self { coefficients })
    }

    /// Coefficients in ascending powers
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Polynomial degree
    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    /// Evaluate at `x` (Horner's method)
    pub fn evaluate(&self, x: f64) -> f64 {
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, &c| acc * x + c)
    }

    /// Evaluate the first derivative at `x`
    pub fn derivative(&self, x: f64) -> f64 {
        self.coefficients
            .iter()
            .enumerate()
            .skip(1)
            .rev()
            .fold(0.0, |acc, (power, &c)| acc * x + c * power as f64)
    }

    /// Coefficient of determination against `points`
    pub fn r_squared(&self, points: &[(f64, f64)]) -> f64 {
        if points.is_empty() {
            return 0.0;
        }
        let mean = points.iter().map(|(_, y)| y).sum::<f64>() / points.len() as f64;
        let ss_tot: f64 = points.iter().map(|(_, y)| (y - mean).powi(2)).sum();
        let ss_res: f64 = points
            .iter()
            .map(|&(x, y)| (y - self.evaluate(x)).powi(2))
            .sum();

        if ss_tot == 0.0 {
            if ss_res == 0.0 {
                1.0
            } else {
                0.0
            }
        } else {
            1.0 - ss_res / ss_tot
        }
    }
}

/// Gaussian elimination with partial pivoting, in place
fn solve(matrix: &mut [Vec<f64>], rhs: &mut [f64]) -> Result<Vec<f64>, FitError> {
    let size = rhs.len();
    let scale = matrix
        .iter()
        .enumerate()
        .map(|(i, row)| row[i].abs())
        .fold(0.0_f64, f64::max);
    if scale == 0.0 || !scale.is_finite() {
        return Err(FitError::Singular);
    }

    for col in 0..size {
        let pivot_row = (col..size)
            .max_by(|&a, &b| matrix[a][col].abs().total_cmp(&matrix[b][col].abs()))
            .unwrap_or(col);

        if matrix[pivot_row][col].abs() <= SINGULAR_TOLERANCE * scale {
            return Err(FitError::Singular);
        }

        matrix.swap(col, pivot_row);
        rhs.swap(col, pivot_row);

        for row in (col + 1)..size {
            let factor = matrix[row][col] / matrix[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..size {
                matrix[row][k] -= factor * matrix[col][k];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut solution = vec![0.0; size];
    for row in (0..size).rev() {
        let tail: f64 = ((row + 1)..size)
            .map(|k| matrix[row][k] * solution[k])
            .sum();
        solution[row] = (rhs[row] - tail) / matrix[row][row];
    }

    Ok(solution)
}
