use log::{debug, trace};
use nalgebra::DMatrix;
use std::time::Instant;

use crate::algebra::RatFunc;
use crate::error::{CircuitError, Result};

/// Solver configuration
#[derive(Debug, Clone)]
pub struct SolverConfig {
    pub pivot: PivotStrategy,
    /// Reject empty rows and columns before elimination.
    pub check_structure: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            pivot: PivotStrategy::Simplest,
            check_structure: true,
        }
    }
}

/// How the pivot row is chosen in each column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PivotStrategy {
    /// First non-zero entry at or below the diagonal
    FirstNonZero,
    /// Non-zero entry with the fewest polynomial terms, which keeps
    /// intermediate expressions small
    Simplest,
}

/// Solver statistics
#[derive(Debug, Clone, Default)]
pub struct SolverStats {
    pub size: usize,
    pub rhs_columns: usize,
    pub row_swaps: usize,
    pub eliminations: usize,
    pub solve_time: f64,
    pub success: bool,
}

/// Exact Gauss-Jordan elimination over rational functions
#[derive(Debug, Clone, Default)]
pub struct LinearSolver {
    config: SolverConfig,
}

impl LinearSolver {
    /// Create a new solver with default configuration
    pub fn new() -> Self {
        LinearSolver {
            config: SolverConfig::default(),
        }
    }

    /// Create a new solver with custom configuration
    pub fn with_config(config: SolverConfig) -> Self {
        LinearSolver { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Solve `A X = B` for every column of `B`.
    ///
    /// `names` labels the unknowns; a singular matrix is reported as
    /// [`CircuitError::Indeterminate`] naming the unknown whose column has no pivot.
    pub fn solve(
        &self,
        matrix: &DMatrix<RatFunc>,
        rhs: &DMatrix<RatFunc>,
        names: &[String],
    ) -> Result<(DMatrix<RatFunc>, SolverStats)> {
        let start_time = Instant::now();
        let n = matrix.nrows();
        if matrix.ncols() != n {
            return Err(CircuitError::Evaluation("matrix must be square".to_string()));
        }
        if rhs.nrows() != n {
            return Err(CircuitError::Evaluation(
                "matrix and right-hand side dimensions don't match".to_string(),
            ));
        }

        let mut a = matrix.clone();
        let mut b = rhs.clone();
        let mut stats = SolverStats {
            size: n,
            rhs_columns: rhs.ncols(),
            ..SolverStats::default()
        };

        for col in 0..n {
            let pivot_row = self.find_pivot(&a, col).ok_or_else(|| CircuitError::Indeterminate {
                unknown: names.get(col).cloned().unwrap_or_else(|| format!("x{}", col)),
            })?;
            if pivot_row != col {
                a.swap_rows(pivot_row, col);
                b.swap_rows(pivot_row, col);
                stats.row_swaps += 1;
            }

            let pivot = a[(col, col)].clone();
            if !pivot.is_one() {
                let inv = pivot.recip().ok_or_else(|| CircuitError::Indeterminate {
                    unknown: names.get(col).cloned().unwrap_or_default(),
                })?;
                for j in col..n {
                    if !a[(col, j)].is_zero() {
                        a[(col, j)] = &a[(col, j)] * &inv;
                    }
                }
                for j in 0..b.ncols() {
                    if !b[(col, j)].is_zero() {
                        b[(col, j)] = &b[(col, j)] * &inv;
                    }
                }
            }

            for row in 0..n {
                if row == col || a[(row, col)].is_zero() {
                    continue;
                }
                let factor = a[(row, col)].clone();
                for j in col..n {
                    if !a[(col, j)].is_zero() {
                        a[(row, j)] = &a[(row, j)] - &(&factor * &a[(col, j)]);
                    }
                }
                for j in 0..b.ncols() {
                    if !b[(col, j)].is_zero() {
                        b[(row, j)] = &b[(row, j)] - &(&factor * &b[(col, j)]);
                    }
                }
                stats.eliminations += 1;
            }
            trace!("Eliminated column {} of {}", col + 1, n);
        }

        stats.solve_time = start_time.elapsed().as_secs_f64();
        stats.success = true;
        debug!(
            "Solved {}x{} system with {} column(s) in {:.3} ms",
            n,
            n,
            stats.rhs_columns,
            stats.solve_time * 1000.0
        );
        Ok((b, stats))
    }

    fn find_pivot(&self, a: &DMatrix<RatFunc>, col: usize) -> Option<usize> {
        let candidates = (col..a.nrows()).filter(|&r| !a[(r, col)].is_zero());
        match self.config.pivot {
            PivotStrategy::FirstNonZero => candidates.into_iter().next(),
            PivotStrategy::Simplest => candidates.min_by_key(|&r| complexity(&a[(r, col)])),
        }
    }

    /// Determinant by fraction-based elimination; zero for a singular matrix.
    pub fn determinant(&self, matrix: &DMatrix<RatFunc>) -> Result<RatFunc> {
        let n = matrix.nrows();
        if matrix.ncols() != n {
            return Err(CircuitError::Evaluation("matrix must be square".to_string()));
        }
        let mut a = matrix.clone();
        let mut det = RatFunc::one();
        for col in 0..n {
            let pivot_row = match self.find_pivot(&a, col) {
                Some(row) => row,
                None => return Ok(RatFunc::zero()),
            };
            if pivot_row != col {
                a.swap_rows(pivot_row, col);
                det = -det;
            }
            let pivot = a[(col, col)].clone();
            det = &det * &pivot;
            for row in (col + 1)..n {
                if a[(row, col)].is_zero() {
                    continue;
                }
                let factor = a[(row, col)].try_div(&pivot)?;
                for j in col..n {
                    if !a[(col, j)].is_zero() {
                        a[(row, j)] = &a[(row, j)] - &(&factor * &a[(col, j)]);
                    }
                }
            }
        }
        Ok(det)
    }

    /// Inverse through elimination against the identity.
    pub fn inverse(&self, matrix: &DMatrix<RatFunc>) -> Result<DMatrix<RatFunc>> {
        let n = matrix.nrows();
        let identity = DMatrix::from_fn(n, n, |i, j| if i == j { RatFunc::one() } else { RatFunc::zero() });
        let names: Vec<String> = (0..n).map(|i| format!("x{}", i + 1)).collect();
        let (inv, _) = self.solve(matrix, &identity, &names)?;
        Ok(inv)
    }
}

/// Size of a rational function, in polynomial terms.
fn complexity(value: &RatFunc) -> usize {
    value.numer().len() + value.denom().len()
}
