//! Restarted GMRES for real linear systems.
//!
//! Solves A*x = b where A is represented by a [`RealOperator`]. The Krylov
//! basis is built with modified Gram-Schmidt and the small least-squares
//! problem is kept triangular with Givens rotations.

use crate::error::{Error, Result};
use crate::operator::RealOperator;

/// GMRES solver configuration.
#[derive(Debug, Clone)]
pub struct GmresConfig {
    /// Maximum number of inner iterations across all restart cycles.
    pub max_iter: usize,
    /// Relative tolerance on the residual norm.
    pub tol: f64,
    /// Absolute tolerance on the residual norm.
    pub atol: f64,
    /// Restart parameter (Krylov subspace dimension before restart).
    pub restart: usize,
}

impl Default for GmresConfig {
    fn default() -> Self {
        Self {
            max_iter: 500,
            tol: 1e-8,
            atol: 0.0,
            restart: 30,
        }
    }
}

impl GmresConfig {
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn with_atol(mut self, atol: f64) -> Self {
        self.atol = atol;
        self
    }

    pub fn with_restart(mut self, restart: usize) -> Self {
        self.restart = restart;
        self
    }
}

/// Result of a GMRES solve.
#[derive(Debug, Clone)]
pub struct GmresResult {
    /// Solution vector.
    pub x: Vec<f64>,
    /// Number of iterations performed.
    pub iterations: usize,
    /// Final relative residual.
    pub residual: f64,
    /// Whether the solver converged.
    pub converged: bool,
}

/// Solve A*x = b using restarted GMRES, starting from x = 0.
///
/// Converged means `||b - A x|| <= max(tol * ||b||, atol)`.
pub fn solve_gmres(op: &dyn RealOperator, b: &[f64], config: &GmresConfig) -> Result<GmresResult> {
    let n = op.dim();
    if b.len() != n {
        return Err(Error::DimensionMismatch {
            expected: n,
            actual: b.len(),
        });
    }

    let b_norm = vec_norm(b);
    if b_norm < 1e-30 {
        return Ok(GmresResult {
            x: vec![0.0; n],
            iterations: 0,
            residual: 0.0,
            converged: true,
        });
    }

    let stop = (config.tol * b_norm).max(config.atol);
    let m = config.restart.clamp(1, n.max(1));
    let mut x = vec![0.0; n];
    let mut total_iter = 0;

    loop {
        let mut r = residual(op, b, &x)?;
        let r_norm = vec_norm(&r);

        if r_norm <= stop {
            return Ok(GmresResult {
                x,
                iterations: total_iter,
                residual: r_norm / b_norm,
                converged: true,
            });
        }
        if total_iter >= config.max_iter {
            log::debug!(
                "gmres stopped after {} iterations, residual {:.3e}",
                total_iter,
                r_norm / b_norm
            );
            return Ok(GmresResult {
                x,
                iterations: total_iter,
                residual: r_norm / b_norm,
                converged: false,
            });
        }

        // Arnoldi process with modified Gram-Schmidt
        let mut v: Vec<Vec<f64>> = Vec::with_capacity(m + 1);
        let mut h = vec![vec![0.0; m + 1]; m];

        let inv_r_norm = 1.0 / r_norm;
        for ri in r.iter_mut() {
            *ri *= inv_r_norm;
        }
        v.push(r);

        // g = ||r|| * e_1
        let mut g = vec![0.0; m + 1];
        g[0] = r_norm;

        let mut cs = vec![0.0; m];
        let mut sn = vec![0.0; m];

        let mut k = 0;
        while k < m && total_iter < config.max_iter {
            total_iter += 1;

            let mut w = vec![0.0; n];
            op.apply(&v[k], &mut w)?;

            for j in 0..=k {
                let hij = dot(&v[j], &w);
                h[k][j] = hij;
                for (wi, vi) in w.iter_mut().zip(&v[j]) {
                    *wi -= hij * vi;
                }
            }

            let w_norm = vec_norm(&w);
            h[k][k + 1] = w_norm;
            let breakdown = w_norm < 1e-30;
            if !breakdown {
                let inv_w = 1.0 / w_norm;
                v.push(w.iter().map(|&wi| wi * inv_w).collect());
            }

            // Apply previous Givens rotations to the new column
            for j in 0..k {
                let temp = cs[j] * h[k][j] + sn[j] * h[k][j + 1];
                h[k][j + 1] = -sn[j] * h[k][j] + cs[j] * h[k][j + 1];
                h[k][j] = temp;
            }

            let (c, s) = givens_rotation(h[k][k], h[k][k + 1]);
            cs[k] = c;
            sn[k] = s;
            h[k][k] = c * h[k][k] + s * h[k][k + 1];
            h[k][k + 1] = 0.0;

            g[k + 1] = -s * g[k];
            g[k] *= c;

            k += 1;
            if breakdown || g[k].abs() <= stop {
                break;
            }
        }

        // Back-substitution for H*y = g
        let mut y = vec![0.0; k];
        for i in (0..k).rev() {
            let mut sum = g[i];
            for j in (i + 1)..k {
                sum -= h[j][i] * y[j];
            }
            if h[i][i].abs() > 1e-30 {
                y[i] = sum / h[i][i];
            }
        }

        for (vi, yi) in v.iter().zip(&y) {
            for (xj, vij) in x.iter_mut().zip(vi) {
                *xj += vij * yi;
            }
        }
    }
}

fn residual(op: &dyn RealOperator, b: &[f64], x: &[f64]) -> Result<Vec<f64>> {
    let mut ax = vec![0.0; b.len()];
    op.apply(x, &mut ax)?;
    Ok(b.iter().zip(&ax).map(|(bi, axi)| bi - axi).collect())
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn vec_norm(v: &[f64]) -> f64 {
    dot(v, v).sqrt()
}

fn givens_rotation(a: f64, b: f64) -> (f64, f64) {
    if b.abs() < 1e-30 {
        return (1.0, 0.0);
    }
    let r = a.hypot(b);
    (a / r, b / r)
}
