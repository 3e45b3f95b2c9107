//! Solver selection and tolerances.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Solve method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// Exact solve for dense operators, otherwise CG for hermitian operators
    /// and BiCGSTAB for the rest.
    #[default]
    Auto,
    /// Dense materialisation and LU / Cholesky.
    Exact,
    /// Batched restarted GMRES.
    Gmres,
    /// Batched conjugate gradient.
    Cg,
    /// Batched BiCGSTAB.
    Bicgstab,
    /// Slice-level GMRES, one (batch, column) system at a time.
    ExternalGmres,
}

impl Method {
    /// Parse from a string.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "exact" | "exactsolve" | "direct" | "lu" => Some(Self::Exact),
            "gmres" => Some(Self::Gmres),
            "cg" => Some(Self::Cg),
            "bicgstab" => Some(Self::Bicgstab),
            "external_gmres" | "scipy_gmres" | "wrap_gmres" => Some(Self::ExternalGmres),
            _ => None,
        }
    }

    /// Get the method name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Exact => "exact",
            Self::Gmres => "gmres",
            Self::Cg => "cg",
            Self::Bicgstab => "bicgstab",
            Self::ExternalGmres => "external_gmres",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Options shared by every solve method.
///
/// Iterative methods stop once every system satisfies
/// `||b - A x|| <= max(rtol * ||b||, atol)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    pub method: Method,
    /// Relative residual tolerance of the batched iterative methods.
    pub rtol: f64,
    /// Absolute residual tolerance of the batched iterative methods.
    pub atol: f64,
    /// Replacement for exact-zero denominators.
    pub eps: f64,
    /// Relative tolerance of the external GMRES path.
    pub min_eps: f64,
    /// Iteration cap. Each method has its own default based on the system
    /// size.
    pub max_niter: Option<usize>,
    /// Skip the power-iteration estimate when set.
    pub posdef: Option<bool>,
    /// Krylov dimension before GMRES restarts.
    pub restart: Option<usize>,
    /// Recompute the residual from scratch every this many CG / BiCGSTAB
    /// iterations. Zero disables the refresh.
    pub resid_calc_every: usize,
    /// Seed of the random probes used for the posdef estimate.
    pub seed: u64,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            method: Method::Auto,
            rtol: 1e-6,
            atol: 1e-8,
            eps: 1e-12,
            min_eps: 1e-9,
            max_niter: None,
            posdef: None,
            restart: None,
            resid_calc_every: 10,
            seed: 0,
        }
    }
}

impl SolveOptions {
    /// Parse options from JSON. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let opts: Self = serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        opts.validate()?;
        Ok(opts)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        let negative = |v: f64| v.is_nan() || v < 0.0;
        if negative(self.rtol) || negative(self.atol) || negative(self.min_eps) {
            return Err(Error::Config(format!(
                "tolerances must be non-negative (rtol {}, atol {}, min_eps {})",
                self.rtol, self.atol, self.min_eps
            )));
        }
        if self.eps.is_nan() || self.eps <= 0.0 {
            return Err(Error::Config(format!("eps must be positive, got {}", self.eps)));
        }
        if self.max_niter == Some(0) {
            return Err(Error::Config("max_niter must be at least 1".into()));
        }
        if self.restart == Some(0) {
            return Err(Error::Config("restart must be at least 1".into()));
        }
        Ok(())
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_rtol(mut self, rtol: f64) -> Self {
        self.rtol = rtol;
        self
    }

    pub fn with_atol(mut self, atol: f64) -> Self {
        self.atol = atol;
        self
    }

    pub fn with_eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    pub fn with_min_eps(mut self, min_eps: f64) -> Self {
        self.min_eps = min_eps;
        self
    }

    pub fn with_max_niter(mut self, max_niter: usize) -> Self {
        self.max_niter = Some(max_niter);
        self
    }

    pub fn with_posdef(mut self, posdef: bool) -> Self {
        self.posdef = Some(posdef);
        self
    }

    pub fn with_restart(mut self, restart: usize) -> Self {
        self.restart = Some(restart);
        self
    }

    pub fn with_resid_calc_every(mut self, every: usize) -> Self {
        self.resid_calc_every = every;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}
