//! BFGS quasi-Newton minimizer with a dense inverse-Hessian approximation.
//!
//! The objective returns its value and gradient together. For objectives
//! without an analytic gradient wrap them in
//! [`with_approx_gradient`](crate::utils::with_approx_gradient).
//!
//! # Examples
//!
//! ```
//! # use ndarray::prelude::*;
//! # use regressor::vector::BfgsBuilder;
//! let rosenbrock = |x: ArrayView1<f64>| {
//!     let value = (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0].powi(2)).powi(2);
//!     let gradient = arr1(&[
//!         -2.0 * (1.0 - x[0]) - 400.0 * x[0] * (x[1] - x[0].powi(2)),
//!         200.0 * (x[1] - x[0].powi(2)),
//!     ]);
//!     Ok((value, gradient))
//! };
//! let minimizer = BfgsBuilder::default().gtol(1e-8).build().unwrap();
//! let res = minimizer.minimize(rosenbrock, arr1(&[-1.2, 1.0]).view()).unwrap();
//! assert!((res.minimum[0] - 1.0).abs() < 1e-4);
//! ```
use float_cmp::ApproxEq;
use ndarray::prelude::*;
use std::time::Instant;
use tracing::{debug, trace};

use super::line_search::{norm_inf, search, wolfe_constants};
use crate::error::{Error, Result};
use crate::minimizer::{OptimResult, Status};
use crate::options::Options;
use crate::utils::WrappedFunction;

#[derive(Builder, Debug, Clone)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct Bfgs {
    /// Stop once the largest gradient entry is at most this.
    #[builder(default = "1e-5")]
    pub gtol: f64,

    /// The maximum number of iterations. Defaults to n*200 where n is the number of parameters.
    #[builder(default = "None")]
    #[builder(setter(into))]
    pub maxiter: Option<usize>,

    /// Sufficient decrease constant of the line search.
    #[builder(default = "1e-4")]
    pub c1: f64,

    /// Curvature constant of the line search, between `c1` and 1.
    #[builder(default = "0.9")]
    pub c2: f64,

    /// Function values this many ULPs apart count as unchanged.
    #[builder(default = "1")]
    pub ulps: i64,
}

impl BfgsBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(gtol) = self.gtol {
            if !(gtol >= 0.0) {
                return Err(format!("gtol must be non-negative, got {gtol}"));
            }
        }
        wolfe_constants(self.c1, self.c2)
    }
}

impl Bfgs {
    /// Read `gtol` and `maxiter`; other keys are ignored.
    pub fn from_options(options: &Options) -> Result<Self> {
        let mut builder = BfgsBuilder::default();
        if let Some(gtol) = options.get_f64("gtol")? {
            builder.gtol(gtol);
        }
        if let Some(maxiter) = options.get_usize("maxiter")? {
            builder.maxiter(maxiter);
        }
        builder.build().map_err(|e| Error::Builder(e.to_string()))
    }

    pub fn minimize<F>(&self, func: F, x0: ArrayView1<f64>) -> Result<OptimResult>
    where
        F: FnMut(ArrayView1<f64>) -> Result<(f64, Array1<f64>)>,
    {
        let start = Instant::now();
        let n = x0.len();
        let maxiter = self.maxiter.unwrap_or(200 * n);
        let mut func = WrappedFunction::new(func);

        let mut x = x0.to_owned();
        let (mut fx, mut g) = func.call(x.view())?;
        let mut h = Array2::<f64>::eye(n);
        let mut iterations = 0;

        let status = loop {
            if norm_inf(&g) <= self.gtol {
                break Status::GtolConvergence;
            }
            if iterations >= maxiter {
                break Status::MaxIterReached;
            }
            iterations += 1;

            let dir = -h.dot(&g);
            let step = match search(&mut func, x.view(), fx, g.view(), dir.view(), self.c1, self.c2)? {
                Some(step) => step,
                None => break Status::LineSearchFailure,
            };
            let s = &step.x - &x;
            let y = &step.g - &g;
            let stalled = step.f.approx_eq(fx, (0.0, self.ulps));
            x = step.x;
            fx = step.f;
            g = step.g;
            trace!(iterations, f = fx, "BFGS step");
            if stalled {
                break Status::LineSearchFailure;
            }

            let ys = y.dot(&s);
            if ys > 0.0 {
                if iterations == 1 {
                    h = Array2::eye(n) * (ys / y.dot(&y));
                }
                let rho = 1.0 / ys;
                let hy = h.dot(&y);
                let yhy = y.dot(&hy);
                h.scaled_add(rho * (1.0 + rho * yhy), &outer(&s, &s));
                h.scaled_add(-rho, &outer(&s, &hy));
                h.scaled_add(-rho, &outer(&hy, &s));
            }
        };

        debug!(iterations, f_evals = func.num, f = fx, %status, "BFGS finished");
        Ok(OptimResult {
            minimum: x,
            minimum_value: fx,
            status,
            iterations,
            f_evals: func.num,
            runtime: start.elapsed(),
        })
    }
}

fn outer(a: &Array1<f64>, b: &Array1<f64>) -> Array2<f64> {
    Array2::from_shape_fn((a.len(), b.len()), |(i, j)| a[i] * b[j])
}
