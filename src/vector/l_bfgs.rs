//! Limited-memory BFGS Quasi-Newton optimizer. Uses the two-loop recursion to
//! calculate the quasi-inverse-hessian, as formulated in
//!
//! Jorge Nocedal. Updating Quasi-Newton Matrices With Limited Storage.
//! MATHEMATICS OF  COMPUTATION, VOLUME 35,  NUMBER 151 JULY 1980, PAGES 773-782
//!
use float_cmp::ApproxEq;
use ndarray::prelude::*;
use std::iter::Chain;
use std::ops::Index;
use std::slice;
use std::time::Instant;
use tracing::{debug, trace};

use super::line_search::{norm_inf, search, wolfe_constants};
use crate::error::{Error, Result};
use crate::minimizer::{OptimResult, Status};
use crate::options::Options;
use crate::utils::WrappedFunction;

#[derive(Builder, Debug, Clone)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct LBFGS {
    /// Smaller is more precise.
    #[builder(default = "1e-5")]
    pub gtol: f64,

    /// Larger is more precise. Defaults to n*200 where n is the number of parameters.
    #[builder(default = "None")]
    #[builder(setter(into))]
    pub maxiter: Option<usize>,

    /// Number of correction pairs kept for the inverse-hessian approximation.
    #[builder(default = "10")]
    pub maxcor: usize,

    #[builder(default = "1e-4")]
    pub c1: f64,

    #[builder(default = "0.9")]
    pub c2: f64,

    #[builder(default = "1")]
    pub ulps: i64,
}

impl LBFGSBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(0) = self.maxcor {
            return Err("maxcor must be at least 1".to_string());
        }
        if let Some(gtol) = self.gtol {
            if !(gtol >= 0.0) {
                return Err(format!("gtol must be non-negative, got {gtol}"));
            }
        }
        wolfe_constants(self.c1, self.c2)
    }
}

impl LBFGS {
    /// Read `gtol`, `maxiter` and `maxcor`; other keys are ignored.
    pub fn from_options(options: &Options) -> Result<Self> {
        let mut builder = LBFGSBuilder::default();
        if let Some(gtol) = options.get_f64("gtol")? {
            builder.gtol(gtol);
        }
        if let Some(maxiter) = options.get_usize("maxiter")? {
            builder.maxiter(maxiter);
        }
        if let Some(maxcor) = options.get_usize("maxcor")? {
            builder.maxcor(maxcor);
        }
        builder.build().map_err(|e| Error::Builder(e.to_string()))
    }

    pub fn minimize<F>(&self, func: F, x0: ArrayView1<f64>) -> Result<OptimResult>
    where
        F: FnMut(ArrayView1<f64>) -> Result<(f64, Array1<f64>)>,
    {
        let start = Instant::now();
        let maxiter = self.maxiter.unwrap_or(200 * x0.len());
        let mut func = WrappedFunction::new(func);
        let mut iterations = 0;

        let mut hist = RobinVec::new();

        let mut x = x0.to_owned();
        let (mut fx, mut g) = func.call(x.view())?;

        let status = loop {
            if norm_inf(&g) <= self.gtol {
                break Status::GtolConvergence;
            }
            if iterations >= maxiter {
                break Status::MaxIterReached;
            }
            iterations += 1;

            let dir = -self.quasi_update(&g, &hist);
            let step = match search(&mut func, x.view(), fx, g.view(), dir.view(), self.c1, self.c2)? {
                Some(step) => step,
                None => break Status::LineSearchFailure,
            };

            let s = &step.x - &x;
            let y = &step.g - &g;
            let sy = s.dot(&y);
            let stalled = step.f.approx_eq(fx, (0.0, self.ulps));

            x = step.x;
            fx = step.f;
            g = step.g;
            trace!(iterations, f = fx, "L-BFGS step");
            if stalled {
                break Status::LineSearchFailure;
            }

            // only curvature-preserving pairs keep the approximation positive definite;
            // without one the next step restarts from steepest descent
            if sy > 0.0 {
                hist.push((s, y, 1f64 / sy), self.maxcor);
            } else {
                hist.clear();
            }
        };

        debug!(iterations, f_evals = func.num, f = fx, %status, "L-BFGS finished");
        Ok(OptimResult {
            minimum: x,
            minimum_value: fx,
            status,
            iterations,
            f_evals: func.num,
            runtime: start.elapsed(),
        })
    }

    fn quasi_update(
        &self,
        grad: &Array1<f64>,
        hist: &RobinVec<(Array1<f64>, Array1<f64>, f64)>,
    ) -> Array1<f64> {
        let mut q = grad.to_owned();
        let mut a = Vec::with_capacity(hist.len());

        for (si, yi, ri) in hist.iter().rev() {
            let ai = ri * si.dot(&q);
            q.scaled_add(-ai, yi);
            a.push(ai);
        }

        // H_0 * q
        if hist.len() > 0 {
            let (ref s, ref y, _) = hist[hist.len() - 1];
            q *= s.dot(y) / y.dot(y);
        }

        for ((si, yi, ri), ai) in hist.iter().zip(a.iter().rev()) {
            let bi = ri * yi.dot(&q);
            q.scaled_add(ai - bi, si);
        }
        q
    }
}

#[derive(Debug)]
struct RobinVec<T> {
    i0: usize,
    vec: Vec<T>,
}

impl<T> RobinVec<T> {
    pub fn new() -> RobinVec<T> {
        RobinVec {
            i0: 0,
            vec: Vec::new(),
        }
    }

    pub fn iter(&self) -> Chain<slice::Iter<T>, slice::Iter<T>> {
        self.vec[self.i0..].iter().chain(self.vec[..self.i0].iter())
    }

    pub fn len(&self) -> usize {
        self.vec.len()
    }

    pub fn clear(&mut self) {
        self.vec.clear();
        self.i0 = 0;
    }

    /// Append `el`, overwriting the oldest element once `size` are stored.
    pub fn push(&mut self, el: T, size: usize) {
        let n = self.vec.len();
        if size > n {
            if self.i0 == 0 {
                self.vec.push(el);
            } else {
                self.vec.insert(self.i0, el);
                self.i0 += 1;
            }
        } else {
            self.vec[self.i0] = el;
            self.i0 = (self.i0 + 1) % n;
        }
    }
}

impl<T> Index<usize> for RobinVec<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.vec[(index + self.i0) % self.vec.len()]
    }
}
