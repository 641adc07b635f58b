//! Basin hopping: a random walk over the local minima of a function.
//!
//! Wales, D J and Doye J P K. Global Optimization by Basin-Hopping and the
//! Lowest Energy Structures of Lennard-Jones Clusters Containing up to 110
//! Atoms. 1997. Journal of Physical Chemistry A. 101, 5111.
//!
//! Every hop displaces the current minimum uniformly by at most `stepsize`
//! per coordinate, runs a local search from there and accepts the new minimum
//! with the Metropolis criterion at temperature `temperature`. The step size
//! adapts every `interval` hops so the acceptance rate approaches
//! `target_accept_rate`.
use ndarray::prelude::*;
use rand::Rng;
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, trace};

use super::rng;
use crate::bounds::Bounds;
use crate::error::{Error, Result};
use crate::minimizer::{OptimResult, Status};
use crate::options::Options;
use crate::utils::{with_approx_gradient, WrappedFunction, EPSILON};
use crate::vector::{BfgsBuilder, NelderMeadBuilder};

/// The local minimizer run after every hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalSearch {
    /// BFGS on forward-difference gradients.
    Bfgs,
    NelderMead,
}

impl FromStr for LocalSearch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "bfgs" => Ok(LocalSearch::Bfgs),
            "nelder-mead" | "neldermead" => Ok(LocalSearch::NelderMead),
            _ => Err(Error::NotSupported {
                family: "basin hopping minimizer",
                name: s.to_string(),
            }),
        }
    }
}

#[derive(Builder, Debug, Clone)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct BasinHopping {
    /// Number of hops after the initial local search.
    #[builder(default = "100")]
    pub niter: usize,

    /// Metropolis temperature. Zero accepts only downhill moves.
    #[builder(default = "1.0")]
    pub temperature: f64,

    #[builder(default = "0.5")]
    pub stepsize: f64,

    /// Hops between step size adjustments.
    #[builder(default = "50")]
    pub interval: usize,

    #[builder(default = "0.5")]
    pub target_accept_rate: f64,

    /// The step size is multiplied or divided by this at every adjustment.
    #[builder(default = "0.9")]
    pub stepwise_factor: f64,

    /// Stop once the best value has not improved for this many hops.
    #[builder(default = "None")]
    #[builder(setter(into))]
    pub niter_success: Option<usize>,

    #[builder(default = "LocalSearch::Bfgs")]
    pub minimizer: LocalSearch,

    #[builder(default = "None")]
    #[builder(setter(into))]
    pub seed: Option<u64>,
}

impl BasinHoppingBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(temperature) = self.temperature {
            if !(temperature >= 0.0) {
                return Err(format!("T must be non-negative, got {temperature}"));
            }
        }
        if let Some(stepsize) = self.stepsize {
            if !(stepsize > 0.0) {
                return Err(format!("stepsize must be positive, got {stepsize}"));
            }
        }
        if let Some(0) = self.interval {
            return Err("interval must be at least 1".to_string());
        }
        if let Some(factor) = self.stepwise_factor {
            if !(factor > 0.0 && factor < 1.0) {
                return Err(format!("stepwise_factor must lie in (0, 1), got {factor}"));
            }
        }
        Ok(())
    }
}

impl BasinHopping {
    /// Read the basin hopping keys: `niter`, `T`, `stepsize`, `interval`,
    /// `target_accept_rate`, `stepwise_factor`, `niter_success`, `minimizer`
    /// and `seed`.
    pub fn from_options(options: &Options) -> Result<Self> {
        let mut builder = BasinHoppingBuilder::default();
        if let Some(niter) = options.get_usize("niter")? {
            builder.niter(niter);
        }
        if let Some(temperature) = options.get_f64("T")? {
            builder.temperature(temperature);
        }
        if let Some(stepsize) = options.get_f64("stepsize")? {
            builder.stepsize(stepsize);
        }
        if let Some(interval) = options.get_usize("interval")? {
            builder.interval(interval);
        }
        if let Some(rate) = options.get_f64("target_accept_rate")? {
            builder.target_accept_rate(rate);
        }
        if let Some(factor) = options.get_f64("stepwise_factor")? {
            builder.stepwise_factor(factor);
        }
        if let Some(niter_success) = options.get_usize("niter_success")? {
            builder.niter_success(niter_success);
        }
        if let Some(minimizer) = options.get_str("minimizer")? {
            builder.minimizer(minimizer.parse()?);
        }
        if let Some(seed) = options.get_u64("seed")? {
            builder.seed(seed);
        }
        builder.build().map_err(|e| Error::Builder(e.to_string()))
    }

    /// Hop from the centre of `bounds`. The objective only ever sees points
    /// inside the box.
    pub fn minimize<F>(&self, func: F, bounds: &Bounds) -> Result<OptimResult>
    where
        F: FnMut(ArrayView1<f64>) -> Result<f64>,
    {
        let start = Instant::now();
        if bounds.is_empty() {
            return Err(Error::EmptyParameters);
        }
        let mut rng = rng(self.seed);
        let mut func = WrappedFunction::new(func);
        let mut objective = |x: ArrayView1<f64>| -> Result<f64> { func.call(bounds.clip(x).view()) };

        let (mut x, mut fx) = self.local_search(&mut objective, bounds, bounds.center().view())?;
        let mut best = x.clone();
        let mut best_value = fx;

        let mut stepsize = self.stepsize;
        let mut accepted = 0;
        let mut stale = 0;
        let mut iterations = 0;
        for hop in 1..=self.niter {
            iterations = hop;
            let displaced = x.mapv(|xi| xi + rng.random_range(-stepsize..=stepsize));
            let (candidate, value) =
                self.local_search(&mut objective, bounds, bounds.clip(displaced.view()).view())?;

            if self.accept(fx, value, &mut rng) {
                accepted += 1;
                x = candidate;
                fx = value;
            }
            if fx < best_value {
                best.assign(&x);
                best_value = fx;
                stale = 0;
            } else {
                stale += 1;
            }
            trace!(hop, f = fx, best = best_value, stepsize, "basin hop");

            if hop % self.interval == 0 {
                stepsize = self.adjust_step(stepsize, accepted as f64 / self.interval as f64);
                accepted = 0;
            }
            if self.niter_success.map_or(false, |limit| stale >= limit) {
                break;
            }
        }

        let f_evals = func.num;
        let status = Status::Completed;
        debug!(iterations, f_evals, f = best_value, %status, "basin hopping finished");
        Ok(OptimResult {
            minimum: best,
            minimum_value: best_value,
            status,
            iterations,
            f_evals,
            runtime: start.elapsed(),
        })
    }

    /// Local minimum reachable from `x0`, projected onto the box.
    fn local_search<F>(
        &self,
        objective: &mut F,
        bounds: &Bounds,
        x0: ArrayView1<f64>,
    ) -> Result<(Array1<f64>, f64)>
    where
        F: FnMut(ArrayView1<f64>) -> Result<f64>,
    {
        let res = match self.minimizer {
            LocalSearch::Bfgs => BfgsBuilder::default()
                .build()
                .map_err(|e| Error::Builder(e.to_string()))?
                .minimize(with_approx_gradient(objective, EPSILON), x0)?,
            LocalSearch::NelderMead => NelderMeadBuilder::default()
                .build()
                .map_err(|e| Error::Builder(e.to_string()))?
                .minimize(objective, x0)?,
        };
        Ok((bounds.clip(res.minimum.view()), res.minimum_value))
    }

    fn accept<R: Rng>(&self, current: f64, candidate: f64, rng: &mut R) -> bool {
        if candidate < current {
            return true;
        }
        if self.temperature == 0.0 || !candidate.is_finite() {
            return false;
        }
        let w = (-(candidate - current) / self.temperature).exp();
        rng.random::<f64>() < w
    }

    /// Grow the step when too many hops are accepted, shrink it otherwise.
    fn adjust_step(&self, stepsize: f64, accept_rate: f64) -> f64 {
        if accept_rate > self.target_accept_rate {
            stepsize / self.stepwise_factor
        } else {
            stepsize * self.stepwise_factor
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;
    use std::f64::consts::PI;

    fn rastrigin(x: ArrayView1<f64>) -> Result<f64> {
        Ok(10.0 * x.len() as f64
            + x.iter()
                .map(|&xi| xi * xi - 10.0 * (2.0 * PI * xi).cos())
                .sum::<f64>())
    }

    #[test]
    fn escapes_the_local_minimum_at_the_centre() {
        // the centre sits in the basin around 1; the global minimum is the origin
        let bounds = Bounds::new(&[(-3.0, 5.0)]).unwrap();
        let minimizer = BasinHoppingBuilder::default()
            .stepsize(1.5)
            .seed(42)
            .build()
            .unwrap();
        let res = minimizer.minimize(rastrigin, &bounds).unwrap();
        assert!(res.minimum_value < 1e-4, "{:?}", res);
        assert_eq!(res.status, Status::Completed);
        assert_eq!(res.iterations, 100);
    }

    #[test]
    fn nelder_mead_inner_search() {
        let bounds = Bounds::new(&[(-4.0, 4.0)]).unwrap();
        let minimizer = BasinHoppingBuilder::default()
            .minimizer(LocalSearch::NelderMead)
            .niter(20)
            .seed(5)
            .build()
            .unwrap();
        let res = minimizer
            .minimize(|x: ArrayView1<f64>| Ok((x[0] - 1.5).powi(2)), &bounds)
            .unwrap();
        assert!(approx_eq!(f64, res.minimum[0], 1.5, epsilon = 1e-3));
    }

    #[test]
    fn minimum_stays_inside_the_box() {
        let bounds = Bounds::new(&[(0.0, 1.0)]).unwrap();
        let minimizer = BasinHoppingBuilder::default()
            .niter(10)
            .seed(1)
            .build()
            .unwrap();
        let res = minimizer
            .minimize(|x: ArrayView1<f64>| Ok((x[0] - 10.0).powi(2)), &bounds)
            .unwrap();
        assert!(bounds.contains(res.minimum.view()));
        assert!(approx_eq!(f64, res.minimum[0], 1.0, epsilon = 1e-6));
        assert!(approx_eq!(f64, res.minimum_value, 81.0, epsilon = 1e-4));
    }

    #[test]
    fn stops_once_the_best_value_goes_stale() {
        let bounds = Bounds::new(&[(-2.0, 2.0), (-2.0, 2.0)]).unwrap();
        let minimizer = BasinHoppingBuilder::default()
            .niter_success(3)
            .temperature(0.0)
            .seed(8)
            .build()
            .unwrap();
        // the first local search already lands on the only minimum
        let res = minimizer
            .minimize(|x: ArrayView1<f64>| Ok(x.dot(&x)), &bounds)
            .unwrap();
        assert_eq!(res.iterations, 3);
        assert!(res.minimum_value < 1e-10);
    }

    #[test]
    fn seeded_runs_repeat() {
        let bounds = Bounds::new(&[(-3.0, 5.0), (-3.0, 5.0)]).unwrap();
        let minimizer = BasinHoppingBuilder::default().niter(15).seed(21).build().unwrap();
        let first = minimizer.minimize(rastrigin, &bounds).unwrap();
        let second = minimizer.minimize(rastrigin, &bounds).unwrap();
        assert_eq!(first.minimum, second.minimum);
        assert_eq!(first.f_evals, second.f_evals);
    }

    #[test]
    fn metropolis_and_step_adaptation() {
        let cold = BasinHoppingBuilder::default().temperature(0.0).build().unwrap();
        let mut rng = rng(Some(0));
        assert!(cold.accept(1.0, 0.5, &mut rng));
        assert!(!cold.accept(1.0, 1.0 + 1e-12, &mut rng));
        assert!(!cold.accept(1.0, f64::NAN, &mut rng));

        let hot = BasinHoppingBuilder::default().temperature(1e12).build().unwrap();
        assert!(hot.accept(1.0, 2.0, &mut rng));

        assert!(approx_eq!(f64, hot.adjust_step(0.9, 0.8), 1.0, epsilon = 1e-12));
        assert!(approx_eq!(f64, hot.adjust_step(1.0, 0.2), 0.9, epsilon = 1e-12));
    }

    #[test]
    fn evaluation_errors_propagate() {
        let bounds = Bounds::new(&[(0.0, 1.0)]).unwrap();
        let minimizer = BasinHoppingBuilder::default().seed(1).build().unwrap();
        let res = minimizer.minimize(|_x: ArrayView1<f64>| Err(Error::evaluation("nan loss")), &bounds);
        assert!(matches!(res, Err(Error::Evaluation(_))));
    }

    #[test]
    fn options_are_read_and_validated() {
        let options = Options::new()
            .with("niter", 5)
            .with("T", 0.5)
            .with("minimizer", "Nelder-Mead")
            .with("niter_success", 2);
        let bh = BasinHopping::from_options(&options).unwrap();
        assert_eq!(bh.niter, 5);
        assert_eq!(bh.temperature, 0.5);
        assert_eq!(bh.minimizer, LocalSearch::NelderMead);
        assert_eq!(bh.niter_success, Some(2));

        let options = Options::new().with("minimizer", "COBYLA");
        assert!(matches!(
            BasinHopping::from_options(&options),
            Err(Error::NotSupported { .. })
        ));
        let options = Options::new().with("T", -1.0);
        assert!(matches!(
            BasinHopping::from_options(&options),
            Err(Error::Builder(_))
        ));
        let options = Options::new().with("T", "hot");
        assert!(matches!(
            BasinHopping::from_options(&options),
            Err(Error::InvalidOption { .. })
        ));
    }
}
