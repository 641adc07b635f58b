//! Differential evolution over a bounded box.
//!
//! Storn, R and Price, K. Differential Evolution - a Simple and Efficient
//! Heuristic for Global Optimization over Continuous Spaces. 1997. Journal of
//! Global Optimization. 11, pp 341--359
//!
//! The population lives in the unit hypercube and is mapped onto the bounds
//! for every evaluation. Each generation builds one trial vector per member
//! from a mutant (see [`Mutation`]) and a crossover with the member (see
//! [`Crossover`]); the trial replaces the member immediately when it is not
//! worse. The run converges once the spread of the population's energies
//! satisfies `std <= atol + tol * |mean|`.
//!
//! # Examples
//!
//! ```
//! # use ndarray::prelude::*;
//! # use regressor::bounds::Bounds;
//! # use regressor::global::DifferentialEvolutionBuilder;
//! let sphere = |x: ArrayView1<f64>| Ok(x.dot(&x));
//! let bounds = Bounds::new(&[(-5.0, 5.0), (-5.0, 5.0)]).unwrap();
//! let minimizer = DifferentialEvolutionBuilder::default().seed(42).build().unwrap();
//! let res = minimizer.minimize(sphere, &bounds).unwrap();
//! assert!(res.minimum_value < 1e-6);
//! ```
use ndarray::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, trace};

use super::rng;
use crate::bounds::Bounds;
use crate::error::{Error, Result};
use crate::minimizer::{OptimResult, Status};
use crate::options::Options;
use crate::utils::{with_approx_gradient, WrappedFunction, EPSILON};
use crate::vector::BfgsBuilder;

/// How the mutant vector is formed from the population.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// `best + F (r0 - r1)`
    Best1,
    /// `r0 + F (r1 - r2)`
    Rand1,
    /// `x + F (best - x + r0 - r1)`
    CurrentToBest1,
    /// `r0 + F (best - r0 + r1 - r2)`
    RandToBest1,
    /// `best + F (r0 + r1 - r2 - r3)`
    Best2,
    /// `r0 + F (r1 + r2 - r3 - r4)`
    Rand2,
}

impl Mutation {
    /// Distinct population members drawn per trial.
    fn samples(self) -> usize {
        match self {
            Mutation::Best1 | Mutation::CurrentToBest1 => 2,
            Mutation::Rand1 | Mutation::RandToBest1 => 3,
            Mutation::Best2 => 4,
            Mutation::Rand2 => 5,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Mutation::Best1 => "best1",
            Mutation::Rand1 => "rand1",
            Mutation::CurrentToBest1 => "currenttobest1",
            Mutation::RandToBest1 => "randtobest1",
            Mutation::Best2 => "best2",
            Mutation::Rand2 => "rand2",
        }
    }
}

/// How the trial vector mixes the mutant into the member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crossover {
    /// Every coordinate is taken from the mutant with the recombination probability.
    Binomial,
    /// A run of consecutive coordinates is taken from the mutant.
    Exponential,
}

/// A mutation and crossover pair, written like `best1bin` or `rand2exp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Strategy {
    pub mutation: Mutation,
    pub crossover: Crossover,
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy {
            mutation: Mutation::Best1,
            crossover: Crossover::Binomial,
        }
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_lowercase();
        let not_supported = || Error::NotSupported {
            family: "differential evolution",
            name: s.to_string(),
        };
        let (head, crossover) = if let Some(head) = lower.strip_suffix("bin") {
            (head, Crossover::Binomial)
        } else if let Some(head) = lower.strip_suffix("exp") {
            (head, Crossover::Exponential)
        } else {
            return Err(not_supported());
        };
        let mutation = match head {
            "best1" => Mutation::Best1,
            "rand1" => Mutation::Rand1,
            "currenttobest1" => Mutation::CurrentToBest1,
            "randtobest1" => Mutation::RandToBest1,
            "best2" => Mutation::Best2,
            "rand2" => Mutation::Rand2,
            _ => return Err(not_supported()),
        };
        Ok(Strategy { mutation, crossover })
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = match self.crossover {
            Crossover::Binomial => "bin",
            Crossover::Exponential => "exp",
        };
        write!(f, "{}{}", self.mutation.name(), suffix)
    }
}

/// Initial population layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Init {
    /// One member per stratum along every axis.
    LatinHypercube,
    /// Uniform draws over the box.
    Random,
}

impl FromStr for Init {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "latinhypercube" => Ok(Init::LatinHypercube),
            "random" => Ok(Init::Random),
            _ => Err(Error::NotSupported {
                family: "population initialization",
                name: s.to_string(),
            }),
        }
    }
}

#[derive(Builder, Debug, Clone)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct DifferentialEvolution {
    #[builder(default)]
    pub strategy: Strategy,

    /// Maximum number of generations.
    #[builder(default = "1000")]
    pub maxiter: usize,

    /// Population size multiplier; the population holds `popsize * n` members, at least 5.
    #[builder(default = "15")]
    pub popsize: usize,

    /// Relative tolerance on the spread of the population energies.
    #[builder(default = "0.01")]
    pub tol: f64,

    /// Absolute tolerance on the spread of the population energies.
    #[builder(default = "0.0")]
    pub atol: f64,

    /// Differential weight. When unset a new weight is drawn from [0.5, 1) every
    /// generation, which speeds up convergence on most problems.
    #[builder(default = "None")]
    #[builder(setter(into))]
    pub mutation: Option<f64>,

    /// Crossover probability.
    #[builder(default = "0.7")]
    pub recombination: f64,

    #[builder(default = "Init::LatinHypercube")]
    pub init: Init,

    /// Refine the best member with BFGS on finite-difference gradients, clipped to the bounds.
    #[builder(default = "true")]
    pub polish: bool,

    /// Seed for reproducible runs. Unseeded runs draw from the OS.
    #[builder(default = "None")]
    #[builder(setter(into))]
    pub seed: Option<u64>,
}

impl DifferentialEvolutionBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(0) = self.popsize {
            return Err("popsize must be at least 1".to_string());
        }
        if let Some(recombination) = self.recombination {
            if !(0.0..=1.0).contains(&recombination) {
                return Err(format!("recombination must lie in [0, 1], got {recombination}"));
            }
        }
        if let Some(Some(mutation)) = self.mutation {
            if !(0.0..=2.0).contains(&mutation) {
                return Err(format!("mutation must lie in [0, 2], got {mutation}"));
            }
        }
        if let Some(tol) = self.tol {
            if !(tol >= 0.0) {
                return Err(format!("tol must be non-negative, got {tol}"));
            }
        }
        Ok(())
    }
}

impl DifferentialEvolution {
    /// Read the differential evolution keys: `strategy`, `maxiter`, `popsize`,
    /// `tol`, `atol`, `mutation`, `recombination`, `init`, `polish` and `seed`.
    pub fn from_options(options: &Options) -> Result<Self> {
        let mut builder = DifferentialEvolutionBuilder::default();
        if let Some(strategy) = options.get_str("strategy")? {
            builder.strategy(strategy.parse()?);
        }
        if let Some(maxiter) = options.get_usize("maxiter")? {
            builder.maxiter(maxiter);
        }
        if let Some(popsize) = options.get_usize("popsize")? {
            builder.popsize(popsize);
        }
        if let Some(tol) = options.get_f64("tol")? {
            builder.tol(tol);
        }
        if let Some(atol) = options.get_f64("atol")? {
            builder.atol(atol);
        }
        if let Some(mutation) = options.get_f64("mutation")? {
            builder.mutation(mutation);
        }
        if let Some(recombination) = options.get_f64("recombination")? {
            builder.recombination(recombination);
        }
        if let Some(init) = options.get_str("init")? {
            builder.init(init.parse()?);
        }
        if let Some(polish) = options.get_bool("polish")? {
            builder.polish(polish);
        }
        if let Some(seed) = options.get_u64("seed")? {
            builder.seed(seed);
        }
        builder.build().map_err(|e| Error::Builder(e.to_string()))
    }

    pub fn minimize<F>(&self, func: F, bounds: &Bounds) -> Result<OptimResult>
    where
        F: FnMut(ArrayView1<f64>) -> Result<f64>,
    {
        let start = Instant::now();
        let n = bounds.len();
        if n == 0 {
            return Err(Error::EmptyParameters);
        }
        let mut rng = rng(self.seed);
        let mut func = WrappedFunction::new(func);

        let np = self
            .popsize
            .checked_mul(n)
            .ok_or_else(|| Error::InvalidOption {
                key: "popsize".to_string(),
                expected: "a population that fits in memory",
                found: format!("{} x {n} parameters", self.popsize),
            })?
            .max(5)
            .max(self.strategy.mutation.samples() + 1);
        let mut population = self.init_population(np, n, &mut rng);
        let mut energies = Array1::<f64>::zeros(np);
        for (energy, member) in energies.iter_mut().zip(population.outer_iter()) {
            *energy = func.call(bounds.scale(member).view())?;
        }
        let mut best = argmin(&energies);

        let mut status = Status::MaxIterReached;
        let mut iterations = 0;
        for generation in 1..=self.maxiter {
            iterations = generation;
            let scale = match self.mutation {
                Some(scale) => scale,
                None => rng.random_range(0.5..1.0),
            };
            for candidate in 0..np {
                let trial = self.trial(candidate, best, &population, scale, &mut rng);
                let energy = func.call(bounds.scale(trial.view()).view())?;
                if energy <= energies[candidate] || energies[candidate].is_nan() {
                    population.row_mut(candidate).assign(&trial);
                    energies[candidate] = energy;
                    if energy < energies[best] || energies[best].is_nan() {
                        best = candidate;
                    }
                }
            }
            trace!(generation, best = energies[best], "differential evolution generation");
            if self.converged(&energies) {
                status = Status::FtolConvergence;
                break;
            }
        }

        let mut minimum = bounds.scale(population.row(best));
        let mut minimum_value = energies[best];

        if self.polish {
            let polisher = BfgsBuilder::default()
                .build()
                .map_err(|e| Error::Builder(e.to_string()))?;
            let clipped = |x: ArrayView1<f64>| -> Result<f64> { func.call(bounds.clip(x).view()) };
            let polished = polisher.minimize(with_approx_gradient(clipped, EPSILON), minimum.view())?;
            if polished.minimum_value < minimum_value {
                minimum = bounds.clip(polished.minimum.view());
                minimum_value = polished.minimum_value;
            }
        }

        debug!(iterations, f_evals = func.num, f = minimum_value, %status, strategy = %self.strategy, "differential evolution finished");
        Ok(OptimResult {
            minimum,
            minimum_value,
            status,
            iterations,
            f_evals: func.num,
            runtime: start.elapsed(),
        })
    }

    fn init_population(&self, np: usize, n: usize, rng: &mut StdRng) -> Array2<f64> {
        match self.init {
            Init::Random => Array2::from_shape_fn((np, n), |_| rng.random::<f64>()),
            Init::LatinHypercube => {
                let segment = 1.0 / np as f64;
                let mut population = Array2::zeros((np, n));
                for mut column in population.columns_mut() {
                    let mut strata: Vec<f64> = (0..np)
                        .map(|k| segment * (k as f64 + rng.random::<f64>()))
                        .collect();
                    strata.shuffle(rng);
                    column.assign(&Array1::from(strata));
                }
                population
            }
        }
    }

    /// Build the trial vector for `candidate` in unit coordinates.
    fn trial(
        &self,
        candidate: usize,
        best: usize,
        population: &Array2<f64>,
        scale: f64,
        rng: &mut StdRng,
    ) -> Array1<f64> {
        let np = population.nrows();
        let n = population.ncols();
        let r: Vec<ArrayView1<f64>> =
            select_samples(candidate, np, self.strategy.mutation.samples(), rng)
                .into_iter()
                .map(|k| population.row(k))
                .collect();
        let best_row = population.row(best);
        let current = population.row(candidate);

        let mutant = match self.strategy.mutation {
            Mutation::Best1 => &best_row + &((&r[0] - &r[1]) * scale),
            Mutation::Rand1 => &r[0] + &((&r[1] - &r[2]) * scale),
            Mutation::CurrentToBest1 => &current + &((&best_row - &current + &r[0] - &r[1]) * scale),
            Mutation::RandToBest1 => &r[0] + &((&best_row - &r[0] + &r[1] - &r[2]) * scale),
            Mutation::Best2 => &best_row + &((&r[0] + &r[1] - &r[2] - &r[3]) * scale),
            Mutation::Rand2 => &r[0] + &((&r[1] + &r[2] - &r[3] - &r[4]) * scale),
        };

        let mut trial = current.to_owned();
        let fill_point = rng.random_range(0..n);
        match self.strategy.crossover {
            Crossover::Binomial => {
                for j in 0..n {
                    if j == fill_point || rng.random::<f64>() < self.recombination {
                        trial[j] = mutant[j];
                    }
                }
            }
            Crossover::Exponential => {
                let mut j = fill_point;
                for _ in 0..n {
                    trial[j] = mutant[j];
                    j = (j + 1) % n;
                    if rng.random::<f64>() >= self.recombination {
                        break;
                    }
                }
            }
        }

        // coordinates pushed out of the box are redrawn
        for v in trial.iter_mut() {
            if !(0.0..=1.0).contains(&*v) {
                *v = rng.random::<f64>();
            }
        }
        trial
    }

    fn converged(&self, energies: &Array1<f64>) -> bool {
        if energies.iter().any(|e| !e.is_finite()) {
            return false;
        }
        let np = energies.len() as f64;
        let mean = energies.sum() / np;
        let std = (energies.mapv(|e| (e - mean).powi(2)).sum() / np).sqrt();
        std <= self.atol + self.tol * mean.abs()
    }
}

/// `count` distinct member indices other than `candidate`.
fn select_samples(candidate: usize, np: usize, count: usize, rng: &mut StdRng) -> Vec<usize> {
    let mut idxs: Vec<usize> = (0..np).filter(|&k| k != candidate).collect();
    idxs.shuffle(rng);
    idxs.truncate(count);
    idxs
}

fn argmin(values: &Array1<f64>) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v < values[best] || values[best].is_nan() {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn rastrigin(x: ArrayView1<f64>) -> Result<f64> {
        let a = 10.0;
        Ok(a * x.len() as f64
            + x.iter()
                .map(|&xi| xi * xi - a * (2.0 * PI * xi).cos())
                .sum::<f64>())
    }

    fn rosenbrock(x: ArrayView1<f64>) -> Result<f64> {
        Ok((1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0].powi(2)).powi(2))
    }

    #[test]
    fn strategy_names_round_trip() {
        for name in &[
            "best1bin",
            "best1exp",
            "rand1bin",
            "rand1exp",
            "currenttobest1bin",
            "currenttobest1exp",
            "randtobest1bin",
            "randtobest1exp",
            "best2bin",
            "best2exp",
            "rand2bin",
            "rand2exp",
        ] {
            let strategy: Strategy = name.parse().unwrap();
            assert_eq!(&strategy.to_string(), name);
        }
        assert!(matches!(
            "best3bin".parse::<Strategy>(),
            Err(Error::NotSupported { .. })
        ));
        assert!("best1".parse::<Strategy>().is_err());
    }

    #[test]
    fn rastrigin_global_minimum() {
        let bounds = Bounds::new(&[(-5.12, 5.12), (-5.12, 5.12)]).unwrap();
        let minimizer = DifferentialEvolutionBuilder::default()
            .seed(42)
            .build()
            .unwrap();
        let res = minimizer.minimize(rastrigin, &bounds).unwrap();
        assert!(res.minimum_value < 1e-6, "{:?}", res);
        assert!(res.minimum.iter().all(|xi| xi.abs() < 1e-3));
    }

    #[test]
    fn every_strategy_solves_rosenbrock() {
        let bounds = Bounds::new(&[(-2.0, 2.0), (-2.0, 2.0)]).unwrap();
        for name in &["best1bin", "rand1exp", "currenttobest1bin", "randtobest1exp", "best2exp", "rand2bin"] {
            let minimizer = DifferentialEvolutionBuilder::default()
                .strategy(name.parse::<Strategy>().unwrap())
                .seed(7)
                .build()
                .unwrap();
            let res = minimizer.minimize(rosenbrock, &bounds).unwrap();
            assert!(res.minimum_value < 1e-4, "{name}: {:?}", res);
            assert!(bounds.contains(res.minimum.view()));
        }
    }

    #[test]
    fn seeded_runs_repeat() {
        let bounds = Bounds::new(&[(-3.0, 3.0), (-3.0, 3.0)]).unwrap();
        let minimizer = DifferentialEvolutionBuilder::default()
            .seed(11)
            .maxiter(20)
            .polish(false)
            .init(Init::Random)
            .build()
            .unwrap();
        let first = minimizer.minimize(rosenbrock, &bounds).unwrap();
        let second = minimizer.minimize(rosenbrock, &bounds).unwrap();
        assert_eq!(first.minimum, second.minimum);
        assert_eq!(first.minimum_value, second.minimum_value);
        assert_eq!(first.f_evals, second.f_evals);
    }

    #[test]
    fn generation_budget_without_polish() {
        let bounds = Bounds::new(&[(-3.0, 3.0), (-3.0, 3.0)]).unwrap();
        let minimizer = DifferentialEvolutionBuilder::default()
            .seed(3)
            .maxiter(2)
            .popsize(5)
            .polish(false)
            .build()
            .unwrap();
        let res = minimizer.minimize(rosenbrock, &bounds).unwrap();
        assert_eq!(res.iterations, 2);
        // 10 members evaluated once, then once per generation
        assert_eq!(res.f_evals, 30);
        assert_eq!(res.status, Status::MaxIterReached);
    }

    #[test]
    fn oversized_population_is_rejected() {
        let bounds = Bounds::new(&[(-1.0, 1.0), (-1.0, 1.0)]).unwrap();
        let minimizer = DifferentialEvolutionBuilder::default().popsize(usize::MAX).build().unwrap();
        let mut calls = 0;
        let res = minimizer.minimize(
            |x: ArrayView1<f64>| -> Result<f64> {
                calls += 1;
                Ok(x.sum())
            },
            &bounds,
        );
        match res {
            Err(Error::InvalidOption { key, .. }) => assert_eq!(key, "popsize"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(calls, 0);
    }

    #[test]
    fn latin_hypercube_fills_every_stratum() {
        let minimizer = DifferentialEvolutionBuilder::default().build().unwrap();
        let mut rng = rng(Some(5));
        let population = minimizer.init_population(10, 3, &mut rng);
        for column in population.columns() {
            let mut strata: Vec<usize> = column.iter().map(|v| (v * 10.0) as usize).collect();
            strata.sort_unstable();
            assert_eq!(strata, (0..10).collect::<Vec<_>>());
        }
    }

    #[test]
    fn evaluation_errors_propagate() {
        let bounds = Bounds::new(&[(0.0, 1.0)]).unwrap();
        let minimizer = DifferentialEvolutionBuilder::default().seed(1).build().unwrap();
        let res = minimizer.minimize(|_x: ArrayView1<f64>| Err(Error::evaluation("boom")), &bounds);
        assert!(matches!(res, Err(Error::Evaluation(_))));
    }

    #[test]
    fn options_are_read_and_validated() {
        let options = Options::new()
            .with("strategy", "rand2exp")
            .with("popsize", 4)
            .with("recombination", 0.3)
            .with("seed", 9)
            .with("workers", 8);
        let de = DifferentialEvolution::from_options(&options).unwrap();
        assert_eq!(de.strategy.to_string(), "rand2exp");
        assert_eq!(de.popsize, 4);
        assert_eq!(de.seed, Some(9));

        let options = Options::new().with("recombination", 1.5);
        assert!(matches!(
            DifferentialEvolution::from_options(&options),
            Err(Error::Builder(_))
        ));
        let options = Options::new().with("init", "sobol");
        assert!(matches!(
            DifferentialEvolution::from_options(&options),
            Err(Error::NotSupported { .. })
        ));
    }
}
