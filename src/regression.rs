//! The two entry points used to calibrate a model: a bounded global search and
//! a local gradient-based descent from the model's current parameters.
//!
//! Both regressors resolve a method identifier, merge the caller's overrides
//! over the method defaults, and build the minimizer once at construction so
//! that bad configuration surfaces before any loss is evaluated.
//!
//! ```
//! # use ndarray::prelude::*;
//! # use regressor::error::Result;
//! # use regressor::loss::Model;
//! # use regressor::options::Options;
//! # use regressor::regression::{GlobalRegressor, LocalRegressor};
//! struct Shifted(Array1<f64>);
//!
//! impl Model for Shifted {
//!     fn vector(&self) -> ArrayView1<f64> {
//!         self.0.view()
//!     }
//!     fn loss(&self, p: ArrayView1<f64>) -> Result<f64> {
//!         Ok((p[0] - 3.0).powi(2))
//!     }
//!     fn loss_and_gradient(&self, p: ArrayView1<f64>) -> Result<(f64, Array1<f64>)> {
//!         Ok(((p[0] - 3.0).powi(2), arr1(&[2.0 * (p[0] - 3.0)])))
//!     }
//! }
//!
//! let model = Shifted(arr1(&[0.0]));
//! let global = GlobalRegressor::new("DifferentialEvolution", Some(Options::new().with("seed", 1)))?;
//! let (params, loss) = global.regress(&model, &[(-10.0, 10.0)])?.into_parts();
//! assert!((params[0] - 3.0).abs() < 1e-3 && loss < 1e-3);
//!
//! let local = LocalRegressor::new("BFGS", None)?;
//! let (params, _) = local.regress(&model)?.into_parts();
//! assert!((params[0] - 3.0).abs() < 1e-6);
//! # Ok::<(), regressor::error::Error>(())
//! ```
use ndarray::prelude::*;
use std::fmt;
use std::str::FromStr;
use tracing::info;

use crate::bounds::Bounds;
use crate::error::{Error, Result};
use crate::global::{BasinHopping, DifferentialEvolution};
use crate::loss::{LossFunction, Model};
use crate::minimizer::OptimResult;
use crate::options::Options;
use crate::utils::{with_approx_gradient, EPSILON};
use crate::vector::{Bfgs, NelderMead, LBFGS};

/// Global search strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalMethod {
    DifferentialEvolution,
    BasinHopping,
}

impl GlobalMethod {
    pub fn name(self) -> &'static str {
        match self {
            GlobalMethod::DifferentialEvolution => "DifferentialEvolution",
            GlobalMethod::BasinHopping => "BasinHopping",
        }
    }

    /// Options applied before the caller's overrides.
    pub fn defaults(self) -> Options {
        match self {
            GlobalMethod::DifferentialEvolution => Options::new()
                .with("strategy", "best1bin")
                .with("maxiter", 1000)
                .with("popsize", 30)
                .with("tol", 1e-4),
            GlobalMethod::BasinHopping => Options::new().with("niter", 100).with("T", 1.0),
        }
    }
}

impl FromStr for GlobalMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "differentialevolution" => Ok(GlobalMethod::DifferentialEvolution),
            "basinhopping" => Ok(GlobalMethod::BasinHopping),
            _ => Err(Error::NotSupported {
                family: "global",
                name: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for GlobalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Local search strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalMethod {
    Bfgs,
}

impl LocalMethod {
    pub fn name(self) -> &'static str {
        match self {
            LocalMethod::Bfgs => "BFGS",
        }
    }

    pub fn defaults(self) -> Options {
        match self {
            LocalMethod::Bfgs => Options::new().with("method", "BFGS").with("gtol", 1e-15),
        }
    }
}

impl FromStr for LocalMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "bfgs" => Ok(LocalMethod::Bfgs),
            _ => Err(Error::NotSupported {
                family: "local",
                name: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for LocalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
enum GlobalBackend {
    DifferentialEvolution(DifferentialEvolution),
    BasinHopping(BasinHopping),
}

impl GlobalBackend {
    fn from_options(method: GlobalMethod, options: &Options) -> Result<Self> {
        Ok(match method {
            GlobalMethod::DifferentialEvolution => {
                GlobalBackend::DifferentialEvolution(DifferentialEvolution::from_options(options)?)
            }
            GlobalMethod::BasinHopping => GlobalBackend::BasinHopping(BasinHopping::from_options(options)?),
        })
    }

    fn minimize<F>(&self, func: F, bounds: &Bounds) -> Result<OptimResult>
    where
        F: FnMut(ArrayView1<f64>) -> Result<f64>,
    {
        match self {
            GlobalBackend::DifferentialEvolution(de) => de.minimize(func, bounds),
            GlobalBackend::BasinHopping(bh) => bh.minimize(func, bounds),
        }
    }
}

/// Bounded, derivative-free calibration.
#[derive(Debug, Clone)]
pub struct GlobalRegressor {
    method: GlobalMethod,
    options: Options,
    backend: GlobalBackend,
}

impl GlobalRegressor {
    /// Resolve `method` and merge `overrides` over its defaults. Fails with
    /// [`Error::NotSupported`] for unknown methods and with a configuration
    /// error when the merged options cannot configure the minimizer.
    pub fn new(method: &str, overrides: Option<Options>) -> Result<Self> {
        Self::with_method(method.parse()?, overrides)
    }

    pub fn with_method(method: GlobalMethod, overrides: Option<Options>) -> Result<Self> {
        let options = method.defaults().merge(&overrides.unwrap_or_default());
        let backend = GlobalBackend::from_options(method, &options)?;
        Ok(GlobalRegressor {
            method,
            options,
            backend,
        })
    }

    pub fn method(&self) -> GlobalMethod {
        self.method
    }

    /// The merged configuration.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Minimize the loss of `model` over the box given by `bounds`, one
    /// `(min, max)` pair per parameter. The model is only read.
    pub fn regress<M: Model + ?Sized>(&self, model: &M, bounds: &[(f64, f64)]) -> Result<OptimResult> {
        let dimension = model.dimension();
        if bounds.len() != dimension {
            return Err(Error::DimensionMismatch {
                expected: dimension,
                found: bounds.len(),
            });
        }
        let bounds = Bounds::new(bounds)?;
        let loss = LossFunction::new(model);

        info!(method = %self.method, dimension, "global regression started");
        let res = self
            .backend
            .minimize(|x: ArrayView1<f64>| loss.global(x), &bounds)?;
        info!(
            method = %self.method,
            loss = res.minimum_value,
            status = %res.status,
            f_evals = res.f_evals,
            "global regression finished"
        );
        Ok(res)
    }
}

#[derive(Debug, Clone)]
enum LocalBackend {
    Bfgs(Bfgs),
    LBfgs(LBFGS),
    NelderMead(NelderMead),
}

impl LocalBackend {
    /// The `method` key picks the minimizer; the remaining keys configure it.
    fn from_options(method: LocalMethod, options: &Options) -> Result<Self> {
        let name = options.get_str("method")?.unwrap_or(method.name());
        Ok(match name.to_lowercase().as_str() {
            "bfgs" => LocalBackend::Bfgs(Bfgs::from_options(options)?),
            "l-bfgs" | "lbfgs" => LocalBackend::LBfgs(LBFGS::from_options(options)?),
            "nelder-mead" | "neldermead" => LocalBackend::NelderMead(NelderMead::from_options(options)?),
            _ => {
                return Err(Error::NotSupported {
                    family: "local",
                    name: name.to_string(),
                })
            }
        })
    }

    fn name(&self) -> &'static str {
        match self {
            LocalBackend::Bfgs(_) => "BFGS",
            LocalBackend::LBfgs(_) => "L-BFGS",
            LocalBackend::NelderMead(_) => "Nelder-Mead",
        }
    }
}

/// Gradient-based calibration starting from the model's current parameters.
#[derive(Debug, Clone)]
pub struct LocalRegressor {
    method: LocalMethod,
    options: Options,
    backend: LocalBackend,
}

impl LocalRegressor {
    pub fn new(method: &str, overrides: Option<Options>) -> Result<Self> {
        Self::with_method(method.parse()?, overrides)
    }

    pub fn with_method(method: LocalMethod, overrides: Option<Options>) -> Result<Self> {
        let options = method.defaults().merge(&overrides.unwrap_or_default());
        let backend = LocalBackend::from_options(method, &options)?;
        Ok(LocalRegressor {
            method,
            options,
            backend,
        })
    }

    pub fn method(&self) -> LocalMethod {
        self.method
    }

    /// The minimizer that runs, after any `method` override in the options.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// The merged configuration, without the evaluation flags.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The options of a single `regress` call: the merged configuration with
    /// `jac` and `gradient` set, whatever the caller passed for them.
    pub fn evaluation_options(&self) -> Options {
        self.options.clone().with("jac", true).with("gradient", true)
    }

    /// Minimize the loss of `model` starting from a copy of its parameter
    /// vector. The model is only read.
    pub fn regress<M: Model + ?Sized>(&self, model: &M) -> Result<OptimResult> {
        self.regress_with(model, &self.evaluation_options())
    }

    fn regress_with<M: Model + ?Sized>(&self, model: &M, options: &Options) -> Result<OptimResult> {
        let x0 = model.vector().to_owned();
        if x0.is_empty() {
            return Err(Error::EmptyParameters);
        }
        let jac = options.get_bool("jac")?.unwrap_or(false);
        let gradient = options.get_bool("gradient")?.unwrap_or(false);
        let eps = options.get_f64("eps")?.unwrap_or(EPSILON);
        let loss = LossFunction::new(model);

        info!(
            method = %self.method,
            backend = self.backend.name(),
            dimension = x0.len(),
            jac,
            "local regression started"
        );
        let joint = |x: ArrayView1<f64>| -> Result<(f64, Array1<f64>)> { loss.local(x, gradient)?.joint() };
        let scalar = |x: ArrayView1<f64>| loss.global(x);
        let res = match &self.backend {
            LocalBackend::Bfgs(bfgs) if jac => bfgs.minimize(joint, x0.view()),
            LocalBackend::Bfgs(bfgs) => bfgs.minimize(with_approx_gradient(scalar, eps), x0.view()),
            LocalBackend::LBfgs(lbfgs) if jac => lbfgs.minimize(joint, x0.view()),
            LocalBackend::LBfgs(lbfgs) => lbfgs.minimize(with_approx_gradient(scalar, eps), x0.view()),
            LocalBackend::NelderMead(nm) => nm.minimize(scalar, x0.view()),
        }?;
        info!(
            method = %self.method,
            backend = self.backend.name(),
            loss = res.minimum_value,
            status = %res.status,
            f_evals = res.f_evals,
            "local regression finished"
        );
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::minimizer::Status;
    use float_cmp::approx_eq;

    struct Parabola {
        vector: Array1<f64>,
    }

    impl Model for Parabola {
        fn vector(&self) -> ArrayView1<f64> {
            self.vector.view()
        }

        fn loss(&self, p: ArrayView1<f64>) -> Result<f64> {
            Ok((p[0] - 3.0).powi(2))
        }

        fn loss_and_gradient(&self, p: ArrayView1<f64>) -> Result<(f64, Array1<f64>)> {
            Ok(((p[0] - 3.0).powi(2), arr1(&[2.0 * (p[0] - 3.0)])))
        }
    }

    fn parabola() -> Parabola {
        Parabola { vector: arr1(&[0.0]) }
    }

    #[test]
    fn defaults_merge_under_overrides() {
        let overrides = Options::new().with("maxiter", 50).with("seed", 3).with("workers", 1);
        let global = GlobalRegressor::new("DifferentialEvolution", Some(overrides)).unwrap();
        let options = global.options();
        for key in &["strategy", "maxiter", "popsize", "tol", "seed", "workers"] {
            assert!(options.contains_key(key), "missing {key}");
        }
        assert_eq!(options.get_usize("maxiter").unwrap(), Some(50));
        assert_eq!(options.get_usize("popsize").unwrap(), Some(30));

        let global = GlobalRegressor::new("BasinHopping", None).unwrap();
        assert_eq!(global.options(), &GlobalMethod::BasinHopping.defaults());

        let local = LocalRegressor::new("BFGS", Some(Options::new().with("gtol", 1e-8))).unwrap();
        assert_eq!(local.options().get_f64("gtol").unwrap(), Some(1e-8));
        assert_eq!(local.options().get_str("method").unwrap(), Some("BFGS"));
    }

    #[test]
    fn unknown_methods_are_not_supported() {
        assert!(matches!(
            GlobalRegressor::new("FooMethod", None),
            Err(Error::NotSupported { family: "global", .. })
        ));
        assert!(matches!(
            LocalRegressor::new("FooMethod", None),
            Err(Error::NotSupported { family: "local", .. })
        ));
        let overrides = Options::new().with("method", "Powell");
        assert!(matches!(
            LocalRegressor::new("BFGS", Some(overrides)),
            Err(Error::NotSupported { .. })
        ));
        let overrides = Options::new().with("strategy", "best9bin");
        assert!(matches!(
            GlobalRegressor::new("DifferentialEvolution", Some(overrides)),
            Err(Error::NotSupported { .. })
        ));
    }

    #[test]
    fn bad_option_values_fail_construction() {
        let err = LocalRegressor::new("BFGS", Some(Options::new().with("gtol", "tiny"))).unwrap_err();
        assert!(matches!(err, Error::InvalidOption { .. }));
        assert!(err.is_configuration());
        let err = GlobalRegressor::new("BasinHopping", Some(Options::new().with("T", -2.0))).unwrap_err();
        assert!(matches!(err, Error::Builder(_)));
    }

    #[test]
    fn bounds_must_match_the_model() {
        let global = GlobalRegressor::new("DifferentialEvolution", None).unwrap();
        assert!(matches!(
            global.regress(&parabola(), &[(-1.0, 1.0), (-1.0, 1.0)]),
            Err(Error::DimensionMismatch { expected: 1, found: 2 })
        ));
        assert!(matches!(
            global.regress(&parabola(), &[(1.0, -1.0)]),
            Err(Error::InvalidBounds { index: 0, .. })
        ));
    }

    #[test]
    fn global_scenario() {
        for method in &["DifferentialEvolution", "BasinHopping"] {
            let global = GlobalRegressor::new(method, Some(Options::new().with("seed", 17))).unwrap();
            let res = global.regress(&parabola(), &[(-10.0, 10.0)]).unwrap();
            assert!(approx_eq!(f64, res.minimum[0], 3.0, epsilon = 1e-3), "{method}: {:?}", res);
            assert!(res.minimum_value < 1e-3);
        }
    }

    #[test]
    fn local_scenario() {
        let local = LocalRegressor::new("BFGS", None).unwrap();
        let model = parabola();
        let res = local.regress(&model).unwrap();
        assert_eq!(res.status, Status::GtolConvergence);
        assert!(approx_eq!(f64, res.minimum[0], 3.0, epsilon = 1e-12));
        assert!(res.minimum_value < 1e-20);
        assert_eq!(model.vector, arr1(&[0.0]));
    }

    #[test]
    fn evaluation_flags_are_forced_per_call() {
        let overrides = Options::new().with("jac", false).with("gradient", false);
        let local = LocalRegressor::new("BFGS", Some(overrides)).unwrap();
        let options = local.evaluation_options();
        assert_eq!(options.get_bool("jac").unwrap(), Some(true));
        assert_eq!(options.get_bool("gradient").unwrap(), Some(true));
        // the stored configuration keeps what the caller gave
        assert_eq!(local.options().get_bool("jac").unwrap(), Some(false));
    }

    #[test]
    fn finite_differences_without_jac() {
        let local = LocalRegressor::new("BFGS", Some(Options::new().with("gtol", 1e-6))).unwrap();
        let options = local.options().clone().with("jac", false);
        let res = local.regress_with(&parabola(), &options).unwrap();
        assert!(approx_eq!(f64, res.minimum[0], 3.0, epsilon = 1e-5));
    }

    #[test]
    fn method_override_selects_the_backend() {
        assert_eq!(LocalRegressor::new("BFGS", None).unwrap().backend_name(), "BFGS");
        for (method, backend) in &[("L-BFGS", "L-BFGS"), ("nelder-mead", "Nelder-Mead")] {
            let overrides = Options::new().with("method", *method);
            let local = LocalRegressor::new("BFGS", Some(overrides)).unwrap();
            assert_eq!(local.method(), LocalMethod::Bfgs);
            assert_eq!(local.backend_name(), *backend);
            let res = local.regress(&parabola()).unwrap();
            assert!(approx_eq!(f64, res.minimum[0], 3.0, epsilon = 1e-3), "{method}: {:?}", res);
        }
    }

    #[test]
    fn seeded_global_regression_repeats() {
        let overrides = Options::new().with("seed", 99).with("maxiter", 5).with("polish", false);
        let global = GlobalRegressor::new("DifferentialEvolution", Some(overrides)).unwrap();
        let first = global.regress(&parabola(), &[(-10.0, 10.0)]).unwrap();
        let second = global.regress(&parabola(), &[(-10.0, 10.0)]).unwrap();
        assert_eq!(first.minimum, second.minimum);
        assert_eq!(first.minimum_value, second.minimum_value);
    }

    #[test]
    fn empty_models_are_rejected() {
        let local = LocalRegressor::new("BFGS", None).unwrap();
        let model = Parabola { vector: Array1::zeros(0) };
        assert!(matches!(local.regress(&model), Err(Error::EmptyParameters)));
    }
}
