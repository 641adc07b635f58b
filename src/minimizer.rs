//! This module provides the result contract shared by all minimizers in this crate and
//! returned by the regressors.
use ndarray::prelude::*;
use std::fmt;
use std::time::Duration;

/// Minimizer states at the end of the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Function values stopped changing by more than the tolerance.
    FtolConvergence,
    /// Parameters stopped changing by more than the tolerance.
    XtolConvergence,
    /// The gradient norm fell below the tolerance.
    GtolConvergence,
    /// All requested iterations ran, which is how basin hopping finishes.
    Completed,
    /// The iteration budget ran out before any tolerance was met.
    MaxIterReached,
    /// The function evaluation budget ran out before any tolerance was met.
    MaxFunReached,
    /// No step along the search direction decreased the objective; the
    /// desired precision was not necessarily reached.
    LineSearchFailure,
}

impl Status {
    pub fn is_converged(self) -> bool {
        matches!(
            self,
            Status::FtolConvergence
                | Status::XtolConvergence
                | Status::GtolConvergence
                | Status::Completed
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Status::FtolConvergence => "function values converged",
            Status::XtolConvergence => "parameters converged",
            Status::GtolConvergence => "gradient norm below tolerance",
            Status::Completed => "requested iterations completed",
            Status::MaxIterReached => "maximum number of iterations reached",
            Status::MaxFunReached => "maximum number of function evaluations reached",
            Status::LineSearchFailure => "desired error not necessarily achieved due to precision loss",
        };
        f.write_str(message)
    }
}

/// A minimization result, storing various details of the run and the final results.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimResult {
    /// The final parameter values.
    pub minimum: Array1<f64>,
    /// The function value at the found minimum.
    pub minimum_value: f64,
    /// Why the minimizer stopped.
    pub status: Status,
    /// The number of iterations run.
    pub iterations: usize,
    /// The number of function evaluations performed.
    pub f_evals: usize,
    /// The runtime of the minimization according to the system clock.
    pub runtime: Duration,
}

impl OptimResult {
    pub fn converged(&self) -> bool {
        self.status.is_converged()
    }

    /// The `(parameters, loss)` pair.
    pub fn into_parts(self) -> (Array1<f64>, f64) {
        (self.minimum, self.minimum_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convergence_follows_status() {
        let mut result = OptimResult {
            minimum: arr1(&[3.0]),
            minimum_value: 0.0,
            status: Status::MaxIterReached,
            iterations: 10,
            f_evals: 20,
            runtime: Duration::from_millis(1),
        };
        assert!(!result.converged());
        result.status = Status::Completed;
        assert!(result.converged());
        assert_eq!(result.into_parts(), (arr1(&[3.0]), 0.0));
    }
}
