//! The capability a model must offer to be calibrated, and the adapter that
//! turns a bound model into the objectives handed to the minimizers.
//!
//! Any type that can report its current parameter vector and a loss for a
//! candidate vector qualifies as a [`Model`]. Models that also know their
//! gradient override [`Model::loss_and_gradient`]; the local regressor asks for
//! it on every evaluation.
use ndarray::prelude::*;

use crate::error::{Error, Result};

pub trait Model {
    /// The current parameter vector.
    fn vector(&self) -> ArrayView1<f64>;

    /// Loss of the model evaluated at `parameters`.
    fn loss(&self, parameters: ArrayView1<f64>) -> Result<f64>;

    /// Loss and its gradient with respect to `parameters`, computed together.
    fn loss_and_gradient(&self, _parameters: ArrayView1<f64>) -> Result<(f64, Array1<f64>)> {
        Err(Error::GradientNotImplemented)
    }

    fn dimension(&self) -> usize {
        self.vector().len()
    }
}

/// Result of a local evaluation. `gradient` is present exactly when it was
/// requested.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub loss: f64,
    pub gradient: Option<Array1<f64>>,
}

impl Evaluation {
    /// The `(loss, gradient)` pair expected by gradient-based minimizers.
    pub fn joint(self) -> Result<(f64, Array1<f64>)> {
        match self.gradient {
            Some(gradient) => Ok((self.loss, gradient)),
            None => Err(Error::GradientNotImplemented),
        }
    }
}

/// Loss-evaluation adapter bound to a model.
pub struct LossFunction<'a, M: ?Sized> {
    model: &'a M,
}

impl<'a, M: Model + ?Sized> LossFunction<'a, M> {
    pub fn new(model: &'a M) -> Self {
        LossFunction { model }
    }

    /// Scalar objective for the global search.
    pub fn global(&self, parameters: ArrayView1<f64>) -> Result<f64> {
        self.model.loss(parameters)
    }

    /// Objective for the local search. With `gradient` set the model computes
    /// loss and gradient in one call.
    pub fn local(&self, parameters: ArrayView1<f64>, gradient: bool) -> Result<Evaluation> {
        if !gradient {
            return Ok(Evaluation {
                loss: self.model.loss(parameters)?,
                gradient: None,
            });
        }
        let (loss, grad) = self.model.loss_and_gradient(parameters)?;
        if grad.len() != parameters.len() {
            return Err(Error::GradientDimMismatch {
                expected: parameters.len(),
                found: grad.len(),
            });
        }
        Ok(Evaluation {
            loss,
            gradient: Some(grad),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Parabola {
        vector: Array1<f64>,
    }

    impl Model for Parabola {
        fn vector(&self) -> ArrayView1<f64> {
            self.vector.view()
        }

        fn loss(&self, parameters: ArrayView1<f64>) -> Result<f64> {
            Ok((parameters[0] - 3.0).powi(2))
        }

        fn loss_and_gradient(&self, parameters: ArrayView1<f64>) -> Result<(f64, Array1<f64>)> {
            // deliberately one entry too many
            Ok((self.loss(parameters)?, arr1(&[0.0, 0.0])))
        }
    }

    struct ValueOnly;

    impl Model for ValueOnly {
        fn vector(&self) -> ArrayView1<f64> {
            ArrayView1::from(&[1.0, 2.0][..])
        }

        fn loss(&self, parameters: ArrayView1<f64>) -> Result<f64> {
            Ok(parameters.sum())
        }
    }

    #[test]
    fn global_entry_point_forwards_the_loss() {
        let model = Parabola { vector: arr1(&[0.0]) };
        let f = LossFunction::new(&model);
        assert_eq!(f.global(arr1(&[1.0]).view()).unwrap(), 4.0);
        assert_eq!(model.dimension(), 1);
    }

    #[test]
    fn local_entry_point_checks_gradient_length() {
        let model = Parabola { vector: arr1(&[0.0]) };
        let f = LossFunction::new(&model);
        assert!(matches!(
            f.local(arr1(&[1.0]).view(), true),
            Err(Error::GradientDimMismatch { expected: 1, found: 2 })
        ));
        let eval = f.local(arr1(&[1.0]).view(), false).unwrap();
        assert_eq!(eval.loss, 4.0);
        assert!(eval.gradient.is_none());
    }

    #[test]
    fn models_without_gradient_refuse_joint_evaluation() {
        let f = LossFunction::new(&ValueOnly);
        assert!(matches!(
            f.local(arr1(&[1.0, 1.0]).view(), true),
            Err(Error::GradientNotImplemented)
        ));
        let eval = f.local(arr1(&[1.0, 1.0]).view(), false).unwrap();
        assert!(matches!(eval.joint(), Err(Error::GradientNotImplemented)));
    }
}
