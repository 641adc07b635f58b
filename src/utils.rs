use ndarray::prelude::*;

use crate::error::Result;

/// Default forward-difference step, the square root of machine epsilon.
pub const EPSILON: f64 = 1.4901161193847656e-8;

/// Counts how often the wrapped objective is called.
pub struct WrappedFunction<F> {
    pub num: usize,
    pub func: F,
}

impl<F> WrappedFunction<F> {
    pub fn new(func: F) -> Self {
        WrappedFunction { num: 0, func }
    }

    pub fn call<T>(&mut self, arg: ArrayView1<f64>) -> Result<T>
    where
        F: FnMut(ArrayView1<f64>) -> Result<T>,
    {
        self.num += 1;
        (self.func)(arg)
    }
}

/// Forward-difference gradient of `func` at `xk`, given `f0 = func(xk)`.
pub fn approx_fprime<F>(xk: ArrayView1<f64>, f0: f64, func: &mut F, epsilon: f64) -> Result<Array1<f64>>
where
    F: FnMut(ArrayView1<f64>) -> Result<f64>,
{
    let n = xk.len();
    let mut grad = Array1::<f64>::zeros(n);
    let mut xp = xk.to_owned();
    for k in 0..n {
        xp[k] += epsilon;
        grad[k] = (func(xp.view())? - f0) / epsilon;
        xp[k] = xk[k];
    }
    Ok(grad)
}

/// Turn a scalar objective into one returning `(value, gradient)`, with the
/// gradient approximated by forward differences.
pub fn with_approx_gradient<F>(
    mut func: F,
    epsilon: f64,
) -> impl FnMut(ArrayView1<f64>) -> Result<(f64, Array1<f64>)>
where
    F: FnMut(ArrayView1<f64>) -> Result<f64>,
{
    move |x: ArrayView1<f64>| {
        let f0 = func(x)?;
        let grad = approx_fprime(x, f0, &mut func, epsilon)?;
        Ok((f0, grad))
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use float_cmp::approx_eq;

    #[test]
    fn gradient() {
        let mut function =
            |x: ArrayView1<f64>| -> Result<f64> { Ok(1.0 * x[0].powi(2) + 200. * x[1].powi(2)) };
        let x = arr1(&[1.0, 1.0]);
        let f0 = function(x.view()).unwrap();
        let res = approx_fprime(x.view(), f0, &mut function, 1e-7).unwrap();

        assert!(approx_eq!(f64, res[0], 2.0, epsilon = 1e-4));
        assert!(approx_eq!(f64, res[1], 400.0, epsilon = 1e-3));
    }

    #[test]
    fn counts_calls_through_the_gradient_wrapper() {
        let mut wrapped = WrappedFunction::new(with_approx_gradient(
            |x: ArrayView1<f64>| -> Result<f64> { Ok(x.dot(&x)) },
            EPSILON,
        ));
        let (value, grad) = wrapped.call(arr1(&[3.0, -1.0]).view()).unwrap();
        assert_eq!(wrapped.num, 1);
        assert_eq!(value, 10.0);
        assert!(approx_eq!(f64, grad[0], 6.0, epsilon = 1e-5));
        assert!(approx_eq!(f64, grad[1], -2.0, epsilon = 1e-5));
    }
}
