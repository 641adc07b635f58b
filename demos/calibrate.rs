extern crate ndarray;
extern crate regressor;
extern crate tracing_subscriber;

use ndarray::prelude::*;
use regressor::{GlobalRegressor, LocalRegressor, Model, Options, Result};
use tracing_subscriber::EnvFilter;

/// Exponential decay `a * exp(-k t)` scored against observations by mean squared error.
struct Decay {
    params: Array1<f64>,
    t: Array1<f64>,
    observed: Array1<f64>,
}

impl Decay {
    fn predict(&self, p: ArrayView1<f64>) -> Array1<f64> {
        self.t.mapv(|ti| p[0] * (-p[1] * ti).exp())
    }
}

impl Model for Decay {
    fn vector(&self) -> ArrayView1<f64> {
        self.params.view()
    }

    fn loss(&self, p: ArrayView1<f64>) -> Result<f64> {
        let r = self.predict(p) - &self.observed;
        Ok(r.dot(&r) / r.len() as f64)
    }

    fn loss_and_gradient(&self, p: ArrayView1<f64>) -> Result<(f64, Array1<f64>)> {
        let decay = self.t.mapv(|ti| (-p[1] * ti).exp());
        let r = &decay * p[0] - &self.observed;
        let m = r.len() as f64;
        let d_a = 2.0 * r.dot(&decay) / m;
        let d_k = -2.0 * p[0] * (&r * &decay).dot(&self.t) / m;
        Ok((r.dot(&r) / m, arr1(&[d_a, d_k])))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let t: Array1<f64> = Array1::linspace(0.0, 5.0, 26);
    let observed = t.mapv(|ti: f64| 4.2 * (-0.7 * ti).exp());
    let mut model = Decay {
        params: arr1(&[1.0, 1.0]),
        t,
        observed,
    };

    let overrides = Options::from_json(r#"{"seed": 7, "maxiter": 300}"#)?;
    let global = GlobalRegressor::new("DifferentialEvolution", Some(overrides))?;
    let (params, loss) = global.regress(&model, &[(0.0, 10.0), (0.0, 5.0)])?.into_parts();
    println!("global: a = {:.6}, k = {:.6}, loss = {:e}", params[0], params[1], loss);

    model.params = params;
    let local = LocalRegressor::new("BFGS", None)?;
    let res = local.regress(&model)?;
    println!(
        "local:  a = {:.9}, k = {:.9}, loss = {:e} ({}, {} evaluations)",
        res.minimum[0], res.minimum[1], res.minimum_value, res.status, res.f_evals
    );
    Ok(())
}
