//! Line searches shared by the quasi-Newton minimizers.
//!
//! [`search`] looks for a step satisfying the strong Wolfe conditions
//! (Nocedal and Wright, Numerical Optimization, algorithms 3.5 and 3.6) and
//! falls back to Armijo backtracking when the bracketing phase gives up.
use ndarray::prelude::*;

use crate::error::Result;
use crate::utils::WrappedFunction;

/// Halvings of the step before backtracking gives up.
const MAX_HALVINGS: usize = 60;
/// Doublings of the trial step while bracketing.
const MAX_EXPANSIONS: usize = 20;
const MAX_ZOOMS: usize = 30;
/// Brackets narrower than this are treated as collapsed.
const MIN_BRACKET: f64 = 1e-14;

/// An accepted point along the search direction.
pub(crate) struct Step {
    pub x: Array1<f64>,
    pub f: f64,
    pub g: Array1<f64>,
}

/// A trial step length with the function value and directional derivative there.
#[derive(Debug, Clone, Copy)]
struct Trial {
    alpha: f64,
    f: f64,
    slope: f64,
}

/// Strong Wolfe search along `dir`, with backtracking as a last resort.
/// Returns `None` when `dir` is not a descent direction or no step decreases `f`.
pub(crate) fn search<F>(
    func: &mut WrappedFunction<F>,
    x: ArrayView1<f64>,
    f0: f64,
    g0: ArrayView1<f64>,
    dir: ArrayView1<f64>,
    c1: f64,
    c2: f64,
) -> Result<Option<Step>>
where
    F: FnMut(ArrayView1<f64>) -> Result<(f64, Array1<f64>)>,
{
    match wolfe(func, x, f0, g0, dir, c1, c2)? {
        Some(step) => Ok(Some(step)),
        None => backtrack(func, x, f0, g0, dir, c1),
    }
}

/// Find a step `a` with `f(x + a*dir) <= f(x) + c1 * a * g'dir` and
/// `|g(x + a*dir)'dir| <= c2 * |g'dir|`, starting at `a = 1`.
pub(crate) fn wolfe<F>(
    func: &mut WrappedFunction<F>,
    x: ArrayView1<f64>,
    f0: f64,
    g0: ArrayView1<f64>,
    dir: ArrayView1<f64>,
    c1: f64,
    c2: f64,
) -> Result<Option<Step>>
where
    F: FnMut(ArrayView1<f64>) -> Result<(f64, Array1<f64>)>,
{
    let slope0 = g0.dot(&dir);
    if !(slope0 < 0.0) {
        return Ok(None);
    }
    let mut prev = Trial {
        alpha: 0.0,
        f: f0,
        slope: slope0,
    };
    let mut alpha = 1.0;
    for i in 0..MAX_EXPANSIONS {
        let x_new = &x + &(alpha * &dir);
        let (f_new, g_new) = func.call(x_new.view())?;
        let trial = Trial {
            alpha,
            f: f_new,
            slope: g_new.dot(&dir),
        };
        if !f_new.is_finite() || f_new > f0 + c1 * alpha * slope0 || (i > 0 && f_new >= prev.f) {
            return zoom(func, x, f0, slope0, dir, c1, c2, prev, trial);
        }
        if trial.slope.abs() <= c2 * slope0.abs() {
            return Ok(Some(Step {
                x: x_new,
                f: f_new,
                g: g_new,
            }));
        }
        if trial.slope >= 0.0 {
            return zoom(func, x, f0, slope0, dir, c1, c2, trial, prev);
        }
        prev = trial;
        alpha *= 2.0;
    }
    Ok(None)
}

/// Narrow the bracket between `lo`, the best point satisfying sufficient
/// decrease, and `hi` until a strong Wolfe point is found.
#[allow(clippy::too_many_arguments)]
fn zoom<F>(
    func: &mut WrappedFunction<F>,
    x: ArrayView1<f64>,
    f0: f64,
    slope0: f64,
    dir: ArrayView1<f64>,
    c1: f64,
    c2: f64,
    mut lo: Trial,
    mut hi: Trial,
) -> Result<Option<Step>>
where
    F: FnMut(ArrayView1<f64>) -> Result<(f64, Array1<f64>)>,
{
    for _ in 0..MAX_ZOOMS {
        if (hi.alpha - lo.alpha).abs() < MIN_BRACKET {
            break;
        }
        let alpha = interpolate(&lo, &hi);
        let x_new = &x + &(alpha * &dir);
        let (f_new, g_new) = func.call(x_new.view())?;
        let trial = Trial {
            alpha,
            f: f_new,
            slope: g_new.dot(&dir),
        };
        if !f_new.is_finite() || f_new > f0 + c1 * alpha * slope0 || f_new >= lo.f {
            hi = trial;
        } else {
            if trial.slope.abs() <= c2 * slope0.abs() {
                return Ok(Some(Step {
                    x: x_new,
                    f: f_new,
                    g: g_new,
                }));
            }
            if trial.slope * (hi.alpha - lo.alpha) >= 0.0 {
                hi = lo;
            }
            lo = trial;
        }
    }
    Ok(None)
}

/// Minimizer of the cubic matching values and slopes at both ends of the
/// bracket, or its midpoint when the cubic is unusable or hugs an end.
fn interpolate(lo: &Trial, hi: &Trial) -> f64 {
    let (a, b) = if lo.alpha < hi.alpha { (lo, hi) } else { (hi, lo) };
    let width = b.alpha - a.alpha;
    let mid = a.alpha + 0.5 * width;
    if !(a.f.is_finite() && b.f.is_finite() && a.slope.is_finite() && b.slope.is_finite()) {
        return mid;
    }
    let d1 = a.slope + b.slope - 3.0 * (b.f - a.f) / width;
    let d2_sq = d1 * d1 - a.slope * b.slope;
    if d2_sq < 0.0 {
        return mid;
    }
    let d2 = d2_sq.sqrt();
    let trial = b.alpha - width * (b.slope + d2 - d1) / (b.slope - a.slope + 2.0 * d2);
    let margin = 0.1 * width;
    if trial.is_finite() && trial > a.alpha + margin && trial < b.alpha - margin {
        trial
    } else {
        mid
    }
}

/// Search along `dir` from `x` for a step satisfying the Armijo condition
/// `f(x + a*dir) <= f(x) + c1 * a * g'dir`, starting at `a = 1` and halving.
/// Returns `None` when `dir` is not a descent direction or no step is accepted.
pub(crate) fn backtrack<F>(
    func: &mut WrappedFunction<F>,
    x: ArrayView1<f64>,
    f0: f64,
    g0: ArrayView1<f64>,
    dir: ArrayView1<f64>,
    c1: f64,
) -> Result<Option<Step>>
where
    F: FnMut(ArrayView1<f64>) -> Result<(f64, Array1<f64>)>,
{
    let slope = g0.dot(&dir);
    if !(slope < 0.0) {
        return Ok(None);
    }
    let mut alpha = 1.0;
    for _ in 0..MAX_HALVINGS {
        let x_new = &x + &(alpha * &dir);
        let (f_new, g_new) = func.call(x_new.view())?;
        if f_new.is_finite() && f_new <= f0 + c1 * alpha * slope {
            return Ok(Some(Step {
                x: x_new,
                f: f_new,
                g: g_new,
            }));
        }
        alpha *= 0.5;
    }
    Ok(None)
}

/// Checks `0 < c1 < c2 < 1` for whichever constants were set.
pub(crate) fn wolfe_constants(c1: Option<f64>, c2: Option<f64>) -> std::result::Result<(), String> {
    let c1 = c1.unwrap_or(1e-4);
    let c2 = c2.unwrap_or(0.9);
    if !(0.0 < c1 && c1 < c2 && c2 < 1.0) {
        return Err(format!("line search constants need 0 < c1 < c2 < 1, got c1 = {c1}, c2 = {c2}"));
    }
    Ok(())
}

/// Largest absolute entry.
pub(crate) fn norm_inf(v: &Array1<f64>) -> f64 {
    v.iter().fold(0.0, |acc: f64, vi| acc.max(vi.abs()))
}
