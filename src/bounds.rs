//! Box constraints for the global search.
use ndarray::prelude::*;
use ndarray::Zip;
use rand::Rng;

use crate::error::{Error, Result};

/// An ordered sequence of `(min, max)` pairs, one per parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    lower: Array1<f64>,
    upper: Array1<f64>,
}

impl Bounds {
    /// Validate `pairs`: every bound must be finite with `min <= max`.
    pub fn new(pairs: &[(f64, f64)]) -> Result<Self> {
        for (index, &(min, max)) in pairs.iter().enumerate() {
            if !min.is_finite() || !max.is_finite() || min > max {
                return Err(Error::InvalidBounds { index, min, max });
            }
        }
        Ok(Bounds {
            lower: pairs.iter().map(|&(min, _)| min).collect(),
            upper: pairs.iter().map(|&(_, max)| max).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    pub fn lower(&self) -> ArrayView1<f64> {
        self.lower.view()
    }

    pub fn upper(&self) -> ArrayView1<f64> {
        self.upper.view()
    }

    pub fn center(&self) -> Array1<f64> {
        (&self.lower + &self.upper) / 2.0
    }

    /// Project `x` onto the box.
    pub fn clip(&self, x: ArrayView1<f64>) -> Array1<f64> {
        let mut clipped = x.to_owned();
        Zip::from(&mut clipped)
            .and(&self.lower)
            .and(&self.upper)
            .for_each(|xi, &lo, &hi| *xi = xi.max(lo).min(hi));
        clipped
    }

    pub fn contains(&self, x: ArrayView1<f64>) -> bool {
        x.len() == self.len()
            && x.iter()
                .zip(self.lower.iter().zip(self.upper.iter()))
                .all(|(&xi, (&lo, &hi))| xi >= lo && xi <= hi)
    }

    /// Map a point of the unit hypercube onto the box.
    pub fn scale(&self, unit: ArrayView1<f64>) -> Array1<f64> {
        &self.lower + &(&unit * &(&self.upper - &self.lower))
    }

    /// Draw a point uniformly from the box.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Array1<f64> {
        let unit = Array1::from_shape_fn(self.len(), |_| rng.random::<f64>());
        self.scale(unit.view())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn rejects_inverted_and_infinite_pairs() {
        assert!(matches!(
            Bounds::new(&[(0.0, 1.0), (2.0, -2.0)]),
            Err(Error::InvalidBounds { index: 1, .. })
        ));
        assert!(Bounds::new(&[(f64::NEG_INFINITY, 1.0)]).is_err());
        // a degenerate pair pins the parameter
        assert!(Bounds::new(&[(1.5, 1.5)]).is_ok());
    }

    #[test]
    fn clip_scale_and_center() {
        let bounds = Bounds::new(&[(-10.0, 10.0), (0.0, 2.0)]).unwrap();
        assert_eq!(bounds.center(), arr1(&[0.0, 1.0]));
        assert_eq!(bounds.clip(arr1(&[12.0, -1.0]).view()), arr1(&[10.0, 0.0]));
        assert_eq!(bounds.scale(arr1(&[0.25, 1.0]).view()), arr1(&[-5.0, 2.0]));
    }

    #[test]
    fn samples_stay_inside() {
        let bounds = Bounds::new(&[(-1.0, 1.0), (5.0, 6.0), (0.0, 0.0)]).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            assert!(bounds.contains(bounds.sample(&mut rng).view()));
        }
    }
}
