use nalgebra::DVector;

/// Error constructing a [`Bounds`].
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum BoundsError {
    #[error("lower and upper bound vectors have different lengths ({0} vs {1})")]
    LengthMismatch(usize, usize),
    #[error("lower bound at index {0} ({1}) exceeds upper bound ({2})")]
    Inverted(usize, f64, f64),
}

/// Per-parameter box constraints `[lo_i, hi_i]`.
#[derive(Debug, Clone)]
pub struct Bounds {
    pub(crate) lo: DVector<f64>,
    pub(crate) hi: DVector<f64>,
}

impl Bounds {
    pub fn new(lo: Vec<f64>, hi: Vec<f64>) -> Result<Self, BoundsError> {
        if lo.len() != hi.len() {
            return Err(BoundsError::LengthMismatch(lo.len(), hi.len()));
        }
        for i in 0..lo.len() {
            if lo[i] > hi[i] {
                return Err(BoundsError::Inverted(i, lo[i], hi[i]));
            }
        }
        Ok(Self {
            lo: DVector::from_vec(lo),
            hi: DVector::from_vec(hi),
        })
    }

    pub fn len(&self) -> usize {
        self.lo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lo.is_empty()
    }

    pub fn lower(&self) -> &DVector<f64> {
        &self.lo
    }

    pub fn upper(&self) -> &DVector<f64> {
        &self.hi
    }

    /// Clamp `x` componentwise into the bounds.
    pub fn clamp(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(
            x.len(),
            x.iter()
                .enumerate()
                .map(|(i, &v)| v.max(self.lo[i]).min(self.hi[i])),
        )
    }

    /// True if every component of `x` lies within its bound (inclusive).
    pub fn contains(&self, x: &DVector<f64>) -> bool {
        (0..x.len()).all(|i| x[i] >= self.lo[i] && x[i] <= self.hi[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_projects_into_box() {
        let b = Bounds::new(vec![0.0, -1.0], vec![1.0, 1.0]).unwrap();
        let x = DVector::from_vec(vec![2.0, -5.0]);
        let c = b.clamp(&x);
        assert_eq!(c[0], 1.0);
        assert_eq!(c[1], -1.0);
    }

    #[test]
    fn rejects_inverted_bounds() {
        let err = Bounds::new(vec![1.0], vec![0.0]).unwrap_err();
        assert_eq!(err, BoundsError::Inverted(0, 1.0, 0.0));
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let err = Bounds::new(vec![0.0, 0.0], vec![1.0]).unwrap_err();
        assert_eq!(err, BoundsError::LengthMismatch(2, 1));
    }
}
