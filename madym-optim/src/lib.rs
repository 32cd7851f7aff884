//! Bounded, derivative-free-or-numeric-gradient minimisation.
//!
//! Two solvers are exposed behind [`OptimiserKind`], mirroring the two
//! optimiser backends `madym` historically drove through ALGLIB:
//! a box-constrained quasi-Newton method (`Bleic`) and a simplex method
//! (`Ns`, Nelder-Mead) for use when the objective is not smooth enough for
//! gradient-based search. Both respect per-parameter lower/upper bounds
//! exactly — the minimiser never evaluates the objective outside them and
//! the returned parameter vector always lies within them.

mod bleic;
mod bounds;
mod nelder_mead;

pub use bounds::Bounds;

use nalgebra::DVector;

/// A function to be minimised over a bounded region of parameter space.
pub trait CostFunction {
    /// Evaluate the objective at `x`. `x.len()` equals [`Bounds::len`] of the
    /// bounds passed to the solver. Implementations may return `f64::INFINITY`
    /// to reject a point (e.g. an invalid parameter combination) without
    /// aborting the search.
    fn cost(&self, x: &DVector<f64>) -> f64;
}

/// Selects which bounded minimiser drives [`minimise`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimiserKind {
    /// Box-constrained quasi-Newton search (spectral projected gradient with
    /// Armijo backtracking). Default; analogous to ALGLIB's `minbc`/`mincg`
    /// solvers madym historically used.
    Bleic,
    /// Nelder-Mead simplex search, clamped to bounds at every step. Used when
    /// the objective is noisy or non-smooth.
    Ns,
}

impl Default for OptimiserKind {
    fn default() -> Self {
        OptimiserKind::Bleic
    }
}

/// Termination reason of a [`minimise`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The gradient (or simplex spread) fell below tolerance.
    Converged,
    /// `max_iterations` was reached before convergence.
    MaxIterations,
}

/// Outcome of a bounded minimisation run.
#[derive(Debug, Clone)]
pub struct OptimResult {
    /// Parameter vector at termination. Always within the supplied bounds.
    pub params: DVector<f64>,
    /// Objective value at `params`.
    pub cost: f64,
    /// Number of outer iterations performed.
    pub iterations: usize,
    pub stop_reason: StopReason,
}

/// Step used for numerical (central-difference) gradient estimation, scaled
/// per parameter as `h_i = NUMERICAL_STEP * max(1, |x_i|)`.
pub const NUMERICAL_STEP: f64 = 1e-4;

/// Minimise `f` over `bounds`, starting from `x0`.
///
/// `x0` is clamped into `bounds` before the first evaluation. `max_iterations
/// == 0` means "run to convergence" (an internal generous cap still applies
/// so the solver cannot loop forever on a pathological objective).
pub fn minimise(
    f: &dyn CostFunction,
    bounds: &Bounds,
    x0: &DVector<f64>,
    max_iterations: usize,
    kind: OptimiserKind,
) -> OptimResult {
    assert_eq!(x0.len(), bounds.len(), "initial point / bounds length mismatch");
    let x0 = bounds.clamp(x0);
    match kind {
        OptimiserKind::Bleic => bleic::minimise(f, bounds, &x0, max_iterations),
        OptimiserKind::Ns => nelder_mead::minimise(f, bounds, &x0, max_iterations),
    }
}

pub(crate) fn numerical_gradient(
    f: &dyn CostFunction,
    bounds: &Bounds,
    x: &DVector<f64>,
) -> DVector<f64> {
    let n = x.len();
    let mut grad = DVector::zeros(n);
    let mut xp = x.clone();
    let mut xm = x.clone();
    for i in 0..n {
        let h = NUMERICAL_STEP * x[i].abs().max(1.0);
        xp[i] = (x[i] + h).min(bounds.hi[i]);
        xm[i] = (x[i] - h).max(bounds.lo[i]);
        let denom = xp[i] - xm[i];
        if denom.abs() < f64::EPSILON {
            grad[i] = 0.0;
        } else {
            grad[i] = (f.cost(&xp) - f.cost(&xm)) / denom;
        }
        xp[i] = x[i];
        xm[i] = x[i];
    }
    grad
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sphere {
        centre: DVector<f64>,
    }
    impl CostFunction for Sphere {
        fn cost(&self, x: &DVector<f64>) -> f64 {
            (x - &self.centre).norm_squared()
        }
    }

    #[test]
    fn bleic_finds_unconstrained_minimum() {
        let centre = DVector::from_vec(vec![1.5, -2.0]);
        let f = Sphere { centre: centre.clone() };
        let bounds = Bounds::new(vec![-10.0, -10.0], vec![10.0, 10.0]).unwrap();
        let x0 = DVector::from_vec(vec![0.0, 0.0]);
        let res = minimise(&f, &bounds, &x0, 500, OptimiserKind::Bleic);
        assert!((res.params[0] - 1.5).abs() < 1e-2);
        assert!((res.params[1] + 2.0).abs() < 1e-2);
    }

    #[test]
    fn bleic_respects_bounds() {
        let centre = DVector::from_vec(vec![5.0]);
        let f = Sphere { centre };
        let bounds = Bounds::new(vec![0.0], vec![1.0]).unwrap();
        let x0 = DVector::from_vec(vec![0.5]);
        let res = minimise(&f, &bounds, &x0, 500, OptimiserKind::Bleic);
        assert!((res.params[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn nelder_mead_finds_minimum() {
        let centre = DVector::from_vec(vec![0.3, 0.7]);
        let f = Sphere { centre: centre.clone() };
        let bounds = Bounds::new(vec![-1.0, -1.0], vec![1.0, 1.0]).unwrap();
        let x0 = DVector::from_vec(vec![0.0, 0.0]);
        let res = minimise(&f, &bounds, &x0, 1000, OptimiserKind::Ns);
        assert!((res.params[0] - 0.3).abs() < 1e-2);
        assert!((res.params[1] - 0.7).abs() < 1e-2);
    }
}
