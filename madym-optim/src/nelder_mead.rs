//! Bounded Nelder-Mead simplex search ("NS" in the spec's optimiser tag).
//!
//! Used when the objective is not smooth enough to trust a numerical
//! gradient (it never evaluates a gradient). Every simplex vertex is clamped
//! to the bounds immediately after being generated, so the search never
//! leaves the feasible box.

use nalgebra::DVector;

use crate::bounds::Bounds;
use crate::{CostFunction, OptimResult, StopReason};

const ALPHA: f64 = 1.0; // reflection
const GAMMA: f64 = 2.0; // expansion
const RHO: f64 = 0.5; // contraction
const SIGMA: f64 = 0.5; // shrink
const EPS_SPREAD: f64 = 1e-10;
const DEFAULT_MAX_ITERATIONS: usize = 4000;

struct Vertex {
    x: DVector<f64>,
    f: f64,
}

fn initial_simplex(bounds: &Bounds, x0: &DVector<f64>) -> Vec<DVector<f64>> {
    let n = x0.len();
    let mut simplex = Vec::with_capacity(n + 1);
    simplex.push(x0.clone());
    for i in 0..n {
        let mut v = x0.clone();
        let range = bounds.hi[i] - bounds.lo[i];
        let step = if range > 0.0 {
            (0.05 * range).max(1e-6)
        } else {
            1e-3
        };
        v[i] = if v[i] + step <= bounds.hi[i] {
            v[i] + step
        } else {
            v[i] - step
        };
        simplex.push(bounds.clamp(&v));
    }
    simplex
}

pub(crate) fn minimise(
    f: &dyn CostFunction,
    bounds: &Bounds,
    x0: &DVector<f64>,
    max_iterations: usize,
) -> OptimResult {
    let cap = if max_iterations == 0 {
        DEFAULT_MAX_ITERATIONS
    } else {
        max_iterations
    };
    let n = x0.len();

    if n == 0 {
        return OptimResult {
            params: x0.clone(),
            cost: f.cost(x0),
            iterations: 0,
            stop_reason: StopReason::Converged,
        };
    }

    let mut simplex: Vec<Vertex> = initial_simplex(bounds, x0)
        .into_iter()
        .map(|x| {
            let fx = f.cost(&x);
            Vertex { x, f: fx }
        })
        .collect();

    let mut iterations = 0usize;
    let mut stop_reason = StopReason::MaxIterations;

    while iterations < cap {
        simplex.sort_by(|a, b| a.f.partial_cmp(&b.f).unwrap_or(std::cmp::Ordering::Equal));

        let spread = (simplex.last().unwrap().f - simplex[0].f).abs();
        if spread < EPS_SPREAD {
            stop_reason = StopReason::Converged;
            break;
        }

        let worst = simplex.len() - 1;
        let centroid: DVector<f64> = simplex[..worst]
            .iter()
            .fold(DVector::zeros(n), |acc, v| acc + &v.x)
            / (worst as f64);

        let reflected = bounds.clamp(&(&centroid + (&centroid - &simplex[worst].x).scale(ALPHA)));
        let f_reflected = f.cost(&reflected);

        if f_reflected < simplex[0].f {
            let expanded =
                bounds.clamp(&(&centroid + (&reflected - &centroid).scale(GAMMA)));
            let f_expanded = f.cost(&expanded);
            if f_expanded < f_reflected {
                simplex[worst] = Vertex { x: expanded, f: f_expanded };
            } else {
                simplex[worst] = Vertex { x: reflected, f: f_reflected };
            }
        } else if f_reflected < simplex[worst - 1].f {
            simplex[worst] = Vertex { x: reflected, f: f_reflected };
        } else {
            let contracted = bounds.clamp(
                &(&centroid + (&simplex[worst].x - &centroid).scale(RHO)),
            );
            let f_contracted = f.cost(&contracted);
            if f_contracted < simplex[worst].f {
                simplex[worst] = Vertex { x: contracted, f: f_contracted };
            } else {
                let best_x = simplex[0].x.clone();
                for v in simplex[1..].iter_mut() {
                    v.x = bounds.clamp(&(&best_x + (&v.x - &best_x).scale(SIGMA)));
                    v.f = f.cost(&v.x);
                }
            }
        }

        iterations += 1;
    }

    simplex.sort_by(|a, b| a.f.partial_cmp(&b.f).unwrap_or(std::cmp::Ordering::Equal));
    let best = &simplex[0];
    OptimResult {
        params: best.x.clone(),
        cost: best.f,
        iterations,
        stop_reason,
    }
}
