//! Truncated-normal moments and the search for parent parameters that give a
//! truncated normal a requested mean and standard deviation.
//!
//! Everything is computed on the standardized bounds `a = (lower - loc) / scale`
//! and `b = (upper - loc) / scale`. An interval in the upper tail is handled
//! through the Mills ratio `R(x) = (1 - Φ(x)) / φ(x)`, so no quantity is formed
//! as a difference of underflowing tail probabilities. Lower-tail intervals are
//! mirrored onto the upper tail.

use argmin::{
    core::{CostFunction, Error, Executor},
    solver::{brent::BrentRoot, neldermead::NelderMead},
};
use rand::Rng;
use rand_distr::{Distribution as Sampler, Exp};
use statrs::distribution::{ContinuousCDF, Normal};
use statrs::function::erf::erfc;
use std::f64::consts::{FRAC_1_SQRT_2, PI};

const MAX_ITERS: u64 = 2000;
/// Largest relative miss on the mean or the sd accepted from the search
const MATCH_TOL: f64 = 1e-3;
/// From here on the Mills ratio comes from its continued fraction
const TAIL_START: f64 = 5.0;
const FRACTION_DEPTH: usize = 200;
/// Search range of the standardized bound for one-sided truncation
const BOUND_RANGE: f64 = 1e4;

fn phi(z: f64) -> f64 {
    if z.is_infinite() {
        0.0
    } else {
        (-0.5 * z * z).exp() / (2.0 * PI).sqrt()
    }
}

// z·φ(z), zero at ±inf
fn z_phi(z: f64) -> f64 {
    if z.is_infinite() {
        0.0
    } else {
        z * phi(z)
    }
}

/// Upper tail probability 1 - Φ(z)
fn upper_tail(z: f64) -> f64 {
    0.5 * erfc(z * FRAC_1_SQRT_2)
}

// Leading partial denominators F0, F1, F2 of
// 1/R(x) = x + 1/(x + 2/(x + 3/(x + ...))), with F_k = x + (k + 1)/F_{k+1}.
fn mills_fraction(x: f64) -> [f64; 3] {
    let mut f = x;
    let mut head = [x; 3];
    for k in (0..FRACTION_DEPTH).rev() {
        f = x + (k + 1) as f64 / f;
        if k < 3 {
            head[k] = f;
        }
    }
    head
}

/// Mills ratio for `x >= 0`
fn mills_ratio(x: f64) -> f64 {
    if x.is_infinite() {
        0.0
    } else if x < TAIL_START {
        upper_tail(x) / phi(x)
    } else {
        1.0 / mills_fraction(x)[0]
    }
}

/// Standard normal truncated to `[a, b]`. Its mass is
/// `φ(anchor) · exp(ln_scaled_mass)`.
#[derive(Debug, Clone, Copy)]
struct Standardized {
    mean: f64,
    var: f64,
    anchor: f64,
    ln_scaled_mass: f64,
}

fn standardized(a: f64, b: f64) -> Standardized {
    if b < 0.0 {
        let mirrored = standardized(-b, -a);
        return Standardized {
            mean: -mirrored.mean,
            ..mirrored
        };
    }

    if a <= 0.0 {
        let z = upper_tail(a) - upper_tail(b);
        let d = (phi(a) - phi(b)) / z;
        return Standardized {
            mean: d,
            var: 1.0 + (z_phi(a) - z_phi(b)) / z - d * d,
            anchor: 0.0,
            ln_scaled_mass: (z / phi(0.0)).ln(),
        };
    }

    if b.is_infinite() && a >= TAIL_START {
        // var = 1 - F0/F1 rewritten without cancellation
        let [f0, f1, f2] = mills_fraction(a);
        return Standardized {
            mean: f0,
            var: (2.0 * f1 - f2) / (f2 * f1 * f1),
            anchor: a,
            ln_scaled_mass: -f0.ln(),
        };
    }

    // Z / φ(a) = R(a) - r R(b) with r = φ(b) / φ(a)
    let r = (-0.5 * (b - a) * (b + a)).exp();
    let w = mills_ratio(a) - r * mills_ratio(b);
    let b_term = if b.is_infinite() { 0.0 } else { b * r };
    let d = (1.0 - r) / w;
    Standardized {
        mean: d,
        var: 1.0 + (a - b_term) / w - d * d,
        anchor: a,
        ln_scaled_mass: w.ln(),
    }
}

/// `(mean, variance)` of N(loc, scale) truncated to `[lower, upper]`
pub fn moments(loc: f64, scale: f64, lower: f64, upper: f64) -> (f64, f64) {
    let s = standardized((lower - loc) / scale, (upper - loc) / scale);
    (loc + scale * s.mean, scale * scale * s.var)
}

/// Log of the probability mass of N(loc, scale) inside `[lower, upper]`
pub fn log_mass(loc: f64, scale: f64, lower: f64, upper: f64) -> f64 {
    let s = standardized((lower - loc) / scale, (upper - loc) / scale);
    -0.5 * s.anchor * s.anchor - 0.5 * (2.0 * PI).ln() + s.ln_scaled_mass
}

/// Log density at a point `x` inside `[lower, upper]`
pub fn log_density(loc: f64, scale: f64, lower: f64, upper: f64, x: f64) -> f64 {
    let s = standardized((lower - loc) / scale, (upper - loc) / scale);
    let z = (x - loc) / scale;
    -0.5 * (z - s.anchor) * (z + s.anchor) - scale.ln() - s.ln_scaled_mass
}

/// Draw from N(loc, scale) truncated to `[lower, upper]`
pub fn sample<R: Rng + ?Sized>(loc: f64, scale: f64, lower: f64, upper: f64, rng: &mut R) -> f64 {
    let z = sample_standardized((lower - loc) / scale, (upper - loc) / scale, rng);
    (loc + scale * z).clamp(lower, upper)
}

fn sample_standardized<R: Rng + ?Sized>(a: f64, b: f64, rng: &mut R) -> f64 {
    if b < 0.0 {
        return -sample_standardized(-b, -a, rng);
    }
    if a >= TAIL_START {
        return sample_tail(a, b, rng);
    }

    let unit = match Normal::new(0.0, 1.0) {
        Ok(d) => d,
        Err(_) => return f64::NAN,
    };
    let u: f64 = rng.random();
    if a > 0.0 {
        // invert through the upper tail so Φ(a) close to 1 keeps its digits
        let (qa, qb) = (upper_tail(a), upper_tail(b));
        -unit.inverse_cdf(qb + u * (qa - qb))
    } else {
        let (lo, hi) = (unit.cdf(a), unit.cdf(b));
        unit.inverse_cdf(lo + u * (hi - lo))
    }
}

// Rejection sampling far in the upper tail: translated exponential proposals,
// or uniform ones when the interval is narrow compared to 1/a
fn sample_tail<R: Rng + ?Sized>(a: f64, b: f64, rng: &mut R) -> f64 {
    if b - a < 1.0 / a {
        loop {
            let z = rng.random_range(a..b);
            let u: f64 = rng.random();
            if u <= (-0.5 * (z - a) * (z + a)).exp() {
                return z;
            }
        }
    }

    let alpha = 0.5 * (a + (a * a + 4.0).sqrt());
    let exp = match Exp::new(alpha) {
        Ok(d) => d,
        Err(_) => return f64::NAN,
    };
    loop {
        let z = a + Sampler::<f64>::sample(&exp, rng);
        let u: f64 = rng.random();
        if z <= b && u <= (-0.5 * (z - alpha).powi(2)).exp() {
            return z;
        }
    }
}

// sd / (mean - a) of the standard normal truncated to [a, inf). It increases
// from 0 towards 1 as a grows.
fn lower_bound_shape(a: f64) -> f64 {
    if a >= TAIL_START {
        let [_, f1, f2] = mills_fraction(a);
        // mean - a = 1/F1
        ((2.0 * f1 - f2) / (f2 * f1 * f1)).sqrt() * f1
    } else {
        let s = standardized(a, f64::INFINITY);
        s.var.sqrt() / (s.mean - a)
    }
}

struct ShapeTarget {
    ratio: f64,
}

impl CostFunction for ShapeTarget {
    type Param = f64;
    type Output = f64;
    fn cost(&self, a: &Self::Param) -> Result<Self::Output, Error> {
        Ok(lower_bound_shape(*a) - self.ratio)
    }
}

// One finite bound at distance `gap` below the mean. Returns the parent
// `(loc - lower, scale)`.
fn match_lower_bound(gap: f64, sd: f64) -> Result<(f64, f64), String> {
    let ratio = sd / gap;
    if lower_bound_shape(-BOUND_RANGE) >= ratio {
        // the bound lies too far out to shift the moments
        return Ok((gap, sd));
    }

    let a = if lower_bound_shape(BOUND_RANGE) <= ratio {
        // sd at or above the gap is only reached in the exponential limit
        BOUND_RANGE
    } else {
        let solver = BrentRoot::new(-BOUND_RANGE, BOUND_RANGE, 1e-10);
        let res = Executor::new(ShapeTarget { ratio }, solver)
            .configure(|state| state.max_iters(MAX_ITERS))
            .run()
            .map_err(|e| e.to_string())?;
        res.state
            .best_param
            .ok_or_else(|| "root search for the truncation point gave no estimate".to_string())?
    };

    let excess = if a >= TAIL_START {
        1.0 / mills_fraction(a)[1]
    } else {
        standardized(a, f64::INFINITY).mean - a
    };
    let scale = gap / excess;
    Ok((-a * scale, scale))
}

struct MomentTarget {
    mean: f64,
    sd: f64,
    lower: f64,
    upper: f64,
}

impl CostFunction for MomentTarget {
    type Param = Vec<f64>;
    type Output = f64;
    fn cost(&self, p: &Self::Param) -> Result<Self::Output, Error> {
        let (loc, scale) = (p[0], p[1].exp());
        let (mean, var) = moments(loc, scale, self.lower, self.upper);
        let cost = ((mean - self.mean) / self.sd).powi(2) + ((var.sqrt() - self.sd) / self.sd).powi(2);
        if cost.is_finite() {
            Ok(cost)
        } else {
            Ok(f64::MAX)
        }
    }
}

fn match_interval(mean: f64, sd: f64, lower: f64, upper: f64) -> Result<(f64, f64), String> {
    let target = MomentTarget {
        mean,
        sd,
        lower,
        upper,
    };
    let start = vec![mean, sd.ln()];
    let simplex = vec![
        start.clone(),
        vec![mean + 0.5 * sd, sd.ln()],
        vec![mean, sd.ln() + 0.5],
    ];

    let solver: NelderMead<Vec<f64>, f64> = NelderMead::new(simplex)
        .with_sd_tolerance(1e-14)
        .map_err(|e| e.to_string())?;
    let res = Executor::new(target, solver)
        .configure(|state| state.max_iters(MAX_ITERS))
        .run()
        .map_err(|e| e.to_string())?;
    let best = res.state.best_param.unwrap_or(start);
    Ok((best[0], best[1].exp()))
}

/// Find `(loc, scale)` of the parent normal such that truncating it to
/// `[lower, upper]` yields the requested mean and standard deviation.
///
/// A one-sided bound reduces to a root search on the standardized bound.
/// Targets with the sd at the distance between mean and bound are reached
/// only in the limit, and are accepted once the fit is within `1e-3`.
pub fn match_moments(mean: f64, sd: f64, lower: f64, upper: f64) -> Result<(f64, f64), String> {
    if !(mean > lower && mean < upper) {
        return Err(format!(
            "mean {} lies outside the truncation bounds [{}, {}]",
            mean, lower, upper
        ));
    }

    let (loc, scale) = match (lower.is_finite(), upper.is_finite()) {
        (true, false) => {
            let (offset, scale) = match_lower_bound(mean - lower, sd)?;
            (lower + offset, scale)
        }
        (false, true) => {
            let (offset, scale) = match_lower_bound(upper - mean, sd)?;
            (upper - offset, scale)
        }
        _ => match_interval(mean, sd, lower, upper)?,
    };

    let (m, v) = moments(loc, scale, lower, upper);
    let miss = ((m - mean) / sd).abs().max(((v.sqrt() - sd) / sd).abs());
    if !miss.is_finite() || miss > MATCH_TOL {
        return Err(format!(
            "no normal truncated to [{}, {}] has mean {} and sd {}",
            lower, upper, mean, sd
        ));
    }
    tracing::trace!(loc, scale, miss, "Matched truncated normal moments");
    Ok((loc, scale))
}
