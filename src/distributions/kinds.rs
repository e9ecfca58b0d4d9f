//! The closed set of supported prior families and their realized forms.

use std::f64::consts::{FRAC_2_PI, LN_2, PI};
use std::fmt;

use indexmap::IndexMap;
use rand::Rng;
use rand_distr::Distribution as Sampler;
use serde::{Deserialize, Serialize};
use statrs::distribution::Continuous;

use super::truncated;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistributionKind {
    Normal,
    HalfNormal,
    Beta,
    Gamma,
    InverseGamma,
    Uniform,
    Exponential,
}

/// One accepted set of canonical parameters for a kind
#[derive(Debug, Clone, Copy)]
pub struct Parametrization {
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
}

const fn exactly(required: &'static [&'static str]) -> Parametrization {
    Parametrization {
        required,
        optional: &[],
    }
}

impl DistributionKind {
    /// Resolve a (case-insensitive) family name or alias
    pub fn from_name(name: &str) -> Option<DistributionKind> {
        match name.trim().to_ascii_lowercase().as_str() {
            "normal" | "norm" | "n" | "gaussian" => Some(DistributionKind::Normal),
            "halfnormal" | "halfnorm" | "half_normal" | "hn" => Some(DistributionKind::HalfNormal),
            "beta" => Some(DistributionKind::Beta),
            "gamma" | "g" => Some(DistributionKind::Gamma),
            "inv_gamma" | "invgamma" | "inverse_gamma" | "inversegamma" | "ig" => {
                Some(DistributionKind::InverseGamma)
            }
            "uniform" | "unif" | "u" => Some(DistributionKind::Uniform),
            "exponential" | "expon" | "exp" => Some(DistributionKind::Exponential),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DistributionKind::Normal => "normal",
            DistributionKind::HalfNormal => "halfnormal",
            DistributionKind::Beta => "beta",
            DistributionKind::Gamma => "gamma",
            DistributionKind::InverseGamma => "inv_gamma",
            DistributionKind::Uniform => "uniform",
            DistributionKind::Exponential => "exponential",
        }
    }

    /// Map a (case-insensitive) parameter name to its canonical name for this kind
    pub fn canonical_param(self, alias: &str) -> Option<&'static str> {
        let alias = alias.trim().to_ascii_lowercase();
        let canonical = match (self, alias.as_str()) {
            (DistributionKind::Normal, "loc" | "mean" | "mu") => "loc",
            (DistributionKind::Normal, "scale" | "sd" | "std" | "sigma") => "scale",
            (DistributionKind::Normal, "lower" | "min") => "lower",
            (DistributionKind::Normal, "upper" | "max") => "upper",

            (DistributionKind::HalfNormal, "scale" | "sigma") => "scale",
            (DistributionKind::HalfNormal, "loc") => "loc",
            (DistributionKind::HalfNormal, "mean" | "mu") => "mean",
            (DistributionKind::HalfNormal, "sd" | "std") => "sd",

            (DistributionKind::Beta, "a" | "alpha") => "a",
            (DistributionKind::Beta, "b" | "beta") => "b",
            (DistributionKind::Beta, "mean" | "mu") => "mean",
            (DistributionKind::Beta, "sd" | "std") => "sd",

            (DistributionKind::Gamma, "a" | "alpha" | "shape" | "k") => "a",
            (DistributionKind::Gamma, "rate" | "b" | "beta") => "rate",
            (DistributionKind::Gamma, "scale" | "theta") => "scale",
            (DistributionKind::Gamma, "mean" | "mu") => "mean",
            (DistributionKind::Gamma, "sd" | "std") => "sd",

            (DistributionKind::InverseGamma, "a" | "alpha" | "shape") => "a",
            (DistributionKind::InverseGamma, "scale" | "b" | "beta") => "scale",
            (DistributionKind::InverseGamma, "mean" | "mu") => "mean",
            (DistributionKind::InverseGamma, "sd" | "std") => "sd",

            (DistributionKind::Uniform, "lower" | "min" | "low") => "lower",
            (DistributionKind::Uniform, "upper" | "max" | "high") => "upper",

            (DistributionKind::Exponential, "rate" | "lam" | "lambda") => "rate",
            (DistributionKind::Exponential, "scale") => "scale",
            (DistributionKind::Exponential, "mean") => "mean",
            _ => return None,
        };
        Some(canonical)
    }

    pub fn parametrizations(self) -> &'static [Parametrization] {
        const NORMAL: &[Parametrization] = &[Parametrization {
            required: &["loc", "scale"],
            optional: &["lower", "upper"],
        }];
        const HALF_NORMAL: &[Parametrization] = &[
            exactly(&["scale"]),
            exactly(&["loc", "scale"]),
            exactly(&["mean", "sd"]),
        ];
        const BETA: &[Parametrization] = &[exactly(&["a", "b"]), exactly(&["mean", "sd"])];
        const GAMMA: &[Parametrization] = &[
            exactly(&["a", "rate"]),
            exactly(&["a", "scale"]),
            exactly(&["mean", "sd"]),
        ];
        const INVERSE_GAMMA: &[Parametrization] =
            &[exactly(&["a", "scale"]), exactly(&["mean", "sd"])];
        const UNIFORM: &[Parametrization] = &[exactly(&["lower", "upper"])];
        const EXPONENTIAL: &[Parametrization] =
            &[exactly(&["rate"]), exactly(&["scale"]), exactly(&["mean"])];

        match self {
            DistributionKind::Normal => NORMAL,
            DistributionKind::HalfNormal => HALF_NORMAL,
            DistributionKind::Beta => BETA,
            DistributionKind::Gamma => GAMMA,
            DistributionKind::InverseGamma => INVERSE_GAMMA,
            DistributionKind::Uniform => UNIFORM,
            DistributionKind::Exponential => EXPONENTIAL,
        }
    }

    /// The parametrization matching `names`, if any
    pub fn match_parametrization<'a, I>(self, names: I) -> Option<Parametrization>
    where
        I: IntoIterator<Item = &'a str> + Clone,
    {
        self.parametrizations().iter().copied().find(|p| {
            p.required
                .iter()
                .all(|r| names.clone().into_iter().any(|n| n == *r))
                && names
                    .clone()
                    .into_iter()
                    .all(|n| p.required.iter().chain(p.optional).any(|r| *r == n))
        })
    }

    fn describe_parametrizations(self) -> String {
        self.parametrizations()
            .iter()
            .map(|p| {
                let mut s = format!("{{{}}}", p.required.join(", "));
                if !p.optional.is_empty() {
                    s.push_str(&format!(" + optional {{{}}}", p.optional.join(", ")));
                }
                s
            })
            .collect::<Vec<_>>()
            .join(" or ")
    }
}

impl fmt::Display for DistributionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A fully parameterized distribution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Distribution {
    Normal { loc: f64, scale: f64 },
    /// Normal with parent parameters `loc`/`scale` restricted to `[lower, upper]`
    TruncatedNormal {
        loc: f64,
        scale: f64,
        lower: f64,
        upper: f64,
    },
    /// `loc + |N(0, scale)|`
    HalfNormal { loc: f64, scale: f64 },
    Beta { a: f64, b: f64 },
    Gamma { shape: f64, rate: f64 },
    InverseGamma { shape: f64, scale: f64 },
    Uniform { lower: f64, upper: f64 },
    Exponential { rate: f64 },
}

fn positive(name: &str, v: f64) -> Result<f64, String> {
    if v.is_finite() && v > 0.0 {
        Ok(v)
    } else {
        Err(format!("'{}' must be positive and finite, got {}", name, v))
    }
}

fn finite(name: &str, v: f64) -> Result<f64, String> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(format!("'{}' must be finite, got {}", name, v))
    }
}

impl Distribution {
    /// Build from canonical numeric parameters, moment-matching where the
    /// parametrization is `{mean, sd}`. Errors are plain reasons; the caller
    /// attaches the variable name and source fragment.
    pub fn from_params(
        kind: DistributionKind,
        params: &IndexMap<String, f64>,
    ) -> Result<Distribution, String> {
        let names: Vec<&str> = params.keys().map(|k| k.as_str()).collect();
        if kind.match_parametrization(names.iter().copied()).is_none() {
            return Err(format!(
                "parameters {{{}}} do not match {} ({})",
                names.join(", "),
                kind,
                kind.describe_parametrizations()
            ));
        }
        let get = |k: &str| params.get(k).copied();

        let dist = match kind {
            DistributionKind::Normal => {
                let loc = finite("loc", get("loc").unwrap_or(0.0))?;
                let scale = positive("scale", get("scale").unwrap_or(1.0))?;
                let lower = get("lower").unwrap_or(f64::NEG_INFINITY);
                let upper = get("upper").unwrap_or(f64::INFINITY);
                if lower.is_nan() || upper.is_nan() || lower >= upper {
                    return Err(format!("truncation bounds [{}, {}] are empty", lower, upper));
                }
                if lower.is_infinite() && upper.is_infinite() {
                    Distribution::Normal { loc, scale }
                } else {
                    let (parent_loc, parent_scale) =
                        truncated::match_moments(loc, scale, lower, upper)?;
                    Distribution::TruncatedNormal {
                        loc: parent_loc,
                        scale: parent_scale,
                        lower,
                        upper,
                    }
                }
            }
            DistributionKind::HalfNormal => match (get("mean"), get("sd")) {
                (Some(mean), Some(sd)) => {
                    let sd = positive("sd", sd)?;
                    let scale = sd / (1.0 - FRAC_2_PI).sqrt();
                    Distribution::HalfNormal {
                        loc: finite("mean", mean)? - scale * FRAC_2_PI.sqrt(),
                        scale,
                    }
                }
                _ => Distribution::HalfNormal {
                    loc: finite("loc", get("loc").unwrap_or(0.0))?,
                    scale: positive("scale", get("scale").unwrap_or(1.0))?,
                },
            },
            DistributionKind::Beta => match (get("mean"), get("sd")) {
                (Some(mean), Some(sd)) => {
                    let var = positive("sd", sd)?.powi(2);
                    if !(mean > 0.0 && mean < 1.0) || var >= mean * (1.0 - mean) {
                        return Err(format!(
                            "no beta distribution has mean {} and sd {}",
                            mean, sd
                        ));
                    }
                    let common = mean * (1.0 - mean) / var - 1.0;
                    Distribution::Beta {
                        a: mean * common,
                        b: (1.0 - mean) * common,
                    }
                }
                _ => Distribution::Beta {
                    a: positive("a", get("a").unwrap_or(f64::NAN))?,
                    b: positive("b", get("b").unwrap_or(f64::NAN))?,
                },
            },
            DistributionKind::Gamma => match (get("mean"), get("sd"), get("scale")) {
                (Some(mean), Some(sd), _) => {
                    let mean = positive("mean", mean)?;
                    let sd = positive("sd", sd)?;
                    Distribution::Gamma {
                        shape: (mean / sd).powi(2),
                        rate: mean / sd.powi(2),
                    }
                }
                (_, _, Some(scale)) => Distribution::Gamma {
                    shape: positive("a", get("a").unwrap_or(f64::NAN))?,
                    rate: 1.0 / positive("scale", scale)?,
                },
                _ => Distribution::Gamma {
                    shape: positive("a", get("a").unwrap_or(f64::NAN))?,
                    rate: positive("rate", get("rate").unwrap_or(f64::NAN))?,
                },
            },
            DistributionKind::InverseGamma => match (get("mean"), get("sd")) {
                (Some(mean), Some(sd)) => {
                    let mean = positive("mean", mean)?;
                    let sd = positive("sd", sd)?;
                    let shape = (mean / sd).powi(2) + 2.0;
                    Distribution::InverseGamma {
                        shape,
                        scale: mean * (shape - 1.0),
                    }
                }
                _ => Distribution::InverseGamma {
                    shape: positive("a", get("a").unwrap_or(f64::NAN))?,
                    scale: positive("scale", get("scale").unwrap_or(f64::NAN))?,
                },
            },
            DistributionKind::Uniform => {
                let lower = finite("lower", get("lower").unwrap_or(f64::NAN))?;
                let upper = finite("upper", get("upper").unwrap_or(f64::NAN))?;
                if lower >= upper {
                    return Err(format!("lower bound {} is not below upper bound {}", lower, upper));
                }
                Distribution::Uniform { lower, upper }
            }
            DistributionKind::Exponential => {
                let rate = match (get("rate"), get("scale"), get("mean")) {
                    (Some(rate), _, _) => positive("rate", rate)?,
                    (_, Some(scale), _) => 1.0 / positive("scale", scale)?,
                    (_, _, Some(mean)) => 1.0 / positive("mean", mean)?,
                    _ => return Err("exponential needs one of rate, scale or mean".to_string()),
                };
                Distribution::Exponential { rate }
            }
        };
        Ok(dist)
    }

    pub fn kind(&self) -> DistributionKind {
        match self {
            Distribution::Normal { .. } | Distribution::TruncatedNormal { .. } => {
                DistributionKind::Normal
            }
            Distribution::HalfNormal { .. } => DistributionKind::HalfNormal,
            Distribution::Beta { .. } => DistributionKind::Beta,
            Distribution::Gamma { .. } => DistributionKind::Gamma,
            Distribution::InverseGamma { .. } => DistributionKind::InverseGamma,
            Distribution::Uniform { .. } => DistributionKind::Uniform,
            Distribution::Exponential { .. } => DistributionKind::Exponential,
        }
    }

    pub fn mean(&self) -> f64 {
        match *self {
            Distribution::Normal { loc, .. } => loc,
            Distribution::TruncatedNormal {
                loc,
                scale,
                lower,
                upper,
            } => truncated::moments(loc, scale, lower, upper).0,
            Distribution::HalfNormal { loc, scale } => loc + scale * FRAC_2_PI.sqrt(),
            Distribution::Beta { a, b } => a / (a + b),
            Distribution::Gamma { shape, rate } => shape / rate,
            Distribution::InverseGamma { shape, scale } => {
                if shape > 1.0 {
                    scale / (shape - 1.0)
                } else {
                    f64::INFINITY
                }
            }
            Distribution::Uniform { lower, upper } => 0.5 * (lower + upper),
            Distribution::Exponential { rate } => 1.0 / rate,
        }
    }

    pub fn var(&self) -> f64 {
        match *self {
            Distribution::Normal { scale, .. } => scale * scale,
            Distribution::TruncatedNormal {
                loc,
                scale,
                lower,
                upper,
            } => truncated::moments(loc, scale, lower, upper).1,
            Distribution::HalfNormal { scale, .. } => scale * scale * (1.0 - 2.0 / PI),
            Distribution::Beta { a, b } => a * b / ((a + b).powi(2) * (a + b + 1.0)),
            Distribution::Gamma { shape, rate } => shape / (rate * rate),
            Distribution::InverseGamma { shape, scale } => {
                if shape > 2.0 {
                    scale * scale / ((shape - 1.0).powi(2) * (shape - 2.0))
                } else {
                    f64::INFINITY
                }
            }
            Distribution::Uniform { lower, upper } => (upper - lower).powi(2) / 12.0,
            Distribution::Exponential { rate } => 1.0 / (rate * rate),
        }
    }

    pub fn std(&self) -> f64 {
        self.var().sqrt()
    }

    /// Log density; `-inf` outside the support
    pub fn logpdf(&self, x: f64) -> f64 {
        use statrs::distribution as sd;
        match *self {
            Distribution::Normal { loc, scale } => sd::Normal::new(loc, scale)
                .map(|d| d.ln_pdf(x))
                .unwrap_or(f64::NAN),
            Distribution::TruncatedNormal {
                loc,
                scale,
                lower,
                upper,
            } => {
                if x < lower || x > upper {
                    return f64::NEG_INFINITY;
                }
                truncated::log_density(loc, scale, lower, upper, x)
            }
            Distribution::HalfNormal { loc, scale } => {
                if x < loc {
                    return f64::NEG_INFINITY;
                }
                sd::Normal::new(loc, scale)
                    .map(|d| LN_2 + d.ln_pdf(x))
                    .unwrap_or(f64::NAN)
            }
            Distribution::Beta { a, b } => sd::Beta::new(a, b)
                .map(|d| d.ln_pdf(x))
                .unwrap_or(f64::NAN),
            Distribution::Gamma { shape, rate } => sd::Gamma::new(shape, rate)
                .map(|d| d.ln_pdf(x))
                .unwrap_or(f64::NAN),
            Distribution::InverseGamma { shape, scale } => {
                // statrs calls the scale of the inverse gamma its "rate"
                sd::InverseGamma::new(shape, scale)
                    .map(|d| d.ln_pdf(x))
                    .unwrap_or(f64::NAN)
            }
            Distribution::Uniform { lower, upper } => sd::Uniform::new(lower, upper)
                .map(|d| d.ln_pdf(x))
                .unwrap_or(f64::NAN),
            Distribution::Exponential { rate } => sd::Exp::new(rate)
                .map(|d| d.ln_pdf(x))
                .unwrap_or(f64::NAN),
        }
    }

    pub fn pdf(&self, x: f64) -> f64 {
        self.logpdf(x).exp()
    }

    /// Draw one value
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            Distribution::Normal { loc, scale } => rand_distr::Normal::new(loc, scale)
                .map(|d| d.sample(rng))
                .unwrap_or(f64::NAN),
            Distribution::TruncatedNormal {
                loc,
                scale,
                lower,
                upper,
            } => truncated::sample(loc, scale, lower, upper, rng),
            Distribution::HalfNormal { loc, scale } => rand_distr::Normal::new(0.0, scale)
                .map(|d| loc + Sampler::<f64>::sample(&d, rng).abs())
                .unwrap_or(f64::NAN),
            Distribution::Beta { a, b } => rand_distr::Beta::new(a, b)
                .map(|d| d.sample(rng))
                .unwrap_or(f64::NAN),
            Distribution::Gamma { shape, rate } => rand_distr::Gamma::new(shape, 1.0 / rate)
                .map(|d| d.sample(rng))
                .unwrap_or(f64::NAN),
            Distribution::InverseGamma { shape, scale } => {
                rand_distr::Gamma::new(shape, 1.0 / scale)
                    .map(|d| 1.0 / Sampler::<f64>::sample(&d, rng))
                    .unwrap_or(f64::NAN)
            }
            Distribution::Uniform { lower, upper } => rand_distr::Uniform::new(lower, upper)
                .map(|d| d.sample(rng))
                .unwrap_or(f64::NAN),
            Distribution::Exponential { rate } => rand_distr::Exp::new(rate)
                .map(|d| d.sample(rng))
                .unwrap_or(f64::NAN),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn build(kind: DistributionKind, params: &[(&str, f64)]) -> Result<Distribution, String> {
        let params: IndexMap<String, f64> =
            params.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        Distribution::from_params(kind, &params)
    }

    #[test]
    fn test_aliases() {
        assert_eq!(DistributionKind::from_name("N"), Some(DistributionKind::Normal));
        assert_eq!(
            DistributionKind::from_name("INV_GAMMA"),
            Some(DistributionKind::InverseGamma)
        );
        assert_eq!(DistributionKind::from_name("cauchy"), None);
        assert_eq!(DistributionKind::Normal.canonical_param("Sd"), Some("scale"));
        assert_eq!(DistributionKind::Gamma.canonical_param("beta"), Some("rate"));
        assert_eq!(DistributionKind::InverseGamma.canonical_param("beta"), Some("scale"));
        assert_eq!(DistributionKind::Beta.canonical_param("rate"), None);
    }

    #[test]
    fn test_moment_matching() {
        let cases: Vec<(DistributionKind, Vec<(&str, f64)>, f64, f64)> = vec![
            (DistributionKind::Beta, vec![("mean", 0.95), ("sd", 0.04)], 0.95, 0.04),
            (DistributionKind::Gamma, vec![("mean", 0.95), ("sd", 1.0)], 0.95, 1.0),
            (DistributionKind::InverseGamma, vec![("mean", 0.01), ("sd", 0.1)], 0.01, 0.1),
            (DistributionKind::HalfNormal, vec![("mean", 0.5), ("sd", 1.0)], 0.5, 1.0),
        ];
        for (kind, params, mean, sd) in cases {
            let d = build(kind, &params).unwrap();
            assert_relative_eq!(d.mean(), mean, max_relative = 1e-10);
            assert_relative_eq!(d.std(), sd, max_relative = 1e-10);
        }

        // sd equal to the distance from the bound only fits in the limit
        let d = build(
            DistributionKind::Normal,
            &[("loc", 1.5), ("scale", 1.5), ("lower", 0.0)],
        )
        .unwrap();
        assert!(matches!(d, Distribution::TruncatedNormal { .. }));
        assert_relative_eq!(d.mean(), 1.5, epsilon = 5e-4);
        assert_relative_eq!(d.std(), 1.5, epsilon = 5e-4);
        assert!(d.logpdf(0.5).is_finite());
        assert_eq!(d.logpdf(-0.5), f64::NEG_INFINITY);
    }

    #[test]
    fn test_standard_parametrizations() {
        let d = build(DistributionKind::Beta, &[("a", 1.0), ("b", 1.0)]).unwrap();
        assert_relative_eq!(d.mean(), 0.5);
        assert_relative_eq!(d.std(), 0.28867513459481287, max_relative = 1e-12);

        let d = build(DistributionKind::Gamma, &[("a", 1.0), ("rate", 0.1)]).unwrap();
        assert_relative_eq!(d.mean(), 10.0);

        let d = build(DistributionKind::Gamma, &[("a", 2.0), ("scale", 3.0)]).unwrap();
        assert_relative_eq!(d.mean(), 6.0, max_relative = 1e-12);

        let d = build(DistributionKind::InverseGamma, &[("a", 20.0), ("scale", 1.0)]).unwrap();
        assert_relative_eq!(d.mean(), 1.0 / 19.0);
        assert_relative_eq!(d.var(), 1.0 / (19.0f64.powi(2) * 18.0), max_relative = 1e-12);

        let d = build(DistributionKind::Exponential, &[("mean", 4.0)]).unwrap();
        assert_relative_eq!(d.mean(), 4.0);
    }

    #[test]
    fn test_wrong_parametrization() {
        assert!(build(DistributionKind::Beta, &[("a", 1.0)]).is_err());
        assert!(build(DistributionKind::Gamma, &[("mean", 1.0), ("rate", 1.0)]).is_err());
        assert!(build(DistributionKind::Beta, &[("mean", 0.5), ("sd", 0.9)]).is_err());
        assert!(build(DistributionKind::Normal, &[("loc", 0.0), ("scale", -1.0)]).is_err());
    }

    #[test]
    fn test_logpdf_against_closed_forms() {
        let d = build(DistributionKind::Normal, &[("loc", 1.0), ("scale", 2.0)]).unwrap();
        let expected = -0.5 * (2.0 * PI).ln() - 2.0f64.ln() - 0.125;
        assert_relative_eq!(d.logpdf(2.0), expected, max_relative = 1e-12);

        let d = build(DistributionKind::HalfNormal, &[("scale", 1.0)]).unwrap();
        assert_relative_eq!(d.pdf(0.0), (2.0 / PI).sqrt(), max_relative = 1e-12);
        assert_eq!(d.logpdf(-0.1), f64::NEG_INFINITY);

        let d = build(DistributionKind::Uniform, &[("lower", 0.0), ("upper", 4.0)]).unwrap();
        assert_relative_eq!(d.pdf(1.0), 0.25, max_relative = 1e-12);

        let d = build(DistributionKind::InverseGamma, &[("a", 3.0), ("scale", 2.0)]).unwrap();
        // 2^3 / Γ(3) x^-4 exp(-2/x) at x = 1
        let expected = (8.0f64 / 2.0).ln() - 2.0;
        assert_relative_eq!(d.logpdf(1.0), expected, max_relative = 1e-10);
    }

    #[test]
    fn test_samples_have_the_right_mean() {
        let mut rng = StdRng::seed_from_u64(42);
        let d = build(DistributionKind::Gamma, &[("mean", 2.0), ("sd", 0.5)]).unwrap();
        let n = 20_000;
        let mean: f64 = (0..n).map(|_| d.sample(&mut rng)).sum::<f64>() / n as f64;
        assert_relative_eq!(mean, 2.0, epsilon = 0.05);

        let d = build(
            DistributionKind::Normal,
            &[("loc", 1.0), ("scale", 0.5), ("lower", 0.0)],
        )
        .unwrap();
        for _ in 0..1000 {
            assert!(d.sample(&mut rng) >= 0.0);
        }
    }
}
