//! Timing functions: pure maps from the elapsed ratio of a run to the
//! progress value observers receive.
//!
//! Every built-in curve maps `0.0` to `0.0` and `1.0` to `1.0`. Curves are not
//! clamped; a ratio slightly past `1.0` from a late frame is extrapolated by
//! the curve itself. [`TimingRegistry`] looks curves up by name, and a name it
//! does not know resolves to [`LINEAR`] with a warning.

use std::{borrow::Cow, collections::BTreeMap, f64::consts::PI, fmt, sync::Arc};

use serde::{Deserialize, Serialize};

/// Name of the curve every unresolved selection falls back to.
pub const LINEAR: &str = "linear";

type Curve = dyn Fn(f64) -> f64 + Send + Sync;

/// A pure mapping from a normalised ratio to the progress value handed to
/// observers. Cloning is cheap; clones share the same curve.
#[derive(Clone)]
pub struct TimingFunction {
    name: Cow<'static, str>,
    curve: Arc<Curve>,
}

impl TimingFunction {
    /// Wraps a curve under the given display name.
    pub fn new<F>(name: impl Into<Cow<'static, str>>, curve: F) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            curve: Arc::new(curve),
        }
    }

    /// Wraps an anonymous caller supplied curve.
    pub fn custom<F>(curve: F) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        Self::new("custom", curve)
    }

    /// The identity curve.
    pub fn linear() -> Self {
        Self::new(LINEAR, linear)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluates the curve. The ratio is passed through untouched, so values
    /// outside `[0, 1]` reach the curve as-is.
    pub fn apply(&self, ratio: f64) -> f64 {
        (self.curve)(ratio)
    }

    /// Tabulates the curve at `steps + 1` evenly spaced ratios from 0 to 1.
    pub fn sample(&self, steps: usize) -> Vec<CurveSample> {
        let steps = steps.max(1);
        (0..=steps)
            .map(|i| {
                let ratio = i as f64 / steps as f64;
                CurveSample {
                    ratio,
                    value: self.apply(ratio),
                }
            })
            .collect()
    }
}

impl Default for TimingFunction {
    fn default() -> Self {
        Self::linear()
    }
}

impl fmt::Debug for TimingFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimingFunction")
            .field("name", &self.name)
            .finish()
    }
}

/// One row of a tabulated curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurveSample {
    pub ratio: f64,
    pub value: f64,
}

/// How a caller picks the timing function of a scheduler.
#[derive(Debug, Clone, Default)]
pub enum Timing {
    #[default]
    Linear,
    /// Looked up in a [`TimingRegistry`]; unknown names resolve to linear.
    Named(String),
    Function(TimingFunction),
}

impl From<&str> for Timing {
    fn from(value: &str) -> Self {
        Self::Named(value.to_string())
    }
}

impl From<String> for Timing {
    fn from(value: String) -> Self {
        Self::Named(value)
    }
}

impl From<TimingFunction> for Timing {
    fn from(value: TimingFunction) -> Self {
        Self::Function(value)
    }
}

impl<T: Into<Timing>> From<Option<T>> for Timing {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

/// Name to curve lookup table. [`TimingRegistry::builtin`] carries the
/// Penner easings and the VDI 2143 cam-design motion laws.
#[derive(Debug, Clone)]
pub struct TimingRegistry {
    curves: BTreeMap<String, TimingFunction>,
}

impl TimingRegistry {
    /// Creates a registry that only knows the linear curve.
    pub fn new() -> Self {
        let mut registry = Self {
            curves: BTreeMap::new(),
        };
        registry.register_fn(LINEAR, linear);
        registry
    }

    /// Creates a registry holding every built-in curve.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for &(name, curve) in BUILTIN_CURVES {
            registry.register_fn(name, curve);
        }
        registry
    }

    /// Adds or replaces a curve under `name`.
    pub fn register(&mut self, name: impl Into<String>, curve: TimingFunction) -> &mut Self {
        self.curves.insert(name.into(), curve);
        self
    }

    fn register_fn(&mut self, name: &'static str, curve: fn(f64) -> f64) {
        self.curves.insert(name.to_string(), TimingFunction::new(name, curve));
    }

    pub fn get(&self, name: &str) -> Option<&TimingFunction> {
        self.curves.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.curves.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.curves.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.curves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.curves.is_empty()
    }

    /// Turns a [`Timing`] selection into a concrete curve.
    pub fn resolve(&self, timing: &Timing) -> TimingFunction {
        match timing {
            Timing::Linear => TimingFunction::linear(),
            Timing::Function(curve) => curve.clone(),
            Timing::Named(name) => match self.get(name) {
                Some(curve) => curve.clone(),
                None => {
                    tracing::warn!(name = %name, "unknown timing function, falling back to linear");
                    TimingFunction::linear()
                }
            },
        }
    }
}

impl Default for TimingRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

const BUILTIN_CURVES: &[(&str, fn(f64) -> f64)] = &[
    ("inQuad", in_quad),
    ("outQuad", out_quad),
    ("inOutQuad", in_out_quad),
    ("inCubic", in_cubic),
    ("outCubic", out_cubic),
    ("inOutCubic", in_out_cubic),
    ("inQuart", in_quart),
    ("outQuart", out_quart),
    ("inOutQuart", in_out_quart),
    ("inQuint", in_quint),
    ("outQuint", out_quint),
    ("inOutQuint", in_out_quint),
    ("easeInQuart", in_quart),
    ("easeOutQuart", out_quart),
    ("easeInOutQuart", in_out_quart),
    ("easeInQuint", in_quint),
    ("easeOutQuint", out_quint),
    ("easeInOutQuint", in_out_quint),
    ("quadratic", quadratic),
    ("sinoid", sinoid),
    ("poly5", poly5),
];

pub fn linear(q: f64) -> f64 {
    q
}

pub fn in_quad(q: f64) -> f64 {
    q * q
}

pub fn out_quad(q: f64) -> f64 {
    1.0 - (q - 1.0).powi(2)
}

pub fn in_out_quad(q: f64) -> f64 {
    if q < 0.5 {
        2.0 * q * q
    } else {
        1.0 - 2.0 * (q - 1.0).powi(2)
    }
}

pub fn in_cubic(q: f64) -> f64 {
    q * q * q
}

pub fn out_cubic(q: f64) -> f64 {
    1.0 + (q - 1.0).powi(3)
}

pub fn in_out_cubic(q: f64) -> f64 {
    if q < 0.5 {
        4.0 * q * q * q
    } else {
        1.0 + 4.0 * (q - 1.0).powi(3)
    }
}

pub fn in_quart(q: f64) -> f64 {
    q.powi(4)
}

pub fn out_quart(q: f64) -> f64 {
    1.0 - (q - 1.0).powi(4)
}

pub fn in_out_quart(q: f64) -> f64 {
    if q < 0.5 {
        8.0 * q.powi(4)
    } else {
        1.0 - 8.0 * (q - 1.0).powi(4)
    }
}

pub fn in_quint(q: f64) -> f64 {
    q.powi(5)
}

pub fn out_quint(q: f64) -> f64 {
    1.0 + (q - 1.0).powi(5)
}

pub fn in_out_quint(q: f64) -> f64 {
    if q < 0.5 {
        16.0 * q.powi(5)
    } else {
        1.0 + 16.0 * (q - 1.0).powi(5)
    }
}

/// Piecewise quadratic motion law (constant acceleration, then deceleration).
pub fn quadratic(z: f64) -> f64 {
    if z <= 0.5 {
        2.0 * z * z
    } else {
        -2.0 * z * z + 4.0 * z - 1.0
    }
}

/// Inclined sine motion law; zero velocity and acceleration at both ends.
pub fn sinoid(z: f64) -> f64 {
    z - (2.0 * PI * z).sin() / (2.0 * PI)
}

/// Fifth order polynomial motion law.
pub fn poly5(z: f64) -> f64 {
    let z3 = z * z * z;
    z3 * (10.0 - 15.0 * z + 6.0 * z * z)
}
