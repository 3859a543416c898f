//! Parameter search spaces: grid, random and empty.

use crate::domain::error::{BackflowError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Double(f64),
    Choice(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Double(v) => write!(f, "{v}"),
            ParamValue::Choice(v) => f.write_str(v),
        }
    }
}

/// One point of a search space: parameter name → value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(BTreeMap<String, ParamValue>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        self.0.insert(name.into(), value);
    }

    pub fn with(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn get_int(&self, name: &str) -> Result<i64> {
        match self.get(name) {
            Some(ParamValue::Int(v)) => Ok(*v),
            Some(other) => Err(self.wrong_type(name, "an integer", other)),
            None => Err(self.missing(name)),
        }
    }

    /// Integers widen to doubles.
    pub fn get_double(&self, name: &str) -> Result<f64> {
        match self.get(name) {
            Some(ParamValue::Double(v)) => Ok(*v),
            Some(ParamValue::Int(v)) => Ok(*v as f64),
            Some(other) => Err(self.wrong_type(name, "a number", other)),
            None => Err(self.missing(name)),
        }
    }

    pub fn get_str(&self, name: &str) -> Result<&str> {
        match self.get(name) {
            Some(ParamValue::Choice(v)) => Ok(v),
            Some(other) => Err(self.wrong_type(name, "a choice", other)),
            None => Err(self.missing(name)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn missing(&self, name: &str) -> BackflowError {
        BackflowError::invalid_argument(format!("parameter '{name}' not set in {{{self}}}"))
    }

    fn wrong_type(&self, name: &str, expected: &str, got: &ParamValue) -> BackflowError {
        BackflowError::invalid_argument(format!(
            "parameter '{name}' is {got}, expected {expected}"
        ))
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in &self.0 {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value}")?;
            first = false;
        }
        Ok(())
    }
}

/// The values a single parameter may take.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamRange {
    /// Inclusive `start..=end` in steps of `step`.
    IntRange { start: i64, end: i64, step: i64 },
    Ints(Vec<i64>),
    /// Continuous `[low, high]`; random search only.
    DoubleRange { low: f64, high: f64 },
    Doubles(Vec<f64>),
    Choices(Vec<String>),
}

impl ParamRange {
    pub fn int(start: i64, end: i64) -> Self {
        ParamRange::IntRange {
            start,
            end,
            step: 1,
        }
    }

    pub fn choices<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        ParamRange::Choices(values.into_iter().map(Into::into).collect())
    }

    fn validate(&self, name: &str) -> Result<()> {
        let invalid = |reason: &str| -> Result<()> {
            Err(BackflowError::invalid_argument(format!(
                "parameter '{name}': {reason}"
            )))
        };
        match self {
            ParamRange::IntRange { step, .. } if *step <= 0 => invalid("step must be positive"),
            ParamRange::DoubleRange { low, high } if !(low.is_finite() && high.is_finite()) => {
                invalid("bounds must be finite")
            }
            ParamRange::DoubleRange { low, high } if low > high => {
                invalid("lower bound exceeds upper bound")
            }
            _ => Ok(()),
        }
    }

    /// Number of values, or `None` for a continuous range. Saturates at
    /// `usize::MAX`.
    fn len(&self) -> Option<usize> {
        match self {
            ParamRange::IntRange { start, end, step } => {
                if start > end || *step <= 0 {
                    return Some(0);
                }
                let count = (*end as i128 - *start as i128) / *step as i128 + 1;
                Some(usize::try_from(count).unwrap_or(usize::MAX))
            }
            ParamRange::Ints(values) => Some(values.len()),
            ParamRange::Doubles(values) => Some(values.len()),
            ParamRange::Choices(values) => Some(values.len()),
            ParamRange::DoubleRange { .. } => None,
        }
    }

    /// The `index`-th value in declaration order.
    fn value_at(&self, index: usize) -> Option<ParamValue> {
        match self {
            ParamRange::IntRange { start, end, step } => {
                let v = *start as i128 + index as i128 * *step as i128;
                if v > *end as i128 {
                    return None;
                }
                i64::try_from(v).ok().map(ParamValue::Int)
            }
            ParamRange::Ints(values) => values.get(index).map(|v| ParamValue::Int(*v)),
            ParamRange::Doubles(values) => values.get(index).map(|v| ParamValue::Double(*v)),
            ParamRange::Choices(values) => values.get(index).map(|v| ParamValue::Choice(v.clone())),
            ParamRange::DoubleRange { .. } => None,
        }
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<ParamValue> {
        match self {
            ParamRange::IntRange { start, end, step } => {
                if start > end {
                    return None;
                }
                let steps = (*end as i128 - *start as i128) / *step as i128;
                let v = *start as i128 + rng.gen_range(0..=steps) * *step as i128;
                i64::try_from(v).ok().map(ParamValue::Int)
            }
            ParamRange::DoubleRange { low, high } => {
                Some(ParamValue::Double(rng.gen_range(*low..=*high)))
            }
            ParamRange::Ints(values) => pick(values, rng).map(|v| ParamValue::Int(*v)),
            ParamRange::Doubles(values) => pick(values, rng).map(|v| ParamValue::Double(*v)),
            ParamRange::Choices(values) => {
                pick(values, rng).map(|v| ParamValue::Choice(v.clone()))
            }
        }
    }
}

fn pick<'a, T, R: Rng + ?Sized>(values: &'a [T], rng: &mut R) -> Option<&'a T> {
    if values.is_empty() {
        None
    } else {
        Some(&values[rng.gen_range(0..values.len())])
    }
}

impl FromStr for ParamRange {
    type Err = BackflowError;

    /// Config syntax: `3..15`, `3..15:2`, `0.1..0.9`, `1,2,5`, `0.5,1.5`, `a|b|c`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || BackflowError::invalid_argument(format!("invalid parameter range '{s}'"));

        if s.contains('|') {
            let values: Vec<String> = s
                .split('|')
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect();
            return if values.is_empty() {
                Err(invalid())
            } else {
                Ok(ParamRange::Choices(values))
            };
        }

        if let Some((low, rest)) = s.split_once("..") {
            let (high, step) = match rest.split_once(':') {
                Some((high, step)) => (high, Some(step)),
                None => (rest, None),
            };
            if let (Ok(start), Ok(end)) = (low.trim().parse::<i64>(), high.trim().parse::<i64>()) {
                let step = match step {
                    Some(step) => step.trim().parse().map_err(|_| invalid())?,
                    None => 1,
                };
                return Ok(ParamRange::IntRange { start, end, step });
            }
            if step.is_some() {
                return Err(invalid());
            }
            let low: f64 = low.trim().parse().map_err(|_| invalid())?;
            let high: f64 = high.trim().parse().map_err(|_| invalid())?;
            return Ok(ParamRange::DoubleRange { low, high });
        }

        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let ints: Option<Vec<i64>> = parts.iter().map(|p| p.parse().ok()).collect();
        if let Some(ints) = ints {
            return Ok(ParamRange::Ints(ints));
        }
        let doubles: Option<Vec<f64>> = parts.iter().map(|p| p.parse().ok()).collect();
        if let Some(doubles) = doubles {
            return Ok(ParamRange::Doubles(doubles));
        }
        if parts.len() == 1 && !parts[0].is_empty() {
            return Ok(ParamRange::Choices(vec![parts[0].to_string()]));
        }
        Err(invalid())
    }
}

/// Ordered, named ranges shared by the grid and random spaces.
#[derive(Debug, Clone, Default)]
struct Declarations(Vec<(String, ParamRange)>);

impl Declarations {
    fn add(&mut self, name: &str, range: ParamRange) -> Result<()> {
        if self.0.iter().any(|(n, _)| n == name) {
            return Err(BackflowError::DuplicateParameter(name.to_string()));
        }
        range.validate(name)?;
        self.0.push((name.to_string(), range));
        Ok(())
    }
}

/// Cartesian product of discrete ranges. The first declared parameter
/// varies slowest.
#[derive(Debug, Clone, Default)]
pub struct GridSearch {
    params: Declarations,
}

impl GridSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, range: ParamRange) -> Result<&mut Self> {
        if matches!(range, ParamRange::DoubleRange { .. }) {
            return Err(BackflowError::invalid_argument(format!(
                "parameter '{name}': a grid needs discrete values, not a continuous range"
            )));
        }
        self.params.add(name, range)?;
        Ok(self)
    }

    /// Number of points, saturating at `usize::MAX`.
    pub fn size(&self) -> usize {
        self.params
            .0
            .iter()
            .map(|(_, range)| range.len().unwrap_or(0))
            .fold(1, usize::saturating_mul)
    }

    pub fn iter(&self) -> GridIter<'_> {
        GridIter::new(&self.params.0)
    }
}

/// Odometer over grid axes; the last axis turns fastest. Values are
/// computed per step, so wide integer ranges are never materialized.
pub struct GridIter<'a> {
    axes: &'a [(String, ParamRange)],
    lens: Vec<usize>,
    indices: Vec<usize>,
    done: bool,
}

impl<'a> GridIter<'a> {
    fn new(axes: &'a [(String, ParamRange)]) -> Self {
        let lens: Vec<usize> = axes.iter().map(|(_, range)| range.len().unwrap_or(0)).collect();
        let done = lens.contains(&0);
        let indices = vec![0; axes.len()];
        Self {
            axes,
            lens,
            indices,
            done,
        }
    }
}

impl Iterator for GridIter<'_> {
    type Item = Params;

    fn next(&mut self) -> Option<Params> {
        if self.done {
            return None;
        }
        let mut params = Params::new();
        for ((name, range), &i) in self.axes.iter().zip(&self.indices) {
            params.insert(name.clone(), range.value_at(i)?);
        }

        self.done = true;
        for axis in (0..self.axes.len()).rev() {
            self.indices[axis] += 1;
            if self.indices[axis] < self.lens[axis] {
                self.done = false;
                break;
            }
            self.indices[axis] = 0;
        }
        Some(params)
    }
}

/// Uniform random sampling, reproducible from `seed`.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    params: Declarations,
    seed: u64,
    samples: usize,
}

impl RandomSearch {
    pub fn new(samples: usize, seed: u64) -> Self {
        Self {
            params: Declarations::default(),
            seed,
            samples,
        }
    }

    pub fn add(&mut self, name: &str, range: ParamRange) -> Result<&mut Self> {
        range.validate(name)?;
        if range.len() == Some(0) {
            return Err(BackflowError::invalid_argument(format!(
                "parameter '{name}' has no values to sample"
            )));
        }
        self.params.add(name, range)?;
        Ok(self)
    }

    /// How many points the optimizer draws.
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Unbounded iterator; each call starts again from the seed.
    pub fn iter(&self) -> RandomIter<'_> {
        RandomIter {
            params: &self.params.0,
            rng: StdRng::seed_from_u64(self.seed),
        }
    }
}

pub struct RandomIter<'a> {
    params: &'a [(String, ParamRange)],
    rng: StdRng,
}

impl Iterator for RandomIter<'_> {
    type Item = Params;

    fn next(&mut self) -> Option<Params> {
        let mut params = Params::new();
        for (name, range) in self.params {
            params.insert(name.clone(), range.sample(&mut self.rng)?);
        }
        Some(params)
    }
}

#[derive(Debug, Clone)]
pub enum SearchSpace {
    Grid(GridSearch),
    Random(RandomSearch),
    /// A single run with no parameters.
    Empty,
}

impl SearchSpace {
    /// The points an optimizer sweep visits, in order.
    pub fn points(&self) -> Box<dyn Iterator<Item = Params> + '_> {
        match self {
            SearchSpace::Grid(grid) => Box::new(grid.iter()),
            SearchSpace::Random(random) => Box::new(random.iter().take(random.samples())),
            SearchSpace::Empty => Box::new(std::iter::once(Params::new())),
        }
    }

    pub fn size(&self) -> usize {
        match self {
            SearchSpace::Grid(grid) => grid.size(),
            SearchSpace::Random(random) => random.samples(),
            SearchSpace::Empty => 1,
        }
    }
}

impl From<GridSearch> for SearchSpace {
    fn from(grid: GridSearch) -> Self {
        SearchSpace::Grid(grid)
    }
}

impl From<RandomSearch> for SearchSpace {
    fn from(random: RandomSearch) -> Self {
        SearchSpace::Random(random)
    }
}
