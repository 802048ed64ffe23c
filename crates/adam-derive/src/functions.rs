//! Named functions callable from `function` derivations.
//!
//! A function receives the resolved arguments of one row and returns one
//! value. Arguments are looked up by keyword first and by position second,
//! so `get_bmi(VS.HEIGHT, VS.WEIGHT)` and `{height: .., weight: ..}` both
//! work.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use adam_model::Literal;

use crate::temporal::{parse_date, study_day};

/// Arguments of one call.
#[derive(Debug, Clone, Copy)]
pub struct FunctionArgs<'a> {
    args: &'a [(Option<String>, Literal)],
}

impl<'a> FunctionArgs<'a> {
    pub fn new(args: &'a [(Option<String>, Literal)]) -> Self {
        Self { args }
    }

    /// Argument by keyword, else the `position`-th positional argument.
    pub fn get(&self, name: &str, position: usize) -> Option<&'a Literal> {
        self.args
            .iter()
            .find(|(key, _)| key.as_deref().is_some_and(|key| key.eq_ignore_ascii_case(name)))
            .or_else(|| {
                self.args
                    .iter()
                    .filter(|(key, _)| key.is_none())
                    .nth(position)
            })
            .map(|(_, value)| value)
    }

    /// Numeric argument. Null yields `Ok(None)`.
    pub fn number(&self, name: &str, position: usize) -> Result<Option<f64>, String> {
        match self.get(name, position) {
            None => Err(format!("missing argument '{name}'")),
            Some(Literal::Null) => Ok(None),
            Some(value) => match value.as_f64() {
                Some(number) => Ok(Some(number)),
                None if value.as_str().is_some_and(|s| s.trim().is_empty()) => Ok(None),
                None => Err(format!("argument '{name}' is not numeric: {value}")),
            },
        }
    }

    /// Date argument. Null, blank and partial dates yield `Ok(None)`.
    pub fn date(&self, name: &str, position: usize) -> Result<Option<chrono::NaiveDate>, String> {
        match self.get(name, position) {
            None => Err(format!("missing argument '{name}'")),
            Some(Literal::Str(text)) => Ok(parse_date(text)),
            Some(Literal::Null) => Ok(None),
            Some(other) => Err(format!("argument '{name}' is not a date: {other}")),
        }
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

/// A registered function.
pub type DeriveFn = Arc<dyn Fn(FunctionArgs<'_>) -> Result<Literal, String> + Send + Sync>;

/// Function name to callable.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, DeriveFn>,
}

impl FunctionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in functions.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("get_bmi", get_bmi);
        registry.register("calculate_bsa", calculate_bsa);
        registry.register("study_day", study_day_fn);
        registry.register("categorize_age", categorize_age);
        registry
    }

    /// Adds or replaces a function.
    pub fn register<F>(&mut self, name: impl Into<String>, function: F) -> &mut Self
    where
        F: Fn(FunctionArgs<'_>) -> Result<Literal, String> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
        self
    }

    /// Adds every function of `other`; on a name clash `other` wins.
    pub fn merge(mut self, other: FunctionRegistry) -> Self {
        self.functions.extend(other.functions);
        self
    }

    pub fn get(&self, name: &str) -> Option<&DeriveFn> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.functions.keys()).finish()
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn number_or_null(value: Option<f64>) -> Literal {
    match value {
        Some(v) if v.is_finite() => Literal::Float(v),
        _ => Literal::Null,
    }
}

/// Body mass index in kg/m² from height (cm) and weight (kg), 1 decimal.
fn get_bmi(args: FunctionArgs<'_>) -> Result<Literal, String> {
    let height = args.number("height", 0)?;
    let weight = args.number("weight", 1)?;
    Ok(number_or_null(match (height, weight) {
        (Some(height), Some(weight)) if height > 0.0 => {
            Some(round_to(weight / (height / 100.0).powi(2), 1))
        }
        _ => None,
    }))
}

/// Body surface area in m² (Mosteller), 2 decimals.
fn calculate_bsa(args: FunctionArgs<'_>) -> Result<Literal, String> {
    let height = args.number("height", 0)?;
    let weight = args.number("weight", 1)?;
    Ok(number_or_null(match (height, weight) {
        (Some(height), Some(weight)) if height >= 0.0 && weight >= 0.0 => {
            Some(round_to((height * weight / 3600.0).sqrt(), 2))
        }
        _ => None,
    }))
}

fn study_day_fn(args: FunctionArgs<'_>) -> Result<Literal, String> {
    let date = args.date("date", 0)?;
    let reference = args.date("reference", 1)?;
    Ok(match (date, reference) {
        (Some(date), Some(reference)) => Literal::Int(study_day(date, reference)),
        _ => Literal::Null,
    })
}

fn categorize_age(args: FunctionArgs<'_>) -> Result<Literal, String> {
    Ok(match args.number("age", 0)? {
        None => Literal::Null,
        Some(age) if age < 18.0 => Literal::from("Pediatric"),
        Some(age) if age < 65.0 => Literal::from("Adult"),
        Some(_) => Literal::from("Elderly"),
    })
}
