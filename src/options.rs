//! Keyword options passed from the regressors down to the minimizers.
//!
//! An [`Options`] value is an ordered map from option name to [`OptionValue`].
//! Each regressor owns a set of defaults for its algorithm family and lays the
//! caller's overrides on top of them with [`Options::merge`]. Keys that no
//! minimizer reads are carried along untouched.
//!
//! ```
//! # use regressor::options::Options;
//! let defaults = Options::new().with("maxiter", 1000).with("tol", 1e-4);
//! let overrides = Options::new().with("tol", 1e-8).with("seed", 7);
//! let merged = defaults.merge(&overrides);
//!
//! assert_eq!(merged.get_usize("maxiter").unwrap(), Some(1000));
//! assert_eq!(merged.get_f64("tol").unwrap(), Some(1e-8));
//! assert_eq!(merged.get_u64("seed").unwrap(), Some(7));
//! ```
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;

use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single option value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<i32> for OptionValue {
    fn from(v: i32) -> Self {
        OptionValue::Int(i64::from(v))
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Int(v)
    }
}

impl From<u64> for OptionValue {
    fn from(v: u64) -> Self {
        match v.to_i64() {
            Some(i) => OptionValue::Int(i),
            None => OptionValue::Float(v as f64),
        }
    }
}

impl From<usize> for OptionValue {
    fn from(v: usize) -> Self {
        OptionValue::from(v as u64)
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        OptionValue::Float(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Str(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        OptionValue::Str(v)
    }
}

/// Ordered keyword options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Options(BTreeMap<String, OptionValue>);

impl Options {
    pub fn new() -> Self {
        Options(BTreeMap::new())
    }

    /// Parse options from a JSON object such as `{"maxiter": 50, "seed": 3}`.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Chainable insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<OptionValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, OptionValue> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lay `overrides` on top of `self`. Keys present in both take the
    /// override's value; every other key of either side is kept.
    pub fn merge(&self, overrides: &Options) -> Options {
        let mut merged = self.0.clone();
        for (key, value) in overrides.iter() {
            merged.insert(key.clone(), value.clone());
        }
        Options(merged)
    }

    pub fn get_f64(&self, key: &str) -> Result<Option<f64>> {
        match self.get(key) {
            None => Ok(None),
            Some(OptionValue::Float(v)) => Ok(Some(*v)),
            Some(OptionValue::Int(v)) => Ok(v.to_f64()),
            Some(other) => Err(invalid(key, "a number", other)),
        }
    }

    pub fn get_usize(&self, key: &str) -> Result<Option<usize>> {
        let value = match self.get(key) {
            None => return Ok(None),
            Some(value) => value,
        };
        let converted = match value {
            OptionValue::Int(v) => v.to_usize(),
            OptionValue::Float(v) if v.fract() == 0.0 => v.to_usize(),
            _ => None,
        };
        converted
            .map(Some)
            .ok_or_else(|| invalid(key, "a non-negative integer", value))
    }

    pub fn get_u64(&self, key: &str) -> Result<Option<u64>> {
        let value = match self.get(key) {
            None => return Ok(None),
            Some(value) => value,
        };
        let converted = match value {
            OptionValue::Int(v) => v.to_u64(),
            OptionValue::Float(v) if v.fract() == 0.0 => v.to_u64(),
            _ => None,
        };
        converted
            .map(Some)
            .ok_or_else(|| invalid(key, "a non-negative integer", value))
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some(OptionValue::Bool(v)) => Ok(Some(*v)),
            Some(other) => Err(invalid(key, "a boolean", other)),
        }
    }

    pub fn get_str(&self, key: &str) -> Result<Option<&str>> {
        match self.get(key) {
            None => Ok(None),
            Some(OptionValue::Str(v)) => Ok(Some(v.as_str())),
            Some(other) => Err(invalid(key, "a string", other)),
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Options
where
    K: Into<String>,
    V: Into<OptionValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Options(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a Options {
    type Item = (&'a String, &'a OptionValue);
    type IntoIter = btree_map::Iter<'a, String, OptionValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

fn invalid(key: &str, expected: &'static str, found: &OptionValue) -> Error {
    Error::InvalidOption {
        key: key.to_string(),
        expected,
        found: found.to_string(),
    }
}
