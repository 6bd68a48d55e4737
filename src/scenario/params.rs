//! Scenario parameters
//!
//! A flat key → value map as read from a scenario file. Cases turn it into
//! typed parameter structs once, before any step runs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::common::{Error, Result};

/// A single parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// Scenario parameters with unique keys
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(BTreeMap<String, ParamValue>);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, replacing any previous value for `key`
    pub fn with(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    /// Numeric parameter, accepting numeric strings such as `"1800"`
    pub fn number(&self, key: &str, default: f64) -> Result<f64> {
        match self.0.get(key) {
            None => Ok(default),
            Some(ParamValue::Number(n)) => Ok(*n),
            Some(ParamValue::Text(s)) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| Error::invalid_param(key, format!("'{}' is not a number", s))),
        }
    }

    /// Duration parameter given in (possibly fractional) seconds
    pub fn seconds(&self, key: &str, default: f64) -> Result<Duration> {
        let secs = self.number(key, default)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(Error::invalid_param(
                key,
                format!("{} is not a valid number of seconds", secs),
            ));
        }
        Duration::try_from_secs_f64(secs).map_err(|_| {
            Error::invalid_param(key, format!("{} seconds is out of range", secs))
        })
    }

    /// Optional string parameter; numbers are rendered as text
    pub fn text(&self, key: &str) -> Option<String> {
        self.0.get(key).map(|v| v.to_string())
    }

    /// String parameter with a default
    pub fn text_or(&self, key: &str, default: &str) -> String {
        self.text(key).unwrap_or_else(|| default.to_string())
    }

    /// Required, non-empty string parameter
    pub fn require_text(&self, key: &str) -> Result<String> {
        match self.text(key) {
            Some(s) if !s.trim().is_empty() => Ok(s),
            Some(_) => Err(Error::invalid_param(key, "must not be empty")),
            None => Err(Error::MissingParam(key.to_string())),
        }
    }
}

impl FromIterator<(String, ParamValue)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
