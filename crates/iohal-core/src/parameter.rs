//! Configuration parameters and validation.
//!
//! Factories declare the keys they accept as an ordered list of [`ConfigParameter`]s and
//! receive caller configuration as loosely typed [`Configuration`] data. A
//! [`ParameterValidator`] walks that data once, coerces each value to its declared type and
//! records every failure under the parameter that caused it, so the caller sees all problems
//! at once instead of only the first.
//!
//! # Example
//!
//! ```rust
//! use iohal_core::parameter::{ConfigParameter, ParameterValidator};
//!
//! let params = vec![ConfigParameter::integer("Address", 0, 0x40)];
//! let config = toml::toml! { Address = 64.0 };
//!
//! let mut v = ParameterValidator::new(&config, &params);
//! let address = v.integer("Address", 1..=255);
//! let failures = v.finish();
//!
//! assert!(failures.is_valid());
//! assert_eq!(address, Some(64));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;

/// Loosely typed key/value configuration supplied when building a driver.
pub type Configuration = toml::Table;

/// Declared type of a configuration parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    /// Whole number. Integer-valued floats and numeric strings are accepted.
    Integer,
    /// Free-form or enumerated text.
    String,
    /// `true` / `false`.
    Boolean,
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ParameterType::Integer => "integer",
            ParameterType::String => "string",
            ParameterType::Boolean => "boolean",
        };
        f.write_str(label)
    }
}

/// One configuration key a factory accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigParameter {
    /// Key name, unique within a factory.
    pub name: String,
    /// Declared type.
    pub kind: ParameterType,
    /// Display order for configuration forms.
    pub order: usize,
    /// Value suggested to users.
    pub default: toml::Value,
}

impl ConfigParameter {
    /// Declare an integer parameter.
    pub fn integer(name: impl Into<String>, order: usize, default: i64) -> Self {
        Self {
            name: name.into(),
            kind: ParameterType::Integer,
            order,
            default: toml::Value::Integer(default),
        }
    }

    /// Declare a string parameter.
    pub fn string(name: impl Into<String>, order: usize, default: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParameterType::String,
            order,
            default: toml::Value::String(default.into()),
        }
    }

    /// Declare a boolean parameter.
    pub fn boolean(name: impl Into<String>, order: usize, default: bool) -> Self {
        Self {
            name: name.into(),
            kind: ParameterType::Boolean,
            order,
            default: toml::Value::Boolean(default),
        }
    }
}

/// Build a configuration holding every parameter's default value.
pub fn default_configuration(parameters: &[ConfigParameter]) -> Configuration {
    parameters
        .iter()
        .map(|p| (p.name.clone(), p.default.clone()))
        .collect()
}

/// Coerce a loosely typed value to an integer.
///
/// Accepts integers, floats with no fractional part (`64.0`), and strings holding a base-10
/// integer. Everything else is rejected.
pub fn coerce_integer(value: &toml::Value) -> Option<i64> {
    match value {
        toml::Value::Integer(i) => Some(*i),
        toml::Value::Float(f) => {
            if f.is_finite() && f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64
            {
                Some(*f as i64)
            } else {
                None
            }
        }
        toml::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Coerce a loosely typed value to a boolean (`true`, `false`, `"true"`, `"false"`).
pub fn coerce_boolean(value: &toml::Value) -> Option<bool> {
    match value {
        toml::Value::Boolean(b) => Some(*b),
        toml::Value::String(s) => match s.trim() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Render a value the way users typed it (strings without quotes).
pub fn describe_value(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Validation outcome: human-readable failures grouped by parameter name.
///
/// Valid iff empty. Iteration order is by parameter name so messages are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationFailures {
    failures: BTreeMap<String, Vec<String>>,
}

impl ValidationFailures {
    /// No failures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure under `parameter`.
    pub fn push(&mut self, parameter: impl Into<String>, message: impl Into<String>) {
        self.failures
            .entry(parameter.into())
            .or_default()
            .push(message.into());
    }

    /// True when nothing failed.
    pub fn is_valid(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of parameters with at least one failure.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// True when nothing failed.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Failures recorded for one parameter.
    pub fn get(&self, parameter: &str) -> Option<&[String]> {
        self.failures.get(parameter).map(Vec::as_slice)
    }

    /// Iterate `(parameter, failures)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.failures
            .iter()
            .map(|(name, msgs)| (name.as_str(), msgs.as_slice()))
    }
}

impl fmt::Display for ValidationFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self
            .failures
            .values()
            .flat_map(|msgs| msgs.iter().map(String::as_str))
            .collect();
        f.write_str(&messages.join("; "))
    }
}

/// Single pass over a [`Configuration`] that coerces values and aggregates failures.
///
/// Every accessor returns `None` when the value is missing or invalid and records why; it
/// never stops at the first problem. Call [`finish`](Self::finish) to collect the outcome.
pub struct ParameterValidator<'a> {
    config: &'a Configuration,
    declared: &'a [ConfigParameter],
    failures: ValidationFailures,
}

impl<'a> ParameterValidator<'a> {
    /// Validate `config` against the `declared` parameter list.
    pub fn new(config: &'a Configuration, declared: &'a [ConfigParameter]) -> Self {
        Self {
            config,
            declared,
            failures: ValidationFailures::new(),
        }
    }

    fn lookup(&mut self, name: &str) -> Option<&'a toml::Value> {
        let value = self.config.get(name);
        if value.is_none() {
            self.failures.push(
                name,
                format!("{name} is a required parameter, but was not received."),
            );
        }
        value
    }

    /// Required integer within `range`.
    pub fn integer(&mut self, name: &str, range: RangeInclusive<i64>) -> Option<i64> {
        let raw = self.lookup(name)?;
        let Some(value) = coerce_integer(raw) else {
            self.failures.push(
                name,
                format!("{name} is not a number. {} was received.", describe_value(raw)),
            );
            return None;
        };
        if !range.contains(&value) {
            self.failures.push(
                name,
                format!(
                    "{name} is out of range ({} - {}). {} was received.",
                    range.start(),
                    range.end(),
                    describe_value(raw)
                ),
            );
            return None;
        }
        Some(value)
    }

    /// Required non-empty string.
    pub fn string(&mut self, name: &str) -> Option<String> {
        let raw = self.lookup(name)?;
        match raw {
            toml::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            toml::Value::String(_) => {
                self.failures
                    .push(name, format!("{name} must not be empty."));
                None
            }
            other => {
                self.failures.push(
                    name,
                    format!("{name} is not a string. {} was received.", describe_value(other)),
                );
                None
            }
        }
    }

    /// Required boolean.
    pub fn boolean(&mut self, name: &str) -> Option<bool> {
        let raw = self.lookup(name)?;
        let value = coerce_boolean(raw);
        if value.is_none() {
            self.failures.push(
                name,
                format!("{name} is not a boolean. {} was received.", describe_value(raw)),
            );
        }
        value
    }

    /// Required value from a fixed set of choices.
    ///
    /// Integer-valued numbers are matched by their decimal form, so `4` selects `"4"`.
    pub fn choice<'c>(&mut self, name: &str, choices: &[&'c str]) -> Option<&'c str> {
        let raw = self.lookup(name)?;
        let text = match raw {
            toml::Value::String(s) => Some(s.trim().to_string()),
            toml::Value::Integer(_) | toml::Value::Float(_) => {
                coerce_integer(raw).map(|i| i.to_string())
            }
            _ => None,
        };
        let Some(text) = text else {
            self.failures.push(
                name,
                format!("{name} is not a string. {} was received.", describe_value(raw)),
            );
            return None;
        };
        let found = choices.iter().copied().find(|c| *c == text);
        if found.is_none() {
            self.failures.push(
                name,
                format!(
                    "{name} is not a valid value of {}. {} was received.",
                    choices.join(", "),
                    describe_value(raw)
                ),
            );
        }
        found
    }

    /// Record a semantic failure that the typed accessors cannot express.
    pub fn fail(&mut self, name: &str, message: impl Into<String>) {
        self.failures.push(name, message);
    }

    /// Finish validation. Keys that no declared parameter names are reported as well.
    pub fn finish(mut self) -> ValidationFailures {
        for key in self.config.keys() {
            if !self.declared.iter().any(|p| p.name == *key) {
                self.failures
                    .push(key.as_str(), format!("{key} is not a recognised parameter."));
            }
        }
        self.failures
    }
}
