//! Named, typed key/value parameter sets.
//!
//! A [`Parameters`] set is created with a fixed collection of keys and default values. Later
//! updates are type-checked against the defaults, so that misspelled keys or values of the wrong
//! type are caught when they are set rather than when they are used.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::fmt::Display;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Parameter {
    Bool(bool),
    Int(i64),
    Real(f64),
    String(String),
}

impl Parameter {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Real(_) => "real",
            Self::String(_) => "string",
        }
    }
}

impl Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{}", value),
            Self::Int(value) => write!(f, "{}", value),
            Self::Real(value) => write!(f, "{:e}", value),
            Self::String(value) => write!(f, "\"{}\"", value),
        }
    }
}

impl From<bool> for Parameter {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Parameter {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Parameter {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Parameter {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<&str> for Parameter {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Parameter {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterError {
    UnknownKey(String),
    DuplicateKey(String),
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
}

impl Display for ParameterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownKey(key) => write!(f, "Unknown parameter \"{}\".", key),
            Self::DuplicateKey(key) => write!(f, "Parameter \"{}\" already defined.", key),
            Self::TypeMismatch { key, expected, found } => {
                write!(f, "Parameter \"{}\" has type {}, but a value of type {} was given.", key, expected, found)
            }
        }
    }
}

impl Error for ParameterError {}

/// A named set of parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    name: String,
    values: BTreeMap<String, Parameter>,
}

impl Parameters {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Defines a new parameter with the given default value.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<Parameter>) -> Result<(), ParameterError> {
        let key = key.into();
        if self.values.contains_key(&key) {
            return Err(ParameterError::DuplicateKey(key));
        }
        self.values.insert(key, value.into());
        Ok(())
    }

    /// Same as [`add`](Self::add), for building parameter sets with statically known keys.
    ///
    /// # Panics
    ///
    /// Panics if the key is already defined.
    pub fn with(mut self, key: &str, value: impl Into<Parameter>) -> Self {
        if let Err(err) = self.add(key, value) {
            panic!("{}", err);
        }
        self
    }

    /// Updates the value of an existing parameter.
    ///
    /// The new value must have the same type as the current value, except that integers are
    /// accepted for real-valued parameters.
    pub fn set(&mut self, key: &str, value: impl Into<Parameter>) -> Result<(), ParameterError> {
        let current = self
            .values
            .get_mut(key)
            .ok_or_else(|| ParameterError::UnknownKey(key.to_string()))?;
        let value = value.into();
        let value = match (&*current, value) {
            (Parameter::Real(_), Parameter::Int(int)) => Parameter::Real(int as f64),
            (current, value) if current.type_name() != value.type_name() => {
                return Err(ParameterError::TypeMismatch {
                    key: key.to_string(),
                    expected: current.type_name(),
                    found: value.type_name(),
                })
            }
            (_, value) => value,
        };
        *current = value;
        Ok(())
    }

    /// Sets every parameter in `other` that is also defined in `self`.
    ///
    /// Fails on the first key of `other` that is unknown to `self` or has a mismatched type.
    /// Parameters set before the failure remain set.
    pub fn update(&mut self, other: &Parameters) -> Result<(), ParameterError> {
        for (key, value) in &other.values {
            self.set(key, value.clone())?;
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Parameter> {
        self.values.get(key)
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn get_typed<'a, U>(
        &'a self,
        key: &str,
        expected: &'static str,
        extract: impl FnOnce(&'a Parameter) -> Option<U>,
    ) -> Result<U, ParameterError> {
        let parameter = self
            .values
            .get(key)
            .ok_or_else(|| ParameterError::UnknownKey(key.to_string()))?;
        extract(parameter).ok_or_else(|| ParameterError::TypeMismatch {
            key: key.to_string(),
            expected,
            found: parameter.type_name(),
        })
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, ParameterError> {
        self.get_typed(key, "bool", |p| match p {
            Parameter::Bool(value) => Some(*value),
            _ => None,
        })
    }

    pub fn get_int(&self, key: &str) -> Result<i64, ParameterError> {
        self.get_typed(key, "int", |p| match p {
            Parameter::Int(value) => Some(*value),
            _ => None,
        })
    }

    /// Returns a real-valued parameter. Integer parameters are converted.
    pub fn get_real(&self, key: &str) -> Result<f64, ParameterError> {
        self.get_typed(key, "real", |p| match p {
            Parameter::Real(value) => Some(*value),
            Parameter::Int(value) => Some(*value as f64),
            _ => None,
        })
    }

    pub fn get_string(&self, key: &str) -> Result<&str, ParameterError> {
        self.get_typed(key, "string", |p| match p {
            Parameter::String(value) => Some(value.as_str()),
            _ => None,
        })
    }
}

impl Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "<Parameter set \"{}\" containing {} parameter(s)>", self.name, self.values.len())?;
        let width = self.values.keys().map(String::len).max().unwrap_or(0);
        for (key, value) in &self.values {
            writeln!(f, "  {:width$}  {}", key, value, width = width)?;
        }
        Ok(())
    }
}
