//! Configuration structures for updaters
//!
//! This module provides the named settings an updater is configured from. Each
//! updater declares the option names it recognizes together with their defaults
//! (or marks them as required), and reads already-validated scalar values during
//! setup.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::fs;

/// A single named setting value.
///
/// Settings are usually parsed from a JSON object, where integers map to `Int`,
/// other numbers to `Float`, strings to `Text` and `null` to `Unset`.
///
/// `Unset` doubles as the "required, no default" marker in an updater's
/// default table: a required name that is still unset after defaults are
/// applied is a configuration error.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Int(i64),
    Float(f32),
    Text(String),
    Unset,
}

impl SettingValue {
    fn kind(&self) -> &'static str {
        match self {
            SettingValue::Int(_) => "integer",
            SettingValue::Float(_) => "float",
            SettingValue::Text(_) => "string",
            SettingValue::Unset => "unset",
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, SettingValue::Unset)
    }
}

impl From<f32> for SettingValue {
    fn from(value: f32) -> Self {
        SettingValue::Float(value)
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        SettingValue::Int(value)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        SettingValue::Text(value.to_string())
    }
}

/// Errors raised while validating or reading updater settings.
///
/// All of them are setup-time failures: an updater that could not be
/// configured is never handed to the training loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A required option has no value and no default.
    MissingRequired(String),
    /// An option holds a value of the wrong kind.
    TypeMismatch { name: String, expected: &'static str },
    /// An option holds a value outside its accepted range.
    InvalidValue { name: String, reason: String },
    /// `updater_type` names a rule this crate does not provide.
    UnknownUpdater(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingRequired(name) => {
                write!(f, "required setting '{}' is not set", name)
            }
            ConfigError::TypeMismatch { name, expected } => {
                write!(f, "setting '{}' must be {}", name, expected)
            }
            ConfigError::InvalidValue { name, reason } => {
                write!(f, "invalid value for setting '{}': {}", name, reason)
            }
            ConfigError::UnknownUpdater(kind) => write!(f, "unknown updater type '{}'", kind),
        }
    }
}

impl Error for ConfigError {}

/// Named settings for one updater.
///
/// # Example
///
/// ```
/// use rust_nn_updaters::config::Settings;
///
/// let settings = Settings::new().with("lr", 0.1f32).with("batch_size", 4i64);
/// assert_eq!(settings.get_f32("lr").unwrap(), 0.1);
/// assert_eq!(settings.get_usize("batch_size").unwrap(), 4);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Settings {
    values: BTreeMap<String, SettingValue>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style `set`.
    pub fn with(mut self, name: &str, value: impl Into<SettingValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<SettingValue>) {
        self.values.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&SettingValue> {
        self.values.get(name)
    }

    /// Returns true if `name` holds a value other than `Unset`.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some_and(|value| !value.is_unset())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn require_value(&self, name: &str) -> Result<&SettingValue, ConfigError> {
        match self.get(name) {
            Some(value) if !value.is_unset() => Ok(value),
            _ => Err(ConfigError::MissingRequired(name.to_string())),
        }
    }

    /// Reads a float setting. Integer values are widened.
    pub fn get_f32(&self, name: &str) -> Result<f32, ConfigError> {
        match self.require_value(name)? {
            SettingValue::Float(v) => Ok(*v),
            SettingValue::Int(v) => Ok(*v as f32),
            _ => Err(ConfigError::TypeMismatch {
                name: name.to_string(),
                expected: "a number",
            }),
        }
    }

    pub fn get_i64(&self, name: &str) -> Result<i64, ConfigError> {
        match self.require_value(name)? {
            SettingValue::Int(v) => Ok(*v),
            _ => Err(ConfigError::TypeMismatch {
                name: name.to_string(),
                expected: "an integer",
            }),
        }
    }

    pub fn get_usize(&self, name: &str) -> Result<usize, ConfigError> {
        let value = self.get_i64(name)?;
        usize::try_from(value).map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            reason: format!("{} is negative", value),
        })
    }

    pub fn get_str(&self, name: &str) -> Result<&str, ConfigError> {
        match self.require_value(name)? {
            SettingValue::Text(v) => Ok(v),
            _ => Err(ConfigError::TypeMismatch {
                name: name.to_string(),
                expected: "a string",
            }),
        }
    }

    /// Merges a default table into these settings.
    ///
    /// Names that are missing (or explicitly `null`) take the default value.
    /// A default of `SettingValue::Unset` marks the name as required: if the
    /// user did not provide it, this fails with `ConfigError::MissingRequired`.
    /// Values supplied by the user are never overwritten.
    ///
    /// # Example
    ///
    /// ```
    /// use rust_nn_updaters::config::{ConfigError, Settings, SettingValue};
    ///
    /// let defaults = Settings::new()
    ///     .with("momentum", 0.0f32)
    ///     .with("lr", SettingValue::Unset);
    ///
    /// let mut settings = Settings::new().with("lr", 0.5f32);
    /// settings.apply_defaults(&defaults).unwrap();
    /// assert_eq!(settings.get_f32("momentum").unwrap(), 0.0);
    ///
    /// let mut empty = Settings::new();
    /// assert_eq!(
    ///     empty.apply_defaults(&defaults),
    ///     Err(ConfigError::MissingRequired("lr".to_string()))
    /// );
    /// ```
    pub fn apply_defaults(&mut self, defaults: &Settings) -> Result<(), ConfigError> {
        for (name, default) in &defaults.values {
            if self.contains(name) {
                continue;
            }
            if default.is_unset() {
                return Err(ConfigError::MissingRequired(name.clone()));
            }
            self.values.insert(name.clone(), default.clone());
        }
        Ok(())
    }

    /// Iterates over all settings in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SettingValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }
}

/// Loads updater settings from a JSON file.
///
/// The file must contain a single JSON object mapping option names to numbers,
/// strings or `null`.
///
/// # Example
///
/// ```json
/// {
///   "updater_type": "sgd",
///   "lr": 0.1,
///   "momentum": 0.9,
///   "l2": 0.0001,
///   "batch_size": 32
/// }
/// ```
///
/// # Returns
///
/// `Ok(Settings)` on success, or an error if the file cannot be read or the JSON is invalid.
pub fn load_settings(path: &str) -> Result<Settings, Box<dyn Error>> {
    let contents = fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&contents)?;
    Ok(settings)
}
