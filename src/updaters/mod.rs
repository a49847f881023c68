//! Updater abstractions for neural network parameter updates
//!
//! This module provides the Updater trait, the factory the training loop uses to
//! build updaters from settings, and the concrete update rules.
//!
//! # Overview
//!
//! An updater turns a raw gradient ("diff") into an in-place mutation of a
//! parameter tensor ("data"). Each instance owns its optimizer state (current
//! learning rate, iteration counter, momentum history) and serves one parameter
//! tensor, or one group of tensors sharing the same hyperparameters.
//!
//! # Available Updaters
//!
//! - SGD: Stochastic gradient descent with momentum, L2 regularization,
//!   batch-size gradient scaling and a linearly decaying learning rate
//!
//! # Example
//!
//! ```
//! use ndarray::{array, Ix2};
//! use rust_nn_updaters::config::Settings;
//! use rust_nn_updaters::updaters::{create_updater, Updater};
//! use rust_nn_updaters::utils::rng::SimpleRng;
//!
//! let settings = Settings::new()
//!     .with("updater_type", "sgd")
//!     .with("lr", 0.1f32)
//!     .with("momentum", 0.9f32);
//! let mut updater = create_updater::<Ix2>(&settings, SimpleRng::shared(42)).unwrap();
//!
//! let mut weights = array![[1.0f32, 2.0], [3.0, 4.0]];
//! let mut grads = array![[0.5f32, 0.5], [0.5, 0.5]];
//! updater.update(weights.view_mut(), grads.view_mut());
//!
//! assert!((weights[[0, 0]] - 0.95).abs() < 1e-6);
//! assert_eq!(updater.iteration(), 1);
//! ```

pub mod sgd;

pub use sgd::SGDUpdater;

use crate::config::{ConfigError, SettingValue, Settings};
use crate::utils::rng::SharedRng;
use ndarray::{ArrayViewMut, RemoveAxis};
use serde::Serialize;

/// Name of the setting that selects the update rule.
pub const UPDATER_TYPE: &str = "updater_type";

/// The update rules known to this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdaterType {
    Sgd,
}

impl UpdaterType {
    /// Parses the `updater_type` setting.
    ///
    /// Accepts the rule name (case-insensitive) or its integer code.
    pub fn from_setting(value: &SettingValue) -> Result<Self, ConfigError> {
        match value {
            SettingValue::Text(name) if name.eq_ignore_ascii_case("sgd") => Ok(UpdaterType::Sgd),
            SettingValue::Int(0) => Ok(UpdaterType::Sgd),
            SettingValue::Text(name) => Err(ConfigError::UnknownUpdater(name.clone())),
            SettingValue::Int(code) => Err(ConfigError::UnknownUpdater(code.to_string())),
            _ => Err(ConfigError::TypeMismatch {
                name: UPDATER_TYPE.to_string(),
                expected: "an updater name or code",
            }),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            UpdaterType::Sgd => "sgd",
        }
    }

    pub fn code(self) -> i64 {
        match self {
            UpdaterType::Sgd => 0,
        }
    }
}

/// Snapshot of an updater's schedule state.
///
/// Intended for metrics sinks: serialize it once per step to follow the
/// effective learning rate over a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdaterState {
    pub updater_type: UpdaterType,
    pub iteration: usize,
    pub lr: f32,
    pub base_lr: f32,
    pub history_allocated: bool,
}

/// Core trait for parameter update rules.
///
/// The training loop holds a `Box<dyn Updater<D>>` per parameter tensor (see
/// [`create_updater`]) and calls [`Updater::update`] or
/// [`Updater::update_sparse`] once per optimization step.
///
/// # Type Parameters
///
/// * `D` - Dimensionality of the parameter tensors this updater serves. Sparse
///   updates address rows along axis 0, hence `RemoveAxis`.
///
/// # Borrowing
///
/// Parameter and gradient tensors belong to the caller. They are passed as
/// mutable views that live for one call; an updater never keeps them.
///
/// # Panics
///
/// Shape mismatches between `data`, `diff` and the updater's own state are
/// caller errors. Implementations check them up front and panic before
/// mutating anything.
pub trait Updater<D: RemoveAxis>: Send {
    /// Option names this rule recognizes, with their defaults.
    ///
    /// A value of `SettingValue::Unset` marks the option as required.
    fn defaults(&self) -> Settings;

    /// Merges [`Updater::defaults`] into `settings`.
    ///
    /// Fails with `ConfigError::MissingRequired` if a required option is
    /// absent, so a misconfigured run stops before training starts.
    fn require(&self, settings: &mut Settings) -> Result<(), ConfigError> {
        settings.apply_defaults(&self.defaults())
    }

    /// Reads validated settings into the updater state and resets the
    /// schedule. Runs once, before any update.
    fn setup_updater(&mut self, settings: &Settings) -> Result<(), ConfigError>;

    /// Applies one optimizer step to every element of `data`.
    ///
    /// `diff` must have the same shape as `data`. It may be modified (scaled)
    /// as a side effect; do not reuse it afterwards.
    fn update(&mut self, data: ArrayViewMut<'_, f32, D>, diff: ArrayViewMut<'_, f32, D>);

    /// Applies one optimizer step to the rows of `data` named by `idx`.
    ///
    /// Row `i` of `diff` is the gradient for row `idx[i]` of `data`. Rows are
    /// processed in order and each is written before the next is read, so a
    /// repeated index sees the result of its earlier occurrence.
    fn update_sparse(
        &mut self,
        data: ArrayViewMut<'_, f32, D>,
        diff: ArrayViewMut<'_, f32, D>,
        idx: &[usize],
    );

    fn updater_type(&self) -> UpdaterType;

    /// Current effective learning rate.
    fn learning_rate(&self) -> f32;

    /// Number of update calls made so far.
    fn iteration(&self) -> usize;

    fn state(&self) -> UpdaterState;
}

/// Builds the updater selected by the `updater_type` setting.
///
/// The returned updater has already validated `settings` and is ready for its
/// first update.
///
/// # Errors
///
/// * `ConfigError::MissingRequired` if `updater_type` or a rule-specific
///   required option is not set
/// * `ConfigError::UnknownUpdater` if `updater_type` names no known rule
/// * Any validation error of the selected rule
pub fn create_updater<D>(
    settings: &Settings,
    rng: SharedRng,
) -> Result<Box<dyn Updater<D>>, ConfigError>
where
    D: RemoveAxis + 'static,
{
    let kind = match settings.get(UPDATER_TYPE) {
        Some(value) if !value.is_unset() => UpdaterType::from_setting(value)?,
        _ => return Err(ConfigError::MissingRequired(UPDATER_TYPE.to_string())),
    };

    match kind {
        UpdaterType::Sgd => Ok(Box::new(SGDUpdater::<D>::new(settings, rng)?)),
    }
}
