//! Stochastic Gradient Descent (SGD) updater implementation
//!
//! This module provides the SGD update rule with classical momentum, L2
//! regularization, batch-size gradient scaling and a linearly decaying learning
//! rate with a floor at 10% of the base rate.

use crate::config::{ConfigError, SettingValue, Settings};
use crate::updaters::{Updater, UpdaterState, UpdaterType, UPDATER_TYPE};
use crate::utils::rng::SharedRng;
use ndarray::{Array, ArrayView, ArrayViewMut, Axis, Dimension, RemoveAxis, Zip};

/// Stochastic Gradient Descent updater.
///
/// Without momentum each step is
///
/// `w = w - lr * (g + l2 * w)`
///
/// and with momentum `m` a history tensor `h` (same shape as `w`) accumulates
/// the update vector:
///
/// ```text
/// h = lr * (g + l2 * w) + m * h
/// w = w - h
/// ```
///
/// Before each step the gradient is divided by `batch_size` and the learning
/// rate is recomputed as `base_lr * (1 - decay * iteration)`, unless it has
/// already fallen below `0.1 * base_lr`, in which case it is left alone. The
/// floor check looks at the learning rate of the *previous* step, so one value
/// below the floor (possibly negative, for large decay) is still produced and
/// then kept for the rest of the run.
///
/// # Settings
///
/// | name         | default  |
/// |--------------|----------|
/// | `lr`         | required |
/// | `decay`      | 0.0      |
/// | `momentum`   | 0.0      |
/// | `l2`         | 0.0      |
/// | `batch_size` | 1        |
///
/// # Example
///
/// ```
/// use ndarray::array;
/// use rust_nn_updaters::config::Settings;
/// use rust_nn_updaters::updaters::{SGDUpdater, Updater};
/// use rust_nn_updaters::utils::rng::SimpleRng;
///
/// let settings = Settings::new().with("lr", 0.1f32);
/// let mut sgd = SGDUpdater::new(&settings, SimpleRng::shared(42)).unwrap();
///
/// let mut weights = array![1.0f32, 2.0, 3.0];
/// let mut grads = array![0.1f32, 0.2, 0.3];
/// sgd.update(weights.view_mut(), grads.view_mut());
///
/// assert!((weights[0] - 0.99).abs() < 1e-6);
/// assert!((weights[2] - 2.97).abs() < 1e-6);
/// ```
#[derive(Debug)]
pub struct SGDUpdater<D: Dimension> {
    /// Injected for parity with rules that sample noise; SGD never reads it.
    rng: SharedRng,
    base_lr: f32,
    lr: f32,
    decay: f32,
    momentum: f32,
    l2: f32,
    batch_size: usize,
    iteration: usize,
    /// Allocated on the first update when momentum is non-zero, never resized.
    history: Option<Array<f32, D>>,
}

impl<D: RemoveAxis> SGDUpdater<D> {
    /// Creates an SGD updater from `settings`.
    ///
    /// Missing options take their defaults; a missing `lr` fails with
    /// `ConfigError::MissingRequired`.
    ///
    /// # Errors
    ///
    /// Returns an error if `lr` is missing, a value has the wrong kind, a
    /// hyperparameter is not finite, `batch_size` is zero, or `updater_type`
    /// names another rule.
    pub fn new(settings: &Settings, rng: SharedRng) -> Result<Self, ConfigError> {
        let mut updater = Self {
            rng,
            base_lr: 0.0,
            lr: 0.0,
            decay: 0.0,
            momentum: 0.0,
            l2: 0.0,
            batch_size: 1,
            iteration: 0,
            history: None,
        };

        let mut settings = settings.clone();
        updater.require(&mut settings)?;
        updater.setup_updater(&settings)?;
        Ok(updater)
    }

    pub fn base_learning_rate(&self) -> f32 {
        self.base_lr
    }

    pub fn momentum(&self) -> f32 {
        self.momentum
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Momentum history, if it has been allocated.
    pub fn history(&self) -> Option<&Array<f32, D>> {
        self.history.as_ref()
    }

    pub fn rng(&self) -> &SharedRng {
        &self.rng
    }

    /// Steps shared by dense and sparse updates: allocate history on the
    /// first call, scale the gradient, adapt the learning rate, count the call.
    fn begin_step(
        &mut self,
        data: &ArrayViewMut<'_, f32, D>,
        diff: &mut ArrayViewMut<'_, f32, D>,
    ) {
        if self.momentum != 0.0 && self.iteration == 0 {
            self.history = Some(Array::zeros(data.raw_dim()));
        }
        if self.batch_size > 1 {
            let batch_size = self.batch_size as f32;
            diff.mapv_inplace(|g| g / batch_size);
        }

        self.adapt_learning_rate();
        self.iteration += 1;
    }

    /// Linear decay with a floor at 10% of the base rate.
    ///
    /// The rate is stored in single precision but the schedule is evaluated in
    /// double precision, with `decay * iteration` rounded to `f32` first.
    fn adapt_learning_rate(&mut self) {
        if f64::from(self.lr) < 0.1 * f64::from(self.base_lr) {
            return;
        }
        let decayed = self.decay * self.iteration as f32;
        self.lr = (f64::from(self.base_lr) * (1.0 - f64::from(decayed))) as f32;
    }

    fn check_history(&self, data: &ArrayViewMut<'_, f32, D>) {
        if let Some(history) = &self.history {
            assert_eq!(
                history.shape(),
                data.shape(),
                "History shape must match the parameter shape"
            );
        }
    }
}

/// `w -= lr * (g + l2 * w)`, element-wise.
fn step_plain<E: Dimension>(
    data: ArrayViewMut<'_, f32, E>,
    diff: ArrayView<'_, f32, E>,
    lr: f32,
    l2: f32,
) {
    Zip::from(data).and(diff).for_each(|w, &g| {
        *w -= lr * (g + l2 * *w);
    });
}

/// `h = lr * (g + l2 * w) + momentum * h; w -= h`, element-wise. The L2 term
/// uses the weight from before this step.
fn step_momentum<E: Dimension>(
    data: ArrayViewMut<'_, f32, E>,
    history: ArrayViewMut<'_, f32, E>,
    diff: ArrayView<'_, f32, E>,
    lr: f32,
    l2: f32,
    momentum: f32,
) {
    Zip::from(data).and(history).and(diff).for_each(|w, h, &g| {
        *h = lr * (g + l2 * *w) + momentum * *h;
        *w -= *h;
    });
}

impl<D: RemoveAxis> Updater<D> for SGDUpdater<D> {
    fn defaults(&self) -> Settings {
        Settings::new()
            .with(UPDATER_TYPE, UpdaterType::Sgd.name())
            .with("decay", 0.0f32)
            .with("momentum", 0.0f32)
            .with("l2", 0.0f32)
            .with("batch_size", 1i64)
            .with("lr", SettingValue::Unset)
    }

    fn setup_updater(&mut self, settings: &Settings) -> Result<(), ConfigError> {
        if let Some(value) = settings.get(UPDATER_TYPE).filter(|value| !value.is_unset()) {
            match UpdaterType::from_setting(value)? {
                UpdaterType::Sgd => {}
            }
        }

        let base_lr = finite(settings, "lr")?;
        let decay = finite(settings, "decay")?;
        let momentum = finite(settings, "momentum")?;
        let l2 = finite(settings, "l2")?;
        let batch_size = settings.get_usize("batch_size")?;
        if batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                name: "batch_size".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        self.base_lr = base_lr;
        self.decay = decay;
        self.momentum = momentum;
        self.l2 = l2;
        self.batch_size = batch_size;
        self.iteration = 0;
        self.lr = base_lr;
        Ok(())
    }

    /// Dense SGD step.
    ///
    /// # Panics
    ///
    /// Panics if `data` and `diff` (or the momentum history) have different
    /// shapes. Nothing is modified in that case.
    fn update(&mut self, data: ArrayViewMut<'_, f32, D>, mut diff: ArrayViewMut<'_, f32, D>) {
        assert_eq!(
            data.shape(),
            diff.shape(),
            "Parameters and gradients must have the same shape"
        );
        self.check_history(&data);

        self.begin_step(&data, &mut diff);

        let (lr, l2, momentum) = (self.lr, self.l2, self.momentum);
        match self.history.as_mut() {
            None => step_plain(data, diff.view(), lr, l2),
            Some(history) => {
                step_momentum(data, history.view_mut(), diff.view(), lr, l2, momentum)
            }
        }
    }

    /// Sparse SGD step over the rows named by `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `diff` does not have one row per index, if row shapes differ,
    /// or if an index is out of range. Nothing is modified in that case.
    fn update_sparse(
        &mut self,
        mut data: ArrayViewMut<'_, f32, D>,
        mut diff: ArrayViewMut<'_, f32, D>,
        idx: &[usize],
    ) {
        assert!(data.ndim() > 0, "Sparse updates need at least one axis");
        assert_eq!(
            diff.len_of(Axis(0)),
            idx.len(),
            "Gradients must have one row per index"
        );
        assert_eq!(
            &data.shape()[1..],
            &diff.shape()[1..],
            "Parameter and gradient rows must have the same shape"
        );
        let rows = data.len_of(Axis(0));
        if let Some(&row) = idx.iter().find(|&&row| row >= rows) {
            panic!("Row index {} out of range for {} rows", row, rows);
        }
        self.check_history(&data);

        self.begin_step(&data, &mut diff);

        let (lr, l2, momentum) = (self.lr, self.l2, self.momentum);
        for (i, &row) in idx.iter().enumerate() {
            let grad = diff.index_axis(Axis(0), i);
            let weights = data.index_axis_mut(Axis(0), row);
            match self.history.as_mut() {
                None => step_plain(weights, grad, lr, l2),
                Some(history) => step_momentum(
                    weights,
                    history.index_axis_mut(Axis(0), row),
                    grad,
                    lr,
                    l2,
                    momentum,
                ),
            }
        }
    }

    fn updater_type(&self) -> UpdaterType {
        UpdaterType::Sgd
    }

    fn learning_rate(&self) -> f32 {
        self.lr
    }

    fn iteration(&self) -> usize {
        self.iteration
    }

    fn state(&self) -> UpdaterState {
        UpdaterState {
            updater_type: UpdaterType::Sgd,
            iteration: self.iteration,
            lr: self.lr,
            base_lr: self.base_lr,
            history_allocated: self.history.is_some(),
        }
    }
}

fn finite(settings: &Settings, name: &str) -> Result<f32, ConfigError> {
    let value = settings.get_f32(name)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: format!("{} is not finite", value),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::rng::SimpleRng;
    use ndarray::{array, Ix1, Ix2};

    fn sgd<D: RemoveAxis>(settings: Settings) -> SGDUpdater<D> {
        SGDUpdater::new(&settings, SimpleRng::shared(42)).unwrap()
    }

    #[test]
    fn test_sgd_new_defaults() {
        let optimizer: SGDUpdater<Ix1> = sgd(Settings::new().with("lr", 0.01f32));

        assert_eq!(optimizer.learning_rate(), 0.01);
        assert_eq!(optimizer.base_learning_rate(), 0.01);
        assert_eq!(optimizer.decay, 0.0);
        assert_eq!(optimizer.momentum(), 0.0);
        assert_eq!(optimizer.l2, 0.0);
        assert_eq!(optimizer.batch_size(), 1);
        assert_eq!(optimizer.iteration(), 0);
        assert!(optimizer.history().is_none());
    }

    #[test]
    fn test_sgd_missing_lr() {
        let result = SGDUpdater::<Ix1>::new(&Settings::new(), SimpleRng::shared(42));
        assert_eq!(
            result.err(),
            Some(ConfigError::MissingRequired("lr".to_string()))
        );
    }

    #[test]
    fn test_sgd_rejects_zero_batch_size() {
        let settings = Settings::new().with("lr", 0.1f32).with("batch_size", 0i64);
        let result = SGDUpdater::<Ix1>::new(&settings, SimpleRng::shared(42));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_sgd_rejects_non_finite_lr() {
        let settings = Settings::new().with("lr", f32::NAN);
        let result = SGDUpdater::<Ix1>::new(&settings, SimpleRng::shared(42));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_sgd_update() {
        let mut optimizer = sgd(Settings::new().with("lr", 0.1f32));
        let mut params = array![1.0f32, 2.0, 3.0];
        let mut grads = array![0.1f32, 0.2, 0.3];

        optimizer.update(params.view_mut(), grads.view_mut());

        assert!((params[0] - 0.99).abs() < 1e-6);
        assert!((params[1] - 1.98).abs() < 1e-6);
        assert!((params[2] - 2.97).abs() < 1e-6);
        assert_eq!(optimizer.iteration(), 1);
    }

    #[test]
    fn test_sgd_l2_uses_pre_update_weights() {
        let mut optimizer = sgd(Settings::new().with("lr", 0.5f32).with("l2", 0.5f32));
        let mut params = array![2.0f32];
        let mut grads = array![1.0f32];

        optimizer.update(params.view_mut(), grads.view_mut());

        // 2 - 0.5 * (1 + 0.5 * 2)
        assert_eq!(params[0], 1.0);
    }

    #[test]
    fn test_sgd_history_allocated_with_momentum() {
        let mut optimizer = sgd(Settings::new().with("lr", 0.1f32).with("momentum", 0.9f32));
        let mut params = array![[1.0f32, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let mut grads = array![[1.0f32, 1.0], [1.0, 1.0], [1.0, 1.0]];

        assert!(optimizer.history().is_none());
        optimizer.update(params.view_mut(), grads.view_mut());

        let history = optimizer.history().unwrap();
        assert_eq!(history.shape(), &[3, 2]);
        assert!(history.iter().all(|&h| (h - 0.1).abs() < 1e-6));
    }

    #[test]
    fn test_sgd_no_history_without_momentum() {
        let mut optimizer = sgd(Settings::new().with("lr", 0.1f32));
        let mut params = array![1.0f32];
        let mut grads = array![1.0f32];

        optimizer.update(params.view_mut(), grads.view_mut());

        assert!(optimizer.history().is_none());
        assert!(!optimizer.state().history_allocated);
    }

    #[test]
    fn test_sgd_batch_scaling_mutates_diff() {
        let settings = Settings::new().with("lr", 1.0f32).with("batch_size", 4i64);
        let mut optimizer = sgd(settings);
        let mut params = array![0.0f32, 0.0];
        let mut grads = array![4.0f32, 8.0];

        optimizer.update(params.view_mut(), grads.view_mut());

        assert_eq!(grads, array![1.0f32, 2.0]);
        assert_eq!(params, array![-1.0f32, -2.0]);
    }

    #[test]
    fn test_adapt_learning_rate_first_call_uses_iteration_zero() {
        let mut optimizer = sgd(Settings::new().with("lr", 1.0f32).with("decay", 0.5f32));
        let mut params = array![0.0f32];
        let mut grads = array![0.0f32];

        optimizer.update(params.view_mut(), grads.view_mut());
        assert_eq!(optimizer.learning_rate(), 1.0);

        optimizer.update(params.view_mut(), grads.view_mut());
        assert_eq!(optimizer.learning_rate(), 0.5);
    }

    #[test]
    fn test_sgd_sparse_update_rows() {
        let mut optimizer: SGDUpdater<Ix2> = sgd(Settings::new().with("lr", 0.5f32));
        let mut params = array![[1.0f32, 1.0], [2.0, 2.0], [3.0, 3.0]];
        let mut grads = array![[2.0f32, 4.0]];

        optimizer.update_sparse(params.view_mut(), grads.view_mut(), &[1]);

        assert_eq!(params, array![[1.0f32, 1.0], [1.0, 0.0], [3.0, 3.0]]);
    }

    #[test]
    fn test_sgd_rng_is_kept() {
        let rng = SimpleRng::shared(9);
        let settings = Settings::new().with("lr", 0.1f32);
        let optimizer = SGDUpdater::<Ix1>::new(&settings, std::sync::Arc::clone(&rng)).unwrap();
        assert!(std::sync::Arc::ptr_eq(optimizer.rng(), &rng));
    }

    #[test]
    fn test_sgd_rejects_other_updater_type() {
        let settings = Settings::new().with("lr", 0.1f32).with(UPDATER_TYPE, "adam");
        let result = SGDUpdater::<Ix1>::new(&settings, SimpleRng::shared(42));
        assert_eq!(
            result.err(),
            Some(ConfigError::UnknownUpdater("adam".to_string()))
        );
    }

    #[test]
    #[should_panic(expected = "Parameters and gradients must have the same shape")]
    fn test_sgd_mismatched_shapes() {
        let mut optimizer = sgd(Settings::new().with("lr", 0.01f32));
        let mut params = array![1.0f32, 2.0];
        let mut grads = array![0.1f32, 0.2, 0.3];
        optimizer.update(params.view_mut(), grads.view_mut());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_sgd_sparse_index_out_of_range() {
        let mut optimizer: SGDUpdater<Ix2> = sgd(Settings::new().with("lr", 0.01f32));
        let mut params = array![[1.0f32], [2.0]];
        let mut grads = array![[0.1f32]];
        optimizer.update_sparse(params.view_mut(), grads.view_mut(), &[2]);
    }
}
