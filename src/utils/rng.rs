//! Random state handed to updaters at construction.
//!
//! Every updater receives a shared handle to a random generator so that rules
//! needing noise (and rules that don't) can be built through the same factory.
//! The generator is a small xorshift PRNG with explicit seeding, so runs are
//! reproducible.

use std::sync::{Arc, Mutex};

/// Random generator handle shared between updater instances.
///
/// Updaters may be driven from different threads, so the generator sits
/// behind a mutex.
pub type SharedRng = Arc<Mutex<SimpleRng>>;

/// Xorshift PRNG.
#[derive(Debug, Clone)]
pub struct SimpleRng {
    state: u64,
}

impl SimpleRng {
    /// Create a new RNG with explicit seed (if zero, use a fixed value).
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { 0x9e3779b97f4a7c15 } else { seed };
        Self { state }
    }

    /// Create a shared handle seeded with `seed`.
    ///
    /// ```
    /// use rust_nn_updaters::utils::rng::SimpleRng;
    ///
    /// let rng = SimpleRng::shared(7);
    /// let value = rng.lock().unwrap().next_f32();
    /// assert!((0.0..1.0).contains(&value));
    /// ```
    pub fn shared(seed: u64) -> SharedRng {
        Arc::new(Mutex::new(Self::new(seed)))
    }

    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        (x >> 32) as u32
    }

    /// Uniform sample in [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        // 24 bits keep the result strictly below 1.0 after rounding to f32.
        (self.next_u32() >> 8) as f32 / (1u32 << 24) as f32
    }

    /// Uniform sample in [low, high).
    pub fn gen_range_f32(&mut self, low: f32, high: f32) -> f32 {
        low + (high - low) * self.next_f32()
    }

    /// Integer sample in [0, upper).
    pub fn gen_usize(&mut self, upper: usize) -> usize {
        if upper == 0 {
            0
        } else {
            (self.next_u32() as usize) % upper
        }
    }

    /// Fisher-Yates shuffle, used to build row orderings for sparse updates.
    pub fn shuffle_usize(&mut self, data: &mut [usize]) {
        if data.len() <= 1 {
            return;
        }
        for i in (1..data.len()).rev() {
            let j = self.gen_usize(i + 1);
            data.swap(i, j);
        }
    }
}
