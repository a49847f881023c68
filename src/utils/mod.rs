//! Shared utilities for updater implementations
//!
//! This module provides the random number generator handle that every updater
//! receives at construction.

pub mod rng;
