//! Rust Neural Network Updaters
//!
//! This library provides the parameter update rules used inside a neural network
//! training loop: given a parameter tensor and its gradient, an updater mutates
//! the parameters in place and advances its own optimizer state.
//!
//! # Modules
//!
//! - `config`: Named settings, defaults and JSON loading
//! - `updaters`: Updater trait, factory and implementations (SGD)
//! - `utils`: Shared utilities (RNG handle)

pub mod config;
pub mod updaters;
pub mod utils;
