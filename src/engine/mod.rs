//! # Engine Module
//!
//! Stream runtime and the for-each dispatch built on it.
//!
//! This module contains:
//! - Streams, events and the worker threads behind them
//! - Dependencies, futures and promises
//! - Execution policies and cursors
//! - Kernels and launch primitives
//! - The dispatch entry points
//!
//! Public API exposure is controlled by `lib.rs`.

pub mod types;
pub mod error;
pub mod config;
pub mod borrow;
pub mod event;
pub mod stream;
pub mod dependency;
pub mod future;
pub mod policy;
pub mod cursor;
pub mod memory;
pub mod kernel;
pub mod launch;
pub mod dispatch;
