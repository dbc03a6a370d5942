//! Waterguard CLI library
//!
//! Configuration loading, output formatting and the terminal notifier used
//! by the `waterguard` binary.

pub mod config;
pub mod notifier;
pub mod output;
pub mod terminal;
