//! Test utilities for the Waterguard client
//!
//! This crate provides a scripted transport, a recording notifier and
//! response frame builders for testing hub interactions without a network.

pub mod builders;
pub mod mocks;

// Re-export commonly used types
pub use mocks::{MockRequest, MockTransport, Notification, RecordingNotifier};
