//! Mock implementations for testing

mod notifier;
mod transport;

pub use notifier::{Notification, RecordingNotifier};
pub use transport::{MockRequest, MockTransport};
