//! Notifier that records what it was told

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use waterguard_core::notify::{AlarmEvent, AlarmKind, NotificationSettings, Notifier};

/// Something the coordinator asked the notifier to do
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Raised(AlarmEvent),
    Cleared(AlarmKind),
}

#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    received: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.received.lock().unwrap().clone()
    }

    /// Kinds of every raised alarm, in order
    pub fn raised(&self) -> Vec<AlarmKind> {
        self.notifications()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Raised(event) => Some(event.kind),
                _ => None,
            })
            .collect()
    }

    pub fn cleared(&self) -> Vec<AlarmKind> {
        self.notifications()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Cleared(kind) => Some(kind),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.received.lock().unwrap().clear();
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn alarm_raised(&self, event: &AlarmEvent, _settings: &NotificationSettings) {
        self.received
            .lock()
            .unwrap()
            .push(Notification::Raised(event.clone()));
    }

    async fn alarm_cleared(&self, kind: AlarmKind, _settings: &NotificationSettings) {
        self.received
            .lock()
            .unwrap()
            .push(Notification::Cleared(kind));
    }
}
