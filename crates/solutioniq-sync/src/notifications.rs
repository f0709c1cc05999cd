//! Bounded feed of notifications built from push events.

use chrono::{DateTime, Utc};
use serde::Serialize;
use solutioniq_stream::{EventKind, InboundEvent, StreamHandle};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

pub const MAX_NOTIFICATIONS: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub id: String,
    pub kind: &'static str,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
}

/// Display text for an event.
#[must_use]
pub fn notification_message(event: &InboundEvent) -> String {
    let short_task = || {
        event
            .task_id()
            .map(|id| id.chars().take(8).collect::<String>())
            .unwrap_or_else(|| "unknown".to_string())
    };
    match event.kind() {
        EventKind::TaskCompleted => format!("Task {} completed", short_task()),
        EventKind::TaskFailed => format!("Task {} failed", short_task()),
        EventKind::BudgetAlert => event
            .payload()
            .message
            .clone()
            .unwrap_or_else(|| "Budget threshold reached".to_string()),
        EventKind::TaskAwaitingApproval => "New approval request".to_string(),
        EventKind::MessageCreated => "New message received".to_string(),
    }
}

#[derive(Debug)]
struct CenterState {
    enabled: bool,
    items: VecDeque<Notification>,
}

/// Newest-first notification list, independent of the active conversation.
#[derive(Debug)]
pub struct NotificationCenter {
    state: Mutex<CenterState>,
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new(true)
    }
}

impl NotificationCenter {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            state: Mutex::new(CenterState {
                enabled,
                items: VecDeque::with_capacity(MAX_NOTIFICATIONS),
            }),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.lock().enabled = enabled;
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    /// Record `event`. Returns the new notification, or `None` while disabled.
    pub fn record(&self, event: &InboundEvent) -> Option<Notification> {
        let mut state = self.lock();
        if !state.enabled {
            return None;
        }
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            kind: event.kind().as_str(),
            message: notification_message(event),
            timestamp: Utc::now(),
            read: false,
        };
        state.items.push_front(notification.clone());
        state.items.truncate(MAX_NOTIFICATIONS);
        Some(notification)
    }

    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.lock().items.iter().cloned().collect()
    }

    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.lock().items.iter().filter(|item| !item.read).count()
    }

    pub fn mark_all_read(&self) {
        for item in &mut self.lock().items {
            item.read = true;
        }
    }

    pub fn clear(&self) {
        self.lock().items.clear();
    }

    /// Record every event from `stream` until the center is dropped.
    pub fn spawn(self: &Arc<Self>, stream: &StreamHandle) -> JoinHandle<()> {
        let mut events = stream.subscribe();
        let center = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let Some(center) = center.upgrade() else {
                            break;
                        };
                        center.record(&event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "notification feed lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, CenterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
