//! In-process publish/subscribe bus for cross-component signals.
//!
//! Every event name has exactly one payload type. Subscribers hold a
//! [`Subscription`]; dropping it unsubscribes.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumDiscriminants};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};
use ts_rs::TS;

const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ToastLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// Short-lived user notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
pub struct Toast {
    pub level: ToastLevel,
    pub title: Option<String>,
    pub message: String,
}

impl Toast {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Success,
            title: None,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Error,
            title: None,
            message: message.into(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
pub struct SupportPopupRequest {
    pub topic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, EnumDiscriminants)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
#[strum_discriminants(
    name(AppEventKind),
    derive(Display, Hash),
    strum(serialize_all = "kebab-case")
)]
pub enum AppEvent {
    OpenSupportPopup(SupportPopupRequest),
    Toast(Toast),
}

impl AppEvent {
    pub fn kind(&self) -> AppEventKind {
        AppEventKind::from(self)
    }
}

/// Cloneable handle to a shared broadcast channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AppEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event. Returns how many subscribers received it.
    pub fn publish(&self, event: AppEvent) -> usize {
        let kind = event.kind();
        match self.sender.send(event) {
            Ok(receivers) => {
                debug!(event = %kind, receivers, "Published event");
                receivers
            }
            Err(_) => {
                debug!(event = %kind, "Published event with no subscribers");
                0
            }
        }
    }

    pub fn toast(&self, toast: Toast) -> usize {
        self.publish(AppEvent::Toast(toast))
    }

    /// Subscribe to every event.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            filter: None,
        }
    }

    /// Subscribe to a single event kind.
    pub fn subscribe_to(&self, kind: AppEventKind) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            filter: Some(kind),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Live subscription. Unsubscribes on drop.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<AppEvent>,
    filter: Option<AppEventKind>,
}

impl Subscription {
    /// Wait for the next matching event. `None` once every bus handle is gone.
    pub async fn recv(&mut self) -> Option<AppEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event subscriber lagged, dropping events");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event that is already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<AppEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event subscriber lagged, dropping events");
                }
                Err(_) => return None,
            }
        }
    }

    fn matches(&self, event: &AppEvent) -> bool {
        self.filter.is_none_or(|kind| kind == event.kind())
    }
}
