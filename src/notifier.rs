//! Outcome sinks.
//!
//! The engine reports every attempt outcome to an [`OutcomeNotifier`]. Sinks
//! are fire-and-continue: they never fail the dispatch and never hold up the
//! value returned to the caller.

use serde::{Deserialize, Serialize};
use sms_core::MessageIntent;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

/// The message as it went out, without credentials or provider fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsSnapshot {
    /// The one number the gateway was asked to deliver to.
    pub to: String,
    pub message: String,
    pub from: Option<String>,
}

impl From<&MessageIntent> for SmsSnapshot {
    fn from(intent: &MessageIntent) -> Self {
        Self {
            to: intent.first_recipient().to_string(),
            message: intent.body().to_string(),
            from: intent.sender().map(str::to_string),
        }
    }
}

/// A gateway accepted the message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsSent {
    pub id: Uuid,
    pub provider: String,
    pub sms: SmsSnapshot,
    pub status: u16,
    /// Raw response body, opaque to the dispatcher.
    pub body: String,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

/// An attempt failed, either rejected by the gateway or lost in transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsFailed {
    pub id: Uuid,
    pub provider: String,
    pub sms: SmsSnapshot,
    pub error: String,
    /// Raw response body when the gateway answered at all.
    pub body: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

impl SmsSent {
    pub fn new(provider: impl Into<String>, sms: SmsSnapshot, status: u16, body: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider: provider.into(),
            sms,
            status,
            body,
            at: OffsetDateTime::now_utc(),
        }
    }
}

impl SmsFailed {
    pub fn new(
        provider: impl Into<String>,
        sms: SmsSnapshot,
        error: impl ToString,
        body: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider: provider.into(),
            sms,
            error: error.to_string(),
            body,
            at: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SmsEvent {
    Sent(SmsSent),
    Failed(SmsFailed),
}

/// Receives attempt outcomes. Implementations must not panic or block.
pub trait OutcomeNotifier: Send + Sync {
    fn notify_success(&self, event: &SmsSent);
    fn notify_failure(&self, event: &SmsFailed);
}

/// Writes outcomes to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl OutcomeNotifier for TracingNotifier {
    fn notify_success(&self, event: &SmsSent) {
        info!(
            event_id = %event.id,
            provider = %event.provider,
            status = event.status,
            "sms sent"
        );
    }

    fn notify_failure(&self, event: &SmsFailed) {
        warn!(
            event_id = %event.id,
            provider = %event.provider,
            error = %event.error,
            "sms failed"
        );
    }
}

/// Publishes outcomes on a broadcast channel for any number of observers.
///
/// Observers receive events asynchronously, possibly after `send` returned.
/// Publishing with no subscriber is not an error; slow subscribers lag
/// instead of blocking the engine.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<SmsEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SmsEvent> {
        self.tx.subscribe()
    }

    fn publish(&self, event: SmsEvent) {
        // Err only means nobody is listening.
        let _ = self.tx.send(event);
    }
}

impl OutcomeNotifier for BroadcastNotifier {
    fn notify_success(&self, event: &SmsSent) {
        self.publish(SmsEvent::Sent(event.clone()));
    }

    fn notify_failure(&self, event: &SmsFailed) {
        self.publish(SmsEvent::Failed(event.clone()));
    }
}

/// Fans every outcome out to several notifiers in order.
#[derive(Default, Clone)]
pub struct Notifiers {
    sinks: Vec<std::sync::Arc<dyn OutcomeNotifier>>,
}

impl Notifiers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: std::sync::Arc<dyn OutcomeNotifier>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl OutcomeNotifier for Notifiers {
    fn notify_success(&self, event: &SmsSent) {
        for sink in &self.sinks {
            sink.notify_success(event);
        }
    }

    fn notify_failure(&self, event: &SmsFailed) {
        for sink in &self.sinks {
            sink.notify_failure(event);
        }
    }
}
