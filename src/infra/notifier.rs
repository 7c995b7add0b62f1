// ============================================================
// Layer 6 — Notification Sinks
// ============================================================
//   TracingNotifier → writes every event to the log
//   ChannelNotifier → forwards (event, payload) over an mpsc
//                     channel; the receiver is the subscriber
//
// Publishing never blocks. A dropped receiver turns into a
// Notify error, which the caller logs and ignores.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

use serde_json::Value;

use crate::domain::traits::NotificationSink;
use crate::error::{PipelineError, Result};

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn publish(&self, event: &str, payload: Value) -> Result<()> {
        tracing::info!(event, %payload, "notification");
        Ok(())
    }
}

/// One published event as seen by a channel subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub event:   String,
    pub payload: Value,
}

pub struct ChannelNotifier {
    sender: Mutex<Sender<Notification>>,
}

impl ChannelNotifier {
    /// A notifier plus the receiving end of its channel.
    pub fn new() -> (Self, Receiver<Notification>) {
        let (tx, rx) = mpsc::channel();
        (Self { sender: Mutex::new(tx) }, rx)
    }
}

impl NotificationSink for ChannelNotifier {
    fn publish(&self, event: &str, payload: Value) -> Result<()> {
        let sender = self.sender.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        sender
            .send(Notification { event: event.to_string(), payload })
            .map_err(|_| PipelineError::Notify(format!("no subscriber for '{event}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_channel_delivers_in_order() {
        let (notifier, rx) = ChannelNotifier::new();
        notifier.publish("training_started", json!({"progress": 0})).unwrap();
        notifier.publish("training_progress", json!({"progress": 50})).unwrap();
        let events: Vec<String> = rx.try_iter().map(|n| n.event).collect();
        assert_eq!(events, vec!["training_started", "training_progress"]);
    }

    #[test]
    fn test_dropped_receiver_is_an_error() {
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);
        let err = notifier.publish("training_started", json!({})).unwrap_err();
        assert!(matches!(err, PipelineError::Notify(_)));
    }

    #[test]
    fn test_tracing_notifier_accepts_everything() {
        assert!(TracingNotifier.publish("anything", json!(null)).is_ok());
    }
}
