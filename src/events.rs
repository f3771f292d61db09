//! Event emitter: a sink trait with a no-op default. The emitter is an
//! owned collaborator, always present on the scheduler, possibly a discard.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// The lifecycle/progress event kinds a crawl can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Progress,
    Log,
    UrlProcessed,
    StateChanged,
    CrawlStarted,
    CrawlStopped,
    CrawlPaused,
    CrawlResumed,
    CrawlCompleted,
    Error,
    WaitingForLogin,
}

/// A single emitted event: its kind, when it happened, and a free-form
/// JSON payload.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlerEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}

impl CrawlerEvent {
    pub fn new(event_type: EventType, data: Value) -> Self {
        CrawlerEvent {
            event_type,
            timestamp: Utc::now(),
            data,
        }
    }
}

/// A fire-and-forget sink for lifecycle/progress events. Implementations
/// must not block the scheduler; `emit` takes `&self` so the emitter can be
/// shared across concurrent workers without a lock.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: CrawlerEvent);
}

/// The default "possibly a discard" emitter: drops every event. An owned
/// `NullEmitter` keeps the scheduler from having to branch on
/// `Option<Box<dyn EventEmitter>>` at every call site.
pub struct NullEmitter;

impl EventEmitter for NullEmitter {
    fn emit(&self, _event: CrawlerEvent) {}
}

/// A bounded-channel emitter for callers that want to observe the event
/// stream (e.g. a progress display). Send errors (a full or closed channel)
/// are swallowed — emission is fire-and-forget by contract.
pub struct ChannelEmitter {
    sender: tokio::sync::mpsc::Sender<CrawlerEvent>,
}

impl ChannelEmitter {
    pub fn new(capacity: usize) -> (Self, tokio::sync::mpsc::Receiver<CrawlerEvent>) {
        let (sender, receiver) = tokio::sync::mpsc::channel(capacity);
        (ChannelEmitter { sender }, receiver)
    }
}

impl EventEmitter for ChannelEmitter {
    fn emit(&self, event: CrawlerEvent) {
        if let Err(e) = self.sender.try_send(event) {
            tracing::debug!(error = %e, "dropping event, channel full or closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_emitter_accepts_anything() {
        let emitter = NullEmitter;
        emitter.emit(CrawlerEvent::new(EventType::CrawlStarted, json!({})));
    }

    #[tokio::test]
    async fn channel_emitter_delivers_events() {
        let (emitter, mut rx) = ChannelEmitter::new(4);
        emitter.emit(CrawlerEvent::new(
            EventType::UrlProcessed,
            json!({"url": "https://example.com"}),
        ));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type, EventType::UrlProcessed);
    }

    #[test]
    fn event_type_serializes_snake_case() {
        let event = CrawlerEvent::new(EventType::WaitingForLogin, json!(null));
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"waiting_for_login\""));
    }
}
