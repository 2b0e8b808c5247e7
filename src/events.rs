//! Feature-request/identify/custom event shaping, per spec.md §4.6.
//!
//! The teacher has no event pipeline at all; this module is new, but kept
//! in the teacher's trait-boundary style (`Store`, `Source`): an
//! [`EventSink`] is the interface the evaluator emits into, and the actual
//! batching/flushing/sampling pipeline is an external collaborator per
//! spec.md §1.

use crate::evaluator::Reason;
use crate::value::Value;

/// A single evaluation's feature-request record.
#[derive(Debug, Clone)]
pub struct FeatureRequestEvent {
    pub key: String,
    /// Redacted projection of the evaluated user (see [`crate::user::User::to_redacted_json`]).
    pub user: Value,
    pub variation: Option<usize>,
    pub value: Value,
    pub default: Value,
    pub reason: Reason,
    pub version: u64,
    pub track_events: bool,
    pub debug_events_until_date: Option<i64>,
    /// Set when this event describes a prerequisite evaluation, naming the
    /// dependent flag.
    pub prereq_of: Option<String>,
    pub creation_date: i64,
}

/// An event the evaluator or client can hand to the external pipeline.
#[derive(Debug, Clone)]
pub enum Event {
    FeatureRequest(FeatureRequestEvent),
    Identify {
        user: Value,
        creation_date: i64,
    },
    Custom {
        key: String,
        user: Value,
        data: Option<Value>,
        metric_value: Option<f64>,
        creation_date: i64,
    },
}

/// Receives shaped events. Emission is fire-and-forget: a failure to
/// accept an event must never affect an evaluation's returned value.
pub trait EventSink: Send + Sync {
    fn send(&self, event: Event);
}

/// Discards every event. Useful for tests and for an offline client.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn send(&self, _event: Event) {}
}

/// Forwards events into an unbounded channel for a real pipeline to drain.
///
/// Sending never blocks and a closed receiver is silently ignored, keeping
/// emission fire-and-forget from the evaluator's perspective.
pub struct ChannelSink(tokio::sync::mpsc::UnboundedSender<Event>);

impl ChannelSink {
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Self(tx), rx)
    }
}

impl EventSink for ChannelSink {
    fn send(&self, event: Event) {
        let _ = self.0.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::ErrorKind;

    #[test]
    fn null_sink_accepts_everything() {
        let sink = NullSink;
        sink.send(Event::Identify {
            user: Value::Null,
            creation_date: 0,
        });
    }

    #[test]
    fn channel_sink_delivers_events() {
        let (sink, mut rx) = ChannelSink::new();
        sink.send(Event::FeatureRequest(FeatureRequestEvent {
            key: "f".to_string(),
            user: Value::Null,
            variation: Some(1),
            value: Value::Bool(true),
            default: Value::Bool(false),
            reason: Reason::Fallthrough,
            version: 1,
            track_events: false,
            debug_events_until_date: None,
            prereq_of: None,
            creation_date: 0,
        }));
        drop(sink);
        let event = rx.try_recv().expect("event delivered");
        match event {
            Event::FeatureRequest(fr) => assert_eq!(fr.key, "f"),
            _ => panic!("wrong event variant"),
        }
    }

    #[test]
    fn channel_sink_send_after_drop_does_not_panic() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.send(Event::FeatureRequest(FeatureRequestEvent {
            key: "f".to_string(),
            user: Value::Null,
            variation: None,
            value: Value::Null,
            default: Value::Null,
            reason: Reason::Error(ErrorKind::FlagNotFound),
            version: 0,
            track_events: false,
            debug_events_until_date: None,
            prereq_of: None,
            creation_date: 0,
        }));
    }
}
