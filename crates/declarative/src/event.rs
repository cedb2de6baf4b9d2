//! Structured per-operation events

use crate::types::{OperationKind, OperationStatus, ResourceKey};
use serde::Serialize;
use std::sync::Mutex;

/// One status transition of one operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationEvent {
    /// `type.name` of the resource
    pub resource: String,
    pub operation: OperationKind,
    pub status: OperationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl OperationEvent {
    pub fn new(key: &ResourceKey, operation: OperationKind, status: OperationStatus) -> Self {
        Self {
            resource: key.to_string(),
            operation,
            status,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Receiver of operation events
///
/// Called from worker threads while a level runs.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &OperationEvent);
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn emit(&self, event: &OperationEvent) {
        (**self).emit(event);
    }
}

impl<S: EventSink + ?Sized> EventSink for &S {
    fn emit(&self, event: &OperationEvent) {
        (**self).emit(event);
    }
}

/// Discards every event
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &OperationEvent) {}
}

/// Keeps every event in memory, in emission order
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<OperationEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<OperationEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Statuses reported for one resource, in order
    pub fn statuses_of(&self, key: &ResourceKey) -> Vec<OperationStatus> {
        let resource = key.to_string();
        self.events()
            .into_iter()
            .filter(|e| e.resource == resource)
            .map(|e| e.status)
            .collect()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: &OperationEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let key = ResourceKey::new("github_issue_label", "docker");
        let event = OperationEvent::new(&key, OperationKind::Create, OperationStatus::Skipped)
            .with_detail("dry run");
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"resource":"github_issue_label.docker","operation":"create","status":"skipped","detail":"dry run"}"#
        );

        let bare = OperationEvent::new(&key, OperationKind::Delete, OperationStatus::Running);
        assert!(!serde_json::to_string(&bare).unwrap().contains("detail"));
    }

    #[test]
    fn test_collecting_sink_orders_events() {
        let sink = CollectingSink::new();
        let key = ResourceKey::new("t", "a");
        for status in [
            OperationStatus::Pending,
            OperationStatus::Running,
            OperationStatus::Succeeded,
        ] {
            sink.emit(&OperationEvent::new(&key, OperationKind::Create, status));
        }
        assert_eq!(
            sink.statuses_of(&key),
            vec![
                OperationStatus::Pending,
                OperationStatus::Running,
                OperationStatus::Succeeded
            ]
        );
    }
}
