//! Event stream (C14): a hierarchical, synchronous sequence of
//! lifecycle events consumed by a caller-supplied sink. There is no
//! cross-thread fan-out ("single-threaded cooperative" execution) —
//! `EventStream` is a plain struct threaded through the lifecycle
//! engine, not a channel or generator.

use crate::error::{EventStreamError, JailError};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    Pending,
    Done,
    Failed,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: String,
    pub identifier: String,
    pub state: EventState,
    pub message: Option<String>,
    pub data: BTreeMap<String, String>,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub parent_depth: usize,
}

/// One rollback action: a human label plus the closure that performs
/// the compensating action and returns the event(s) describing it.
type RollbackAction = (String, Box<dyn FnMut() -> Vec<Event>>);

pub struct EventStream<'a> {
    sink: Box<dyn FnMut(&Event) + 'a>,
    /// Stack of scopes; each scope's pending-children counter drives
    /// display indentation in callers that render a tree.
    depth: usize,
    rollback_stack: Vec<RollbackAction>,
    open: BTreeMap<(String, String), Event>,
}

impl<'a> EventStream<'a> {
    pub fn new(sink: impl FnMut(&Event) + 'a) -> EventStream<'a> {
        EventStream {
            sink: Box::new(sink),
            depth: 0,
            rollback_stack: Vec::new(),
            open: BTreeMap::new(),
        }
    }

    fn emit(&mut self, event: &Event) {
        (self.sink)(event);
    }

    /// Start a new event, entering a nested scope for any children it
    /// emits before its matching `end`/`fail`/`skip`.
    pub fn begin(&mut self, event_type: &str, identifier: &str) {
        let event = Event {
            event_type: event_type.to_string(),
            identifier: identifier.to_string(),
            state: EventState::Pending,
            message: None,
            data: BTreeMap::new(),
            started_at: Utc::now(),
            stopped_at: None,
            parent_depth: self.depth,
        };
        self.emit(&event);
        self.open.insert((event_type.to_string(), identifier.to_string()), event);
        self.depth += 1;
    }

    /// A sub-step within the current scope that doesn't itself open a
    /// new scope — emitted and immediately done.
    pub fn step(&mut self, event_type: &str, identifier: &str, message: Option<&str>) {
        let event = Event {
            event_type: event_type.to_string(),
            identifier: identifier.to_string(),
            state: EventState::Done,
            message: message.map(str::to_string),
            data: BTreeMap::new(),
            started_at: Utc::now(),
            stopped_at: Some(Utc::now()),
            parent_depth: self.depth,
        };
        self.emit(&event);
    }

    /// Register a rollback action against the currently-open scope,
    /// innermost first; drained in LIFO order by [`EventStream::fail`].
    pub fn push_rollback(&mut self, label: impl Into<String>, action: impl FnMut() -> Vec<Event> + 'static) {
        self.rollback_stack.push((label.into(), Box::new(action)));
    }

    pub fn end(&mut self, event_type: &str, identifier: &str) -> Result<(), JailError> {
        self.finish(event_type, identifier, EventState::Done, None)
    }

    pub fn skip(&mut self, event_type: &str, identifier: &str, reason: &str) -> Result<(), JailError> {
        self.finish(event_type, identifier, EventState::Skipped, Some(reason.to_string()))
    }

    /// Drain the rollback stack (innermost action first), emitting
    /// each compensating event, then emit the terminal failure event
    /// itself.
    pub fn fail(&mut self, event_type: &str, identifier: &str, message: &str) -> Result<(), JailError> {
        while let Some((label, mut action)) = self.rollback_stack.pop() {
            self.step("rollback", &label, None);
            for rollback_event in action() {
                self.emit(&rollback_event);
            }
        }
        self.finish(event_type, identifier, EventState::Failed, Some(message.to_string()))
    }

    fn finish(&mut self, event_type: &str, identifier: &str, state: EventState, message: Option<String>) -> Result<(), JailError> {
        let key = (event_type.to_string(), identifier.to_string());
        let mut event = self
            .open
            .remove(&key)
            .ok_or_else(|| EventStreamError::EventAlreadyFinished(event_type.to_string(), identifier.to_string()))?;
        event.state = state;
        event.message = message;
        event.stopped_at = Some(Utc::now());
        self.depth = self.depth.saturating_sub(1);
        self.emit(&event);
        Ok(())
    }

    pub fn clear_rollbacks(&mut self) {
        self.rollback_stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn begin_end_roundtrip() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log2 = log.clone();
        let mut stream = EventStream::new(move |e: &Event| log2.borrow_mut().push(format!("{}:{:?}", e.identifier, e.state)));
        stream.begin("jail.start", "web1");
        stream.end("jail.start", "web1").unwrap();
        let entries = log.borrow();
        assert_eq!(entries[0], "web1:Pending");
        assert_eq!(entries[1], "web1:Done");
    }

    #[test]
    fn double_finish_errors() {
        let mut stream = EventStream::new(|_| {});
        stream.begin("jail.start", "web1");
        stream.end("jail.start", "web1").unwrap();
        assert!(stream.end("jail.start", "web1").is_err());
    }

    #[test]
    fn fail_drains_rollback_stack_in_lifo_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log2 = log.clone();
        let mut stream = EventStream::new(move |e: &Event| log2.borrow_mut().push(e.identifier.clone()));
        stream.begin("jail.start", "web1");
        let log3 = log.clone();
        stream.push_rollback("undo-mount", move || {
            log3.borrow_mut().push("undo-mount-ran".to_string());
            Vec::new()
        });
        let log4 = log.clone();
        stream.push_rollback("undo-epair", move || {
            log4.borrow_mut().push("undo-epair-ran".to_string());
            Vec::new()
        });
        stream.fail("jail.start", "web1", "boom").unwrap();
        let entries = log.borrow();
        let undo_epair_pos = entries.iter().position(|e| e == "undo-epair-ran").unwrap();
        let undo_mount_pos = entries.iter().position(|e| e == "undo-mount-ran").unwrap();
        assert!(undo_epair_pos < undo_mount_pos, "innermost rollback (epair) must run before outer (mount)");
    }
}
