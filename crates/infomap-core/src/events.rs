//! Host-facing event callbacks.
//!
//! One callback slot per event kind. Registering again replaces the previous
//! callback; fan-out to several subscribers is left to the host.

use std::fmt;
use std::str::FromStr;

use crate::job::JobId;

/// Callback invoked with an event's content and the job it belongs to.
pub type EventCallback = Box<dyn FnMut(&str, JobId) + Send>;

/// Kinds of events a host can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Data,
    Error,
    Finished,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Error => "error",
            Self::Finished => "finished",
        }
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "data" => Ok(Self::Data),
            "error" => Ok(Self::Error),
            "finished" => Ok(Self::Finished),
            other => Err(format!("Unhandled event: {}", other)),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The subscription set: one callback per [`EventKind`], no-op by default.
pub struct EventDispatcher {
    on_data: EventCallback,
    on_error: EventCallback,
    on_finished: EventCallback,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            on_data: noop(),
            on_error: noop(),
            on_finished: noop(),
        }
    }

    /// Replace the callback for `kind`.
    pub fn set(&mut self, kind: EventKind, callback: EventCallback) {
        *self.slot(kind) = callback;
    }

    /// Invoke the callback for `kind`.
    pub fn emit(&mut self, kind: EventKind, content: &str, id: JobId) {
        let callback = self.slot(kind);
        callback(content, id);
    }

    fn slot(&mut self, kind: EventKind) -> &mut EventCallback {
        match kind {
            EventKind::Data => &mut self.on_data,
            EventKind::Error => &mut self.on_error,
            EventKind::Finished => &mut self.on_finished,
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher").finish_non_exhaustive()
    }
}

fn noop() -> EventCallback {
    Box::new(|_, _| {})
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_parse_event_kind() {
        assert_eq!("data".parse::<EventKind>(), Ok(EventKind::Data));
        assert_eq!("finished".parse::<EventKind>(), Ok(EventKind::Finished));
        assert!("progress".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_unset_callbacks_are_noops() {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.emit(EventKind::Error, "boom", JobId::new(0));
    }

    #[test]
    fn test_last_registration_wins() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new();

        let first = Arc::clone(&seen);
        dispatcher.set(
            EventKind::Data,
            Box::new(move |content, _| first.lock().unwrap().push(format!("first:{content}"))),
        );
        let second = Arc::clone(&seen);
        dispatcher.set(
            EventKind::Data,
            Box::new(move |content, _| second.lock().unwrap().push(format!("second:{content}"))),
        );

        dispatcher.emit(EventKind::Data, "line", JobId::new(0));
        assert_eq!(*seen.lock().unwrap(), vec!["second:line".to_string()]);
    }
}
