//! Inbound event application.
//!
//! Events from a frontend update are applied in array order before the render
//! pass. Each event addresses a component by `waveid` and a callback by prop
//! name; a missing component, a missing prop, or a non-callable prop is
//! silently ignored. Global events carry no `waveid` and dispatch to the
//! root's registered global handler.

use crate::error::panic_message;
use crate::innerlude::*;
use std::panic::{catch_unwind, AssertUnwindSafe};

impl VDomRoot {
    /// Apply a batch of events in order.
    pub(crate) fn apply_events(&mut self, events: &[VDomEvent]) {
        for event in events {
            self.handle_event(event);
        }
    }

    /// Dispatch a single event to at most one callback, determined by
    /// `(waveid, eventtype)`.
    pub fn handle_event(&mut self, event: &VDomEvent) {
        let waveid = match &event.waveid {
            Some(id) if !id.is_empty() => id.clone(),
            _ => {
                self.handle_global_event(event);
                return;
            }
        };
        let func = match self
            .components
            .get(&waveid)
            .and_then(|comp| comp.committed_prop(&event.eventtype))
            .and_then(PropValue::as_func)
        {
            Some(f) => f.clone(),
            None => return,
        };
        self.invoke_handler(func, event, &waveid);
    }

    fn handle_global_event(&mut self, event: &VDomEvent) {
        let func = match &self.global_handler {
            Some(f) => f.clone(),
            None => {
                tracing::debug!(eventtype = %event.eventtype, "global event with no handler");
                return;
            }
        };
        let label = "global".to_string();
        self.invoke_handler(func, event, &label);
    }

    fn invoke_handler(&mut self, func: HandlerFn, event: &VDomEvent, target: &str) {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| func(self, event))) {
            let msg = panic_message(payload);
            tracing::error!(waveid = %target, eventtype = %event.eventtype, "event callback panicked: {msg}");
            self.messages.push(
                VDomMessage::error(format!(
                    "callback {} on {target} failed: {msg}",
                    event.eventtype
                ))
                .with_stacktrace(std::backtrace::Backtrace::force_capture().to_string()),
            );
        }
    }
}
