//! Binding a model to its backend route.
//!
//! The route is resolved from block metadata (`"<view>:route"`), confirmed
//! through a bounded `WaitForRoute`, and torn down when the route-gone
//! lifecycle event fires. States are sticky: a gone route never comes back.

use crate::model::ModelError;
use serde_json::Value;
use tokio::time::Duration;

/// In-protocol wait passed to the transport's `wait_for_route`.
pub const ROUTE_WAIT_PROTO: Duration = Duration::from_secs(4);

/// Outer guard around the whole confirmation attempt.
pub const ROUTE_WAIT_OUTER: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    Resolving,
    Confirmed,
    Gone,
}

/// Route binding and lifecycle state for one model.
#[derive(Debug)]
pub struct RouteManager {
    route: String,
    persist: bool,
    state: RouteState,
}

impl RouteManager {
    /// Resolve the backend route from block metadata. The route lives under
    /// `"<view>:route"`; the `"<view>:persist"` flag suppresses host close on
    /// route loss.
    pub fn from_meta(view: &str, meta: &serde_json::Map<String, Value>) -> Result<Self, ModelError> {
        let key = format!("{view}:route");
        let route = meta
            .get(&key)
            .and_then(Value::as_str)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| ModelError::MissingRoute(key))?
            .to_string();
        let persist = meta
            .get(&format!("{view}:persist"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Ok(RouteManager {
            route,
            persist,
            state: RouteState::Resolving,
        })
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn persist(&self) -> bool {
        self.persist
    }

    pub fn state(&self) -> RouteState {
        self.state
    }

    /// Mark the route confirmed. No effect once the route is gone.
    pub fn confirm(&mut self) {
        if self.state == RouteState::Resolving {
            self.state = RouteState::Confirmed;
        }
    }

    /// Mark the route gone. Terminal.
    pub fn mark_gone(&mut self) {
        self.state = RouteState::Gone;
    }

    pub fn is_confirmed(&self) -> bool {
        self.state == RouteState::Confirmed
    }

    pub fn is_gone(&self) -> bool {
        self.state == RouteState::Gone
    }
}
