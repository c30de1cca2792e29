//! # Wavedom Client
//!
//! The frontend half of a server-driven virtual DOM: a mirror of the
//! backend's committed tree, an update scheduler that coalesces changes into
//! bounded-rate render requests, and a route manager that binds the model to
//! its backend peer.
//!
//! The host supplies two seams: a [`VDomTransport`] that carries the
//! request/response blobs, and a [`DomBridge`] that performs imperative ref
//! operations and measurements on the real rendering surface. Everything
//! else — hydration, version counters, state sync, disposal — lives here.
//!
//! ```rust,ignore
//! let cfg = VDomModelConfig::new("vdom", blockid, block_meta)
//!     .on_close(|| host.close_block());
//! let (model, handle) = VDomModel::new(cfg, transport)?;
//! let applier = model.applier();
//! tokio::task::spawn_local(model.run(Box::new(bridge)));
//!
//! // host glue
//! handle.send_event(Some(waveid), "onClick", event_data::click());
//! handle.set_context(true, cols, rows, false);
//! ```

pub mod applier;
pub mod model;
pub mod route;
pub mod scheduler;
pub mod transport;

pub use applier::{Applier, ClientElem, DomBridge, NoopBridge};
pub use model::{ModelError, ModelMsg, VDomModel, VDomModelConfig, VDomModelHandle};
pub use route::{RouteManager, RouteState, ROUTE_WAIT_OUTER, ROUTE_WAIT_PROTO};
pub use scheduler::{
    FireDecision, UpdateScheduler, DEFAULT_MAX_NORMAL_UPDATE_INTERVAL, DEFAULT_UPDATE_DELAY,
};
pub use transport::{TransportError, VDomTransport};

pub mod prelude {
    pub use crate::applier::{Applier, ClientElem, DomBridge, NoopBridge};
    pub use crate::model::{VDomModel, VDomModelConfig, VDomModelHandle};
    pub use crate::transport::{TransportError, VDomTransport};
    pub use wavedom_core::prelude::*;
}
