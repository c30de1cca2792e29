//! # Wavedom Core
//!
//! The backend half of a server-driven virtual DOM: a process renders an
//! element tree into a live component tree, and each cycle produces a
//! reconciled patch (render updates + deduplicated transfer nodes + state
//! sync) that a remote frontend materializes into real DOM nodes.
//!
//! ## Guide
//!
//! Components are plain functions registered under a tag name. They receive a
//! [`Scope`] for hooks and a [`VDomProps`] with their props and children:
//!
//! ```rust
//! use serde_json::json;
//! use wavedom_core::prelude::*;
//!
//! let mut root = VDomRoot::new("block-1");
//! root.register_component("counter", |scope, _props| {
//!     let n = scope.use_atom("n");
//!     Some(
//!         VDomElem::new("div")
//!             .handler("onClick", |root, _event| {
//!                 let n = root.get_atom_val("n").as_i64().unwrap_or(0);
//!                 root.set_atom_val("n", json!(n + 1), true);
//!             })
//!             .child(VDomElem::text(n.as_i64().unwrap_or(0).to_string())),
//!     )
//! });
//! root.set_root_elem(VDomElem::new("counter"));
//! ```
//!
//! Driving the root is one call per frontend update:
//!
//! ```rust,ignore
//! let reply = root.render_update(frontend_update);
//! transport.send(reply);
//! ```
//!
//! The reply carries everything the frontend applier needs: sparse render
//! updates, changed transfer nodes, dirty atom values, ref operations, and
//! diagnostics. Rendering the same tree twice in a row produces an empty
//! patch; the transfer cache and dirty bits collapse it.

pub(crate) mod atoms;
pub(crate) mod component;
pub(crate) mod diff;
pub(crate) mod error;
pub(crate) mod events;
pub(crate) mod nodes;
pub(crate) mod protocol;
pub(crate) mod scope;
pub(crate) mod transfer;
pub(crate) mod virtual_dom;

pub(crate) mod innerlude {
    pub(crate) use crate::atoms::*;
    pub(crate) use crate::component::*;
    pub(crate) use crate::error::*;
    pub(crate) use crate::nodes::*;
    pub(crate) use crate::protocol::*;
    pub(crate) use crate::scope::*;
    pub(crate) use crate::virtual_dom::*;
}

pub use crate::atoms::AtomStore;
pub use crate::component::{CleanupFn, ComponentImpl, EffectFn, EffectHook, HookKind};
pub use crate::error::VDomError;
pub use crate::nodes::{
    event_data, h, HandlerFn, PropMap, PropValue, TagClass, VDomElem, VDomProps, WaveId,
    FRAGMENT_TAG, KEY_PROP, REF_PROP, TEXT_TAG, WAVE_TEXT_TAG,
};
pub use crate::protocol::{
    DomRect, VDomAsyncInitiationRequest, VDomBackendOpts, VDomBackendUpdate, VDomEvent,
    VDomFrontendUpdate, VDomMessage, VDomRef, VDomRefOperation, VDomRefPosition, VDomRefUpdate,
    VDomRenderCommand, VDomRenderContext, VDomRenderUpdate, VDomStateSync, VDomTransferElem,
    ASYNC_INITIATION_TYPE, BACKEND_UPDATE_TYPE, BINDING_TYPE, FRONTEND_UPDATE_TYPE, FUNC_TYPE,
    REF_TYPE,
};
pub use crate::scope::{Scope, StateRef};
pub use crate::virtual_dom::{now_ts, ComponentFn, VDomRoot};

pub mod prelude {
    pub use crate::nodes::{event_data, h, PropValue, VDomElem, VDomProps, WaveId};
    pub use crate::protocol::{
        VDomBackendOpts, VDomBackendUpdate, VDomEvent, VDomFrontendUpdate, VDomMessage, VDomRef,
        VDomRenderContext,
    };
    pub use crate::scope::{Scope, StateRef};
    pub use crate::virtual_dom::{ComponentFn, VDomRoot};
}
