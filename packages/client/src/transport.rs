//! The RPC seam between the frontend mirror and its backend peer.
//!
//! Transport itself lives outside this crate: the host supplies something
//! that can carry request/response blobs to the backend route. Futures are
//! not required to be `Send`; the model runs single-threaded.

use async_trait::async_trait;
use std::time::Duration;
use wavedom_core::{VDomBackendUpdate, VDomFrontendUpdate};

/// Faults surfaced by the transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request could not be carried or the peer failed it.
    #[error("rpc failure: {0}")]
    Rpc(String),

    /// The backend route did not answer within the in-protocol timeout.
    #[error("route wait timed out")]
    RouteTimeout,

    /// The backend route is gone.
    #[error("route gone")]
    RouteGone,
}

/// Carrier of frontend updates and route confirmation.
#[async_trait(?Send)]
pub trait VDomTransport {
    /// Send one frontend update and wait for the backend reply.
    async fn render_update(
        &self,
        cmd: VDomFrontendUpdate,
    ) -> Result<VDomBackendUpdate, TransportError>;

    /// Resolve whether the backend route is reachable, waiting up to `within`
    /// inside the protocol before reporting [`TransportError::RouteTimeout`].
    async fn wait_for_route(&self, route: &str, within: Duration) -> Result<(), TransportError>;
}
