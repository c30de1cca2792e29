//! Wire types exchanged between a backend [`VDomRoot`] and its frontend mirror.
//!
//! Every update in either direction is a single JSON document. Field names are
//! all-lowercase single words so the payloads stay friendly to non-Rust peers
//! on the other side of the transport.
//!
//! [`VDomRoot`]: crate::VDomRoot

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `type` discriminator carried by every frontend update.
pub const FRONTEND_UPDATE_TYPE: &str = "frontendupdate";

/// `type` discriminator carried by every backend reply.
pub const BACKEND_UPDATE_TYPE: &str = "backendupdate";

/// `type` discriminator for the fire-and-forget backend wakeup notice.
pub const ASYNC_INITIATION_TYPE: &str = "vdomasyncinitiation";

/// Marker value identifying a server-side callback in serialized props.
pub const FUNC_TYPE: &str = "func";

/// Marker value identifying an atom binding in serialized props.
pub const BINDING_TYPE: &str = "binding";

/// Marker value identifying a ref descriptor in serialized props.
pub const REF_TYPE: &str = "ref";

fn is_false(v: &bool) -> bool {
    !*v
}

/// The frontend's per-cycle request: context, batched events, and ref
/// measurements, plus the `resync`/`dispose` control flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VDomFrontendUpdate {
    #[serde(rename = "type")]
    pub update_type: String,
    pub ts: i64,
    pub blockid: String,
    #[serde(default)]
    pub rendercontext: VDomRenderContext,
    #[serde(default, skip_serializing_if = "is_false")]
    pub dispose: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub resync: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<VDomEvent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refupdates: Vec<VDomRefUpdate>,
}

/// The RPC command envelope is the frontend update itself.
pub type VDomRenderCommand = VDomFrontendUpdate;

/// Display-surface information the backend can consult while rendering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VDomRenderContext {
    #[serde(default)]
    pub blockid: String,
    #[serde(default)]
    pub focused: bool,
    #[serde(default)]
    pub width: i32,
    #[serde(default)]
    pub height: i32,
    #[serde(default)]
    pub rootrefid: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub background: bool,
}

/// A single user event captured on the frontend.
///
/// `waveid` is `None` for global events; `eventtype` is the prop name the
/// callback was registered under (`onClick`, `onKeyDown`, ...), or the
/// backend-declared global event name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VDomEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waveid: Option<String>,
    pub eventtype: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub eventdata: Value,
}

/// Frontend-reported state of one ref: mounted-ness plus an optional
/// position snapshot when the ref tracks position.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VDomRefUpdate {
    pub refid: String,
    #[serde(default)]
    pub hascurrent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<VDomRefPosition>,
}

/// DOM measurements for a position-tracking ref.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VDomRefPosition {
    #[serde(default)]
    pub offsetheight: i32,
    #[serde(default)]
    pub offsetwidth: i32,
    #[serde(default)]
    pub scrollheight: i32,
    #[serde(default)]
    pub scrollwidth: i32,
    #[serde(default)]
    pub scrolltop: i32,
    #[serde(default)]
    pub boundingclientrect: DomRect,
}

/// A `getBoundingClientRect`-shaped rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DomRect {
    #[serde(default)]
    pub top: f64,
    #[serde(default)]
    pub left: f64,
    #[serde(default)]
    pub right: f64,
    #[serde(default)]
    pub bottom: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
}

/// A ref handle minted on the backend and mirrored by the frontend.
///
/// `hascurrent` and `position` are frontend-written: the backend sees them
/// again through [`VDomRefUpdate`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VDomRef {
    #[serde(rename = "type")]
    pub reftype: String,
    pub refid: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub trackposition: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub hascurrent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<VDomRefPosition>,
}

impl VDomRef {
    /// Mint a fresh ref with a new uuid id.
    pub fn new(trackposition: bool) -> Self {
        VDomRef {
            reftype: REF_TYPE.to_string(),
            refid: format!("ref-{}", uuid::Uuid::new_v4()),
            trackposition,
            hascurrent: false,
            position: None,
        }
    }
}

/// The backend's per-cycle reply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VDomBackendUpdate {
    #[serde(rename = "type")]
    pub update_type: String,
    pub ts: i64,
    pub blockid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opts: Option<VDomBackendOpts>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub renderupdates: Vec<VDomRenderUpdate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statesync: Vec<VDomStateSync>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refoperations: Vec<VDomRefOperation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<VDomMessage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transferelems: Vec<VDomTransferElem>,
}

/// Host-behavior switches the backend can set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VDomBackendOpts {
    #[serde(default, skip_serializing_if = "is_false")]
    pub closeonctrlc: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub globalkeyboardevents: bool,
}

/// Discrete tree mutation applied by the frontend in array order.
///
/// `updatetype` is one of `root`, `append`, `replace`, `insert`, `remove`.
/// Unknown types, unknown parent ids, and out-of-range indices are skipped
/// with a non-fatal message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VDomRenderUpdate {
    pub updatetype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waveid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vdom: Option<VDomTransferElem>,
}

/// One flattened, deduplicated node of the committed tree.
///
/// Children are referenced by id (`WaveId` or a synthetic `text-N` id);
/// function props are replaced by a `{"type":"func"}` marker before
/// transmission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VDomTransferElem {
    pub waveid: String,
    pub tag: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<serde_json::Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
}

impl VDomTransferElem {
    /// A bare reference to a node transmitted (or cached) elsewhere.
    pub fn reference(waveid: impl Into<String>) -> Self {
        VDomTransferElem {
            waveid: waveid.into(),
            ..Default::default()
        }
    }
}

/// Backend-authoritative value for one atom.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VDomStateSync {
    pub atom: String,
    pub value: Value,
}

/// Imperative operation on a mounted element, addressed by ref id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VDomRefOperation {
    pub refid: String,
    pub op: String,
}

/// Diagnostic emitted by the backend; never fatal on its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VDomMessage {
    pub messagetype: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<String>,
}

impl VDomMessage {
    /// Build an `error` message.
    pub fn error(message: impl Into<String>) -> Self {
        VDomMessage {
            messagetype: "error".to_string(),
            message: message.into(),
            stacktrace: None,
        }
    }

    /// Build a `warning` message.
    pub fn warning(message: impl Into<String>) -> Self {
        VDomMessage {
            messagetype: "warning".to_string(),
            message: message.into(),
            stacktrace: None,
        }
    }

    /// Attach a stack trace to the message.
    pub fn with_stacktrace(mut self, stacktrace: impl Into<String>) -> Self {
        self.stacktrace = Some(stacktrace.into());
        self
    }
}

/// Fire-and-forget notice that the backend has work for the frontend.
///
/// Delivery is a transport concern; receipt queues a quick update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VDomAsyncInitiationRequest {
    #[serde(rename = "type")]
    pub request_type: String,
    pub ts: i64,
    #[serde(default)]
    pub blockid: String,
}

impl VDomAsyncInitiationRequest {
    /// Build a notice stamped with the given timestamp and block id.
    pub fn new(ts: i64, blockid: impl Into<String>) -> Self {
        VDomAsyncInitiationRequest {
            request_type: ASYNC_INITIATION_TYPE.to_string(),
            ts,
            blockid: blockid.into(),
        }
    }
}
