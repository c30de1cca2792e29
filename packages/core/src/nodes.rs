//! The element model: immutable descriptions of desired tree nodes.
//!
//! Elements are produced fresh on every render and discarded after commit;
//! the live instances that survive across renders are [`ComponentImpl`]s.
//!
//! [`ComponentImpl`]: crate::component::ComponentImpl

use crate::innerlude::*;
use indexmap::IndexMap;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::rc::Rc;

/// Text leaf tag.
pub const TEXT_TAG: &str = "#text";

/// Transparent container tag.
pub const FRAGMENT_TAG: &str = "#fragment";

/// Text-bearing base element whose `text` prop may be an atom binding.
pub const WAVE_TEXT_TAG: &str = "wave:text";

/// Prop holding the stable sibling key.
pub const KEY_PROP: &str = "key";

/// Prop holding a ref descriptor.
pub const REF_PROP: &str = "ref";

/// Stable identifier bridging backend components and frontend mirror nodes.
pub type WaveId = String;

/// An event callback stored in props. Handlers run on the render task and may
/// mutate atoms through the root they are handed.
pub type HandlerFn = Rc<dyn Fn(&mut VDomRoot, &VDomEvent)>;

/// A single prop value.
///
/// Anything that is not a plain JSON value is replaced by a marker descriptor
/// when the element is dehydrated for transfer.
#[derive(Clone)]
pub enum PropValue {
    /// Plain JSON, passed through untouched.
    Value(Value),
    /// Server-side callback; serializes as `{"type":"func"}`.
    Func(HandlerFn),
    /// Atom binding; serializes as `{"type":"binding","bind":"<atom>"}` and is
    /// resolved on the frontend by substituting the current atom value.
    Bind(String),
    /// Ref descriptor pairing this element with a backend ref handle.
    Ref(VDomRef),
    /// Nested element reference.
    Elem(Box<VDomElem>),
}

impl PropValue {
    /// The plain JSON value, if this prop is one.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            PropValue::Value(v) => Some(v),
            _ => None,
        }
    }

    /// The callback, if this prop is one.
    pub fn as_func(&self) -> Option<&HandlerFn> {
        match self {
            PropValue::Func(f) => Some(f),
            _ => None,
        }
    }
}

impl fmt::Debug for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Func(_) => f.debug_tuple("Func").finish(),
            Self::Bind(b) => f.debug_tuple("Bind").field(b).finish(),
            Self::Ref(r) => f.debug_tuple("Ref").field(&r.refid).finish(),
            Self::Elem(e) => f.debug_tuple("Elem").field(e).finish(),
        }
    }
}

impl PartialEq for PropValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Value(l), Self::Value(r)) => l == r,
            (Self::Bind(l), Self::Bind(r)) => l == r,
            (Self::Ref(l), Self::Ref(r)) => l.refid == r.refid,
            (Self::Elem(l), Self::Elem(r)) => l == r,
            // callbacks are opaque; two handlers on the same prop compare equal
            (Self::Func(_), Self::Func(_)) => true,
            _ => false,
        }
    }
}

impl Serialize for PropValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PropValue::Value(v) => v.serialize(serializer),
            PropValue::Func(_) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("type", FUNC_TYPE)?;
                map.end()
            }
            PropValue::Bind(atom) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", BINDING_TYPE)?;
                map.serialize_entry("bind", atom)?;
                map.end()
            }
            PropValue::Ref(r) => r.serialize(serializer),
            PropValue::Elem(e) => e.serialize(serializer),
        }
    }
}

impl From<Value> for PropValue {
    fn from(v: Value) -> Self {
        PropValue::Value(v)
    }
}

/// Name→value prop mapping with stable iteration (and serialization) order.
pub type PropMap = IndexMap<String, PropValue>;

/// A value describing one desired node in the tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VDomElem {
    /// Assigned on commit; empty while the element is only a description.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub waveid: String,
    pub tag: String,
    #[serde(skip_serializing_if = "PropMap::is_empty")]
    pub props: PropMap,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<VDomElem>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub text: String,
}

impl VDomElem {
    /// An element with the given tag and nothing else.
    pub fn new(tag: impl Into<String>) -> Self {
        VDomElem {
            tag: tag.into(),
            ..Default::default()
        }
    }

    /// A `#text` leaf.
    pub fn text(text: impl Into<String>) -> Self {
        VDomElem {
            tag: TEXT_TAG.to_string(),
            text: text.into(),
            ..Default::default()
        }
    }

    /// A `#fragment` wrapping the given children.
    pub fn fragment(children: impl IntoIterator<Item = VDomElem>) -> Self {
        VDomElem::new(FRAGMENT_TAG).children(children)
    }

    /// Set the sibling key used for identity matching under one parent.
    pub fn key(self, key: impl Into<String>) -> Self {
        self.prop(KEY_PROP, Value::String(key.into()))
    }

    /// Set a plain JSON prop.
    pub fn prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(name.into(), PropValue::Value(value.into()));
        self
    }

    /// Bind a prop to an atom, resolved on the frontend.
    pub fn bind(mut self, name: impl Into<String>, atom: impl Into<String>) -> Self {
        self.props.insert(name.into(), PropValue::Bind(atom.into()));
        self
    }

    /// Attach an event callback under an `on*` prop.
    pub fn handler(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&mut VDomRoot, &VDomEvent) + 'static,
    ) -> Self {
        self.props.insert(name.into(), PropValue::Func(Rc::new(f)));
        self
    }

    /// Attach a ref descriptor under the `ref` prop.
    pub fn vref(mut self, r: &VDomRef) -> Self {
        self.props
            .insert(REF_PROP.to_string(), PropValue::Ref(r.clone()));
        self
    }

    /// Store a nested element reference in a prop.
    pub fn elem_prop(mut self, name: impl Into<String>, elem: VDomElem) -> Self {
        self.props
            .insert(name.into(), PropValue::Elem(Box::new(elem)));
        self
    }

    /// Append one child.
    pub fn child(mut self, child: VDomElem) -> Self {
        self.children.push(child);
        self
    }

    /// Append many children.
    pub fn children(mut self, children: impl IntoIterator<Item = VDomElem>) -> Self {
        self.children.extend(children);
        self
    }

    /// The explicit sibling key, when one was set.
    pub fn elem_key(&self) -> Option<&str> {
        match self.props.get(KEY_PROP) {
            Some(PropValue::Value(Value::String(s))) => Some(s.as_str()),
            _ => None,
        }
    }

    /// True for elements that describe nothing (unmount markers).
    pub fn is_empty_tag(&self) -> bool {
        self.tag.is_empty()
    }

    /// Serialize props for transfer, with functions replaced by markers.
    pub(crate) fn transfer_props(&self) -> Option<serde_json::Map<String, Value>> {
        if self.props.is_empty() {
            return None;
        }
        let mut out = serde_json::Map::new();
        for (name, value) in &self.props {
            // serialization of PropValue is infallible for JSON targets
            let v = serde_json::to_value(value).unwrap_or(Value::Null);
            out.insert(name.clone(), v);
        }
        Some(out)
    }
}

/// Convenience constructor mirroring the JSX-ish shape of backend UIs.
pub fn h(tag: impl Into<String>) -> VDomElem {
    VDomElem::new(tag)
}

/// How the reconciler dispatches on a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagClass {
    /// `#text` leaf: only `text`, no children.
    Text,
    /// Passthrough element materialized by the frontend.
    Base,
    /// Tag with a registered render function.
    Component,
    /// Capitalized tag with no registered function; renders as `"<TAG>"`.
    Unknown,
}

/// Classify a tag given whether the root's registry resolves it.
///
/// The registry wins: a registered tag is a component no matter its spelling.
/// Otherwise `#`-prefixed, namespaced (`wave:text`) and lowercase-initial tags
/// flow through to the frontend as base elements.
pub(crate) fn tag_class(tag: &str, registered: bool) -> TagClass {
    if tag == TEXT_TAG {
        return TagClass::Text;
    }
    if registered {
        return TagClass::Component;
    }
    let first = match tag.chars().next() {
        Some(c) => c,
        None => return TagClass::Unknown,
    };
    if first == '#' || tag.contains(':') || !first.is_uppercase() {
        TagClass::Base
    } else {
        TagClass::Unknown
    }
}

/// Props handed to a component render function: the element's own props plus
/// the `children` pseudo-prop.
#[derive(Debug, Clone, Default)]
pub struct VDomProps {
    pub props: PropMap,
    pub children: Vec<VDomElem>,
}

impl VDomProps {
    /// Fetch a raw prop value.
    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.props.get(name)
    }

    /// Fetch a plain JSON prop.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.props.get(name).and_then(PropValue::as_value)
    }

    /// Fetch a string prop.
    pub fn str(&self, name: &str) -> Option<&str> {
        self.value(name).and_then(Value::as_str)
    }
}

/// Typed event payload constructors for the conventional event kinds.
pub mod event_data {
    use super::*;

    /// `onClick` payload.
    pub fn click() -> Value {
        json!({ "type": "click" })
    }

    /// `onKeyDown` payload.
    pub fn keydown(key: &str, code: &str, modifiers: &[&str]) -> Value {
        json!({ "type": "keydown", "key": key, "code": code, "modifiers": modifiers })
    }

    /// `onFocus` payload.
    pub fn focus() -> Value {
        json!({ "type": "focus" })
    }

    /// `onBlur` payload.
    pub fn blur() -> Value {
        json!({ "type": "blur" })
    }

    /// Payload for event kinds without a typed mapping.
    pub fn unknown() -> Value {
        json!({ "type": "unknown" })
    }
}
