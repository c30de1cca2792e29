//! Live component instances: the tree the reconciler keeps across renders.
//!
//! Components own their hook slots and their children by `WaveId`; the map in
//! the root owns every component, so parent→child edges are id lists and
//! child→parent is a map lookup, never an owning back-pointer.

use crate::innerlude::*;
use serde_json::Value;

/// Closure run after commit when an effect's dependencies changed. Returns an
/// optional cleanup to run before the next mount or on unmount.
pub type EffectFn = Box<dyn FnOnce(&mut VDomRoot) -> Option<CleanupFn>>;

/// Cleanup closure recorded by an effect mount.
pub type CleanupFn = Box<dyn FnOnce(&mut VDomRoot)>;

/// One ordered hook slot, indexed by call order within the render function.
pub enum HookKind {
    /// A state cell holding a JSON value.
    State(Value),
    /// An effect record with mount function and optional recorded cleanup.
    Effect(EffectHook),
    /// An atom binding (the atom name read through this slot).
    Atom(String),
    /// A ref handle minted for this component.
    Ref(VDomRef),
}

impl HookKind {
    /// Short name used in hook-mismatch diagnostics.
    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            HookKind::State(_) => "state",
            HookKind::Effect(_) => "effect",
            HookKind::Atom(_) => "atom",
            HookKind::Ref(_) => "ref",
        }
    }
}

/// Effect slot state.
pub struct EffectHook {
    /// Dependency list from the last render; `None` means run on every render.
    pub deps: Option<Vec<Value>>,
    /// Mount closure staged for the next work pass.
    pub mount: Option<EffectFn>,
    /// Cleanup recorded by the previous mount, if any.
    pub cleanup: Option<CleanupFn>,
}

impl std::fmt::Debug for HookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookKind::State(v) => f.debug_tuple("State").field(v).finish(),
            HookKind::Effect(e) => f
                .debug_struct("Effect")
                .field("deps", &e.deps)
                .field("has_cleanup", &e.cleanup.is_some())
                .finish(),
            HookKind::Atom(name) => f.debug_tuple("Atom").field(name).finish(),
            HookKind::Ref(r) => f.debug_tuple("Ref").field(&r.refid).finish(),
        }
    }
}

/// A live instance of an element, preserved across renders while its identity
/// `(parent slot, tag, key-or-index)` keeps matching.
pub struct ComponentImpl {
    pub waveid: WaveId,
    pub tag: String,
    /// Explicit sibling key, or empty when the component is index-keyed.
    pub key: String,
    /// The last committed element for this component.
    pub elem: Option<VDomElem>,
    /// Ordered hook slots.
    pub hooks: Vec<HookKind>,
    /// Single rendered subtree, for component tags.
    pub comp: Option<WaveId>,
    /// Ordered child components, for base tags.
    pub children: Option<Vec<WaveId>>,
    /// Committed text, for `#text`.
    pub text: String,
    /// Cycle counter stamped at creation; child-list edits are only recorded
    /// for components that already existed in the previous cycle.
    pub(crate) created_cycle: u64,
}

impl ComponentImpl {
    pub(crate) fn new(waveid: WaveId, tag: String, key: String, created_cycle: u64) -> Self {
        ComponentImpl {
            waveid,
            tag,
            key,
            elem: None,
            hooks: Vec::new(),
            comp: None,
            children: None,
            text: String::new(),
            created_cycle,
        }
    }

    /// The prop value registered on the committed element, if any.
    pub fn committed_prop(&self, name: &str) -> Option<&PropValue> {
        self.elem.as_ref().and_then(|e| e.props.get(name))
    }
}

impl std::fmt::Debug for ComponentImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentImpl")
            .field("waveid", &self.waveid)
            .field("tag", &self.tag)
            .field("key", &self.key)
            .field("hooks", &self.hooks.len())
            .field("comp", &self.comp)
            .field("children", &self.children)
            .finish()
    }
}
