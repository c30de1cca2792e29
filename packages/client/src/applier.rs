//! The frontend applier: a live mirror of the backend's committed tree.
//!
//! Incoming backend updates mutate the mirror through sparse render-updates
//! (root / append / replace / insert / remove), hydrated from the payload's
//! transfer elems. Nodes removed mid-apply land in a detached pool so a
//! reorder's insert can reuse them; per-node version counters drive the
//! rendering layer's cache invalidation.
//!
//! Protocol faults (unknown update types, unknown parents, out-of-range
//! indices) are logged and skipped; a single bad update never disposes the
//! model.

use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use wavedom_core::{
    VDomBackendOpts, VDomBackendUpdate, VDomRefPosition, VDomRefUpdate, VDomTransferElem,
    BINDING_TYPE, REF_TYPE, TEXT_TAG,
};

/// One node of the mirror tree.
#[derive(Debug, Clone, Default)]
pub struct ClientElem {
    pub waveid: String,
    pub tag: String,
    pub text: String,
    pub props: serde_json::Map<String, Value>,
    pub children: Vec<ClientElem>,
    /// Bumped whenever this node (or its child list) is mutated; rendering
    /// layers key their caches on `(waveid, version)`.
    pub version: u64,
}

/// Seam to the real rendering surface: imperative ref operations and
/// position measurements. `focus(None)` targets the synthetic root ref.
pub trait DomBridge {
    fn focus(&mut self, elem: Option<&ClientElem>);

    fn measure(&mut self, elem: &ClientElem) -> Option<VDomRefPosition> {
        let _ = elem;
        None
    }
}

/// Bridge that ignores every operation; useful headless and in tests.
#[derive(Debug, Default)]
pub struct NoopBridge;

impl DomBridge for NoopBridge {
    fn focus(&mut self, _elem: Option<&ClientElem>) {}
}

#[derive(Debug)]
struct RefEntry {
    waveid: String,
    trackposition: bool,
    hascurrent: bool,
    updated: bool,
}

/// Mirror state for one block: the element tree, the local atom store, and
/// the ref table.
pub struct Applier {
    blockid: String,
    rootrefid: String,
    root: Option<ClientElem>,
    versions: FxHashMap<String, u64>,
    /// `text-N` id → content, learned from every text transfer elem seen.
    text_registry: FxHashMap<String, String>,
    atoms: FxHashMap<String, Value>,
    atom_used_by: FxHashMap<String, FxHashSet<String>>,
    refs: FxHashMap<String, RefEntry>,
    opts: VDomBackendOpts,
}

struct ApplyCtx<'a> {
    te_map: FxHashMap<&'a str, &'a VDomTransferElem>,
    detached: FxHashMap<String, ClientElem>,
    consumed: FxHashSet<String>,
}

impl Applier {
    pub fn new(blockid: impl Into<String>, rootrefid: impl Into<String>) -> Self {
        Applier {
            blockid: blockid.into(),
            rootrefid: rootrefid.into(),
            root: None,
            versions: FxHashMap::default(),
            text_registry: FxHashMap::default(),
            atoms: FxHashMap::default(),
            atom_used_by: FxHashMap::default(),
            refs: FxHashMap::default(),
            opts: VDomBackendOpts::default(),
        }
    }

    /// The mirror tree root.
    pub fn root(&self) -> Option<&ClientElem> {
        self.root.as_ref()
    }

    /// Current backend opts.
    pub fn opts(&self) -> &VDomBackendOpts {
        &self.opts
    }

    /// Backend-authoritative atom value, as last synced.
    pub fn atom_val(&self, name: &str) -> Value {
        self.atoms.get(name).cloned().unwrap_or(Value::Null)
    }

    /// Current version counter for a mounted node.
    pub fn version(&self, waveid: &str) -> Option<u64> {
        find_elem(&self.root, waveid).map(|el| el.version)
    }

    /// Look up a mounted node by id.
    pub fn elem(&self, waveid: &str) -> Option<&ClientElem> {
        find_elem(&self.root, waveid)
    }

    /// Whether a global keydown should be forwarded to the backend under the
    /// current opts. Cmd/Meta chords stay with the host.
    pub fn wants_global_keydown(&self, modifiers: &[&str]) -> bool {
        self.opts.globalkeyboardevents
            && !modifiers
                .iter()
                .any(|m| m.eq_ignore_ascii_case("meta") || m.eq_ignore_ascii_case("cmd"))
    }

    /// Read a prop with binding descriptors substituted by the current atom
    /// value.
    pub fn resolved_prop(&self, elem: &ClientElem, name: &str) -> Option<Value> {
        let raw = elem.props.get(name)?;
        Some(self.resolve_value(raw))
    }

    fn resolve_value(&self, raw: &Value) -> Value {
        if let Some(bind) = binding_target(raw) {
            return self.atom_val(bind);
        }
        raw.clone()
    }

    /// Apply one backend update: store opts, mutate the tree in array order,
    /// sync atoms (bumping consumers), run ref operations, and surface
    /// messages into the host log.
    pub fn apply(&mut self, update: &VDomBackendUpdate, bridge: &mut dyn DomBridge) {
        if let Some(opts) = &update.opts {
            self.opts = opts.clone();
        }

        let mut ctx = ApplyCtx {
            te_map: update
                .transferelems
                .iter()
                .map(|te| (te.waveid.as_str(), te))
                .collect(),
            detached: FxHashMap::default(),
            consumed: FxHashSet::default(),
        };
        for te in &update.transferelems {
            if te.tag == TEXT_TAG {
                self.text_registry
                    .insert(te.waveid.clone(), te.text.clone());
            }
        }

        let mut root = self.root.take();
        for ru in &update.renderupdates {
            if let Err(err) = self.apply_render_update(&mut root, ru, &mut ctx) {
                tracing::warn!(blockid = %self.blockid, "skipping render update: {err}");
            }
        }

        // nodes re-sent only because their content changed update in place
        for te in &update.transferelems {
            if te.tag == TEXT_TAG || ctx.consumed.contains(te.waveid.as_str()) {
                continue;
            }
            if let Some(node) = find_elem_mut(&mut root, &te.waveid) {
                node.text = te.text.clone();
                node.props = te.props.clone().unwrap_or_default();
                node.version += 1;
                let version = node.version;
                self.versions.insert(te.waveid.clone(), version);
                self.unrecord_usage(&te.waveid);
                self.record_usage(&te.waveid, te.props.as_ref());
            }
        }
        self.root = root;

        for ss in &update.statesync {
            self.atoms.insert(ss.atom.clone(), ss.value.clone());
            let consumers: Vec<String> = self
                .atom_used_by
                .get(&ss.atom)
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default();
            for waveid in consumers {
                match find_elem_mut(&mut self.root, &waveid) {
                    Some(node) => {
                        node.version += 1;
                        self.versions.insert(waveid, node.version);
                    }
                    None => {
                        if let Some(set) = self.atom_used_by.get_mut(&ss.atom) {
                            set.remove(&waveid);
                        }
                    }
                }
            }
        }

        for op in &update.refoperations {
            self.apply_ref_op(op.refid.as_str(), op.op.as_str(), bridge);
        }

        for msg in &update.messages {
            match msg.messagetype.as_str() {
                "error" => tracing::error!(
                    blockid = %self.blockid,
                    stacktrace = msg.stacktrace.as_deref().unwrap_or(""),
                    "backend: {}",
                    msg.message
                ),
                _ => tracing::warn!(blockid = %self.blockid, "backend: {}", msg.message),
            }
        }

        let mut mounted = FxHashSet::default();
        collect_ids(&self.root, &mut mounted);
        self.refresh_refs(&mounted);
        self.versions.retain(|id, _| mounted.contains(id));
    }

    fn apply_render_update(
        &mut self,
        root: &mut Option<ClientElem>,
        ru: &wavedom_core::VDomRenderUpdate,
        ctx: &mut ApplyCtx<'_>,
    ) -> Result<(), String> {
        match ru.updatetype.as_str() {
            "root" => {
                if let Some(old) = root.take() {
                    ctx.detached.insert(old.waveid.clone(), old);
                }
                *root = match &ru.vdom {
                    Some(stub) => Some(
                        self.materialize(ctx, &stub.waveid, Some(stub))
                            .ok_or_else(|| format!("unknown root node {}", stub.waveid))?,
                    ),
                    None => None,
                };
                Ok(())
            }
            "append" => {
                let stub = ru.vdom.as_ref().ok_or("append without vdom")?;
                let child = self
                    .materialize(ctx, &stub.waveid, Some(stub))
                    .ok_or_else(|| format!("unknown node {}", stub.waveid))?;
                let parent = target_elem(root, ru)?;
                parent.children.push(child);
                parent.version += 1;
                Ok(())
            }
            "insert" => {
                let index = ru.index.ok_or("insert without index")?;
                let stub = ru.vdom.as_ref().ok_or("insert without vdom")?;
                let child = self
                    .materialize(ctx, &stub.waveid, Some(stub))
                    .ok_or_else(|| format!("unknown node {}", stub.waveid))?;
                let parent = target_elem(root, ru)?;
                if index > parent.children.len() {
                    return Err(format!("insert index {index} out of range"));
                }
                parent.children.insert(index, child);
                parent.version += 1;
                Ok(())
            }
            "replace" => {
                let index = ru.index.ok_or("replace without index")?;
                let stub = ru.vdom.as_ref().ok_or("replace without vdom")?;
                let child = self
                    .materialize(ctx, &stub.waveid, Some(stub))
                    .ok_or_else(|| format!("unknown node {}", stub.waveid))?;
                let parent = target_elem(root, ru)?;
                if index >= parent.children.len() {
                    return Err(format!("replace index {index} out of range"));
                }
                let old = std::mem::replace(&mut parent.children[index], child);
                parent.version += 1;
                ctx.detached.insert(old.waveid.clone(), old);
                Ok(())
            }
            "remove" => {
                let index = ru.index.ok_or("remove without index")?;
                let parent = target_elem(root, ru)?;
                if index >= parent.children.len() {
                    return Err(format!("remove index {index} out of range"));
                }
                let old = parent.children.remove(index);
                parent.version += 1;
                ctx.detached.insert(old.waveid.clone(), old);
                Ok(())
            }
            other => Err(format!("unknown update type {other:?}")),
        }
    }

    /// Re-derive mounted-ness for every ref after a tree mutation.
    fn refresh_refs(&mut self, mounted: &FxHashSet<String>) {
        for entry in self.refs.values_mut() {
            let now_mounted = mounted.contains(&entry.waveid);
            if now_mounted != entry.hascurrent {
                entry.hascurrent = now_mounted;
                entry.updated = true;
            }
        }
        // a ref whose unmount has already been reported is gone for good
        self.refs.retain(|_, e| e.hascurrent || e.updated);
    }

    /// Build (or recover) the node for `id`: fresh from the payload if it was
    /// transmitted, from the detached pool if it was unhooked earlier in this
    /// apply, from the text registry for text ids, or shallow from an inline
    /// stub as a last resort.
    fn materialize(
        &mut self,
        ctx: &mut ApplyCtx<'_>,
        id: &str,
        inline: Option<&VDomTransferElem>,
    ) -> Option<ClientElem> {
        if let Some(te) = ctx.te_map.get(id).copied() {
            // the same id may be needed twice (shared text); build a copy
            // each time it is referenced
            ctx.consumed.insert(id.to_string());
            return Some(self.build_node(ctx, te));
        }
        if let Some(node) = ctx.detached.remove(id) {
            return Some(node);
        }
        if let Some(text) = self.text_registry.get(id) {
            return Some(ClientElem {
                waveid: id.to_string(),
                tag: TEXT_TAG.to_string(),
                text: text.clone(),
                ..Default::default()
            });
        }
        if let Some(stub) = inline {
            if !stub.tag.is_empty() {
                let mut node = ClientElem {
                    waveid: stub.waveid.clone(),
                    tag: stub.tag.clone(),
                    text: stub.text.clone(),
                    props: stub.props.clone().unwrap_or_default(),
                    children: Vec::new(),
                    version: 0,
                };
                node.version = self.bump_version(&node.waveid);
                return Some(node);
            }
        }
        None
    }

    fn build_node(&mut self, ctx: &mut ApplyCtx<'_>, te: &VDomTransferElem) -> ClientElem {
        let mut children = Vec::with_capacity(te.children.len());
        for cid in &te.children {
            match self.materialize(ctx, cid, None) {
                Some(child) => children.push(child),
                None => {
                    tracing::warn!(blockid = %self.blockid, "missing child node {cid}");
                }
            }
        }
        self.record_usage(&te.waveid, te.props.as_ref());
        ClientElem {
            waveid: te.waveid.clone(),
            tag: te.tag.clone(),
            text: te.text.clone(),
            props: te.props.clone().unwrap_or_default(),
            children,
            version: self.bump_version(&te.waveid),
        }
    }

    fn bump_version(&mut self, waveid: &str) -> u64 {
        let v = self.versions.entry(waveid.to_string()).or_insert(0);
        *v += 1;
        *v
    }

    /// Record atom bindings and ref descriptors found in a node's props.
    fn record_usage(&mut self, waveid: &str, props: Option<&serde_json::Map<String, Value>>) {
        let props = match props {
            Some(p) => p,
            None => return,
        };
        for value in props.values() {
            if let Some(bind) = binding_target(value) {
                self.atom_used_by
                    .entry(bind.to_string())
                    .or_default()
                    .insert(waveid.to_string());
            }
            if let Some(refid) = ref_target(value) {
                let trackposition = value
                    .get("trackposition")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let entry = self.refs.entry(refid.to_string()).or_insert(RefEntry {
                    waveid: waveid.to_string(),
                    trackposition,
                    hascurrent: false,
                    updated: true,
                });
                entry.waveid = waveid.to_string();
                entry.trackposition = trackposition;
            }
        }
    }

    fn unrecord_usage(&mut self, waveid: &str) {
        for set in self.atom_used_by.values_mut() {
            set.remove(waveid);
        }
    }

    fn apply_ref_op(&mut self, refid: &str, op: &str, bridge: &mut dyn DomBridge) {
        match op {
            "focus" => {
                if refid == self.rootrefid {
                    bridge.focus(None);
                    return;
                }
                let waveid = match self.refs.get(refid) {
                    Some(entry) => entry.waveid.clone(),
                    None => {
                        tracing::warn!(blockid = %self.blockid, "focus on unknown ref {refid}");
                        return;
                    }
                };
                match find_elem(&self.root, &waveid) {
                    Some(elem) => bridge.focus(Some(elem)),
                    None => {
                        tracing::warn!(blockid = %self.blockid, "focus on unmounted ref {refid}")
                    }
                }
            }
            other => {
                tracing::warn!(blockid = %self.blockid, "unknown ref operation {other:?}");
            }
        }
    }

    /// Drain ref updates for the next frontend payload, measuring
    /// position-tracking refs through the bridge. Clears the updated flags;
    /// refs that reported their unmount are dropped.
    pub fn take_ref_updates(&mut self, bridge: &mut dyn DomBridge) -> Vec<VDomRefUpdate> {
        let pending: Vec<String> = self
            .refs
            .iter()
            .filter(|(_, e)| e.updated)
            .map(|(id, _)| id.clone())
            .collect();
        let mut out = Vec::with_capacity(pending.len());
        for refid in pending {
            let (waveid, trackposition, hascurrent) = match self.refs.get(&refid) {
                Some(e) => (e.waveid.clone(), e.trackposition, e.hascurrent),
                None => continue,
            };
            let position = if trackposition && hascurrent {
                find_elem(&self.root, &waveid).and_then(|el| bridge.measure(el))
            } else {
                None
            };
            if let Some(e) = self.refs.get_mut(&refid) {
                e.updated = false;
            }
            out.push(VDomRefUpdate {
                refid,
                hascurrent,
                position,
            });
        }
        self.refs.retain(|_, e| e.hascurrent);
        out
    }
}

fn target_elem<'t>(
    root: &'t mut Option<ClientElem>,
    ru: &wavedom_core::VDomRenderUpdate,
) -> Result<&'t mut ClientElem, String> {
    let waveid = ru.waveid.as_deref().ok_or("update without parent id")?;
    find_elem_mut(root, waveid).ok_or_else(|| format!("unknown parent {waveid}"))
}

fn binding_target(value: &Value) -> Option<&str> {
    let obj = value.as_object()?;
    if obj.get("type")?.as_str()? == BINDING_TYPE {
        obj.get("bind")?.as_str()
    } else {
        None
    }
}

fn ref_target(value: &Value) -> Option<&str> {
    let obj = value.as_object()?;
    if obj.get("type")?.as_str()? == REF_TYPE {
        obj.get("refid")?.as_str()
    } else {
        None
    }
}

fn find_elem<'a>(root: &'a Option<ClientElem>, waveid: &str) -> Option<&'a ClientElem> {
    fn walk<'a>(node: &'a ClientElem, waveid: &str) -> Option<&'a ClientElem> {
        if node.waveid == waveid {
            return Some(node);
        }
        node.children.iter().find_map(|c| walk(c, waveid))
    }
    root.as_ref().and_then(|node| walk(node, waveid))
}

fn find_elem_mut<'a>(root: &'a mut Option<ClientElem>, waveid: &str) -> Option<&'a mut ClientElem> {
    fn walk<'a>(node: &'a mut ClientElem, waveid: &str) -> Option<&'a mut ClientElem> {
        if node.waveid == waveid {
            return Some(node);
        }
        node.children
            .iter_mut()
            .find_map(|c| walk(c, waveid))
    }
    root.as_mut().and_then(|node| walk(node, waveid))
}

fn collect_ids(root: &Option<ClientElem>, out: &mut FxHashSet<String>) {
    fn walk(node: &ClientElem, out: &mut FxHashSet<String>) {
        out.insert(node.waveid.clone());
        for c in &node.children {
            walk(c, out);
        }
    }
    if let Some(node) = root {
        walk(node, out);
    }
}
