//! The backend root: registry, state, and the per-cycle work loop.
//!
//! A root is single-threaded: render, event dispatch, effect execution, and
//! transfer encoding share one logical task and never interleave. Embedders
//! that drive a root from async code serialize access with their own lock and
//! deliver out-of-band atom writes through it.

use crate::component::HookKind;
use crate::diff::ChildOp;
use crate::error::panic_message;
use crate::innerlude::*;
use crate::transfer::TransferState;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

/// A registered component render function.
///
/// Invoked once per render pass with the element's props and the `children`
/// pseudo-prop; the returned element (or `None` for an empty subtree) is
/// reconciled into the component's single child slot.
pub type ComponentFn = Rc<dyn Fn(&mut Scope<'_>, &VDomProps) -> Option<VDomElem>>;

/// Effect-driven passes allowed within one cycle before the loop is reported
/// as runaway and stopped.
pub(crate) const MAX_RENDER_PASSES: u32 = 32;

/// Owner of the element-to-component tree, the atom store, and the registry
/// of component functions for one display surface.
pub struct VDomRoot {
    pub(crate) components: FxHashMap<WaveId, ComponentImpl>,
    pub(crate) registry: FxHashMap<String, ComponentFn>,
    pub(crate) atoms: AtomStore,
    pub(crate) root_elem: Option<VDomElem>,
    pub(crate) root_comp: Option<WaveId>,

    // work state for the current cycle
    pub(crate) effect_queue: Vec<(WaveId, usize)>,
    pub(crate) needs_render: FxHashSet<WaveId>,
    pub(crate) pending_child_ops: Vec<ChildOp>,
    pub(crate) render_cycle: u64,
    pub(crate) force_root_update: bool,

    // outbound payload state
    pub(crate) messages: Vec<VDomMessage>,
    pub(crate) ref_ops: Vec<VDomRefOperation>,
    pub(crate) transfer: TransferState,
    pub(crate) opts: VDomBackendOpts,
    pub(crate) opts_dirty: bool,
    pub(crate) full_state_sync: bool,

    pub(crate) render_context: VDomRenderContext,
    pub(crate) global_handler: Option<HandlerFn>,
    pub(crate) blockid: String,
    pub(crate) disposed: bool,
    pub(crate) in_cycle: bool,
    pub(crate) async_needed: bool,
}

impl VDomRoot {
    /// Create an empty root for the given block.
    pub fn new(blockid: impl Into<String>) -> Self {
        VDomRoot {
            components: FxHashMap::default(),
            registry: FxHashMap::default(),
            atoms: AtomStore::default(),
            root_elem: None,
            root_comp: None,
            effect_queue: Vec::new(),
            needs_render: FxHashSet::default(),
            pending_child_ops: Vec::new(),
            render_cycle: 0,
            force_root_update: false,
            messages: Vec::new(),
            ref_ops: Vec::new(),
            transfer: TransferState::new(),
            opts: VDomBackendOpts::default(),
            opts_dirty: false,
            full_state_sync: false,
            render_context: VDomRenderContext::default(),
            global_handler: None,
            blockid: blockid.into(),
            disposed: false,
            in_cycle: false,
            async_needed: false,
        }
    }

    /// Register a component render function under a tag name.
    pub fn register_component(
        &mut self,
        name: impl Into<String>,
        func: impl Fn(&mut Scope<'_>, &VDomProps) -> Option<VDomElem> + 'static,
    ) {
        self.registry.insert(name.into(), Rc::new(func));
    }

    /// Set the element rendered at the root on every cycle.
    pub fn set_root_elem(&mut self, elem: VDomElem) {
        self.root_elem = Some(elem);
    }

    /// Register the handler invoked for events without a `waveid`.
    pub fn set_global_event_handler(
        &mut self,
        func: impl Fn(&mut VDomRoot, &VDomEvent) + 'static,
    ) {
        self.global_handler = Some(Rc::new(func));
    }

    /// Read an atom value; `Null` when unset.
    pub fn get_atom_val(&self, name: &str) -> Value {
        self.atoms.get_atom_val(name)
    }

    /// Write an atom.
    ///
    /// With `mark_dirty`, consumers are scheduled for re-render; a write from
    /// outside a render cycle additionally flags the root for an async
    /// initiation notice (see [`take_async_initiation`](Self::take_async_initiation)).
    pub fn set_atom_val(&mut self, name: &str, val: Value, mark_dirty: bool) {
        let changed = self.atoms.set_atom_val(name, val, mark_dirty);
        if changed && mark_dirty {
            self.needs_render.extend(self.atoms.used_by(name));
            if !self.in_cycle {
                self.async_needed = true;
            }
        }
    }

    /// Set the host-behavior opts; they ride in the next reply.
    pub fn set_opts(&mut self, opts: VDomBackendOpts) {
        if self.opts != opts {
            self.opts = opts;
            self.opts_dirty = true;
        }
    }

    /// Queue an imperative ref operation for the next reply.
    pub fn queue_ref_op(&mut self, refid: impl Into<String>, op: impl Into<String>) {
        self.ref_ops.push(VDomRefOperation {
            refid: refid.into(),
            op: op.into(),
        });
    }

    /// Queue a `focus` operation for a ref.
    pub fn focus_ref(&mut self, refid: impl Into<String>) {
        self.queue_ref_op(refid, "focus");
    }

    /// Push a diagnostic into the next reply's `messages`.
    pub fn report(&mut self, msg: VDomMessage) {
        tracing::debug!(blockid = %self.blockid, messagetype = %msg.messagetype, "{}", msg.message);
        self.messages.push(msg);
    }

    /// True after a dispose update has torn the tree down.
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Whether an out-of-cycle atom write is waiting on a frontend wakeup.
    /// Draining the flag is the embedder's cue to send the fire-and-forget
    /// `vdomasyncinitiation` notice.
    pub fn take_async_initiation(&mut self) -> bool {
        std::mem::take(&mut self.async_needed)
    }

    /// The committed root component.
    pub fn root_component(&self) -> Option<&ComponentImpl> {
        self.root_comp.as_ref().and_then(|id| self.components.get(id))
    }

    /// Look up a committed component by id.
    pub fn component(&self, id: &str) -> Option<&ComponentImpl> {
        self.components.get(id)
    }

    /// Number of live components.
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub(crate) fn make_wave_id(&mut self) -> WaveId {
        uuid::Uuid::new_v4().to_string()
    }

    /// Process one frontend update: apply inbound events and ref reports,
    /// render (re-rendering while effects keep dirtying state), and encode
    /// the reply.
    pub fn render_update(&mut self, update: VDomFrontendUpdate) -> VDomBackendUpdate {
        self.render_context = update.rendercontext.clone();

        if self.disposed {
            return self.empty_reply();
        }

        if update.dispose {
            if let Some(root) = self.root_comp.take() {
                self.unmount_component(&root);
            }
            self.pending_child_ops.clear();
            self.effect_queue.clear();
            self.needs_render.clear();
            self.disposed = true;
            return self.empty_reply();
        }

        if update.resync {
            self.transfer.reset();
            self.force_root_update = true;
            self.full_state_sync = true;
        }

        self.in_cycle = true;
        self.render_cycle += 1;

        self.apply_events(&update.events);
        self.apply_ref_updates(&update.refupdates);

        let mut passes = 0u32;
        loop {
            passes += 1;
            if passes > MAX_RENDER_PASSES {
                tracing::error!(blockid = %self.blockid, "render loop did not settle after {MAX_RENDER_PASSES} passes");
                self.messages.push(VDomMessage::error(format!(
                    "render loop did not settle after {MAX_RENDER_PASSES} passes; check effects that write the state they depend on"
                )));
                break;
            }
            self.needs_render.clear();
            self.render_root();
            self.run_work();
            if self.needs_render.is_empty() {
                break;
            }
        }

        self.in_cycle = false;
        self.build_reply()
    }

    /// Copy frontend-reported ref state onto the matching ref hooks.
    fn apply_ref_updates(&mut self, updates: &[VDomRefUpdate]) {
        for ru in updates {
            for comp in self.components.values_mut() {
                for hook in comp.hooks.iter_mut() {
                    if let HookKind::Ref(r) = hook {
                        if r.refid == ru.refid {
                            r.hascurrent = ru.hascurrent;
                            r.position = ru.position.clone();
                        }
                    }
                }
            }
        }
    }

    /// Run the effect queue: every enqueued slot's prior cleanup first, then
    /// the new mounts, recording their returned cleanups. Effects run
    /// post-commit, single-threaded, in enqueue order.
    pub(crate) fn run_work(&mut self) {
        let queue = std::mem::take(&mut self.effect_queue);

        for (waveid, idx) in &queue {
            let cleanup = self.components.get_mut(waveid).and_then(|comp| {
                match comp.hooks.get_mut(*idx) {
                    Some(HookKind::Effect(effect)) => effect.cleanup.take(),
                    _ => None,
                }
            });
            if let Some(cleanup) = cleanup {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| cleanup(self))) {
                    let msg = panic_message(payload);
                    tracing::error!(waveid = %waveid, "effect cleanup panicked: {msg}");
                    self.messages
                        .push(VDomMessage::error(format!("effect cleanup failed: {msg}")));
                }
            }
        }

        for (waveid, idx) in &queue {
            let mount = self.components.get_mut(waveid).and_then(|comp| {
                match comp.hooks.get_mut(*idx) {
                    Some(HookKind::Effect(effect)) => effect.mount.take(),
                    _ => None,
                }
            });
            if let Some(mount) = mount {
                match catch_unwind(AssertUnwindSafe(|| mount(self))) {
                    Ok(cleanup) => {
                        if let Some(comp) = self.components.get_mut(waveid) {
                            if let Some(HookKind::Effect(effect)) = comp.hooks.get_mut(*idx) {
                                effect.cleanup = cleanup;
                            }
                        }
                    }
                    Err(payload) => {
                        let msg = panic_message(payload);
                        tracing::error!(waveid = %waveid, "effect mount panicked: {msg}");
                        self.messages.push(
                            VDomMessage::error(format!("effect failed: {msg}")).with_stacktrace(
                                std::backtrace::Backtrace::force_capture().to_string(),
                            ),
                        );
                    }
                }
            }
        }
    }

    fn build_reply(&mut self) -> VDomBackendUpdate {
        let transferelems = self.dehydrate_tree();

        let renderupdates = if self.force_root_update {
            self.pending_child_ops.clear();
            let vdom = self.root_comp.clone().map(|id| {
                let child = self.child_ref(&id);
                self.child_stub(child)
            });
            vec![VDomRenderUpdate {
                updatetype: "root".to_string(),
                waveid: None,
                index: None,
                vdom,
            }]
        } else {
            self.resolve_child_ops()
        };
        self.force_root_update = false;

        let live: FxHashSet<WaveId> = self.components.keys().cloned().collect();
        self.transfer.prune(&live);

        let statesync = self.atoms.get_state_sync(self.full_state_sync);
        self.full_state_sync = false;

        VDomBackendUpdate {
            update_type: BACKEND_UPDATE_TYPE.to_string(),
            ts: now_ts(),
            blockid: self.blockid.clone(),
            opts: if std::mem::take(&mut self.opts_dirty) {
                Some(self.opts.clone())
            } else {
                None
            },
            renderupdates,
            statesync,
            refoperations: std::mem::take(&mut self.ref_ops),
            messages: std::mem::take(&mut self.messages),
            transferelems,
        }
    }

    fn empty_reply(&mut self) -> VDomBackendUpdate {
        VDomBackendUpdate {
            update_type: BACKEND_UPDATE_TYPE.to_string(),
            ts: now_ts(),
            blockid: self.blockid.clone(),
            messages: std::mem::take(&mut self.messages),
            ..Default::default()
        }
    }
}

/// Milliseconds since the unix epoch.
pub fn now_ts() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
