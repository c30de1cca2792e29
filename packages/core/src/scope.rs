//! The render context handed to component functions, and the hook API.
//!
//! Hook slots live in the component and are indexed by call order; the scope
//! only carries the cursor. Calling a hook at a slot that previously held a
//! different hook kind is a usage error: it is reported as a backend message
//! and the slot is re-initialized, but the render continues.

use crate::component::{CleanupFn, EffectHook, HookKind};
use crate::innerlude::*;
use serde_json::Value;

/// Context bound to one component for the duration of a single render call.
pub struct Scope<'a> {
    pub(crate) root: &'a mut VDomRoot,
    pub(crate) waveid: WaveId,
    pub(crate) hook_idx: usize,
}

/// Handle to a state hook slot, usable from event handlers and effects.
#[derive(Debug, Clone)]
pub struct StateRef {
    waveid: WaveId,
    idx: usize,
}

impl StateRef {
    /// Replace the stored value and schedule a re-render for the owning
    /// component. A set on an unmounted component is ignored.
    pub fn set(&self, root: &mut VDomRoot, val: Value) {
        let VDomRoot {
            components,
            needs_render,
            messages,
            ..
        } = root;
        let comp = match components.get_mut(&self.waveid) {
            Some(comp) => comp,
            None => return,
        };
        match comp.hooks.get_mut(self.idx) {
            Some(HookKind::State(v)) => {
                *v = val;
                needs_render.insert(self.waveid.clone());
            }
            _ => {
                messages.push(VDomMessage::error(format!(
                    "state set on non-state hook slot {} of {}",
                    self.idx, self.waveid
                )));
            }
        }
    }

    /// Read the current value; `Null` once the component is gone.
    pub fn get(&self, root: &VDomRoot) -> Value {
        match root
            .components
            .get(&self.waveid)
            .and_then(|c| c.hooks.get(self.idx))
        {
            Some(HookKind::State(v)) => v.clone(),
            _ => Value::Null,
        }
    }
}

impl<'a> Scope<'a> {
    pub(crate) fn new(root: &'a mut VDomRoot, waveid: WaveId) -> Self {
        Scope {
            root,
            waveid,
            hook_idx: 0,
        }
    }

    /// The id of the component being rendered.
    pub fn waveid(&self) -> &WaveId {
        &self.waveid
    }

    /// The most recent render context reported by the frontend.
    pub fn render_context(&self) -> &VDomRenderContext {
        &self.root.render_context
    }

    /// Read an atom. The value is returned as-is and the component is tagged
    /// into the atom's used-by set so frontend consumers re-render with it.
    pub fn use_atom(&mut self, name: &str) -> Value {
        let idx = self.next_idx();
        let waveid = self.waveid.clone();
        let VDomRoot {
            components,
            atoms,
            messages,
            ..
        } = &mut *self.root;
        let comp = match components.get_mut(&waveid) {
            Some(comp) => comp,
            None => return Value::Null,
        };
        ensure_slot(comp, idx, messages, &waveid, || {
            HookKind::Atom(name.to_string())
        });
        if let Some(HookKind::Atom(stored)) = comp.hooks.get_mut(idx) {
            if stored.as_str() != name {
                // the slot re-bound to a different atom between renders
                let old = std::mem::replace(stored, name.to_string());
                atoms.tag_unuse(&waveid, &[old.as_str()]);
            }
        }
        atoms.tag_use(&waveid, &[name]);
        atoms.get_atom_val(name)
    }

    /// A JSON state cell scoped to this component. Returns the current value
    /// and a [`StateRef`] for writing it from handlers or effects.
    pub fn use_state(&mut self, initial: Value) -> (Value, StateRef) {
        let idx = self.next_idx();
        let waveid = self.waveid.clone();
        let VDomRoot {
            components,
            messages,
            ..
        } = &mut *self.root;
        let state_ref = StateRef {
            waveid: waveid.clone(),
            idx,
        };
        let comp = match components.get_mut(&waveid) {
            Some(comp) => comp,
            None => return (Value::Null, state_ref),
        };
        ensure_slot(comp, idx, messages, &waveid, || HookKind::State(initial));
        let val = match comp.hooks.get(idx) {
            Some(HookKind::State(v)) => v.clone(),
            _ => Value::Null,
        };
        (val, state_ref)
    }

    /// Stage an effect. The mount closure runs after commit whenever `deps`
    /// changed since the last render (`None` deps: every render); its returned
    /// cleanup runs before the next mount and on unmount.
    pub fn use_effect(
        &mut self,
        deps: Option<Vec<Value>>,
        mount: impl FnOnce(&mut VDomRoot) -> Option<CleanupFn> + 'static,
    ) {
        let idx = self.next_idx();
        let waveid = self.waveid.clone();
        let VDomRoot {
            components,
            messages,
            effect_queue,
            ..
        } = &mut *self.root;
        let comp = match components.get_mut(&waveid) {
            Some(comp) => comp,
            None => return,
        };
        let fresh = comp.hooks.len() <= idx
            || !matches!(comp.hooks.get(idx), Some(HookKind::Effect(_)));
        ensure_slot(comp, idx, messages, &waveid, || {
            HookKind::Effect(EffectHook {
                deps: None,
                mount: None,
                cleanup: None,
            })
        });
        if let Some(HookKind::Effect(effect)) = comp.hooks.get_mut(idx) {
            let changed = fresh || deps.is_none() || effect.deps != deps;
            if changed {
                effect.deps = deps;
                effect.mount = Some(Box::new(mount));
                effect_queue.push((waveid, idx));
            }
        }
    }

    /// A stable ref handle for this component. Pass `trackposition` to have
    /// the frontend attach measurement snapshots to its ref updates.
    pub fn use_vdom_ref(&mut self, trackposition: bool) -> VDomRef {
        let idx = self.next_idx();
        let waveid = self.waveid.clone();
        let VDomRoot {
            components,
            messages,
            ..
        } = &mut *self.root;
        let comp = match components.get_mut(&waveid) {
            Some(comp) => comp,
            None => return VDomRef::new(trackposition),
        };
        ensure_slot(comp, idx, messages, &waveid, || {
            HookKind::Ref(VDomRef::new(trackposition))
        });
        match comp.hooks.get(idx) {
            Some(HookKind::Ref(r)) => r.clone(),
            _ => VDomRef::new(trackposition),
        }
    }

    fn next_idx(&mut self) -> usize {
        let idx = self.hook_idx;
        self.hook_idx += 1;
        idx
    }
}

/// Get-or-create the hook slot at `idx`, reporting (and re-initializing) a
/// slot whose previous render stored a different hook kind.
fn ensure_slot(
    comp: &mut ComponentImpl,
    idx: usize,
    messages: &mut Vec<VDomMessage>,
    waveid: &WaveId,
    make: impl FnOnce() -> HookKind,
) {
    if comp.hooks.len() <= idx {
        // hooks are called in order, so at most one slot is missing
        comp.hooks.push(make());
        return;
    }
    let want = make();
    let have = &comp.hooks[idx];
    if std::mem::discriminant(have) != std::mem::discriminant(&want) {
        messages.push(VDomMessage::error(format!(
            "hook slot {} of component {} ({}) changed kind from {} to {}; hooks must be called unconditionally",
            idx,
            waveid,
            comp.tag,
            have.kind_name(),
            want.kind_name(),
        )));
        comp.hooks[idx] = want;
    }
}
