//! The reconciler: renders an element tree into the live component tree.
//!
//! Identity is preserved per parent slot while `(tag, key-or-index)` keeps
//! matching; everything else is unmounted and rebuilt. While reconciling, the
//! root records child-list edits for surviving parents so the frontend can be
//! patched with sparse updates instead of a full tree replacement.
//!
//! Keyed reorders lean on the longest-increasing-subsequence of surviving
//! children: the LIS stays put, everything else moves with a remove+insert
//! pair. This keeps the number of moved nodes minimal.

use crate::component::{CleanupFn, HookKind};
use crate::error::panic_message;
use crate::innerlude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::hash_map::Entry;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// A child slot entry as the frontend will see it: a committed component or a
/// text leaf (whose synthetic id is assigned at transfer time).
#[derive(Debug, Clone)]
pub(crate) enum ChildRef {
    Comp(WaveId),
    Text(String),
}

/// One recorded child-list edit, resolved into a wire render-update after the
/// transfer encoder has assigned text ids.
#[derive(Debug, Clone)]
pub(crate) enum ChildOp {
    Append {
        parent: WaveId,
        child: ChildRef,
    },
    Insert {
        parent: WaveId,
        index: usize,
        child: ChildRef,
    },
    Replace {
        parent: WaveId,
        index: usize,
        child: ChildRef,
    },
    Remove {
        parent: WaveId,
        index: usize,
    },
}

impl VDomRoot {
    /// Reconcile the stored root element against the committed root component.
    pub(crate) fn render_root(&mut self) {
        let elem = self.root_elem.clone();
        let prev = self.root_comp.take();
        let new = self.reconcile(prev.clone(), elem);
        if new != prev {
            self.force_root_update = true;
        }
        self.root_comp = new;
    }

    /// Match `elem` against `prev`, reusing the component when identity holds
    /// and rebuilding it otherwise. Returns the committed component id.
    pub(crate) fn reconcile(
        &mut self,
        prev: Option<WaveId>,
        elem: Option<VDomElem>,
    ) -> Option<WaveId> {
        let elem = match elem {
            Some(e) if !e.is_empty_tag() => e,
            _ => {
                if let Some(pid) = prev {
                    self.unmount_component(&pid);
                }
                return None;
            }
        };

        let key = elem.elem_key().unwrap_or("").to_string();
        let reusable = match &prev {
            Some(pid) => self
                .components
                .get(pid)
                .map_or(false, |c| c.tag == elem.tag && c.key == key),
            None => false,
        };
        let comp_id = if reusable {
            prev.unwrap()
        } else {
            if let Some(pid) = prev {
                self.unmount_component(&pid);
            }
            let id = self.make_wave_id();
            self.components.insert(
                id.clone(),
                ComponentImpl::new(id.clone(), elem.tag.clone(), key, self.render_cycle),
            );
            id
        };

        let tag = elem.tag.clone();
        let props = elem.props.clone();
        let children = elem.children.clone();
        let text = elem.text.clone();
        if let Some(comp) = self.components.get_mut(&comp_id) {
            comp.elem = Some(elem);
        }

        let registered = self.registry.contains_key(&tag);
        match tag_class(&tag, registered) {
            TagClass::Text => {
                if let Some(comp) = self.components.get_mut(&comp_id) {
                    comp.text = text;
                }
            }
            TagClass::Base => {
                self.reconcile_children(&comp_id, children);
            }
            TagClass::Component => {
                self.render_component(&comp_id, &tag, props, children);
            }
            TagClass::Unknown => {
                // keep the tree well-formed: the tag renders as literal text
                let rendered = Some(VDomElem::text(format!("<{tag}>")));
                self.reconcile_single_child(&comp_id, rendered);
            }
        }

        Some(comp_id)
    }

    /// Invoke a registered render function inside a scope bound to `comp_id`
    /// and reconcile its output into the single-child slot. A panicking render
    /// leaves the component in its prior committed state.
    fn render_component(
        &mut self,
        comp_id: &WaveId,
        tag: &str,
        props: PropMap,
        children: Vec<VDomElem>,
    ) {
        let func = match self.registry.get(tag) {
            Some(f) => f.clone(),
            None => return,
        };
        let vprops = VDomProps { props, children };
        let result = catch_unwind(AssertUnwindSafe(|| {
            let mut scope = Scope::new(self, comp_id.clone());
            func(&mut scope, &vprops)
        }));
        match result {
            Ok(rendered) => self.reconcile_single_child(comp_id, rendered),
            Err(payload) => {
                let msg = panic_message(payload);
                tracing::error!(tag, waveid = %comp_id, "render function panicked: {msg}");
                self.messages.push(
                    VDomMessage::error(format!("render of <{tag}> failed: {msg}"))
                        .with_stacktrace(std::backtrace::Backtrace::force_capture().to_string()),
                );
            }
        }
    }

    /// Reconcile the single rendered subtree of a component tag.
    fn reconcile_single_child(&mut self, parent: &WaveId, rendered: Option<VDomElem>) {
        let parent_cycle = match self.components.get_mut(parent) {
            Some(comp) => comp.created_cycle,
            None => return,
        };
        let prev_child = self
            .components
            .get_mut(parent)
            .and_then(|comp| comp.comp.take());
        let prev_text = prev_child.as_ref().and_then(|id| {
            self.components
                .get(id)
                .filter(|c| c.tag == TEXT_TAG)
                .map(|c| c.text.clone())
        });

        let new_child = self.reconcile(prev_child.clone(), rendered);
        if let Some(comp) = self.components.get_mut(parent) {
            comp.comp = new_child.clone();
        }

        if parent_cycle < self.render_cycle {
            let old: Vec<WaveId> = prev_child.into_iter().collect();
            let new: Vec<WaveId> = new_child.into_iter().collect();
            let mut changed = FxHashSet::default();
            for id in &new {
                if old.contains(id) {
                    if let (Some(prev), Some(comp)) = (&prev_text, self.components.get(id)) {
                        if comp.tag == TEXT_TAG && comp.text != *prev {
                            changed.insert(id.clone());
                        }
                    }
                }
            }
            self.child_edit_script(parent, &old, &new, &changed);
        }
    }

    /// Reconcile the ordered child list of a base-tag component.
    ///
    /// Prior children are keyed by `(tag, key)` when a key is present and by
    /// `(tag, slot index)` otherwise; the first occurrence of a duplicate key
    /// wins and later duplicates fall back to index matching.
    pub(crate) fn reconcile_children(&mut self, parent: &WaveId, new_elems: Vec<VDomElem>) {
        let parent_cycle = match self.components.get(parent) {
            Some(comp) => comp.created_cycle,
            None => return,
        };
        let prev: Vec<WaveId> = self
            .components
            .get_mut(parent)
            .and_then(|comp| comp.children.take())
            .unwrap_or_default();

        let mut prev_texts: FxHashMap<WaveId, String> = FxHashMap::default();
        let mut by_key: FxHashMap<(String, String), usize> = FxHashMap::default();
        let mut by_index: FxHashMap<(String, usize), usize> = FxHashMap::default();
        for (i, cid) in prev.iter().enumerate() {
            if let Some(comp) = self.components.get(cid) {
                if comp.tag == TEXT_TAG {
                    prev_texts.insert(cid.clone(), comp.text.clone());
                }
                if comp.key.is_empty() {
                    by_index.insert((comp.tag.clone(), i), i);
                } else {
                    match by_key.entry((comp.tag.clone(), comp.key.clone())) {
                        Entry::Vacant(slot) => {
                            slot.insert(i);
                        }
                        // first occurrence wins; duplicates fall back to
                        // index matching
                        Entry::Occupied(_) => {
                            by_index.insert((comp.tag.clone(), i), i);
                        }
                    }
                }
            }
        }

        let mut used = vec![false; prev.len()];
        let mut new_ids: Vec<WaveId> = Vec::new();
        let live: Vec<VDomElem> = new_elems
            .into_iter()
            .filter(|e| !e.is_empty_tag())
            .collect();
        for (j, elem) in live.into_iter().enumerate() {
            let match_idx = match elem.elem_key() {
                Some(k) => by_key
                    .remove(&(elem.tag.clone(), k.to_string()))
                    .or_else(|| by_index.remove(&(elem.tag.clone(), j))),
                None => by_index.remove(&(elem.tag.clone(), j)),
            };
            let prev_id = match_idx.map(|i| {
                used[i] = true;
                prev[i].clone()
            });
            if let Some(id) = self.reconcile(prev_id, Some(elem)) {
                new_ids.push(id);
            }
        }

        for (i, cid) in prev.iter().enumerate() {
            if !used[i] {
                self.unmount_component(cid);
            }
        }

        if let Some(comp) = self.components.get_mut(parent) {
            comp.children = Some(new_ids.clone());
        }

        if parent_cycle < self.render_cycle {
            let mut changed = FxHashSet::default();
            for id in &new_ids {
                if let (Some(prev_text), Some(comp)) = (prev_texts.get(id), self.components.get(id))
                {
                    if comp.text != *prev_text {
                        changed.insert(id.clone());
                    }
                }
            }
            self.child_edit_script(parent, &prev, &new_ids, &changed);
        }
    }

    /// Record the edit script transforming `old` into `new` under `parent`.
    ///
    /// `changed` holds surviving children whose content changed in place
    /// (text rewrites); they become replaces at their final position.
    fn child_edit_script(
        &mut self,
        parent: &WaveId,
        old: &[WaveId],
        new: &[WaveId],
        changed: &FxHashSet<WaveId>,
    ) {
        if old == new && changed.is_empty() {
            return;
        }

        let mut ops: Vec<ChildOp> = Vec::new();
        let new_pos: FxHashMap<&WaveId, usize> =
            new.iter().enumerate().map(|(i, id)| (id, i)).collect();
        let mut sim: Vec<WaveId> = old.to_vec();

        // children that did not survive
        for i in (0..sim.len()).rev() {
            if !new_pos.contains_key(&sim[i]) {
                ops.push(ChildOp::Remove {
                    parent: parent.clone(),
                    index: i,
                });
                sim.remove(i);
            }
        }

        // survivors on the longest increasing run stay put; the rest move
        let positions: Vec<usize> = sim.iter().map(|id| new_pos[id]).collect();
        let mut in_lis = FxHashSet::default();
        let mut predecessors = vec![0; positions.len()];
        let mut starts = vec![0; positions.len()];
        longest_increasing_subsequence::lis_with(
            &positions,
            &mut in_lis,
            |a, b| a < b,
            &mut predecessors,
            &mut starts,
        );
        let stationary: FxHashSet<WaveId> =
            in_lis.iter().map(|&i| sim[i].clone()).collect();
        for i in (0..sim.len()).rev() {
            if !stationary.contains(&sim[i]) {
                ops.push(ChildOp::Remove {
                    parent: parent.clone(),
                    index: i,
                });
                sim.remove(i);
            }
        }

        // rebuild toward the target order
        for (j, id) in new.iter().enumerate() {
            if sim.get(j) == Some(id) {
                if changed.contains(id) {
                    ops.push(ChildOp::Replace {
                        parent: parent.clone(),
                        index: j,
                        child: self.child_ref(id),
                    });
                }
                continue;
            }
            let child = self.child_ref(id);
            if j >= sim.len() {
                sim.push(id.clone());
                ops.push(ChildOp::Append {
                    parent: parent.clone(),
                    child,
                });
            } else {
                sim.insert(j, id.clone());
                ops.push(ChildOp::Insert {
                    parent: parent.clone(),
                    index: j,
                    child,
                });
            }
        }
        debug_assert_eq!(sim, new);

        self.pending_child_ops.extend(ops);
    }

    pub(crate) fn child_ref(&self, id: &WaveId) -> ChildRef {
        match self.components.get(id) {
            Some(comp) if comp.tag == TEXT_TAG => ChildRef::Text(comp.text.clone()),
            _ => ChildRef::Comp(id.clone()),
        }
    }

    /// Unmount a component subtree: children first, then the component's own
    /// hook cleanups in reverse declaration order, then removal from the map.
    /// A panicking cleanup is reported and does not stop the rest.
    pub(crate) fn unmount_component(&mut self, id: &WaveId) {
        let (child, children) = match self.components.get_mut(id) {
            Some(comp) => (comp.comp.take(), comp.children.take()),
            None => return,
        };
        if let Some(c) = child {
            self.unmount_component(&c);
        }
        if let Some(cs) = children {
            for c in cs {
                self.unmount_component(&c);
            }
        }

        let mut cleanups: Vec<CleanupFn> = Vec::new();
        if let Some(comp) = self.components.get_mut(id) {
            for hook in comp.hooks.iter_mut().rev() {
                if let HookKind::Effect(effect) = hook {
                    if let Some(f) = effect.cleanup.take() {
                        cleanups.push(f);
                    }
                }
            }
        }
        for cleanup in cleanups {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| cleanup(self))) {
                let msg = panic_message(payload);
                tracing::error!(waveid = %id, "effect cleanup panicked: {msg}");
                self.messages
                    .push(VDomMessage::error(format!("effect cleanup failed: {msg}")));
            }
        }

        self.components.remove(id);
        self.atoms.remove_used_by(id);
        self.needs_render.remove(id);
    }
}
