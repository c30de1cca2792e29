//! Dehydration: flattening the committed tree into deduplicated transfer
//! nodes with stable identifiers.
//!
//! Two caches keep the payload sparse. Text content maps to synthetic
//! `text-N` ids through a bounded LRU, so identical text shares one id. The
//! per-session transfer cache remembers the last JSON transmitted per
//! `WaveId`; an unchanged node is omitted and the reference-by-id in its
//! parent suffices.

use crate::diff::{ChildOp, ChildRef};
use crate::innerlude::*;
use lru::LruCache;
use rustc_hash::{FxHashMap, FxHashSet};
use std::num::NonZeroUsize;

const TEXT_ID_CACHE_SIZE: usize = 4096;

pub(crate) struct TransferState {
    text_ids: LruCache<String, String>,
    next_text_num: u64,
    cache: FxHashMap<WaveId, String>,
}

impl TransferState {
    pub(crate) fn new() -> Self {
        TransferState {
            text_ids: LruCache::new(
                NonZeroUsize::new(TEXT_ID_CACHE_SIZE).expect("nonzero cache size"),
            ),
            next_text_num: 0,
            cache: FxHashMap::default(),
        }
    }

    /// Forget everything transmitted so far (frontend resync).
    pub(crate) fn reset(&mut self) {
        self.text_ids.clear();
        self.cache.clear();
    }

    /// The synthetic id for a piece of text, assigned on first use.
    pub(crate) fn text_id(&mut self, text: &str) -> String {
        if let Some(id) = self.text_ids.get(text) {
            return id.clone();
        }
        self.next_text_num += 1;
        let id = format!("text-{}", self.next_text_num);
        self.text_ids.put(text.to_string(), id.clone());
        id
    }

    /// Drop unmounted ids from the transfer cache so it stays bounded by the
    /// live tree (plus the bounded text-id cache).
    pub(crate) fn prune(&mut self, live: &FxHashSet<WaveId>) {
        let live_text: FxHashSet<&String> = self.text_ids.iter().map(|(_, id)| id).collect();
        self.cache
            .retain(|id, _| live.contains(id) || live_text.contains(id));
    }
}

impl VDomRoot {
    /// Flatten the committed tree (preorder) into transfer nodes, suppressing
    /// nodes whose encoding matches the last transmitted version and keeping
    /// only the last occurrence of any repeated id.
    pub(crate) fn dehydrate_tree(&mut self) -> Vec<VDomTransferElem> {
        let root = match &self.root_comp {
            Some(id) => id.clone(),
            None => return Vec::new(),
        };
        let mut out = Vec::new();
        self.dehydrate_node(&root, &mut out);
        dedup_last_occurrence(out)
    }

    fn dehydrate_node(&mut self, id: &WaveId, out: &mut Vec<VDomTransferElem>) {
        let (tag, text, props, child_ids) = {
            let comp = match self.components.get(id) {
                Some(comp) => comp,
                None => return,
            };
            let props = comp.elem.as_ref().and_then(|e| e.transfer_props());
            let child_ids: Vec<WaveId> = match (&comp.comp, &comp.children) {
                (Some(single), _) => vec![single.clone()],
                (None, Some(list)) => list.clone(),
                (None, None) => Vec::new(),
            };
            (comp.tag.clone(), comp.text.clone(), props, child_ids)
        };

        if tag == TEXT_TAG {
            let text_id = self.transfer.text_id(&text);
            self.push_transfer_node(
                out,
                VDomTransferElem {
                    waveid: text_id,
                    tag,
                    text,
                    props: None,
                    children: Vec::new(),
                },
            );
            return;
        }

        let mut children = Vec::with_capacity(child_ids.len());
        for cid in &child_ids {
            match self.components.get(cid) {
                Some(comp) if comp.tag == TEXT_TAG => {
                    let text = comp.text.clone();
                    children.push(self.transfer.text_id(&text));
                }
                _ => children.push(cid.clone()),
            }
        }

        self.push_transfer_node(
            out,
            VDomTransferElem {
                waveid: id.clone(),
                tag,
                text: String::new(),
                props,
                children,
            },
        );

        for cid in &child_ids {
            self.dehydrate_node(cid, out);
        }
    }

    fn push_transfer_node(&mut self, out: &mut Vec<VDomTransferElem>, node: VDomTransferElem) {
        let encoded = match serde_json::to_string(&node) {
            Ok(s) => s,
            Err(err) => {
                tracing::warn!(waveid = %node.waveid, "failed to encode transfer node: {err}");
                return;
            }
        };
        if self.transfer.cache.get(&node.waveid) == Some(&encoded) {
            return;
        }
        self.transfer.cache.insert(node.waveid.clone(), encoded);
        out.push(node);
    }

    /// Resolve the recorded child-list edits into wire render-updates. Must
    /// run after [`dehydrate_tree`](Self::dehydrate_tree) so text ids exist.
    pub(crate) fn resolve_child_ops(&mut self) -> Vec<VDomRenderUpdate> {
        let ops = std::mem::take(&mut self.pending_child_ops);
        let mut out = Vec::with_capacity(ops.len());
        for op in ops {
            out.push(match op {
                ChildOp::Append { parent, child } => VDomRenderUpdate {
                    updatetype: "append".to_string(),
                    waveid: Some(parent),
                    index: None,
                    vdom: Some(self.child_stub(child)),
                },
                ChildOp::Insert {
                    parent,
                    index,
                    child,
                } => VDomRenderUpdate {
                    updatetype: "insert".to_string(),
                    waveid: Some(parent),
                    index: Some(index),
                    vdom: Some(self.child_stub(child)),
                },
                ChildOp::Replace {
                    parent,
                    index,
                    child,
                } => VDomRenderUpdate {
                    updatetype: "replace".to_string(),
                    waveid: Some(parent),
                    index: Some(index),
                    vdom: Some(self.child_stub(child)),
                },
                ChildOp::Remove { parent, index } => VDomRenderUpdate {
                    updatetype: "remove".to_string(),
                    waveid: Some(parent),
                    index: Some(index),
                    vdom: None,
                },
            });
        }
        out
    }

    pub(crate) fn child_stub(&mut self, child: ChildRef) -> VDomTransferElem {
        match child {
            ChildRef::Comp(id) => {
                let tag = self
                    .components
                    .get(&id)
                    .map(|c| c.tag.clone())
                    .unwrap_or_default();
                VDomTransferElem {
                    waveid: id,
                    tag,
                    ..Default::default()
                }
            }
            ChildRef::Text(text) => {
                let id = self.transfer.text_id(&text);
                VDomTransferElem {
                    waveid: id,
                    tag: TEXT_TAG.to_string(),
                    text,
                    ..Default::default()
                }
            }
        }
    }
}

/// Keep only the last occurrence of each id, preserving relative order of the
/// kept entries.
fn dedup_last_occurrence(nodes: Vec<VDomTransferElem>) -> Vec<VDomTransferElem> {
    let mut seen: FxHashSet<WaveId> = FxHashSet::default();
    let mut kept: Vec<VDomTransferElem> = Vec::with_capacity(nodes.len());
    for node in nodes.into_iter().rev() {
        if seen.insert(node.waveid.clone()) {
            kept.push(node);
        }
    }
    kept.reverse();
    kept
}
