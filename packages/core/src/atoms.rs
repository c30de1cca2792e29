//! Named state cells shared between backend renders and their consumers.
//!
//! Atoms are process-wide to a [`VDomRoot`](crate::VDomRoot): created lazily on
//! first read or write, never destroyed. Reads during render tag the current
//! component into the atom's used-by set; writes from event handlers do not.

use crate::innerlude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;

#[derive(Debug, Default)]
pub(crate) struct Atom {
    pub val: Value,
    pub dirty: bool,
    pub used_by: FxHashSet<WaveId>,
}

/// The root's atom table with dirty tracking and used-by back-references.
#[derive(Debug, Default)]
pub struct AtomStore {
    atoms: FxHashMap<String, Atom>,
}

impl AtomStore {
    /// The stored value, or `Value::Null` for an atom never written. Never
    /// fails.
    pub fn get_atom_val(&self, name: &str) -> Value {
        self.atoms
            .get(name)
            .map(|a| a.val.clone())
            .unwrap_or(Value::Null)
    }

    /// Write an atom.
    ///
    /// With `mark_dirty`, a structurally equal value is a no-op; otherwise the
    /// value is written and the dirty bit set. Without `mark_dirty` the value
    /// is updated silently (frontend-driven state sync). Returns whether the
    /// store changed.
    pub fn set_atom_val(&mut self, name: &str, val: Value, mark_dirty: bool) -> bool {
        let atom = self.atoms.entry(name.to_string()).or_default();
        if mark_dirty {
            if atom.val == val {
                return false;
            }
            atom.val = val;
            atom.dirty = true;
        } else {
            atom.val = val;
        }
        true
    }

    /// Record that `waveid` read the named atoms during its last render.
    pub fn tag_use(&mut self, waveid: &WaveId, names: &[&str]) {
        for name in names {
            let atom = self.atoms.entry((*name).to_string()).or_default();
            atom.used_by.insert(waveid.clone());
        }
    }

    /// Drop `waveid` from the named atoms' used-by sets.
    pub fn tag_unuse(&mut self, waveid: &WaveId, names: &[&str]) {
        for name in names {
            if let Some(atom) = self.atoms.get_mut(*name) {
                atom.used_by.remove(waveid);
            }
        }
    }

    /// Drop `waveid` from every used-by set (component unmount).
    pub fn remove_used_by(&mut self, waveid: &WaveId) {
        for atom in self.atoms.values_mut() {
            atom.used_by.remove(waveid);
        }
    }

    /// Components that read the named atom during their last render.
    pub fn used_by(&self, name: &str) -> Vec<WaveId> {
        self.atoms
            .get(name)
            .map(|a| a.used_by.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Components consuming at least one dirty atom.
    pub fn dirty_consumers(&self) -> FxHashSet<WaveId> {
        let mut out = FxHashSet::default();
        for atom in self.atoms.values() {
            if atom.dirty {
                out.extend(atom.used_by.iter().cloned());
            }
        }
        out
    }

    /// True when any atom is dirty.
    pub fn has_dirty(&self) -> bool {
        self.atoms.values().any(|a| a.dirty)
    }

    /// Drain the dirty set (or the whole table, if `full`) into state-sync
    /// entries, clearing the dirty bits.
    pub fn get_state_sync(&mut self, full: bool) -> Vec<VDomStateSync> {
        let mut out = Vec::new();
        for (name, atom) in self.atoms.iter_mut() {
            if full || atom.dirty {
                out.push(VDomStateSync {
                    atom: name.clone(),
                    value: atom.val.clone(),
                });
            }
            atom.dirty = false;
        }
        // map iteration order is arbitrary; keep the payload stable
        out.sort_by(|a, b| a.atom.cmp(&b.atom));
        out
    }
}
