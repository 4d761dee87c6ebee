//! Decentralized version tracking. Every edit gets a random nonzero id, and a
//! version's id is the XOR of its base version and the edit applied to it. XOR is
//! commutative, so two peers that incorporate the same set of edits in different
//! orders end up at the same version id without coordination.
//!
//! The store keeps the version DAG with a document snapshot per version, which makes
//! rebasing a batch of foreign changes a matter of replaying them from a shared
//! ancestor.

use std::collections::{HashMap, HashSet};
use rand::Rng;

use crate::map::{PosMap, Remapping};
use crate::node::Node;
use crate::step::Step;

pub type VersionId = u64;
pub type ClientId = u32;

pub const ROOT_VERSION: VersionId = 0;

/// One edit: a step made by a client against a specific version.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// Random nonzero edit id.
    pub id: VersionId,
    /// The version the step was created against.
    pub base: VersionId,
    pub client: ClientId,
    pub step: Step,
}

pub struct VersionEntry {
    doc: Node,
    parent: Option<VersionId>,
    children: Vec<Change>,
}

pub struct VersionStore {
    versions: HashMap<VersionId, VersionEntry>,
}

impl VersionStore {
    pub fn new(doc: Node) -> VersionStore {
        let mut versions = HashMap::new();
        versions.insert(ROOT_VERSION, VersionEntry { doc, parent: None, children: Vec::new() });
        VersionStore { versions }
    }

    pub fn contains(&self, id: VersionId) -> bool {
        self.versions.contains_key(&id)
    }

    /// Asking for a version we never stored is a caller bug.
    fn get(&self, id: VersionId) -> &VersionEntry {
        self.versions.get(&id).unwrap_or_else(|| panic!("unknown version {:x}", id))
    }

    pub fn doc(&self, id: VersionId) -> &Node {
        &self.get(id).doc
    }

    pub fn child_version(base: VersionId, edit: VersionId) -> VersionId {
        base ^ edit
    }

    pub fn fresh_edit_id(rng: &mut impl Rng) -> VersionId {
        loop {
            let id: u64 = rng.gen();
            if id != 0 {
                return id;
            }
        }
    }

    /// Apply a change whose base is already in the store. Returns the new version
    /// id, or `None` when the step doesn't fit the base document.
    pub fn apply_change(&mut self, change: Change) -> Option<VersionId> {
        let result = change.step.apply(&self.get(change.base).doc)?;
        let id = Self::child_version(change.base, change.id);
        let base = change.base;
        if !self.versions.contains_key(&id) {
            self.versions.insert(
                id,
                VersionEntry { doc: result.doc, parent: Some(base), children: Vec::new() },
            );
            self.versions.get_mut(&base).unwrap().children.push(change);
        }
        Some(id)
    }

    fn insert_version(&mut self, id: VersionId, doc: Node, change: Change) {
        if self.versions.contains_key(&id) {
            return;
        }
        let base = change.base;
        self.versions.insert(id, VersionEntry { doc, parent: Some(base), children: Vec::new() });
        self.versions.get_mut(&base).unwrap().children.push(change);
    }

    /// The edit ids on the path from the root to `version`.
    pub fn ancestor_edits(&self, mut version: VersionId) -> HashSet<VersionId> {
        let mut out = HashSet::new();
        while let Some(parent) = self.get(version).parent {
            out.insert(version ^ parent);
            version = parent;
        }
        out
    }

    /// Drop everything not reachable from `base` and make it the new root.
    pub fn clean_up(&mut self, base: VersionId) {
        let mut keep = HashSet::new();
        let mut queue = vec![base];
        while let Some(v) = queue.pop() {
            if !keep.insert(v) {
                continue;
            }
            for change in &self.get(v).children {
                queue.push(v ^ change.id);
            }
        }
        self.versions.retain(|id, _| keep.contains(id));
        if let Some(entry) = self.versions.get_mut(&base) {
            entry.parent = None;
        }
    }

    pub fn len(&self) -> usize { self.versions.len() }
    pub fn is_empty(&self) -> bool { self.versions.is_empty() }
}

/// Merge two orderings of (partly shared) changes into one deterministic order,
/// keyed on client id. Both peers merging each other's sets produce the same list.
pub fn merge_change_sets(old: Vec<Change>, new: Vec<Change>) -> Vec<Change> {
    let mut out = Vec::with_capacity(old.len() + new.len());
    let mut old = old.into_iter().peekable();
    let mut new = new.into_iter().peekable();
    loop {
        match (old.peek(), new.peek()) {
            (Some(o), Some(n)) => {
                if o.client > n.client {
                    out.push(new.next().unwrap());
                } else {
                    out.push(old.next().unwrap());
                }
            }
            (Some(_), None) => out.push(old.next().unwrap()),
            (None, Some(_)) => out.push(new.next().unwrap()),
            (None, None) => break,
        }
    }
    out
}

/// Replay `changes` on top of `base`. Each change's own base must be `base`, an
/// ancestor of it, or the version produced by an earlier change in the batch.
/// Positions in each change are remapped over the changes replayed before it that
/// its base didn't know about. Changes that no longer apply are dropped, leaving an
/// identity map in their place. Returns the resulting tip.
pub fn rebase_changes(store: &mut VersionStore, base: VersionId, changes: Vec<Change>) -> VersionId {
    let mut tip = base;
    let mut replayed: Vec<(VersionId, PosMap)> = Vec::new();
    // Known-edit sets keyed by original version id. A foreign peer's intermediate
    // versions never exist in the local store (replay only creates `tip ^ edit`
    // ids), so the sets are grown from the batch itself.
    let mut known_at: HashMap<VersionId, HashSet<VersionId>> = HashMap::new();
    known_at.insert(base, store.ancestor_edits(base));
    for ch in changes {
        let known = match known_at.get(&ch.base) {
            Some(k) => k.clone(),
            None => store.ancestor_edits(ch.base),
        };
        let mut after = known.clone();
        after.insert(ch.id);
        known_at.insert(VersionStore::child_version(ch.base, ch.id), after);

        let mut remap = Remapping::new();
        for (eid, map) in &replayed {
            if !known.contains(eid) {
                remap.add_to_back(map.clone(), None);
            }
        }
        let mapped = ch.step.map_over(&remap);
        let applied = mapped.as_ref().and_then(|s| s.apply(store.doc(tip)));
        match (mapped, applied) {
            (Some(step), Some(result)) => {
                let new_id = VersionStore::child_version(tip, ch.id);
                let rebased = Change { id: ch.id, base: tip, client: ch.client, step };
                store.insert_version(new_id, result.doc, rebased);
                replayed.push((ch.id, result.map));
                tip = new_id;
            }
            _ => replayed.push((ch.id, PosMap::identity())),
        }
    }
    tip
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::*;
    use crate::node::{Fragment, Slice};
    use crate::pos::Pos;

    fn insert(pos: Pos, text: &str) -> Step {
        Step::Replace {
            from: pos.clone(),
            to: pos,
            slice: Slice::new(Fragment::inline(vec![Node::text(text)]), 0, 0),
            structure: false,
        }
    }

    fn change(id: u64, base: VersionId, client: ClientId, step: Step) -> Change {
        Change { id, base, client, step }
    }

    #[test]
    fn xor_version_ids_commute() {
        let e1 = change(0x11, ROOT_VERSION, 1, insert(Pos::new([0], 1), "X"));
        let e2 = change(0x22, ROOT_VERSION, 2, insert(Pos::new([0], 2), "Y"));

        let mut a = VersionStore::new(doc(vec![p("ab")]));
        let merged = merge_change_sets(vec![e1.clone()], vec![e2.clone()]);
        let tip_a = rebase_changes(&mut a, ROOT_VERSION, merged);

        let mut b = VersionStore::new(doc(vec![p("ab")]));
        let merged = merge_change_sets(vec![e2], vec![e1]);
        let tip_b = rebase_changes(&mut b, ROOT_VERSION, merged);

        assert_eq!(tip_a, tip_b);
        assert_eq!(tip_a, ROOT_VERSION ^ 0x11 ^ 0x22);
        assert_eq!(a.doc(tip_a), b.doc(tip_b));
        assert_eq!(a.doc(tip_a), &doc(vec![p("aXbY")]));
    }

    #[test]
    fn rebase_remaps_later_changes() {
        // Both edits target version 0; the second must shift over the first.
        let e1 = change(0x1, ROOT_VERSION, 1, insert(Pos::new([0], 0), "AA"));
        let e2 = change(0x2, ROOT_VERSION, 2, insert(Pos::new([0], 2), "Z"));
        let mut store = VersionStore::new(doc(vec![p("xy")]));
        let tip = rebase_changes(&mut store, ROOT_VERSION, vec![e1, e2]);
        assert_eq!(store.doc(tip), &doc(vec![p("AAxyZ")]));
    }

    #[test]
    fn rebase_foreign_chain_of_two() {
        // Client 2's second change is based on a version only client 2 ever had;
        // the replay must resolve its ancestry from the batch, not the store.
        let a1 = change(0x1, ROOT_VERSION, 1, insert(Pos::new([0], 2), "A"));
        let b1 = change(0x4, ROOT_VERSION, 2, insert(Pos::new([0], 0), "x"));
        let b2 = change(0x8, ROOT_VERSION ^ 0x4, 2, insert(Pos::new([0], 1), "y"));

        let mut a = VersionStore::new(doc(vec![p("ab")]));
        a.apply_change(a1.clone()).unwrap();
        let merged = merge_change_sets(vec![a1.clone()], vec![b1.clone(), b2.clone()]);
        let tip_a = rebase_changes(&mut a, ROOT_VERSION, merged);

        let mut b = VersionStore::new(doc(vec![p("ab")]));
        b.apply_change(b1.clone()).unwrap();
        b.apply_change(b2.clone()).unwrap();
        let merged = merge_change_sets(vec![b1, b2], vec![a1]);
        let tip_b = rebase_changes(&mut b, ROOT_VERSION, merged);

        assert_eq!(tip_a, tip_b);
        assert_eq!(tip_a, 0x1 ^ 0x4 ^ 0x8);
        assert_eq!(a.doc(tip_a), b.doc(tip_b));
        assert_eq!(a.doc(tip_a), &doc(vec![p("xyabA")]));
    }

    #[test]
    fn dropped_change_leaves_identity() {
        let del = change(0x1, ROOT_VERSION, 1, Step::Replace {
            from: Pos::new([0], 0),
            to: Pos::new([0], 4),
            slice: Slice::empty(),
            structure: false,
        });
        let ins = change(0x2, ROOT_VERSION, 2, insert(Pos::new([0], 2), "Z"));
        let mut store = VersionStore::new(doc(vec![p("abcd")]));
        let tip = rebase_changes(&mut store, ROOT_VERSION, vec![del, ins]);
        // The insert vanished; only the deletion took effect.
        assert_eq!(tip, ROOT_VERSION ^ 0x1);
        assert_eq!(store.doc(tip), &doc(vec![p("")]));
    }

    #[test]
    fn clean_up_prunes_stale_branches() {
        let mut store = VersionStore::new(doc(vec![p("ab")]));
        let v1 = store
            .apply_change(change(0x1, ROOT_VERSION, 1, insert(Pos::new([0], 2), "c")))
            .unwrap();
        let _v2 = store
            .apply_change(change(0x2, ROOT_VERSION, 2, insert(Pos::new([0], 0), "z")))
            .unwrap();
        assert_eq!(store.len(), 3);
        store.clean_up(v1);
        assert_eq!(store.len(), 1);
        assert!(store.contains(v1));
        assert!(!store.contains(ROOT_VERSION));
        assert!(store.ancestor_edits(v1).is_empty());
    }
}
