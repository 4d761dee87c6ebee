//! Client-side collaborative editing against a central authority. The client keeps
//! the last confirmed document plus a queue of unconfirmed local steps; when remote
//! steps come in, the local queue is rebased over them. Steps whose context was
//! deleted by a remote change silently vanish from the queue.

use crate::map::{PosMap, Remapping};
use crate::node::Node;
use crate::step::Step;
use crate::transform::Transform;

#[derive(Debug, Clone)]
pub(crate) struct Unconfirmed {
    pub(crate) step: Step,
    pub(crate) map: PosMap,
}

/// A batch of local steps tagged with the version they apply to.
#[derive(Debug, Clone, PartialEq)]
pub struct Sendable {
    pub version: u64,
    pub steps: Vec<Step>,
}

pub struct Collab {
    version: u64,
    confirmed_doc: Node,
    doc: Node,
    unconfirmed: Vec<Unconfirmed>,
}

impl Collab {
    pub fn new(doc: Node) -> Collab {
        Collab {
            version: 0,
            confirmed_doc: doc.clone(),
            doc,
            unconfirmed: Vec::new(),
        }
    }

    pub fn version(&self) -> u64 { self.version }

    /// The document including unconfirmed local changes.
    pub fn doc(&self) -> &Node { &self.doc }

    /// The document at the last confirmed version.
    pub fn confirmed_doc(&self) -> &Node { &self.confirmed_doc }

    pub fn has_unconfirmed(&self) -> bool { !self.unconfirmed.is_empty() }

    /// Record a locally applied transform. The transform must have been built on
    /// this client's current document.
    pub fn apply_transform(&mut self, tr: &Transform) {
        debug_assert!(tr.before() == &self.doc, "transform base is not the current doc");
        for (step, map) in tr.steps().iter().zip(tr.maps()) {
            self.unconfirmed.push(Unconfirmed { step: step.clone(), map: map.clone() });
        }
        self.doc = tr.doc().clone();
    }

    /// The unconfirmed steps, packaged for sending to the authority.
    pub fn sendable_steps(&self) -> Option<Sendable> {
        if self.unconfirmed.is_empty() {
            return None;
        }
        Some(Sendable {
            version: self.version,
            steps: self.unconfirmed.iter().map(|u| u.step.clone()).collect(),
        })
    }

    /// The authority accepted a batch of our own steps. The batch must be a prefix
    /// of the unconfirmed queue, unchanged; anything else is a protocol bug.
    pub fn confirm_steps(&mut self, sendable: &Sendable) {
        assert_eq!(sendable.version, self.version, "confirming against a stale version");
        assert!(sendable.steps.len() <= self.unconfirmed.len(), "confirming unknown steps");
        for (sent, local) in sendable.steps.iter().zip(&self.unconfirmed) {
            assert_eq!(sent, &local.step, "confirmed steps diverge from the local queue");
        }
        for u in self.unconfirmed.drain(..sendable.steps.len()) {
            let result = u
                .step
                .apply(&self.confirmed_doc)
                .expect("unconfirmed step no longer applies to the confirmed doc");
            self.confirmed_doc = result.doc;
        }
        self.version += sendable.steps.len() as u64;
    }

    /// Steps confirmed for another client arrived. Applies them to the confirmed
    /// document and rebases the unconfirmed queue on top. The returned remapping
    /// maps positions in the old current document to the new one.
    pub fn receive(&mut self, steps: &[Step]) -> Remapping {
        let mut forward = Vec::with_capacity(steps.len());
        for step in steps {
            let result = step
                .apply(&self.confirmed_doc)
                .expect("authority-confirmed step failed to apply");
            self.confirmed_doc = result.doc;
            forward.push(result.map);
        }
        self.version += steps.len() as u64;
        let unconfirmed = std::mem::take(&mut self.unconfirmed);
        let (rebased, doc, remap) = rebase_steps(self.confirmed_doc.clone(), forward, unconfirmed);
        self.unconfirmed = rebased;
        self.doc = doc;
        remap
    }
}

/// Replay `unconfirmed` on top of `doc`, which already includes the changes the
/// `forward` maps describe. Steps that no longer apply are dropped.
pub(crate) fn rebase_steps(
    mut doc: Node, forward: Vec<PosMap>, unconfirmed: Vec<Unconfirmed>,
) -> (Vec<Unconfirmed>, Node, Remapping) {
    let mut remap = Remapping::with_tail(forward);
    let mut rebased = Vec::new();
    for u in unconfirmed {
        let mapped = u.step.map_over(&remap);
        let result = mapped.as_ref().and_then(|s| s.apply(&doc));
        let inv_id = remap.add_to_front(u.map.invert(), None);
        if let (Some(step), Some(result)) = (mapped, result) {
            remap.add_to_back(result.map.clone(), Some(inv_id));
            rebased.push(Unconfirmed { step, map: result.map });
            doc = result.doc;
        }
    }
    (rebased, doc, remap)
}
