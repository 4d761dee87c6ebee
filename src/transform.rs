//! A transform accumulates steps against a document, keeping every intermediate
//! document and step map around so the whole thing can be mapped through or
//! inverted. The compound editing operations (wrap, lift, split ranges, smart
//! replace) live here; they express themselves purely as sequences of steps.

use std::error::Error;
use std::fmt;

use crate::map::PosMap;
use crate::mark::Mark;
use crate::node::{Node, Slice, Visit};
use crate::pos::{Path, Pos};
use crate::schema::{find_connection, Attrs, NodeKind};
use crate::step::Step;

/// A step didn't fit the document it was applied to.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct StepFailed;

impl fmt::Display for StepFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step does not apply to document")
    }
}

impl Error for StepFailed {}

pub struct Transform {
    docs: Vec<Node>,
    steps: Vec<Step>,
    maps: Vec<PosMap>,
}

impl Transform {
    pub fn new(doc: Node) -> Transform {
        Transform { docs: vec![doc], steps: Vec::new(), maps: Vec::new() }
    }

    /// The current document.
    pub fn doc(&self) -> &Node { self.docs.last().unwrap() }

    /// The document before any steps.
    pub fn before(&self) -> &Node { &self.docs[0] }

    pub fn steps(&self) -> &[Step] { &self.steps }
    pub fn maps(&self) -> &[PosMap] { &self.maps }

    /// The document a given step applied to.
    pub fn doc_before_step(&self, i: usize) -> &Node { &self.docs[i] }

    pub fn step(&mut self, step: Step) -> Result<(), StepFailed> {
        match step.apply(self.doc()) {
            Some(result) => {
                self.docs.push(result.doc);
                self.maps.push(result.map);
                self.steps.push(step);
                Ok(())
            }
            None => Err(StepFailed),
        }
    }

    /// Like [`step`](Transform::step) but swallows the failure.
    pub fn maybe_step(&mut self, step: Step) -> bool {
        self.step(step).is_ok()
    }

    /// Map a position from the original document through all accumulated maps.
    pub fn map_through(&self, pos: &Pos, bias: i32) -> (Pos, bool) {
        let mut p = pos.clone();
        let mut deleted = false;
        for map in &self.maps {
            let r = map.map(&p, bias);
            deleted |= r.deleted;
            p = r.pos;
        }
        (p, deleted)
    }

    /// The inverse steps, in the order that undoes this transform.
    pub fn inverted_steps(&self) -> Vec<Step> {
        (0..self.steps.len())
            .rev()
            .map(|i| self.steps[i].invert(&self.docs[i], &self.maps[i]))
            .collect()
    }

    pub fn delete_range(&mut self, from: Pos, to: Pos) -> Result<(), StepFailed> {
        self.step(Step::Replace { from, to, slice: Slice::empty(), structure: false })
    }

    /// Replace a range with a slice, falling back to delete-then-insert when the
    /// slice's open edges don't line up with the gap.
    pub fn replace_range(&mut self, from: Pos, to: Pos, slice: Slice) -> Result<(), StepFailed> {
        let direct = Step::Replace {
            from: from.clone(), to: to.clone(), slice: slice.clone(), structure: false,
        };
        if self.maybe_step(direct) {
            return Ok(());
        }
        // Only block content can be re-homed at a block boundary.
        if slice.content.children().iter().any(|c| c.inline_size() > 0) {
            return Err(StepFailed);
        }
        if from < to {
            self.delete_range(from.clone(), to)?;
        }
        // The left edge of the gap survives deletion unchanged.
        let insert_at = self.block_insert_point(&from)?;
        let count = slice.content.len();
        self.step(Step::Replace {
            from: insert_at.clone(),
            to: insert_at.clone(),
            slice: Slice::new(slice.content, 0, 0),
            structure: false,
        })?;
        // Try to smooth over the seams; failure just leaves the boundaries alone.
        let right = Pos { path: insert_at.path.clone(), offset: insert_at.offset + count };
        if let Some(step) = self.join_step(&right.path, right.offset) {
            self.maybe_step(step);
        }
        if let Some(step) = self.join_step(&insert_at.path, insert_at.offset) {
            self.maybe_step(step);
        }
        Ok(())
    }

    /// Turn a position into a gap between block children, splitting the textblock
    /// around it when it lands inside one.
    fn block_insert_point(&mut self, pos: &Pos) -> Result<Pos, StepFailed> {
        let node = self.doc().node_at(&pos.path).ok_or(StepFailed)?;
        if !node.is_textblock() || pos.depth() == 0 {
            return Ok(pos.clone());
        }
        if pos.offset > 0 && pos.offset < node.size() {
            self.step(Step::Split { pos: pos.clone(), retype: None })?;
        }
        let (last, parent) = pos.path.split_last().ok_or(StepFailed)?;
        let i = last + (pos.offset > 0) as usize;
        Ok(Pos::new(parent, i))
    }

    fn join_step(&self, parent: &[usize], idx: usize) -> Option<Step> {
        let node = self.doc().node_at(parent)?;
        if idx == 0 || idx >= node.children().len() {
            return None;
        }
        let first = node.children().get(idx - 1)?;
        let mut fpath = Path::from_slice(parent);
        fpath.push(idx - 1);
        let mut tpath = Path::from_slice(parent);
        tpath.push(idx);
        Some(Step::Join {
            from: Pos { path: fpath, offset: first.size() },
            to: Pos { path: tpath, offset: 0 },
        })
    }

    /// Split the node at `pos`, and `depth - 1` of its ancestors above it.
    pub fn split(&mut self, pos: Pos, depth: usize) -> Result<(), StepFailed> {
        let mut cur = pos;
        for _ in 0..depth {
            self.step(Step::Split { pos: cur.clone(), retype: None })?;
            let (last, parent) = cur.path.split_last().ok_or(StepFailed)?;
            cur = Pos::new(parent, last + 1);
        }
        Ok(())
    }

    /// Join the children on either side of the gap at `pos`.
    pub fn join(&mut self, pos: Pos) -> Result<(), StepFailed> {
        let step = self.join_step(&pos.path, pos.offset).ok_or(StepFailed)?;
        self.step(step)
    }

    /// Lift the block range `[from, to)` (children of one parent) out of that
    /// parent, splitting the parent first when the range doesn't span it.
    pub fn lift(&mut self, from: Pos, to: Pos) -> Result<(), StepFailed> {
        if from.path != to.path || from.path.is_empty() {
            return Err(StepFailed);
        }
        let parent = self.doc().node_at(&from.path).ok_or(StepFailed)?;
        let (f, t) = (from.offset, to.offset);
        if t > parent.size() || f > t {
            return Err(StepFailed);
        }
        let mut path = from.path.clone();
        if t < parent.size() {
            self.step(Step::Split { pos: Pos { path: path.clone(), offset: t }, retype: None })?;
        }
        if f > 0 {
            self.step(Step::Split { pos: Pos { path: path.clone(), offset: f }, retype: None })?;
            let last = path.len() - 1;
            path[last] += 1;
        }
        self.step(Step::Ancestor {
            from: Pos { path: path.clone(), offset: 0 },
            to: Pos { path, offset: t - f },
            depth: 1,
            types: vec![],
        })
    }

    /// Wrap the block range `[from, to)` in a node of the given kind, inserting
    /// whatever intermediate wrappers the kinds require.
    pub fn wrap(&mut self, from: Pos, to: Pos, kind: NodeKind, attrs: Attrs) -> Result<(), StepFailed> {
        if from.path != to.path || from.offset >= to.offset {
            return Err(StepFailed);
        }
        let parent = self.doc().node_at(&from.path).ok_or(StepFailed)?;
        let inner = parent.children().get(from.offset).ok_or(StepFailed)?;
        let mut types = vec![(kind, attrs)];
        if !kind.can_contain(inner.kind()) {
            let chain = find_connection(kind, inner.kind()).ok_or(StepFailed)?;
            types.extend(chain.into_iter().map(|k| (k, Attrs::default_for(k))));
        }
        self.step(Step::Ancestor { from, to, depth: 0, types })
    }

    /// Retype every textblock touched by the range. Textblocks whose content can't
    /// live in the new kind are skipped.
    pub fn set_block_type(&mut self, from: Pos, to: Pos, kind: NodeKind, attrs: Attrs) -> Result<(), StepFailed> {
        let mut paths: Vec<Path> = Vec::new();
        self.doc().nodes_between(&from, &to, &mut |node, path| {
            if node.is_textblock() {
                if node.kind() != kind || *node.attrs() != attrs {
                    paths.push(path.clone());
                }
                Visit::Skip
            } else {
                Visit::Descend
            }
        });
        if paths.is_empty() {
            return Ok(());
        }
        let mut any = false;
        // Retyping keeps every coordinate stable, so the collected paths stay valid.
        for path in paths {
            let size = match self.doc().node_at(&path) {
                Some(n) => n.size(),
                None => continue,
            };
            any |= self.maybe_step(Step::Ancestor {
                from: Pos { path: path.clone(), offset: 0 },
                to: Pos { path, offset: size },
                depth: 1,
                types: vec![(kind, attrs.clone())],
            });
        }
        if any { Ok(()) } else { Err(StepFailed) }
    }

    pub fn add_mark(&mut self, from: Pos, to: Pos, mark: Mark) -> Result<(), StepFailed> {
        self.step(Step::AddMark { from, to, mark })
    }

    pub fn remove_mark(&mut self, from: Pos, to: Pos, mark: Mark) -> Result<(), StepFailed> {
        self.step(Step::RemoveMark { from, to, mark })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::*;
    use crate::node::Fragment;

    #[test]
    fn wrap_and_lift_roundtrip() {
        let d = doc(vec![p("a"), p("b"), p("c")]);
        let mut tr = Transform::new(d.clone());
        tr.wrap(Pos::at(1), Pos::at(3), NodeKind::Blockquote, Attrs::None).unwrap();
        assert_eq!(tr.doc(), &doc(vec![p("a"), blockquote(vec![p("b"), p("c")])]));
        tr.lift(Pos::new([1], 0), Pos::new([1], 2)).unwrap();
        assert_eq!(tr.doc(), &d);
    }

    #[test]
    fn wrap_inserts_connection() {
        let d = doc(vec![p("a")]);
        let mut tr = Transform::new(d);
        tr.wrap(Pos::at(0), Pos::at(1), NodeKind::BulletList, Attrs::None).unwrap();
        assert_eq!(tr.doc(), &doc(vec![ul(vec![li(vec![p("a")])])]));
    }

    #[test]
    fn lift_splits_partial_cover() {
        let d = doc(vec![blockquote(vec![p("a"), p("b"), p("c")])]);
        let mut tr = Transform::new(d);
        tr.lift(Pos::new([0], 1), Pos::new([0], 2)).unwrap();
        assert_eq!(
            tr.doc(),
            &doc(vec![blockquote(vec![p("a")]), p("b"), blockquote(vec![p("c")])])
        );
    }

    #[test]
    fn set_block_type_skips_nonconforming() {
        let d = doc(vec![p("a"), blockquote(vec![p("b")]), p("c")]);
        let mut tr = Transform::new(d);
        tr.set_block_type(Pos::at(0), Pos::at(3), NodeKind::Heading, Attrs::heading(1))
            .unwrap();
        assert_eq!(
            tr.doc(),
            &doc(vec![h(1, "a"), blockquote(vec![h(1, "b")]), h(1, "c")])
        );
    }

    #[test]
    fn inverted_steps_undo() {
        let d = doc(vec![p("hello"), p("world")]);
        let mut tr = Transform::new(d.clone());
        tr.delete_range(Pos::new([0], 2), Pos::new([1], 3)).unwrap();
        tr.add_mark(Pos::new([0], 0), Pos::new([0], 2), Mark::Strong).unwrap();
        tr.split(Pos::new([0], 1), 1).unwrap();
        let mut undo = Transform::new(tr.doc().clone());
        for step in tr.inverted_steps() {
            undo.step(step).unwrap();
        }
        assert_eq!(undo.doc(), &d);
    }

    #[test]
    fn map_through_accumulates() {
        let d = doc(vec![p("abcd")]);
        let mut tr = Transform::new(d);
        let slice = Slice::new(Fragment::inline(vec![Node::text("xy")]), 0, 0);
        tr.replace_range(Pos::new([0], 1), Pos::new([0], 1), slice).unwrap();
        tr.split(Pos::new([0], 2), 1).unwrap();
        // Bias decides which side of the insertion the boundary position follows,
        // and the split then routes the two sides into different nodes.
        assert_eq!(tr.map_through(&Pos::new([0], 1), -1).0, Pos::new([0], 1));
        assert_eq!(tr.map_through(&Pos::new([0], 1), 1).0, Pos::new([1], 1));
        assert_eq!(tr.map_through(&Pos::new([0], 2), 1).0, Pos::new([1], 2));
    }

    #[test]
    fn replace_range_block_fallback() {
        // Inserting a block into the middle of a paragraph splits it.
        let d = doc(vec![p("abcd")]);
        let mut tr = Transform::new(d);
        let slice = Slice::new(Fragment::new(vec![hr()]), 0, 0);
        tr.replace_range(Pos::new([0], 2), Pos::new([0], 2), slice).unwrap();
        assert_eq!(tr.doc(), &doc(vec![p("ab"), hr(), p("cd")]));
    }
}
