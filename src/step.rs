//! Atomic document changes. The six step kinds are a closed set; each one applies to
//! a document to produce a new document plus a [`PosMap`], and each can be inverted
//! against the document it applied to.
//!
//! `apply` returns `None` for structural failures (positions that don't fit the
//! document, schema violations). That's an expected outcome during rebasing, not an
//! error.

use crate::map::{MovedRange, PosMap, Remapping, ReplacedRange};
use crate::mark::{Mark, MarkSet};
use crate::node::{push_inline, Fragment, Node, Slice};
use crate::pos::{Path, Pos};
use crate::replace::apply_replace;
use crate::schema::{Attrs, NodeKind};

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Split the node at `pos.path` in two at `pos.offset`. The second half keeps
    /// the node's markup unless `retype` overrides it.
    Split { pos: Pos, retype: Option<(NodeKind, Attrs)> },
    /// Merge two adjacent siblings. `from` sits at the end of the first, `to` at
    /// the start of the second.
    Join { from: Pos, to: Pos },
    /// Rework the ancestry of the content `[from, to)` under a single parent: peel
    /// off `depth` levels of exactly-covering ancestors, then wrap in `types`
    /// (outermost first). `depth == 0` wraps in place; empty `types` lifts.
    Ancestor { from: Pos, to: Pos, depth: usize, types: Vec<(NodeKind, Attrs)> },
    AddMark { from: Pos, to: Pos, mark: Mark },
    RemoveMark { from: Pos, to: Pos, mark: Mark },
    /// Replace `[from, to)` with a slice. With `structure` set, the step refuses to
    /// overwrite any real content.
    Replace { from: Pos, to: Pos, slice: Slice, structure: bool },
}

#[derive(Debug, Clone)]
pub struct StepResult {
    pub doc: Node,
    pub map: PosMap,
}

impl StepResult {
    pub fn identity(doc: &Node) -> StepResult {
        StepResult { doc: doc.clone(), map: PosMap::identity() }
    }
}

impl Step {
    /// Apply to `doc`. `None` means the step doesn't fit this document.
    pub fn apply(&self, doc: &Node) -> Option<StepResult> {
        match self {
            Step::Split { pos, retype } => apply_split(doc, pos, retype.as_ref()),
            Step::Join { from, to } => apply_join(doc, from, to),
            Step::Ancestor { from, to, depth, types } => {
                apply_ancestor(doc, from, to, *depth, types)
            }
            Step::AddMark { from, to, mark } => apply_mark(doc, from, to, mark, true),
            Step::RemoveMark { from, to, mark } => apply_mark(doc, from, to, mark, false),
            Step::Replace { from, to, slice, structure } => {
                apply_replace(doc, from, to, slice, *structure)
            }
        }
    }

    /// The step that undoes this one, given the document it applied to and the map
    /// it produced.
    pub fn invert(&self, doc_before: &Node, map: &PosMap) -> Step {
        match self {
            Step::Split { pos, .. } => {
                let after = &map.replaced[0].after;
                Step::Join { from: after.0.clone(), to: after.1.clone() }
            }
            Step::Join { from, to } => {
                let second = doc_before.node_at(&to.path).expect("bad join step");
                let first = doc_before.node_at(&from.path).expect("bad join step");
                let retype = if first.same_markup(second) {
                    None
                } else {
                    Some((second.kind(), second.attrs().clone()))
                };
                Step::Split { pos: from.clone(), retype }
            }
            Step::Ancestor { from, to, depth, types } => {
                let base = &from.path;
                let peeled: Vec<(NodeKind, Attrs)> = (1..=*depth)
                    .map(|l| {
                        let n = doc_before
                            .node_at(&base[..base.len() - depth + l])
                            .expect("bad ancestor step");
                        (n.kind(), n.attrs().clone())
                    })
                    .collect();
                let dest = ancestor_dest(from, *depth, types.len());
                let size = to.offset - from.offset;
                Step::Ancestor {
                    from: dest.clone(),
                    to: Pos { path: dest.path.clone(), offset: dest.offset + size },
                    depth: types.len(),
                    types: peeled,
                }
            }
            Step::AddMark { from, to, mark } => {
                Step::RemoveMark { from: from.clone(), to: to.clone(), mark: mark.clone() }
            }
            Step::RemoveMark { from, to, mark } => {
                Step::AddMark { from: from.clone(), to: to.clone(), mark: mark.clone() }
            }
            Step::Replace { from, .. } => {
                let to_after = map
                    .replaced
                    .first()
                    .map(|r| r.after.1.clone())
                    .unwrap_or_else(|| from.clone());
                let (bf, bt) = map
                    .replaced
                    .first()
                    .map(|r| (r.before.0.clone(), r.before.1.clone()))
                    .unwrap_or_else(|| (from.clone(), from.clone()));
                Step::Replace {
                    from: from.clone(),
                    to: to_after,
                    slice: crate::node::slice_between(doc_before, &bf, &bt),
                    structure: false,
                }
            }
        }
    }

    /// Map this step through a remapping, for replaying it over other changes.
    /// `None` means every position the step touches was deleted.
    pub fn map_over(&self, remap: &Remapping) -> Option<Step> {
        match self {
            Step::Split { pos, retype } => {
                let (pos, del) = remap.map(pos, -1);
                if del { return None; }
                Some(Step::Split { pos, retype: retype.clone() })
            }
            Step::Join { from, to } => {
                let (from, d1) = remap.map(from, 1);
                let (to, d2) = remap.map(to, -1);
                if d1 && d2 { return None; }
                Some(Step::Join { from, to })
            }
            Step::Ancestor { from, to, depth, types } => {
                let (from, d1) = remap.map(from, 1);
                let (to, d2) = remap.map(to, -1);
                if d1 && d2 { return None; }
                Some(Step::Ancestor { from, to, depth: *depth, types: types.clone() })
            }
            Step::AddMark { from, to, mark } => {
                let (from, d1) = remap.map(from, 1);
                let (to, d2) = remap.map(to, -1);
                if d1 && d2 { return None; }
                Some(Step::AddMark { from, to, mark: mark.clone() })
            }
            Step::RemoveMark { from, to, mark } => {
                let (from, d1) = remap.map(from, 1);
                let (to, d2) = remap.map(to, -1);
                if d1 && d2 { return None; }
                Some(Step::RemoveMark { from, to, mark: mark.clone() })
            }
            Step::Replace { from, to, slice, structure } => {
                if from == to {
                    let (pos, del) = remap.map(from, -1);
                    if del { return None; }
                    Some(Step::Replace {
                        from: pos.clone(),
                        to: pos,
                        slice: slice.clone(),
                        structure: *structure,
                    })
                } else {
                    let (from, d1) = remap.map(from, 1);
                    let (to, d2) = remap.map(to, -1);
                    if d1 && d2 { return None; }
                    Some(Step::Replace { from, to, slice: slice.clone(), structure: *structure })
                }
            }
        }
    }
}

fn apply_split(doc: &Node, pos: &Pos, retype: Option<&(NodeKind, Attrs)>) -> Option<StepResult> {
    let (last, parent_path) = pos.path.split_last()?;
    let i = *last;
    let parent = doc.node_at(parent_path)?;
    let target = parent.children().get(i)?;
    if !matches!(target, Node::Block { .. }) { return None; }
    let size = target.size();
    let o = pos.offset;
    if o > size { return None; }

    let (c1, c2) = if target.is_textblock() {
        (target.fragment().cut_inline(0, o), target.fragment().cut_inline(o, size))
    } else {
        (target.fragment().cut(0, o), target.fragment().cut(o, target.children().len()))
    };
    let first = target.copy(c1);
    let (k2, a2) = match retype {
        Some((k, a)) => (*k, a.clone()),
        None => (target.kind(), target.attrs().clone()),
    };
    if !a2.fits(k2) { return None; }
    if !parent.kind().can_contain(k2) { return None; }
    if !content_fits(k2, &c2) { return None; }
    let second = Node::Block { kind: k2, attrs: a2, content: c2 };

    let new_parent = parent.copy(parent.fragment().splice(i, i + 1, vec![first, second]));
    let new_doc = doc.replace_at_path(parent_path, new_parent)?;

    let second_path: Path = parent_path.iter().copied().chain([i + 1]).collect();
    let mut map = PosMap::identity();
    if size - o > 0 {
        map.moved.push(MovedRange {
            start: pos.clone(),
            size: size - o,
            dest: Pos { path: second_path.clone(), offset: 0 },
        });
    }
    let rest = parent.size() - (i + 1);
    if rest > 0 {
        map.moved.push(MovedRange {
            start: Pos::new(parent_path, i + 1),
            size: rest,
            dest: Pos::new(parent_path, i + 2),
        });
    }
    map.replaced.push(ReplacedRange {
        before: (pos.clone(), pos.clone()),
        after: (pos.clone(), Pos { path: second_path, offset: 0 }),
    });
    Some(StepResult { doc: new_doc, map })
}

fn apply_join(doc: &Node, from: &Pos, to: &Pos) -> Option<StepResult> {
    let (fl, parent_path) = from.path.split_last()?;
    let (tl, tparent) = to.path.split_last()?;
    if parent_path != tparent || *tl != fl + 1 { return None; }
    let j = *fl;
    let parent = doc.node_at(parent_path)?;
    let first = parent.children().get(j)?;
    let second = parent.children().get(j + 1)?;
    if from.offset != first.size() || to.offset != 0 { return None; }
    // Joinable when the two nodes hold the same class of content. The merged node
    // keeps the first node's markup.
    if first.kind().contains() != second.kind().contains() { return None; }
    if first.kind().contains() == crate::schema::Contains::Nothing { return None; }
    if !first.is_textblock() {
        for c in second.children() {
            if !first.kind().can_contain(c.kind()) { return None; }
        }
    }

    let merged = first.copy(first.fragment().append(&second.fragment()));
    let new_parent = parent.copy(parent.fragment().splice(j, j + 2, vec![merged]));
    let new_doc = doc.replace_at_path(parent_path, new_parent)?;

    let mut map = PosMap::identity();
    if second.size() > 0 {
        map.moved.push(MovedRange {
            start: Pos { path: to.path.clone(), offset: 0 },
            size: second.size(),
            dest: Pos { path: from.path.clone(), offset: first.size() },
        });
    }
    let rest = parent.size() - (j + 2);
    if rest > 0 {
        map.moved.push(MovedRange {
            start: Pos::new(parent_path, j + 2),
            size: rest,
            dest: Pos::new(parent_path, j + 1),
        });
    }
    map.replaced.push(ReplacedRange {
        before: (from.clone(), to.clone()),
        after: (from.clone(), from.clone()),
    });
    Some(StepResult { doc: new_doc, map })
}

/// Where the moved content starts after an [`Step::Ancestor`] application.
fn ancestor_dest(from: &Pos, depth: usize, wrappers: usize) -> Pos {
    let base = &from.path;
    if depth == 0 {
        let mut path: Path = base.clone();
        path.push(from.offset);
        path.extend(std::iter::repeat(0).take(wrappers - 1));
        Pos { path, offset: 0 }
    } else if wrappers > 0 {
        let mut path: Path = Path::from_slice(&base[..base.len() - depth + 1]);
        path.extend(std::iter::repeat(0).take(wrappers - 1));
        Pos { path, offset: 0 }
    } else {
        Pos::new(&base[..base.len() - depth], base[base.len() - depth])
    }
}

fn apply_ancestor(
    doc: &Node, from: &Pos, to: &Pos, depth: usize, types: &[(NodeKind, Attrs)],
) -> Option<StepResult> {
    if from.path != to.path || from.offset > to.offset { return None; }
    if depth == 0 && types.is_empty() { return None; }
    let base = &from.path;
    if depth > base.len() { return None; }
    let parent = doc.node_at(base)?;
    let (f, t) = (from.offset, to.offset);
    if t > parent.size() { return None; }

    // Peeled levels must contain nothing but the peeled range.
    if depth >= 1 && (f != 0 || t != parent.size()) { return None; }
    for l in 2..=depth {
        let anc = doc.node_at(&base[..base.len() - l + 1])?;
        if anc.children().len() != 1 || base[base.len() - l + 1] != 0 { return None; }
    }

    let inner = if parent.is_textblock() {
        parent.fragment().cut_inline(f, t)
    } else {
        parent.fragment().cut(f, t)
    };

    // Wrap inside-out.
    let replacement: Vec<Node> = if types.is_empty() {
        // Lift. Every lifted child must fit the container.
        inner.children().to_vec()
    } else {
        let (ik, ia) = types.last().unwrap();
        if !ia.fits(*ik) || !content_fits(*ik, &inner) { return None; }
        let mut node = Node::block(*ik, ia.clone(), inner.clone());
        for (k, a) in types[..types.len() - 1].iter().rev() {
            if !a.fits(*k) || !k.can_contain(node.kind()) { return None; }
            node = Node::block(*k, a.clone(), Fragment::new(vec![node]));
        }
        vec![node]
    };

    let (host_path, lo, hi): (&[usize], usize, usize) = if depth == 0 {
        (&base[..], f, t)
    } else {
        let cut = base.len() - depth;
        (&base[..cut], base[cut], base[cut] + 1)
    };
    let host = doc.node_at(host_path)?;
    for n in &replacement {
        if !host.kind().can_contain(n.kind()) { return None; }
    }
    let new_host = host.copy(host.fragment().splice(lo, hi, replacement.clone()));
    let new_doc = doc.replace_at_path(host_path, new_host)?;

    let dest = ancestor_dest(from, depth, types.len());
    let mut map = PosMap::identity();
    if from != &dest && t > f {
        map.moved.push(MovedRange { start: from.clone(), size: t - f, dest: dest.clone() });
    }
    let shift = replacement.len() as isize - (hi - lo) as isize;
    let trailing = host.size() - hi;
    if shift != 0 && trailing > 0 {
        map.moved.push(MovedRange {
            start: Pos::new(host_path, hi),
            size: trailing,
            dest: Pos::new(host_path, (hi as isize + shift) as usize),
        });
    }
    let dest_end = Pos { path: dest.path.clone(), offset: dest.offset + (t - f) };
    if from != &dest {
        map.replaced.push(ReplacedRange {
            before: (from.clone(), from.clone()),
            after: (dest.clone(), dest.clone()),
        });
    }
    if to != &dest_end {
        map.replaced.push(ReplacedRange {
            before: (to.clone(), to.clone()),
            after: (dest_end.clone(), dest_end),
        });
    }
    Some(StepResult { doc: new_doc, map })
}

fn content_fits(kind: NodeKind, content: &Fragment) -> bool {
    content.children().iter().all(|c| {
        kind.can_contain(c.kind())
            && (kind.contains() != crate::schema::Contains::PlainText
                || c.marks().map_or(true, |m| m.is_empty()))
    })
}

fn apply_mark(doc: &Node, from: &Pos, to: &Pos, mark: &Mark, add: bool) -> Option<StepResult> {
    if !doc.valid_pos(from) || !doc.valid_pos(to) || from > to {
        return None;
    }
    let new_doc = mark_walk(doc, Some(from), Some(to), 0, mark, add);
    Some(StepResult { doc: new_doc, map: PosMap::identity() })
}

fn mark_bound(pos: Option<&Pos>, depth: usize, default: usize) -> usize {
    match pos {
        None => default,
        Some(p) => p.index(depth.min(p.depth())),
    }
}

fn mark_walk(
    node: &Node, from: Option<&Pos>, to: Option<&Pos>, depth: usize, mark: &Mark, add: bool,
) -> Node {
    if node.is_textblock() {
        if !node.kind().allows_marks() { return node.clone(); }
        let lo = mark_bound(from, depth, 0);
        let hi = mark_bound(to, depth, node.size()).min(node.size());
        if lo >= hi { return node.clone(); }
        return node.copy(mark_inline(&node.fragment(), lo, hi, mark, add));
    }
    let lo = mark_bound(from, depth, 0);
    let hi = mark_bound(to, depth, usize::MAX);
    let to_deep = to.map_or(true, |p| p.depth() > depth);
    let mut changed = false;
    let mut out: Vec<Node> = Vec::with_capacity(node.children().len());
    for (i, child) in node.children().iter().enumerate() {
        if i < lo || i > hi || (i == hi && !to_deep) {
            out.push(child.clone());
            continue;
        }
        let child_from = from.filter(|p| p.depth() > depth && p.path[depth] == i);
        let child_to = to.filter(|p| p.depth() > depth && p.path[depth] == i);
        let new_child = mark_walk(child, child_from, child_to, depth + 1, mark, add);
        changed |= new_child != *child;
        out.push(new_child);
    }
    if changed { node.copy(Fragment::new(out)) } else { node.clone() }
}

fn mark_inline(frag: &Fragment, lo: usize, hi: usize, mark: &Mark, add: bool) -> Fragment {
    let mut out: Vec<Node> = Vec::new();
    let mut off = 0;
    for child in frag.children() {
        let size = child.inline_size();
        let (s, e) = (off, off + size);
        off = e;
        if e <= lo || s >= hi {
            push_inline(&mut out, child.clone());
            continue;
        }
        let marks = child.marks().cloned().unwrap_or_else(MarkSet::none);
        let updated = if add { marks.add(mark.clone()) } else { marks.remove(mark) };
        match child {
            Node::Text { text, marks } => {
                let a = lo.saturating_sub(s);
                let b = (hi - s).min(size);
                let at = |i| str_indices::chars::to_byte_idx(text, i);
                if a > 0 {
                    push_inline(&mut out, Node::text_with(&text[..at(a)], marks.clone()));
                }
                push_inline(&mut out, Node::text_with(&text[at(a)..at(b)], updated));
                if b < size {
                    push_inline(&mut out, Node::text_with(&text[at(b)..], marks.clone()));
                }
            }
            _ => push_inline(&mut out, child.with_marks(updated)),
        }
    }
    Fragment::new(out)
}
