//! The general replace operation: cut the gap between two positions out of the tree
//! and stitch a slice into it, merging the slice's open edges with the cut edges.
//!
//! The slice content gets wrapped in single-child copies of the left spine so that
//! document and replacement can be walked as two trees of the same shape. The merge
//! is a three-way zip of left frontier, wrapper, and right frontier; once one side's
//! frontier bottoms out it degrades to a two-way join. Frontier nodes that hold
//! different content classes aren't merged at all; both are kept as siblings.

use crate::map::{MovedRange, PosMap, ReplacedRange};
use crate::node::{content_between, gap_is_structure, Fragment, Node, Slice};
use crate::pos::{Path, Pos};
use crate::schema::Contains;
use crate::step::StepResult;

pub(crate) fn apply_replace(
    doc: &Node, from: &Pos, to: &Pos, slice: &Slice, structure: bool,
) -> Option<StepResult> {
    if from > to || !doc.valid_pos(from) || !doc.valid_pos(to) {
        return None;
    }
    if structure && !gap_is_structure(doc, from, to) {
        return None;
    }
    if slice.is_empty() && slice.open_left == 0 && slice.open_right == 0 {
        if from == to {
            return Some(StepResult::identity(doc));
        }
        let mut joined = join_two(doc, doc, from, to, 0)?;
        debug_assert_eq!(joined.len(), 1);
        let new_doc = joined.pop()?;
        let map = frontier_map(doc, &new_doc, from, to, from.common_depth(to));
        return Some(StepResult { doc: new_doc, map });
    }

    let d0 = from.depth().checked_sub(slice.open_left)?;
    if to.depth().checked_sub(slice.open_right)? != d0 {
        return None;
    }
    let (wrapper, start, end) = prepare_slice(doc, from, to, slice, d0)?;
    let mut merged = three_way(doc, doc, &wrapper, from, &start, &end, to, 0)?;
    debug_assert_eq!(merged.len(), 1);
    let new_doc = merged.pop()?;
    let dtop = from.common_depth(to).min(d0);
    let map = frontier_map(doc, &new_doc, from, to, dtop);
    Some(StepResult { doc: new_doc, map })
}

/// Build the wrapper tree: the slice content under a copy of the node it lands in,
/// under single-child copies of the spine above. Returns the wrapper root and the
/// start/end positions of the slice content within it.
fn prepare_slice(
    doc: &Node, from: &Pos, to: &Pos, slice: &Slice, d0: usize,
) -> Option<(Node, Pos, Pos)> {
    let holder = doc.node_at(&from.path[..d0])?;
    let mut node = close(holder, slice.content.clone())?;

    // Both open spines must exist and consist of block nodes.
    let mut cur = &node;
    for _ in 0..slice.open_left {
        cur = cur.children().first()?;
        if !matches!(cur, Node::Block { .. }) {
            return None;
        }
    }
    let start = Pos { path: std::iter::repeat(0).take(from.depth()).collect(), offset: 0 };

    let mut end_path: Path = std::iter::repeat(0).take(d0).collect();
    let mut cur = &node;
    for _ in 0..slice.open_right {
        let i = cur.children().len().checked_sub(1)?;
        end_path.push(i);
        cur = cur.children().get(i)?;
        if !matches!(cur, Node::Block { .. }) {
            return None;
        }
    }
    let end = Pos { path: end_path, offset: cur.size() };
    debug_assert_eq!(end.depth(), to.depth());

    for i in (0..d0).rev() {
        node = doc.node_at(&from.path[..i])?.copy(Fragment::new(vec![node]));
    }
    Some((node, start, end))
}

fn joinable(a: &Node, b: &Node) -> bool {
    let c = a.kind().contains();
    c == b.kind().contains() && c != Contains::Nothing
}

fn close(shape: &Node, content: Fragment) -> Option<Node> {
    let kind = shape.kind();
    for child in content.children() {
        if !kind.can_contain(child.kind()) {
            return None;
        }
        if kind.contains() == Contains::PlainText
            && child.marks().map_or(false, |m| !m.is_empty())
        {
            return None;
        }
    }
    Some(shape.copy(content))
}

/// Merge the part of `a` before `from` with the part of `b` after `to`. Joinable
/// frontiers merge into one node (keeping `a`'s markup); incompatible ones stay two.
fn join_two(a: &Node, b: &Node, from: &Pos, to: &Pos, depth: usize) -> Option<Vec<Node>> {
    if !joinable(a, b) {
        return Some(vec![a.cut_before(from, depth)?, b.cut_after(to, depth)?]);
    }
    if a.is_textblock() {
        let frag = a
            .fragment()
            .cut_inline(0, from.index(depth))
            .append(&b.fragment().cut_inline(to.index(depth), b.size()));
        return Some(vec![close(a, frag)?]);
    }
    let fd = from.depth() > depth;
    let td = to.depth() > depth;
    let fi = from.index(depth);
    let ti = to.index(depth);
    let mut out: Vec<Node> = a.children()[..fi.min(a.children().len())].to_vec();
    match (fd, td) {
        (true, true) => {
            out.extend(join_two(a.children().get(fi)?, b.children().get(ti)?, from, to, depth + 1)?);
        }
        (true, false) => {
            out.push(a.children().get(fi)?.cut_before(from, depth + 1)?);
        }
        (false, true) => {
            out.push(b.children().get(ti)?.cut_after(to, depth + 1)?);
        }
        (false, false) => {}
    }
    let tail = ti + td as usize;
    out.extend_from_slice(&b.children()[tail.min(b.children().len())..]);
    Some(vec![close(a, Fragment::new(out))?])
}

/// Merge `l` before `from`, the wrapper content between `start` and `end`, and `r`
/// after `to`, shaped like `l` where the frontiers are compatible.
#[allow(clippy::too_many_arguments)]
fn three_way(
    l: &Node, r: &Node, w: &Node,
    from: &Pos, start: &Pos, end: &Pos, to: &Pos, depth: usize,
) -> Option<Vec<Node>> {
    if !joinable(l, w) || !joinable(w, r) {
        let mut out = vec![l.cut_before(from, depth)?];
        out.extend(content_between(w, start, end, depth).children().iter().cloned());
        out.push(r.cut_after(to, depth)?);
        return Some(out);
    }
    if l.is_textblock() {
        let frag = l
            .fragment()
            .cut_inline(0, from.index(depth))
            .append(&w.fragment().cut_inline(start.index(depth), end.index(depth)))
            .append(&r.fragment().cut_inline(to.index(depth), r.size()));
        return Some(vec![close(l, frag)?]);
    }
    let fd = from.depth() > depth;
    let td = to.depth() > depth;
    let fi = from.index(depth);
    let ti = to.index(depth);
    let wlen = w.children().len();
    let mut out: Vec<Node> = l.children()[..fi.min(l.children().len())].to_vec();
    match (fd, td) {
        (true, true) => {
            let sd = start.path[depth];
            let ed = end.path[depth];
            if sd == ed {
                out.extend(three_way(
                    l.children().get(fi)?, r.children().get(ti)?, w.children().get(sd)?,
                    from, start, end, to, depth + 1,
                )?);
            } else {
                out.extend(join_two(l.children().get(fi)?, w.children().get(sd)?, from, start, depth + 1)?);
                out.extend_from_slice(&w.children()[sd + 1..ed]);
                out.extend(join_two(w.children().get(ed)?, r.children().get(ti)?, end, to, depth + 1)?);
            }
        }
        (true, false) => {
            let sd = start.path[depth];
            out.extend(join_two(l.children().get(fi)?, w.children().get(sd)?, from, start, depth + 1)?);
            out.extend_from_slice(&w.children()[(sd + 1).min(wlen)..end.index(depth).min(wlen)]);
        }
        (false, true) => {
            let ed = end.path[depth];
            out.extend_from_slice(&w.children()[start.index(depth).min(wlen)..ed]);
            out.extend(join_two(w.children().get(ed)?, r.children().get(ti)?, end, to, depth + 1)?);
        }
        (false, false) => {
            out.extend_from_slice(
                &w.children()[start.index(depth).min(wlen)..end.index(depth).min(wlen)],
            );
        }
    }
    let tail = ti + td as usize;
    out.extend_from_slice(&r.children()[tail.min(r.children().len())..]);
    Some(vec![close(l, Fragment::new(out))?])
}

/// Build the step map by walking the right frontier: at each level along `to`'s
/// path, the siblings after the cut moved to sit after the merged content in the
/// new tree.
fn frontier_map(old: &Node, new: &Node, from: &Pos, to: &Pos, dtop: usize) -> PosMap {
    let mut map = PosMap::identity();
    let mut new_path: Path = Path::from_slice(&to.path[..dtop.min(to.depth())]);
    let mut inserted_end = from.clone();
    for level in dtop..=to.depth() {
        let old_node = match old.node_at(&to.path[..level]) {
            Some(n) => n,
            None => break,
        };
        let new_node = match new.node_at(&new_path) {
            Some(n) => n,
            None => break,
        };
        let b = if level < to.depth() { to.path[level] + 1 } else { to.offset };
        let trailing = old_node.size().saturating_sub(b);
        let e = new_node.size().saturating_sub(trailing);
        if trailing > 0 && (new_path[..] != to.path[..level] || e != b) {
            map.moved.push(MovedRange {
                start: Pos::new(&to.path[..level], b),
                size: trailing,
                dest: Pos::new(&new_path, e),
            });
        }
        if level == to.depth() {
            inserted_end = Pos::new(&new_path, e);
        } else {
            match e.checked_sub(1) {
                Some(i) => new_path.push(i),
                None => {
                    inserted_end = Pos::new(&new_path, 0);
                    break;
                }
            }
        }
    }
    if !(from == to && from == &inserted_end) {
        map.replaced.push(ReplacedRange {
            before: (from.clone(), to.clone()),
            after: (from.clone(), inserted_end),
        });
    }
    map
}
