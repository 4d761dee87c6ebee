//! The document tree. Nodes are immutable values; every edit builds a new tree that
//! shares all untouched subtrees with the old one (children live behind an `Rc`, so
//! "copy the spine, reuse the rest" is the only edit pattern).
//!
//! Inline content obeys one normalization invariant everywhere: two adjacent text
//! runs with the same mark set are always merged into one. Every constructor that
//! builds textblock content enforces it, so step code never has to think about it.

use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use smartstring::alias::String as SmartString;
use str_indices::chars;

use crate::mark::MarkSet;
use crate::pos::{Path, Pos};
use crate::schema::{Attrs, Contains, NodeKind};

#[derive(Clone, Eq, PartialEq)]
pub enum Node {
    Block { kind: NodeKind, attrs: Attrs, content: Fragment },
    Text { text: SmartString, marks: MarkSet },
    /// Inline leaves (image, hard break). Inline size 1.
    Inline { kind: NodeKind, attrs: Attrs, marks: MarkSet },
}

#[derive(Clone, Eq, PartialEq)]
pub struct Fragment {
    children: Rc<[Node]>,
}

impl Default for Fragment {
    fn default() -> Self { Fragment::empty() }
}

impl Fragment {
    pub fn empty() -> Fragment {
        Fragment { children: Vec::new().into() }
    }

    pub fn new(children: Vec<Node>) -> Fragment {
        Fragment { children: children.into() }
    }

    /// Build inline content, merging adjacent same-marked text runs and dropping
    /// empty ones.
    pub fn inline(children: Vec<Node>) -> Fragment {
        let mut out: Vec<Node> = Vec::with_capacity(children.len());
        for child in children {
            push_inline(&mut out, child);
        }
        Fragment::new(out)
    }

    pub fn children(&self) -> &[Node] { &self.children }
    pub fn len(&self) -> usize { self.children.len() }
    pub fn is_empty(&self) -> bool { self.children.is_empty() }
    pub fn get(&self, i: usize) -> Option<&Node> { self.children.get(i) }

    /// Total inline size: characters plus one per inline leaf.
    pub fn inline_size(&self) -> usize {
        self.children.iter().map(|c| c.inline_size()).sum()
    }

    /// Children `[from, to)` by child index.
    pub fn cut(&self, from: usize, to: usize) -> Fragment {
        Fragment::new(self.children[from..to].to_vec())
    }

    /// Inline content between two inline offsets, splitting text runs at the edges.
    pub fn cut_inline(&self, from: usize, to: usize) -> Fragment {
        let mut out = Vec::new();
        let mut off = 0;
        for child in self.children.iter() {
            let size = child.inline_size();
            let (start, end) = (off, off + size);
            off = end;
            if end <= from || start >= to || size == 0 {
                continue;
            }
            let s = from.saturating_sub(start);
            let e = (to - start).min(size);
            if s == 0 && e == size {
                out.push(child.clone());
            } else if let Node::Text { text, marks } = child {
                out.push(Node::text_with(slice_chars(text, s, e), marks.clone()));
            }
            // A partial overlap with a size-1 leaf can't happen: s == 0 && e == 1.
        }
        Fragment::inline(out)
    }

    /// Concatenate, merging text runs at the seam.
    pub fn append(&self, other: &Fragment) -> Fragment {
        if other.is_empty() { return self.clone(); }
        if self.is_empty() { return other.clone(); }
        let mut out = self.children.to_vec();
        for child in other.children.iter() {
            push_inline(&mut out, child.clone());
        }
        Fragment::new(out)
    }

    pub fn replace_child(&self, i: usize, node: Node) -> Fragment {
        let mut out = self.children.to_vec();
        out[i] = node;
        Fragment::new(out)
    }

    /// Replace children `[from, to)` with `with`.
    pub fn splice(&self, from: usize, to: usize, with: Vec<Node>) -> Fragment {
        let mut out = self.children[..from].to_vec();
        out.extend(with);
        out.extend_from_slice(&self.children[to..]);
        Fragment::new(out)
    }

    /// Inline offset -> (child index, offset inside that child). An offset landing
    /// exactly between children resolves to the start of the later child.
    pub fn find_inline(&self, offset: usize) -> (usize, usize) {
        let mut off = 0;
        for (i, child) in self.children.iter().enumerate() {
            let size = child.inline_size();
            if offset < off + size {
                return (i, offset - off);
            }
            off += size;
        }
        (self.children.len(), 0)
    }
}

/// Push an inline node, merging with the previous text run when the mark sets match.
pub(crate) fn push_inline(out: &mut Vec<Node>, node: Node) {
    match &node {
        Node::Text { text, marks } => {
            if text.is_empty() { return; }
            if let Some(Node::Text { text: prev, marks: prev_marks }) = out.last_mut() {
                if prev_marks == marks {
                    prev.push_str(text);
                    return;
                }
            }
            out.push(node);
        }
        _ => out.push(node),
    }
}

fn slice_chars(s: &str, from: usize, to: usize) -> &str {
    let b0 = chars::to_byte_idx(s, from);
    let b1 = chars::to_byte_idx(s, to);
    &s[b0..b1]
}

/// Passed back by `nodes_between` visitors to control descent.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Visit {
    Descend,
    Skip,
}

impl Node {
    pub fn block(kind: NodeKind, attrs: Attrs, content: Fragment) -> Node {
        debug_assert!(attrs.fits(kind), "attrs don't fit {:?}", kind);
        let content = if kind.is_textblock() {
            Fragment::inline(content.children.to_vec())
        } else {
            content
        };
        Node::Block { kind, attrs, content }
    }

    pub fn text(text: &str) -> Node {
        Node::Text { text: text.into(), marks: MarkSet::none() }
    }

    pub fn text_with(text: &str, marks: MarkSet) -> Node {
        Node::Text { text: text.into(), marks }
    }

    pub fn inline_leaf(kind: NodeKind, attrs: Attrs) -> Node {
        debug_assert!(kind.class() == crate::schema::KindClass::Inline && kind != NodeKind::Text);
        Node::Inline { kind, attrs, marks: MarkSet::none() }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Block { kind, .. } | Node::Inline { kind, .. } => *kind,
            Node::Text { .. } => NodeKind::Text,
        }
    }

    pub fn attrs(&self) -> &Attrs {
        const NONE: &Attrs = &Attrs::None;
        match self {
            Node::Block { attrs, .. } | Node::Inline { attrs, .. } => attrs,
            Node::Text { .. } => NONE,
        }
    }

    pub fn marks(&self) -> Option<&MarkSet> {
        match self {
            Node::Text { marks, .. } | Node::Inline { marks, .. } => Some(marks),
            Node::Block { .. } => None,
        }
    }

    pub fn with_marks(&self, marks: MarkSet) -> Node {
        match self {
            Node::Text { text, .. } => Node::Text { text: text.clone(), marks },
            Node::Inline { kind, attrs, .. } => {
                Node::Inline { kind: *kind, attrs: attrs.clone(), marks }
            }
            Node::Block { .. } => self.clone(),
        }
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Node::Block { content, .. } => content.children(),
            _ => &[],
        }
    }

    pub fn fragment(&self) -> Fragment {
        match self {
            Node::Block { content, .. } => content.clone(),
            _ => Fragment::empty(),
        }
    }

    pub fn is_text(&self) -> bool { matches!(self, Node::Text { .. }) }

    pub fn is_textblock(&self) -> bool {
        matches!(self, Node::Block { kind, .. } if kind.is_textblock())
    }

    pub fn text_str(&self) -> Option<&str> {
        match self {
            Node::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Size as a child of a textblock: character count for text, 1 for leaves.
    pub fn inline_size(&self) -> usize {
        match self {
            Node::Text { text, .. } => chars::count(text),
            Node::Inline { .. } => 1,
            Node::Block { .. } => 0,
        }
    }

    /// Maximum position offset inside this node: inline size for textblocks, child
    /// count for other blocks, 0 for leaves.
    pub fn size(&self) -> usize {
        match self {
            Node::Block { kind, content, .. } => {
                if kind.is_textblock() { content.inline_size() } else { content.len() }
            }
            _ => 0,
        }
    }

    /// Same kind and same attributes.
    pub fn same_markup(&self, other: &Node) -> bool {
        self.kind() == other.kind() && self.attrs() == other.attrs()
    }

    /// Shallow copy with replaced content.
    pub fn copy(&self, content: Fragment) -> Node {
        match self {
            Node::Block { kind, attrs, .. } => Node::block(*kind, attrs.clone(), content),
            _ => self.clone(),
        }
    }

    pub fn node_at(&self, path: &[usize]) -> Option<&Node> {
        let mut node = self;
        for &i in path {
            node = node.children().get(i)?;
        }
        Some(node)
    }

    /// Whether `pos` addresses a real place in this tree: the path lands on a block
    /// node and the offset is within its size.
    pub fn valid_pos(&self, pos: &Pos) -> bool {
        match self.node_at(&pos.path) {
            Some(n @ Node::Block { .. }) => pos.offset <= n.size(),
            _ => false,
        }
    }

    /// Rebuild the spine down `path`, substituting `node` at the end.
    pub fn replace_at_path(&self, path: &[usize], node: Node) -> Option<Node> {
        match path.split_first() {
            None => Some(node),
            Some((&i, rest)) => {
                let child = self.children().get(i)?;
                let new_child = child.replace_at_path(rest, node)?;
                Some(self.copy(self.fragment().replace_child(i, new_child)))
            }
        }
    }

    /// Everything in this node up to `pos`, spine preserved.
    pub fn cut_before(&self, pos: &Pos, depth: usize) -> Option<Node> {
        if depth == pos.depth() {
            let frag = if self.is_textblock() {
                self.fragment().cut_inline(0, pos.offset)
            } else {
                self.fragment().cut(0, pos.offset.min(self.children().len()))
            };
            Some(self.copy(frag))
        } else {
            let i = pos.path[depth];
            let child = self.children().get(i)?;
            let mut out = self.children()[..i].to_vec();
            out.push(child.cut_before(pos, depth + 1)?);
            Some(self.copy(Fragment::new(out)))
        }
    }

    /// Everything in this node from `pos` on, spine preserved.
    pub fn cut_after(&self, pos: &Pos, depth: usize) -> Option<Node> {
        if depth == pos.depth() {
            let frag = if self.is_textblock() {
                self.fragment().cut_inline(pos.offset, self.size())
            } else {
                self.fragment().cut(pos.offset.min(self.children().len()), self.children().len())
            };
            Some(self.copy(frag))
        } else {
            let i = pos.path[depth];
            let child = self.children().get(i)?;
            let mut out = vec![child.cut_after(pos, depth + 1)?];
            out.extend_from_slice(&self.children()[i + 1..]);
            Some(self.copy(Fragment::new(out)))
        }
    }

    /// Depth-first walk of the nodes overlapping `(from, to)`. The visitor gets each
    /// node and the path to it; returning [`Visit::Skip`] prunes the subtree.
    pub fn nodes_between<F>(&self, from: &Pos, to: &Pos, f: &mut F)
    where F: FnMut(&Node, &Path) -> Visit {
        let mut path = Path::new();
        self.walk_between(Some(from), Some(to), 0, &mut path, f);
    }

    fn walk_between<F>(&self, from: Option<&Pos>, to: Option<&Pos>, depth: usize,
                       path: &mut Path, f: &mut F)
    where F: FnMut(&Node, &Path) -> Visit {
        let lo = boundary(from, depth, 0);
        let hi = boundary(to, depth, usize::MAX);
        if self.is_textblock() {
            let mut off = 0;
            for child in self.children() {
                let size = child.inline_size();
                if off < hi.min(self.size()) && off + size > lo {
                    f(child, path);
                }
                off += size;
            }
            return;
        }
        // A deeper boundary includes the child it descends into; a same-depth one
        // doesn't.
        let to_deep = to.map_or(true, |p| p.depth() > depth);
        for (i, child) in self.children().iter().enumerate() {
            if i < lo { continue; }
            if i > hi || (i == hi && !to_deep) { break; }
            let child_from = from.filter(|p| p.depth() > depth && p.path[depth] == i);
            let child_to = to.filter(|p| p.depth() > depth && p.path[depth] == i);
            path.push(i);
            if f(child, path) == Visit::Descend {
                child.walk_between(child_from, child_to, depth + 1, path, f);
            }
            path.pop();
        }
    }

    /// Concatenated text content; inline leaves contribute nothing.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Node::Text { text, .. } => out.push_str(text),
            _ => {
                for child in self.children() {
                    child.collect_text(out);
                }
            }
        }
    }

    /// Deep validation of the tree invariants. Panics on violation; meant for tests
    /// and debug assertions.
    pub fn check(&self) {
        match self {
            Node::Text { text, .. } => {
                assert!(!text.is_empty(), "empty text node");
            }
            Node::Inline { .. } => {}
            Node::Block { kind, attrs, content } => {
                assert!(attrs.fits(*kind), "attrs {:?} don't fit {:?}", attrs, kind);
                let mut prev_text_marks: Option<&MarkSet> = None;
                for child in content.children() {
                    assert!(
                        kind.can_contain(child.kind()),
                        "{:?} can't contain {:?}", kind, child.kind()
                    );
                    if kind.contains() == Contains::PlainText {
                        assert!(
                            child.marks().map_or(true, |m| m.is_empty()),
                            "marked text in plain-text block"
                        );
                    }
                    match child {
                        Node::Text { marks, .. } => {
                            if let Some(prev) = prev_text_marks {
                                assert_ne!(prev, marks, "unmerged adjacent text runs");
                            }
                            prev_text_marks = Some(marks);
                        }
                        _ => prev_text_marks = None,
                    }
                    child.check();
                }
            }
        }
    }
}

fn boundary(pos: Option<&Pos>, depth: usize, default: usize) -> usize {
    match pos {
        None => default,
        Some(p) => p.index(depth.min(p.depth())),
    }
}

/// A piece of document content plus how many levels of its left/right edge nodes are
/// "open": joinable with surrounding content rather than literal new nodes.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Slice {
    pub content: Fragment,
    pub open_left: usize,
    pub open_right: usize,
}

impl Slice {
    pub fn empty() -> Slice {
        Slice { content: Fragment::empty(), open_left: 0, open_right: 0 }
    }

    pub fn new(content: Fragment, open_left: usize, open_right: usize) -> Slice {
        Slice { content, open_left, open_right }
    }

    pub fn is_empty(&self) -> bool { self.content.is_empty() }
}

/// The content between two positions as a [`Slice`], spine wrappers preserved and
/// marked open on both sides. The slice content sits at the depth where the two
/// paths diverge.
pub fn slice_between(doc: &Node, from: &Pos, to: &Pos) -> Slice {
    debug_assert!(from <= to);
    let root = from.common_depth(to);
    let node = doc.node_at(&from.path[..root]).expect("bad position");
    let content = content_between(node, from, to, root);
    Slice::new(content, from.depth() - root, to.depth() - root)
}

/// The pieces of `node` between two positions, edge spines preserved.
pub(crate) fn content_between(node: &Node, from: &Pos, to: &Pos, depth: usize) -> Fragment {
    if node.is_textblock() {
        return node.fragment().cut_inline(from.index(depth), to.index(depth));
    }
    let mut out = Vec::new();
    let (mut lo, hi);
    if from.depth() > depth {
        let i = from.path[depth];
        if let Some(child) = node.children().get(i) {
            if let Some(cut) = child.cut_after(from, depth + 1) {
                out.push(cut);
            }
        }
        lo = i + 1;
    } else {
        lo = from.offset;
    }
    if to.depth() > depth {
        hi = to.path[depth];
    } else {
        hi = to.offset;
    }
    lo = lo.min(node.children().len());
    for child in &node.children()[lo..hi.min(node.children().len()).max(lo)] {
        out.push(child.clone());
    }
    if to.depth() > depth {
        if let Some(child) = node.children().get(to.path[depth]) {
            if let Some(cut) = child.cut_before(to, depth + 1) {
                out.push(cut);
            }
        }
    }
    Fragment::new(out)
}

/// True when the gap between `from` and `to` contains no content, only node
/// boundaries: `from` sits at the end of everything below the divergence point and
/// `to` at the start, with the two spines adjacent there.
pub fn gap_is_structure(doc: &Node, from: &Pos, to: &Pos) -> bool {
    if from > to { return false; }
    let root = from.common_depth(to);
    for d in root + 1..=from.depth() {
        let node = match doc.node_at(&from.path[..d]) {
            Some(n) => n,
            None => return false,
        };
        if from.index(d) != node.size() { return false; }
    }
    for d in root + 1..=to.depth() {
        if to.index(d) != 0 { return false; }
    }
    // At the divergence depth the right boundary must directly follow the left.
    let left = if from.depth() > root { from.path[root] + 1 } else { from.offset };
    let right = to.index(root);
    left == right
}

impl Debug for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::Text { text, marks } => {
                if marks.is_empty() {
                    write!(f, "{:?}", text.as_str())
                } else {
                    write!(f, "{:?}{:?}", text.as_str(), marks)
                }
            }
            Node::Inline { kind, .. } => write!(f, "{}", kind.name()),
            Node::Block { kind, attrs, content } => {
                write!(f, "{}", kind.name())?;
                if *attrs != Attrs::None {
                    write!(f, "[{:?}]", attrs)?;
                }
                f.debug_list().entries(content.children().iter()).finish()
            }
        }
    }
}

impl Debug for Fragment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.children.iter()).finish()
    }
}
