use std::cmp::Ordering;
use std::fmt::{Debug, Formatter};
use smallvec::SmallVec;
use serde::{Deserialize, Serialize};

/// Child indices walked from the document root. Most positions in real documents are
/// at most a few levels deep, so keep the path inline.
pub type Path = SmallVec<[usize; 4]>;

/// A position in a document tree. `path[i]` is the child index entered at depth `i`;
/// `offset` addresses within the final node the path lands on - a child index for
/// ordinary block nodes, an inline offset (1 per character, 1 per inline leaf) for
/// textblocks. Paths never descend into inline content; a textblock is as deep as a
/// path goes.
///
/// Positions are plain values. They're only meaningful relative to the document they
/// were computed against - mapping them through [`PosMap`](crate::map::PosMap)s is how
/// they survive edits. Comparing positions taken from unrelated documents gives an
/// answer, but not a useful one; that's on the caller.
#[derive(Clone, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
pub struct Pos {
    pub path: Path,
    pub offset: usize,
}

impl Pos {
    pub fn new<P: AsRef<[usize]>>(path: P, offset: usize) -> Self {
        Pos { path: Path::from_slice(path.as_ref()), offset }
    }

    /// A position at the document root: `offset` indexes the root's children.
    pub fn at(offset: usize) -> Self {
        Pos { path: Path::new(), offset }
    }

    pub fn depth(&self) -> usize { self.path.len() }

    /// The child index (or final offset) this position takes at `depth`.
    /// `depth` must be ≤ `self.depth()`.
    pub fn index(&self, depth: usize) -> usize {
        if depth < self.path.len() {
            self.path[depth]
        } else {
            debug_assert_eq!(depth, self.path.len());
            self.offset
        }
    }

    /// Drop path entries below `depth`; the entry at `depth` becomes the offset.
    pub fn shorten(&self, depth: usize) -> Pos {
        if depth >= self.path.len() {
            self.clone()
        } else {
            Pos::new(&self.path[..depth], self.path[depth])
        }
    }

    /// Push the current offset onto the path and descend with a new offset.
    pub fn extend(&self, offset: usize) -> Pos {
        let mut path = self.path.clone();
        path.push(self.offset);
        Pos { path, offset }
    }

    /// Length of the shared path prefix with `other`.
    pub fn common_depth(&self, other: &Pos) -> usize {
        let mut d = 0;
        while d < self.path.len() && d < other.path.len() && self.path[d] == other.path[d] {
            d += 1;
        }
        d
    }
}

impl Ord for Pos {
    fn cmp(&self, other: &Self) -> Ordering {
        let (la, lb) = (self.path.len(), other.path.len());
        let end = la.min(lb);
        for i in 0..end {
            match self.path[i].cmp(&other.path[i]) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        if la > lb {
            // `other` stops at this depth. If its offset is at or before the child we
            // descend into, we're past it.
            if other.offset <= self.path[end] { Ordering::Greater } else { Ordering::Less }
        } else if lb > la {
            if self.offset <= other.path[end] { Ordering::Less } else { Ordering::Greater }
        } else {
            self.offset.cmp(&other.offset)
        }
    }
}

impl PartialOrd for Pos {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Debug for Pos {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "P")?;
        for p in &self.path { write!(f, "{}/", p)?; }
        write!(f, "{}", self.offset)
    }
}

/// A position encoded relative to an anchor it compares ≥ to. Used by
/// [`Recover`](crate::map::Recover) so a position swallowed by a deletion can be
/// re-expressed against the corresponding re-insertion point.
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct RelPos {
    /// Depth at which the position diverges from the anchor.
    depth: usize,
    /// How far past the anchor's index at that depth.
    delta: usize,
    /// Remaining path entries below the divergence.
    tail: Path,
    /// Final offset, when the position is deeper than the divergence depth.
    offset: Option<usize>,
}

impl RelPos {
    /// Encode `pos` relative to `base`. Requires `base <= pos`.
    pub(crate) fn encode(pos: &Pos, base: &Pos) -> RelPos {
        debug_assert!(base <= pos);
        let d = pos.common_depth(base).min(pos.depth()).min(base.depth());
        let bidx = base.index(d);
        let pidx = pos.index(d);
        debug_assert!(pidx >= bidx);
        if pos.depth() > d {
            RelPos {
                depth: d,
                delta: pidx - bidx,
                tail: Path::from_slice(&pos.path[d + 1..]),
                offset: Some(pos.offset),
            }
        } else {
            RelPos { depth: d, delta: pidx - bidx, tail: Path::new(), offset: None }
        }
    }

    /// Re-anchor at `anchor`. When the anchor has a different shape than the original
    /// base the result is a best-effort placement, not an exact one.
    pub(crate) fn resolve(&self, anchor: &Pos) -> Pos {
        let d = self.depth.min(anchor.depth());
        let idx = anchor.index(d) + self.delta;
        match self.offset {
            None => Pos::new(&anchor.path[..d], idx),
            Some(offset) => {
                let mut path = Path::from_slice(&anchor.path[..d]);
                path.push(idx);
                path.extend_from_slice(&self.tail);
                Pos { path, offset }
            }
        }
    }
}
