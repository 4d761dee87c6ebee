//! Position maps. Every step produces a [`PosMap`] describing how positions in the
//! old document land in the new one, and [`Remapping`] chains maps (with inverse /
//! re-applied correspondences) for rebasing.

use std::collections::HashMap;
use smallvec::SmallVec;

use crate::pos::{Pos, RelPos};

/// A contiguous run of content that moved wholesale. `start` names the first moved
/// child (or inline unit) under its parent, `size` how many, `dest` where the first
/// one ended up.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MovedRange {
    pub start: Pos,
    pub size: usize,
    pub dest: Pos,
}

/// A range that was replaced outright. Positions strictly inside `before` are gone;
/// the boundaries map to the matching `after` boundaries.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ReplacedRange {
    pub before: (Pos, Pos),
    pub after: (Pos, Pos),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PosMap {
    pub moved: SmallVec<[MovedRange; 2]>,
    pub replaced: SmallVec<[ReplacedRange; 1]>,
}

/// Token for recovering a position that fell inside a replaced range, relative to
/// that range's start.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Recover {
    pub(crate) range: usize,
    pub(crate) rel: RelPos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapResult {
    pub pos: Pos,
    pub deleted: bool,
    pub recover: Option<Recover>,
}

impl MapResult {
    fn ok(pos: Pos) -> MapResult {
        MapResult { pos, deleted: false, recover: None }
    }
}

impl PosMap {
    pub fn identity() -> PosMap { PosMap::default() }

    pub fn single_moved(range: MovedRange) -> PosMap {
        let mut map = PosMap::default();
        map.moved.push(range);
        map
    }

    /// Map a position through this step. `bias` breaks ties when the position sits
    /// exactly on a replaced range boundary that collapsed to a point: positive
    /// bias keeps it after the insertion, non-positive before.
    pub fn map(&self, pos: &Pos, bias: i32) -> MapResult {
        for (ri, range) in self.replaced.iter().enumerate() {
            let (bf, bt) = (&range.before.0, &range.before.1);
            if pos < bf { continue; }
            if pos == bf && pos == bt {
                // Zero-width replacement (an insertion) right at this position.
                let side = if bias > 0 { &range.after.1 } else { &range.after.0 };
                return MapResult::ok(side.clone());
            }
            if pos == bf { return MapResult::ok(range.after.0.clone()); }
            if pos <= bt {
                if pos == bt { return MapResult::ok(range.after.1.clone()); }
                let side = if bias < 0 { &range.after.0 } else { &range.after.1 };
                return MapResult {
                    pos: side.clone(),
                    deleted: true,
                    recover: Some(Recover { range: ri, rel: RelPos::encode(pos, bf) }),
                };
            }
        }
        for range in self.moved.iter() {
            let d = range.start.path.len();
            if pos.depth() < d { continue; }
            if pos.path[..d] != range.start.path[..] { continue; }
            let idx = pos.index(d);
            let lo = range.start.offset;
            if idx < lo { continue; }
            if pos.depth() == d {
                if idx > lo + range.size { continue; }
            } else if idx >= lo + range.size {
                continue;
            }
            let delta = idx - lo;
            let mapped = if pos.depth() == d {
                Pos { path: range.dest.path.clone(), offset: range.dest.offset + delta }
            } else {
                let mut path = range.dest.path.clone();
                path.push(range.dest.offset + delta);
                path.extend_from_slice(&pos.path[d + 1..]);
                Pos { path, offset: pos.offset }
            };
            return MapResult::ok(mapped);
        }
        MapResult::ok(pos.clone())
    }

    /// The map of the inverse step.
    pub fn invert(&self) -> PosMap {
        PosMap {
            moved: self.moved.iter().map(|r| MovedRange {
                start: Pos { path: r.dest.path.clone(), offset: r.dest.offset },
                size: r.size,
                dest: Pos { path: r.start.path.clone(), offset: r.start.offset },
            }).collect(),
            replaced: self.replaced.iter().map(|r| ReplacedRange {
                before: r.after.clone(),
                after: r.before.clone(),
            }).collect(),
        }
    }

    /// Resolve a recover token against this map's post-step document.
    pub fn recover_pos(&self, rec: &Recover) -> Option<Pos> {
        let range = self.replaced.get(rec.range)?;
        Some(rec.rel.resolve(&range.after.0))
    }
}

/// A chain of maps for rebasing: inverted maps of undone local steps at the front,
/// maps of remote and re-applied steps at the back. `corresponds` links an inverted
/// map to the map of its re-applied counterpart, so positions deleted by the
/// un-apply can jump straight to where the step put them back.
#[derive(Debug, Default)]
pub struct Remapping {
    pub head: Vec<PosMap>,
    pub tail: Vec<PosMap>,
    corresponds: HashMap<i32, i32>,
}

impl Remapping {
    pub fn new() -> Remapping { Remapping::default() }

    pub fn with_tail(tail: Vec<PosMap>) -> Remapping {
        Remapping { head: Vec::new(), tail, corresponds: HashMap::new() }
    }

    /// Prepend a map (applied before everything already here). Returns its id.
    pub fn add_to_front(&mut self, map: PosMap, corr: Option<i32>) -> i32 {
        self.head.push(map);
        let id = -(self.head.len() as i32);
        if let Some(c) = corr { self.corresponds.insert(id, c); }
        id
    }

    /// Append a map. `corr` links it back to the inverted map it re-applies.
    pub fn add_to_back(&mut self, map: PosMap, corr: Option<i32>) -> i32 {
        self.tail.push(map);
        let id = self.tail.len() as i32 - 1;
        if let Some(c) = corr { self.corresponds.insert(c, id); }
        id
    }

    fn get(&self, id: i32) -> &PosMap {
        if id < 0 { &self.head[(-id - 1) as usize] } else { &self.tail[id as usize] }
    }

    /// Map through the whole chain. Returns the result position and whether the
    /// position was deleted somewhere along the way without recovery.
    pub fn map(&self, pos: &Pos, bias: i32) -> (Pos, bool) {
        let mut pos = pos.clone();
        let mut deleted = false;
        let mut i = -(self.head.len() as i32);
        while i < self.tail.len() as i32 {
            let map = self.get(i);
            let result = map.map(&pos, bias);
            if result.deleted {
                if let Some(&corr) = self.corresponds.get(&i) {
                    if let Some(rec) = &result.recover {
                        if let Some(p) = self.get(corr).recover_pos(rec) {
                            pos = p;
                            i = corr + 1;
                            continue;
                        }
                    }
                }
                deleted = true;
            }
            pos = result.pos;
            i += 1;
        }
        (pos, deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(path: &[usize], offset: usize) -> Pos {
        Pos { path: path.iter().copied().collect(), offset }
    }

    fn insertion_at(p: &Pos, size: usize) -> PosMap {
        // Insertion of `size` inline units at p: zero-width replacement plus a
        // trailing shift.
        let mut map = PosMap::default();
        map.replaced.push(ReplacedRange {
            before: (p.clone(), p.clone()),
            after: (p.clone(), Pos { path: p.path.clone(), offset: p.offset + size }),
        });
        map.moved.push(MovedRange {
            start: p.clone(),
            size: usize::MAX / 2,
            dest: Pos { path: p.path.clone(), offset: p.offset + size },
        });
        map
    }

    #[test]
    fn insertion_shifts() {
        let map = insertion_at(&pos(&[0], 2), 3);
        assert_eq!(map.map(&pos(&[0], 4), 1).pos, pos(&[0], 7));
        assert_eq!(map.map(&pos(&[0], 1), 1).pos, pos(&[0], 1));
        // On the boundary: bias decides.
        assert_eq!(map.map(&pos(&[0], 2), -1).pos, pos(&[0], 2));
        assert_eq!(map.map(&pos(&[0], 2), 1).pos, pos(&[0], 5));
    }

    #[test]
    fn deletion_and_recovery() {
        let mut map = PosMap::default();
        map.replaced.push(ReplacedRange {
            before: (pos(&[0], 1), pos(&[0], 4)),
            after: (pos(&[0], 1), pos(&[0], 1)),
        });
        let r = map.map(&pos(&[0], 2), 1);
        assert!(r.deleted);
        let rec = r.recover.unwrap();
        // Inverting puts the content back; recovery against the inverse restores
        // the original position.
        let inv = map.invert();
        assert_eq!(inv.recover_pos(&rec), Some(pos(&[0], 2)));
    }

    #[test]
    fn moved_deep() {
        // Children 1..3 of the root moved into a wrapper at [1, 0].
        let map = PosMap::single_moved(MovedRange {
            start: pos(&[], 1),
            size: 2,
            dest: pos(&[1], 0),
        });
        assert_eq!(map.map(&pos(&[2], 3), 1).pos, pos(&[1, 1], 3));
        assert_eq!(map.map(&pos(&[], 2), 1).pos, pos(&[1], 1));
        // Same-depth end boundary is inclusive.
        assert_eq!(map.map(&pos(&[], 3), 1).pos, pos(&[1], 2));
        // Deeper positions under the child past the range don't match.
        assert_eq!(map.map(&pos(&[3], 0), 1).pos, pos(&[3], 0));
    }

    #[test]
    fn remapping_correspondence() {
        // Undo an insertion, then redo it elsewhere: a position inside the inserted
        // content should follow it.
        let ins = insertion_at(&pos(&[0], 2), 3);
        let redo = insertion_at(&pos(&[0], 6), 3);
        let mut remap = Remapping::new();
        let inv_id = remap.add_to_front(ins.invert(), None);
        remap.add_to_back(redo.clone(), Some(inv_id));
        let (p, deleted) = remap.map(&pos(&[0], 3), 1);
        assert!(!deleted);
        assert_eq!(p, pos(&[0], 7));
    }
}
