use std::fmt::{Debug, Formatter};
use smallvec::SmallVec;
use smartstring::alias::String as SmartString;

/// An inline formatting annotation. Two marks of the same kind compare by deep
/// attribute equality (two links are the same mark only if href and title match).
#[derive(Clone, Eq, PartialEq, Hash)]
pub enum Mark {
    Em,
    Strong,
    Link { href: SmartString, title: SmartString },
    Code,
}

impl Mark {
    pub fn link(href: &str, title: &str) -> Mark {
        Mark::Link { href: href.into(), title: title.into() }
    }

    /// Ordering rank inside a mark set. One rank per kind, so sets have a canonical
    /// order regardless of the order marks were added in.
    fn rank(&self) -> u8 {
        match self {
            Mark::Em => 0,
            Mark::Strong => 1,
            Mark::Link { .. } => 2,
            Mark::Code => 3,
        }
    }

    pub fn same_kind(&self, other: &Mark) -> bool {
        self.rank() == other.rank()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mark::Em => "em",
            Mark::Strong => "strong",
            Mark::Link { .. } => "link",
            Mark::Code => "code",
        }
    }
}

impl Debug for Mark {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Mark::Link { href, title } => write!(f, "link({:?},{:?})", href, title),
            m => f.write_str(m.name()),
        }
    }
}

/// An ordered set of marks: at most one mark per kind, kept sorted by rank so two
/// sets with the same marks are always representationally equal.
#[derive(Clone, Eq, PartialEq, Hash, Default)]
pub struct MarkSet(SmallVec<[Mark; 2]>);

impl MarkSet {
    pub fn none() -> MarkSet { MarkSet(SmallVec::new()) }

    pub fn single(mark: Mark) -> MarkSet {
        let mut v = SmallVec::new();
        v.push(mark);
        MarkSet(v)
    }

    pub fn from_marks<I: IntoIterator<Item = Mark>>(marks: I) -> MarkSet {
        let mut set = MarkSet::none();
        for m in marks { set = set.add(m); }
        set
    }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn iter(&self) -> impl Iterator<Item = &Mark> { self.0.iter() }

    /// Deep-equality membership.
    pub fn contains(&self, mark: &Mark) -> bool {
        self.0.iter().any(|m| m == mark)
    }

    pub fn contains_kind(&self, mark: &Mark) -> bool {
        self.0.iter().any(|m| m.same_kind(mark))
    }

    /// Add a mark, replacing any existing mark of the same kind.
    pub fn add(&self, mark: Mark) -> MarkSet {
        let mut v = self.0.clone();
        if let Some(i) = v.iter().position(|m| m.same_kind(&mark)) {
            v[i] = mark;
        } else {
            let at = v.iter().position(|m| m.rank() > mark.rank()).unwrap_or(v.len());
            v.insert(at, mark);
        }
        MarkSet(v)
    }

    /// Remove a mark by deep equality. No-op when absent.
    pub fn remove(&self, mark: &Mark) -> MarkSet {
        MarkSet(self.0.iter().filter(|m| *m != mark).cloned().collect())
    }
}

impl Debug for MarkSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_canonical() {
        let a = MarkSet::none().add(Mark::Strong).add(Mark::Em);
        let b = MarkSet::none().add(Mark::Em).add(Mark::Strong);
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn one_per_kind() {
        let a = MarkSet::single(Mark::link("x", "")).add(Mark::link("y", ""));
        assert_eq!(a.len(), 1);
        assert!(a.contains(&Mark::link("y", "")));
        assert!(!a.contains(&Mark::link("x", "")));
        assert!(a.contains_kind(&Mark::link("x", "")));
    }

    #[test]
    fn remove_is_deep() {
        let a = MarkSet::single(Mark::link("x", ""));
        assert_eq!(a.remove(&Mark::link("y", "")), a);
        assert!(a.remove(&Mark::link("x", "")).is_empty());
    }
}
