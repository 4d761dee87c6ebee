//! The node type registry, as a closed enum rather than a runtime-populated table.
//! Containment ("can this type hold that type") is a total function over the enum,
//! so an unknown node kind is a compile error here instead of a runtime one.

use smartstring::alias::String as SmartString;

/// Every node type in the schema.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum NodeKind {
    Doc,
    Paragraph,
    Blockquote,
    Heading,
    BulletList,
    ListItem,
    CodeBlock,
    Text,
    Image,
    HardBreak,
    HorizontalRule,
}

/// The class of content a node kind may hold.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Contains {
    Block,
    ListItems,
    Inline,
    /// Inline, but only unmarked text (code blocks).
    PlainText,
    Nothing,
}

/// The class a node kind belongs to as a child of something else.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum KindClass {
    Block,
    ListItem,
    Inline,
}

pub const ALL_KINDS: [NodeKind; 11] = [
    NodeKind::Doc, NodeKind::Paragraph, NodeKind::Blockquote, NodeKind::Heading,
    NodeKind::BulletList, NodeKind::ListItem, NodeKind::CodeBlock, NodeKind::Text,
    NodeKind::Image, NodeKind::HardBreak, NodeKind::HorizontalRule,
];

impl NodeKind {
    pub fn contains(self) -> Contains {
        use NodeKind::*;
        match self {
            Doc | Blockquote | ListItem => Contains::Block,
            BulletList => Contains::ListItems,
            Paragraph | Heading => Contains::Inline,
            CodeBlock => Contains::PlainText,
            Text | Image | HardBreak | HorizontalRule => Contains::Nothing,
        }
    }

    pub fn class(self) -> KindClass {
        use NodeKind::*;
        match self {
            Text | Image | HardBreak => KindClass::Inline,
            ListItem => KindClass::ListItem,
            _ => KindClass::Block,
        }
    }

    pub fn can_contain(self, child: NodeKind) -> bool {
        match (self.contains(), child.class()) {
            (Contains::Block, KindClass::Block) => true,
            (Contains::ListItems, KindClass::ListItem) => true,
            (Contains::Inline, KindClass::Inline) => true,
            (Contains::PlainText, KindClass::Inline) => child == NodeKind::Text,
            _ => false,
        }
    }

    /// Whether paths bottom out at this kind with an inline offset.
    pub fn is_textblock(self) -> bool {
        matches!(self.contains(), Contains::Inline | Contains::PlainText)
    }

    /// Whether inline content inside this kind may carry marks.
    pub fn allows_marks(self) -> bool {
        self.contains() == Contains::Inline
    }

    pub fn name(self) -> &'static str {
        use NodeKind::*;
        match self {
            Doc => "doc",
            Paragraph => "paragraph",
            Blockquote => "blockquote",
            Heading => "heading",
            BulletList => "bullet_list",
            ListItem => "list_item",
            CodeBlock => "code_block",
            Text => "text",
            Image => "image",
            HardBreak => "hard_break",
            HorizontalRule => "horizontal_rule",
        }
    }

    pub fn from_name(name: &str) -> Option<NodeKind> {
        ALL_KINDS.iter().copied().find(|k| k.name() == name)
    }
}

/// Shortest chain of intermediate node kinds needed to legally nest content of
/// class `child` inside `outer`. Empty chain means direct containment; `None` means
/// no amount of wrapping helps. Breadth-first over the containment graph.
pub fn find_connection(outer: NodeKind, child: NodeKind) -> Option<Vec<NodeKind>> {
    if outer.can_contain(child) {
        return Some(Vec::new());
    }
    let mut seen = vec![outer];
    let mut queue: Vec<(NodeKind, Vec<NodeKind>)> = vec![(outer, Vec::new())];
    let mut at = 0;
    while at < queue.len() {
        let (from, chain) = queue[at].clone();
        at += 1;
        for kind in ALL_KINDS {
            if kind.contains() == Contains::Nothing || seen.contains(&kind) {
                continue;
            }
            if from.can_contain(kind) {
                let mut next = chain.clone();
                next.push(kind);
                if kind.can_contain(child) {
                    return Some(next);
                }
                seen.push(kind);
                queue.push((kind, next));
            }
        }
    }
    None
}

/// Per-kind attributes. Deep equality; kinds not listed here carry `None`.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Default)]
pub enum Attrs {
    #[default]
    None,
    Heading { level: u8 },
    Image { src: SmartString, title: SmartString, alt: SmartString },
}

impl Attrs {
    pub fn heading(level: u8) -> Attrs { Attrs::Heading { level } }

    pub fn image(src: &str, title: &str, alt: &str) -> Attrs {
        Attrs::Image { src: src.into(), title: title.into(), alt: alt.into() }
    }

    /// Default attributes for a kind.
    pub fn default_for(kind: NodeKind) -> Attrs {
        match kind {
            NodeKind::Heading => Attrs::Heading { level: 1 },
            NodeKind::Image => Attrs::Image {
                src: SmartString::new(), title: SmartString::new(), alt: SmartString::new(),
            },
            _ => Attrs::None,
        }
    }

    /// Whether this attribute payload is the right shape for `kind`.
    pub fn fits(&self, kind: NodeKind) -> bool {
        match (kind, self) {
            (NodeKind::Heading, Attrs::Heading { .. }) => true,
            (NodeKind::Image, Attrs::Image { .. }) => true,
            (NodeKind::Heading | NodeKind::Image, _) => false,
            (_, Attrs::None) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use NodeKind::*;

    #[test]
    fn containment() {
        assert!(Doc.can_contain(Paragraph));
        assert!(Blockquote.can_contain(Paragraph));
        assert!(!Doc.can_contain(Text));
        assert!(Paragraph.can_contain(Text));
        assert!(Paragraph.can_contain(Image));
        assert!(!BulletList.can_contain(Paragraph));
        assert!(BulletList.can_contain(ListItem));
        assert!(CodeBlock.can_contain(Text));
        assert!(!CodeBlock.can_contain(Image));
    }

    #[test]
    fn connections() {
        assert_eq!(find_connection(Blockquote, Paragraph), Some(vec![]));
        assert_eq!(find_connection(BulletList, Paragraph), Some(vec![ListItem]));
        assert_eq!(find_connection(Doc, Text), Some(vec![Paragraph]));
        assert_eq!(find_connection(Paragraph, Paragraph), None);
    }

    #[test]
    fn names_roundtrip() {
        for kind in ALL_KINDS {
            assert_eq!(NodeKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(NodeKind::from_name("nope"), None);
    }
}
