//! Shorthand constructors for building documents by hand, mostly used in tests.

use crate::node::Fragment;

pub use crate::mark::{Mark, MarkSet};
pub use crate::node::Node;
pub use crate::pos::Pos;
pub use crate::schema::{Attrs, NodeKind};

pub fn doc(children: Vec<Node>) -> Node {
    Node::block(NodeKind::Doc, Attrs::None, Fragment::new(children))
}

pub fn p(text: &str) -> Node {
    para(vec![txt(text)])
}

pub fn para(children: Vec<Node>) -> Node {
    Node::block(NodeKind::Paragraph, Attrs::None, Fragment::inline(children))
}

pub fn h(level: u8, text: &str) -> Node {
    Node::block(NodeKind::Heading, Attrs::heading(level), Fragment::inline(vec![txt(text)]))
}

pub fn blockquote(children: Vec<Node>) -> Node {
    Node::block(NodeKind::Blockquote, Attrs::None, Fragment::new(children))
}

pub fn ul(items: Vec<Node>) -> Node {
    Node::block(NodeKind::BulletList, Attrs::None, Fragment::new(items))
}

pub fn li(children: Vec<Node>) -> Node {
    Node::block(NodeKind::ListItem, Attrs::None, Fragment::new(children))
}

pub fn pre(text: &str) -> Node {
    Node::block(NodeKind::CodeBlock, Attrs::None, Fragment::inline(vec![txt(text)]))
}

pub fn hr() -> Node {
    Node::block(NodeKind::HorizontalRule, Attrs::None, Fragment::empty())
}

pub fn br() -> Node {
    Node::inline_leaf(NodeKind::HardBreak, Attrs::None)
}

pub fn img(src: &str) -> Node {
    Node::inline_leaf(NodeKind::Image, Attrs::image(src, "", ""))
}

pub fn txt(text: &str) -> Node {
    Node::text(text)
}

pub fn styled(text: &str, marks: Vec<Mark>) -> Node {
    Node::text_with(text, MarkSet::from_marks(marks))
}

pub fn pos(path: &[usize], offset: usize) -> Pos {
    Pos::new(path, offset)
}
