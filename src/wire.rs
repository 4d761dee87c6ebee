//! JSON wire format for documents and steps. The shapes are hand-rolled repr
//! structs rather than derived straight off the internal types, so the internal
//! representation can move without breaking the protocol. Unknown node, mark, or
//! step types are hard errors; silently dropping content a peer sent would corrupt
//! the collaboration.

use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::mark::{Mark, MarkSet};
use crate::node::{Fragment, Node, Slice};
use crate::pos::Pos;
use crate::schema::{Attrs, KindClass, NodeKind};
use crate::step::Step;

#[derive(Debug)]
pub enum WireError {
    UnknownType(String),
    Malformed(&'static str),
    Json(serde_json::Error),
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::UnknownType(name) => write!(f, "unknown type {:?}", name),
            WireError::Malformed(what) => write!(f, "malformed wire data: {}", what),
            WireError::Json(e) => write!(f, "invalid json: {}", e),
        }
    }
}

impl Error for WireError {}

impl From<serde_json::Error> for WireError {
    fn from(e: serde_json::Error) -> Self {
        WireError::Json(e)
    }
}

#[derive(Serialize, Deserialize, Default)]
struct AttrsRepr {
    #[serde(skip_serializing_if = "Option::is_none")]
    level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    src: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alt: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct MarkRepr {
    #[serde(rename = "type")]
    type_: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct NodeRepr {
    #[serde(rename = "type")]
    type_: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    attrs: Option<AttrsRepr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<Vec<NodeRepr>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    marks: Option<Vec<MarkRepr>>,
}

#[derive(Serialize, Deserialize)]
struct StepRepr {
    #[serde(rename = "type")]
    type_: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pos: Option<Pos>,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<Pos>,
    #[serde(skip_serializing_if = "Option::is_none")]
    to: Option<Pos>,
    #[serde(skip_serializing_if = "Option::is_none")]
    param: Option<Value>,
}

fn mark_repr(mark: &Mark) -> MarkRepr {
    let (href, title) = match mark {
        Mark::Link { href, title } => (Some(href.to_string()), Some(title.to_string())),
        _ => (None, None),
    };
    MarkRepr { type_: mark.name().to_string(), href, title }
}

fn mark_from_repr(repr: &MarkRepr) -> Result<Mark, WireError> {
    match repr.type_.as_str() {
        "em" => Ok(Mark::Em),
        "strong" => Ok(Mark::Strong),
        "code" => Ok(Mark::Code),
        "link" => Ok(Mark::link(
            repr.href.as_deref().unwrap_or(""),
            repr.title.as_deref().unwrap_or(""),
        )),
        other => Err(WireError::UnknownType(other.to_string())),
    }
}

fn marks_repr(marks: &MarkSet) -> Option<Vec<MarkRepr>> {
    if marks.is_empty() {
        None
    } else {
        Some(marks.iter().map(mark_repr).collect())
    }
}

fn marks_from_repr(reprs: &Option<Vec<MarkRepr>>) -> Result<MarkSet, WireError> {
    let mut set = MarkSet::none();
    if let Some(reprs) = reprs {
        for r in reprs {
            set = set.add(mark_from_repr(r)?);
        }
    }
    Ok(set)
}

fn attrs_repr(attrs: &Attrs) -> Option<AttrsRepr> {
    match attrs {
        Attrs::None => None,
        Attrs::Heading { level } => Some(AttrsRepr { level: Some(*level), ..Default::default() }),
        Attrs::Image { src, title, alt } => Some(AttrsRepr {
            src: Some(src.to_string()),
            title: Some(title.to_string()),
            alt: Some(alt.to_string()),
            ..Default::default()
        }),
    }
}

fn attrs_from_repr(kind: NodeKind, repr: &Option<AttrsRepr>) -> Result<Attrs, WireError> {
    let attrs = match (kind, repr) {
        (NodeKind::Heading, Some(r)) => {
            Attrs::Heading { level: r.level.ok_or(WireError::Malformed("heading without level"))? }
        }
        (NodeKind::Heading, None) => return Err(WireError::Malformed("heading without attrs")),
        (NodeKind::Image, Some(r)) => Attrs::image(
            r.src.as_deref().unwrap_or(""),
            r.title.as_deref().unwrap_or(""),
            r.alt.as_deref().unwrap_or(""),
        ),
        (NodeKind::Image, None) => return Err(WireError::Malformed("image without attrs")),
        _ => Attrs::None,
    };
    if !attrs.fits(kind) {
        return Err(WireError::Malformed("attributes don't fit node type"));
    }
    Ok(attrs)
}

fn node_repr(node: &Node) -> NodeRepr {
    match node {
        Node::Text { text, marks } => NodeRepr {
            type_: "text".to_string(),
            attrs: None,
            content: None,
            text: Some(text.to_string()),
            marks: marks_repr(marks),
        },
        Node::Inline { kind, attrs, marks } => NodeRepr {
            type_: kind.name().to_string(),
            attrs: attrs_repr(attrs),
            content: None,
            text: None,
            marks: marks_repr(marks),
        },
        Node::Block { kind, attrs, content } => NodeRepr {
            type_: kind.name().to_string(),
            attrs: attrs_repr(attrs),
            content: if content.is_empty() {
                None
            } else {
                Some(content.children().iter().map(node_repr).collect())
            },
            text: None,
            marks: None,
        },
    }
}

fn node_from_repr(repr: &NodeRepr) -> Result<Node, WireError> {
    if repr.type_ == "text" {
        let text = repr.text.as_deref().ok_or(WireError::Malformed("text node without text"))?;
        if text.is_empty() {
            return Err(WireError::Malformed("empty text node"));
        }
        return Ok(Node::text_with(text, marks_from_repr(&repr.marks)?));
    }
    let kind = NodeKind::from_name(&repr.type_)
        .ok_or_else(|| WireError::UnknownType(repr.type_.clone()))?;
    let attrs = attrs_from_repr(kind, &repr.attrs)?;
    if kind.class() == KindClass::Inline {
        return Ok(Node::Inline { kind, attrs, marks: marks_from_repr(&repr.marks)? });
    }
    let mut children = Vec::new();
    if let Some(content) = &repr.content {
        for child in content {
            let node = node_from_repr(child)?;
            if !kind.can_contain(node.kind()) {
                return Err(WireError::Malformed("child not allowed in parent"));
            }
            children.push(node);
        }
    }
    Ok(Node::block(kind, attrs, Fragment::new(children)))
}

fn fragment_from_value(value: &Value) -> Result<Fragment, WireError> {
    let reprs: Vec<NodeRepr> = serde_json::from_value(value.clone())?;
    let mut children = Vec::new();
    for r in &reprs {
        children.push(node_from_repr(r)?);
    }
    Ok(Fragment::new(children))
}

pub fn node_to_value(node: &Node) -> Result<Value, WireError> {
    Ok(serde_json::to_value(node_repr(node))?)
}

pub fn node_from_value(value: &Value) -> Result<Node, WireError> {
    let repr: NodeRepr = serde_json::from_value(value.clone())?;
    node_from_repr(&repr)
}

pub fn node_to_json(node: &Node) -> Result<String, WireError> {
    Ok(serde_json::to_string(&node_repr(node))?)
}

pub fn node_from_json(json: &str) -> Result<Node, WireError> {
    let repr: NodeRepr = serde_json::from_str(json)?;
    node_from_repr(&repr)
}

fn type_repr(kind: NodeKind, attrs: &Attrs) -> Value {
    let mut obj = serde_json::Map::new();
    obj.insert("type".to_string(), Value::String(kind.name().to_string()));
    if let Some(a) = attrs_repr(attrs) {
        obj.insert("attrs".to_string(), serde_json::to_value(a).unwrap_or(Value::Null));
    }
    Value::Object(obj)
}

fn type_from_value(value: &Value) -> Result<(NodeKind, Attrs), WireError> {
    let name = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(WireError::Malformed("node type without name"))?;
    let kind = NodeKind::from_name(name).ok_or_else(|| WireError::UnknownType(name.to_string()))?;
    let attrs_repr: Option<AttrsRepr> = match value.get("attrs") {
        Some(v) => Some(serde_json::from_value(v.clone())?),
        None => None,
    };
    Ok((kind, attrs_from_repr(kind, &attrs_repr)?))
}

pub fn step_to_value(step: &Step) -> Result<Value, WireError> {
    let repr = match step {
        Step::Split { pos, retype } => StepRepr {
            type_: "split".to_string(),
            pos: Some(pos.clone()),
            from: None,
            to: None,
            param: retype.as_ref().map(|(k, a)| type_repr(*k, a)),
        },
        Step::Join { from, to } => StepRepr {
            type_: "join".to_string(),
            pos: None,
            from: Some(from.clone()),
            to: Some(to.clone()),
            param: None,
        },
        Step::Ancestor { from, to, depth, types } => {
            let types: Vec<Value> = types.iter().map(|(k, a)| type_repr(*k, a)).collect();
            StepRepr {
                type_: "ancestor".to_string(),
                pos: None,
                from: Some(from.clone()),
                to: Some(to.clone()),
                param: Some(serde_json::json!({ "depth": depth, "types": types })),
            }
        }
        Step::AddMark { from, to, mark } | Step::RemoveMark { from, to, mark } => StepRepr {
            type_: if matches!(step, Step::AddMark { .. }) { "addMark" } else { "removeMark" }
                .to_string(),
            pos: None,
            from: Some(from.clone()),
            to: Some(to.clone()),
            param: Some(serde_json::to_value(mark_repr(mark))?),
        },
        Step::Replace { from, to, slice, structure } => {
            let content: Vec<NodeRepr> = slice.content.children().iter().map(node_repr).collect();
            StepRepr {
                type_: "replace".to_string(),
                pos: None,
                from: Some(from.clone()),
                to: Some(to.clone()),
                param: Some(serde_json::json!({
                    "content": content,
                    "openLeft": slice.open_left,
                    "openRight": slice.open_right,
                    "structure": structure,
                })),
            }
        }
    };
    Ok(serde_json::to_value(repr)?)
}

pub fn step_from_value(value: &Value) -> Result<Step, WireError> {
    let repr: StepRepr = serde_json::from_value(value.clone())?;
    let from = || repr.from.clone().ok_or(WireError::Malformed("step without from"));
    let to = || repr.to.clone().ok_or(WireError::Malformed("step without to"));
    match repr.type_.as_str() {
        "split" => {
            let pos = repr.pos.clone().ok_or(WireError::Malformed("split without pos"))?;
            let retype = match &repr.param {
                Some(v) => Some(type_from_value(v)?),
                None => None,
            };
            Ok(Step::Split { pos, retype })
        }
        "join" => Ok(Step::Join { from: from()?, to: to()? }),
        "ancestor" => {
            let param = repr.param.as_ref().ok_or(WireError::Malformed("ancestor without param"))?;
            let depth = param
                .get("depth")
                .and_then(Value::as_u64)
                .ok_or(WireError::Malformed("ancestor without depth"))? as usize;
            let mut types = Vec::new();
            for t in param
                .get("types")
                .and_then(Value::as_array)
                .ok_or(WireError::Malformed("ancestor without types"))?
            {
                types.push(type_from_value(t)?);
            }
            Ok(Step::Ancestor { from: from()?, to: to()?, depth, types })
        }
        "addMark" | "removeMark" => {
            let param = repr.param.as_ref().ok_or(WireError::Malformed("mark step without mark"))?;
            let mark_repr: MarkRepr = serde_json::from_value(param.clone())?;
            let mark = mark_from_repr(&mark_repr)?;
            if repr.type_ == "addMark" {
                Ok(Step::AddMark { from: from()?, to: to()?, mark })
            } else {
                Ok(Step::RemoveMark { from: from()?, to: to()?, mark })
            }
        }
        "replace" => {
            let param = repr.param.as_ref().ok_or(WireError::Malformed("replace without param"))?;
            let content = match param.get("content") {
                Some(v) => fragment_from_value(v)?,
                None => Fragment::empty(),
            };
            let open_left = param.get("openLeft").and_then(Value::as_u64).unwrap_or(0) as usize;
            let open_right = param.get("openRight").and_then(Value::as_u64).unwrap_or(0) as usize;
            let structure = param.get("structure").and_then(Value::as_bool).unwrap_or(false);
            Ok(Step::Replace {
                from: from()?,
                to: to()?,
                slice: Slice::new(content, open_left, open_right),
                structure,
            })
        }
        other => Err(WireError::UnknownType(other.to_string())),
    }
}

pub fn step_to_json(step: &Step) -> Result<String, WireError> {
    Ok(serde_json::to_string(&step_to_value(step)?)?)
}

pub fn step_from_json(json: &str) -> Result<Step, WireError> {
    step_from_value(&serde_json::from_str(json)?)
}
