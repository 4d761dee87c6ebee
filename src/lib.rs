//! A transform-based engine for collaborative rich-text editing.
//!
//! Documents are immutable trees of block and inline nodes. Edits are expressed as
//! [`Step`](step::Step)s - small, invertible changes that each produce a
//! [`PosMap`](map::PosMap) describing how positions moved. On top of that sit
//! [`Transform`](transform::Transform) for composing steps,
//! [`Collab`](collab::Collab) for rebasing local changes against a central
//! authority, and [`VersionStore`](versions::VersionStore) for coordination-free
//! peer-to-peer version tracking.
//!
//! ```
//! use prosetree::builder::*;
//! use prosetree::step::Step;
//! use prosetree::transform::Transform;
//!
//! let mut tr = Transform::new(doc(vec![p("hello world")]));
//! tr.step(Step::Split { pos: pos(&[0], 5), retype: None }).unwrap();
//! assert_eq!(tr.doc(), &doc(vec![p("hello"), p(" world")]));
//!
//! // Every transform can be undone by its inverted steps.
//! let mut undo = Transform::new(tr.doc().clone());
//! for step in tr.inverted_steps() {
//!     undo.step(step).unwrap();
//! }
//! assert_eq!(undo.doc(), &doc(vec![p("hello world")]));
//! ```

pub mod builder;
pub mod collab;
pub mod map;
pub mod mark;
pub mod node;
pub mod pos;
mod replace;
pub mod schema;
pub mod step;
pub mod transform;
pub mod versions;
pub mod wire;

pub use crate::map::{PosMap, Remapping};
pub use crate::mark::{Mark, MarkSet};
pub use crate::node::{slice_between, Fragment, Node, Slice, Visit};
pub use crate::pos::{Path, Pos};
pub use crate::schema::{Attrs, NodeKind};
pub use crate::step::{Step, StepResult};
pub use crate::transform::{StepFailed, Transform};
