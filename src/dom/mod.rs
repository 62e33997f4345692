//! Document backend: an id-addressed node arena with listeners, dispatch,
//! and HTML serialization, plus a lenient fragment parser for loading
//! server-rendered markup into the arena.

pub mod document;
pub mod parse;

pub use document::{Document, NodeId, NodeKind, ROOT};
pub use parse::parse_fragment;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Elements serialized without a closing tag.
pub(crate) const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements whose text children are serialized and parsed unescaped.
pub(crate) const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Default event payload. Applications with richer event models substitute
/// their own type through the `Ev` parameter on [`Document`] and the node
/// tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub detail: Value,
}

impl Event {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            detail: Value::Null,
        }
    }

    pub fn with_detail(name: impl Into<String>, detail: Value) -> Self {
        Self {
            name: name.into(),
            detail,
        }
    }
}
