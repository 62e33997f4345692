//! The island attribute contract, client side: scanning a document for
//! island boundaries and resolving their state payloads.

use serde_json::Value;

use crate::dom::document::{Document, NodeId};
use crate::error::{Error, Result};
use crate::node::island::Trigger;

/// Parsed island boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct IslandRecord {
    pub id: String,
    pub src: String,
    pub trigger: Trigger,
    pub state: StateRef,
}

/// Where an island's state payload lives. Unlike `IslandState` on the
/// authoring side, a script payload is still a reference here; it resolves
/// against the document at hydration time.
#[derive(Debug, Clone, PartialEq)]
pub enum StateRef {
    None,
    Inline(Value),
    /// Element id of a sibling `<script type="application/json">` block.
    Script(String),
    Url(String),
}

/// Source of remote state payloads for `url:` islands.
pub trait StateFetcher {
    fn fetch(&self, url: &str) -> std::result::Result<Value, String>;
}

/// Parse one island element. The element must carry `data-island`.
pub fn parse_island<Ev>(doc: &Document<Ev>, node: NodeId) -> Result<IslandRecord> {
    let id = doc
        .attribute(node, "data-island")
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::HydrationParse {
            id: String::from("?"),
            reason: String::from("missing or empty data-island attribute"),
        })?;

    let src = doc
        .attribute(node, "data-island-src")
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::HydrationParse {
            id: id.clone(),
            reason: String::from("missing or empty data-island-src attribute"),
        })?;

    let trigger = match doc.attribute(node, "data-island-on") {
        None => Trigger::default(),
        Some(raw) => Trigger::parse(&raw).ok_or_else(|| Error::HydrationParse {
            id: id.clone(),
            reason: format!("unknown data-island-on value `{raw}`"),
        })?,
    };

    let state = match doc.attribute(node, "data-island-state") {
        None => StateRef::None,
        Some(raw) => parse_state_ref(&id, &raw)?,
    };

    Ok(IslandRecord {
        id,
        src,
        trigger,
        state,
    })
}

fn parse_state_ref(id: &str, raw: &str) -> Result<StateRef> {
    if let Some(element_id) = raw.strip_prefix('#') {
        if element_id.is_empty() {
            return Err(Error::HydrationParse {
                id: id.to_string(),
                reason: String::from("empty script reference in data-island-state"),
            });
        }
        return Ok(StateRef::Script(element_id.to_string()));
    }
    if let Some(url) = raw.strip_prefix("url:") {
        if url.is_empty() {
            return Err(Error::HydrationParse {
                id: id.to_string(),
                reason: String::from("empty url in data-island-state"),
            });
        }
        return Ok(StateRef::Url(url.to_string()));
    }
    let value = serde_json::from_str(raw).map_err(|e| Error::HydrationParse {
        id: id.to_string(),
        reason: format!("invalid inline state JSON: {e}"),
    })?;
    Ok(StateRef::Inline(value))
}

/// All island elements in document order, each parsed or failed
/// independently.
pub fn scan_islands<Ev>(doc: &Document<Ev>) -> Vec<(NodeId, Result<IslandRecord>)> {
    doc.elements_with_attribute("data-island")
        .into_iter()
        .map(|node| (node, parse_island(doc, node)))
        .collect()
}

/// Resolve a state reference to its JSON value. `None` resolves to null.
pub fn resolve_state<Ev>(
    doc: &Document<Ev>,
    record: &IslandRecord,
    fetcher: Option<&dyn StateFetcher>,
) -> Result<Value> {
    match &record.state {
        StateRef::None => Ok(Value::Null),
        StateRef::Inline(value) => Ok(value.clone()),
        StateRef::Script(element_id) => {
            let node = doc
                .element_by_id(element_id)
                .ok_or_else(|| Error::HydrationParse {
                    id: record.id.clone(),
                    reason: format!("state block `#{element_id}` not found"),
                })?;
            let body = doc.text_content(node);
            serde_json::from_str(&body).map_err(|e| Error::HydrationParse {
                id: record.id.clone(),
                reason: format!("state block `#{element_id}` is not valid JSON: {e}"),
            })
        }
        StateRef::Url(url) => {
            let fetcher = fetcher.ok_or_else(|| Error::HydrationParse {
                id: record.id.clone(),
                reason: format!("island needs a state fetcher for `{url}` but none is configured"),
            })?;
            fetcher.fetch(url).map_err(|e| Error::HydrationParse {
                id: record.id.clone(),
                reason: format!("state fetch from `{url}` failed: {e}"),
            })
        }
    }
}
