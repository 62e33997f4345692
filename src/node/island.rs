//! Island boundary records: the data carried across the server/client split.

use serde_json::Value;

/// When an island's module is loaded and its hydrate entry invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Hydrate as soon as the island is scanned.
    Immediate,
    /// Hydrate on the host's idle callback.
    Idle,
    /// Hydrate on the island's first viewport intersection.
    Visible,
    /// Hydrate when the media query first matches.
    Media(String),
    /// Never hydrate automatically; the island stays server markup unless
    /// hydrated explicitly.
    None,
}

impl Trigger {
    /// Attribute value for `data-island-on`.
    pub fn as_attr_value(&self) -> String {
        match self {
            Trigger::Immediate => "immediate".into(),
            Trigger::Idle => "idle".into(),
            Trigger::Visible => "visible".into(),
            Trigger::Media(query) => format!("media:{query}"),
            Trigger::None => "none".into(),
        }
    }

    /// Parse a `data-island-on` value. Unknown values are rejected rather
    /// than silently treated as immediate.
    pub fn parse(value: &str) -> Option<Trigger> {
        match value {
            "immediate" => Some(Trigger::Immediate),
            "idle" => Some(Trigger::Idle),
            "visible" => Some(Trigger::Visible),
            "none" => Some(Trigger::None),
            other => other
                .strip_prefix("media:")
                .filter(|q| !q.is_empty())
                .map(|q| Trigger::Media(q.to_string())),
        }
    }
}

impl Default for Trigger {
    fn default() -> Self {
        Trigger::Immediate
    }
}

/// How an island's state payload is delivered to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum IslandState {
    /// No state.
    None,
    /// JSON inline in the `data-island-state` attribute.
    Inline(Value),
    /// JSON in a sibling `<script type="application/json">` block; the
    /// attribute carries `#<element-id>`.
    Script(Value),
    /// Fetched at hydration time; the attribute carries `url:<url>`.
    Url(String),
}

impl IslandState {
    /// `data-island-state` attribute value for an island with this state.
    /// None means the attribute is omitted.
    pub fn attr_value(&self, island_id: &str) -> Option<String> {
        match self {
            IslandState::None => None,
            IslandState::Inline(value) => Some(value.to_string()),
            IslandState::Script(_) => Some(format!("#{island_id}-state")),
            IslandState::Url(url) => Some(format!("url:{url}")),
        }
    }

    /// Payload for the sibling `<script>` block, if this state uses one.
    pub fn script_payload(&self) -> Option<&Value> {
        match self {
            IslandState::Script(value) => Some(value),
            _ => None,
        }
    }

    /// Element id of the sibling `<script>` block.
    pub fn script_id(island_id: &str) -> String {
        format!("{island_id}-state")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_round_trip() {
        for t in [
            Trigger::Immediate,
            Trigger::Idle,
            Trigger::Visible,
            Trigger::Media("(min-width: 768px)".into()),
            Trigger::None,
        ] {
            assert_eq!(Trigger::parse(&t.as_attr_value()), Some(t));
        }
    }

    #[test]
    fn unknown_trigger_rejected() {
        assert_eq!(Trigger::parse("eager"), None);
        assert_eq!(Trigger::parse("media:"), None);
        assert_eq!(Trigger::parse(""), None);
    }
}
