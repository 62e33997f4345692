//! Escaping contracts for serialized markup.
//!
//! Three contexts, three rules:
//! - text content escapes `&`, `<`, `>`
//! - attribute values additionally escape `"` and `'`
//! - JSON destined for a `<script>` block is not entity-escaped at all;
//!   instead every `<` in the JSON text becomes the JSON escape
//!   `\u003c`, so no byte sequence in the payload can close the
//!   script element.

use serde_json::Value;

pub fn escape_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn escape_attr(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Serialize JSON for embedding in a raw-text `<script>` body. JSON string
/// literals are the only place `<` can occur, and `\u003c` is a valid JSON
/// escape, so a global replacement is safe.
pub fn escape_script_json(value: &Value) -> String {
    value.to_string().replace('<', "\\u003c")
}

/// Decode the entities the serializer emits, plus decimal and hex numeric
/// references. Unknown references pass through verbatim.
pub fn unescape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'&' {
            let c = input[i..].chars().next().unwrap_or('\u{fffd}');
            out.push(c);
            i += c.len_utf8();
            continue;
        }
        let rest = &input[i..];
        let Some(semi) = rest.find(';').filter(|&s| s <= 10) else {
            out.push('&');
            i += 1;
            continue;
        };
        let entity = &rest[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix('#')
                .and_then(|num| {
                    if let Some(hex) = num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                        u32::from_str_radix(hex, 16).ok()
                    } else {
                        num.parse::<u32>().ok()
                    }
                })
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                i += semi + 1;
            }
            None => {
                out.push('&');
                i += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_escaping() {
        assert_eq!(escape_text("a & <b> c"), "a &amp; &lt;b&gt; c");
        assert_eq!(escape_text("\"quoted\""), "\"quoted\"");
    }

    #[test]
    fn attr_escaping() {
        assert_eq!(
            escape_attr("it's a \"<test>\""),
            "it&#39;s a &quot;&lt;test&gt;&quot;"
        );
    }

    #[test]
    fn escape_unescape_round_trip() {
        let original = "a & b < c > d \"e\" 'f'";
        assert_eq!(unescape(&escape_attr(original)), original);
        assert_eq!(unescape(&escape_text(original)), original);
    }

    #[test]
    fn numeric_references() {
        assert_eq!(unescape("&#65;&#x42;"), "AB");
        assert_eq!(unescape("&#39;"), "'");
    }

    #[test]
    fn unknown_references_pass_through() {
        assert_eq!(unescape("&nope; & &#zzz;"), "&nope; & &#zzz;");
    }

    #[test]
    fn script_json_cannot_close_the_element() {
        let state = json!({"a": "<script>", "b": "it's \"quoted\"", "end": "</script>"});
        let encoded = escape_script_json(&state);
        assert!(!encoded.contains("</script>"));
        assert!(!encoded.contains('<'));

        let decoded: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, state);
    }
}
