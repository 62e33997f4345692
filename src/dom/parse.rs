//! Lenient HTML fragment parsing into the document arena.
//!
//! This is not a full standards HTML parser. It handles the markup the string
//! renderer emits plus ordinary hand-written fragments: elements with
//! quoted or unquoted attributes, text with entities, comments (which
//! become markers), void elements, and raw-text `<script>`/`<style>`
//! bodies. Malformed input degrades gracefully instead of erroring; a
//! stray close tag is dropped, an unclosed element is closed at the end
//! of input.

use crate::dom::document::{Document, NodeId};
use crate::dom::{RAW_TEXT_ELEMENTS, VOID_ELEMENTS};
use crate::render::escape::unescape;

/// Parse `html` and append the resulting nodes under `parent`. Returns the
/// ids of the top-level parsed nodes in document order.
pub fn parse_fragment<Ev>(doc: &Document<Ev>, parent: NodeId, html: &str) -> Vec<NodeId> {
    let mut parser = Parser {
        doc,
        input: html.as_bytes(),
        pos: 0,
        // (node, tag) pairs; the tag is kept lowercase for close matching.
        open: vec![(parent, String::new())],
        top_level: Vec::new(),
        root: parent,
    };
    parser.run();
    parser.top_level
}

struct Parser<'a, Ev> {
    doc: &'a Document<Ev>,
    input: &'a [u8],
    pos: usize,
    open: Vec<(NodeId, String)>,
    top_level: Vec<NodeId>,
    root: NodeId,
}

impl<Ev> Parser<'_, Ev> {
    fn run(&mut self) {
        while self.pos < self.input.len() {
            if self.peek_str("<!--") {
                self.parse_comment();
            } else if self.peek_str("</") {
                self.parse_close_tag();
            } else if self.input[self.pos] == b'<' && self.next_is_tag_start() {
                self.parse_open_tag();
            } else {
                self.parse_text();
            }
        }
    }

    fn current_parent(&self) -> NodeId {
        self.open.last().map(|(id, _)| *id).unwrap_or(self.root)
    }

    fn attach(&mut self, node: NodeId) {
        let parent = self.current_parent();
        self.doc.append_child(parent, node);
        if parent == self.root {
            self.top_level.push(node);
        }
    }

    fn peek_str(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s.as_bytes())
    }

    fn next_is_tag_start(&self) -> bool {
        self.input
            .get(self.pos + 1)
            .is_some_and(|b| b.is_ascii_alphabetic())
    }

    fn parse_comment(&mut self) {
        self.pos += 4;
        let rest = &self.input[self.pos..];
        let end = find(rest, b"-->").unwrap_or(rest.len());
        let label = String::from_utf8_lossy(&rest[..end]).into_owned();
        self.pos += end + 3.min(rest.len() - end);
        let marker = self.doc.create_marker(label);
        self.attach(marker);
    }

    fn parse_close_tag(&mut self) {
        self.pos += 2;
        let start = self.pos;
        while self.pos < self.input.len() && self.input[self.pos] != b'>' {
            self.pos += 1;
        }
        let name = String::from_utf8_lossy(&self.input[start..self.pos])
            .trim()
            .to_ascii_lowercase();
        if self.pos < self.input.len() {
            self.pos += 1;
        }

        // Pop to the matching open element; drop the tag if nothing matches.
        if let Some(at) = self.open.iter().rposition(|(_, tag)| *tag == name) {
            if at > 0 {
                self.open.truncate(at);
            }
        }
    }

    fn parse_open_tag(&mut self) {
        self.pos += 1;
        let start = self.pos;
        while self.pos < self.input.len() && is_name_byte(self.input[self.pos]) {
            self.pos += 1;
        }
        let tag = String::from_utf8_lossy(&self.input[start..self.pos]).to_ascii_lowercase();
        let node = self.doc.create_element(tag.clone());

        let mut self_closing = false;
        loop {
            self.skip_whitespace();
            match self.input.get(self.pos) {
                None => break,
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(b'/') => {
                    self.pos += 1;
                    if self.input.get(self.pos) == Some(&b'>') {
                        self.pos += 1;
                        self_closing = true;
                        break;
                    }
                }
                _ => self.parse_attribute(node),
            }
        }

        self.attach(node);

        if self_closing || VOID_ELEMENTS.contains(&tag.as_str()) {
            return;
        }

        if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) {
            self.parse_raw_text(node, &tag);
        } else {
            self.open.push((node, tag));
        }
    }

    fn parse_attribute(&mut self, node: NodeId) {
        let start = self.pos;
        while self.pos < self.input.len() && is_attr_name_byte(self.input[self.pos]) {
            self.pos += 1;
        }
        if self.pos == start {
            // Unparseable byte; skip it to guarantee progress.
            self.pos += 1;
            return;
        }
        let name = String::from_utf8_lossy(&self.input[start..self.pos]).to_ascii_lowercase();

        self.skip_whitespace();
        if self.input.get(self.pos) != Some(&b'=') {
            self.doc.set_attribute(node, name, "");
            return;
        }
        self.pos += 1;
        self.skip_whitespace();

        let value = match self.input.get(self.pos) {
            Some(&quote @ (b'"' | b'\'')) => {
                self.pos += 1;
                let start = self.pos;
                while self.pos < self.input.len() && self.input[self.pos] != quote {
                    self.pos += 1;
                }
                let raw = &self.input[start..self.pos];
                if self.pos < self.input.len() {
                    self.pos += 1;
                }
                String::from_utf8_lossy(raw).into_owned()
            }
            _ => {
                let start = self.pos;
                while self
                    .input
                    .get(self.pos)
                    .is_some_and(|b| !b.is_ascii_whitespace() && *b != b'>' && *b != b'/')
                {
                    self.pos += 1;
                }
                String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
            }
        };
        self.doc.set_attribute(node, name, unescape(&value));
    }

    /// Consume until the matching close tag, storing the body verbatim.
    fn parse_raw_text(&mut self, node: NodeId, tag: &str) {
        let close = format!("</{tag}");
        let rest = &self.input[self.pos..];
        let end = find_ascii_ci(rest, close.as_bytes()).unwrap_or(rest.len());
        let body = String::from_utf8_lossy(&rest[..end]).into_owned();
        if !body.is_empty() {
            let text = self.doc.create_text(body);
            self.doc.append_child(node, text);
        }
        self.pos += end;
        // Consume the close tag itself.
        if self.pos < self.input.len() {
            while self.pos < self.input.len() && self.input[self.pos] != b'>' {
                self.pos += 1;
            }
            if self.pos < self.input.len() {
                self.pos += 1;
            }
        }
    }

    fn parse_text(&mut self) {
        let start = self.pos;
        while self.pos < self.input.len() {
            if self.input[self.pos] == b'<'
                && (self.peek_str("<!--") || self.peek_str("</") || self.next_is_tag_start())
            {
                break;
            }
            self.pos += 1;
        }
        let raw = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
        if raw.is_empty() {
            return;
        }
        let text = self.doc.create_text(unescape(&raw));
        self.attach(text);
    }

    fn skip_whitespace(&mut self) {
        while self
            .input
            .get(self.pos)
            .is_some_and(|b| b.is_ascii_whitespace())
        {
            self.pos += 1;
        }
    }
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

fn is_attr_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b':'
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|w| w == needle)
}

fn find_ascii_ci(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle))
}
