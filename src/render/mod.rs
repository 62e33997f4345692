//! Server-side serialization: escaping contracts and the one-shot string
//! renderer.

pub mod escape;
pub mod string;

pub use escape::{escape_attr, escape_script_json, escape_text, unescape};
pub use string::render_to_string;
