//! HTML5 token model.
//!
//! Tokens are produced by an external tokenizer and consumed exactly once by
//! the tree builder. They are immutable once produced; the builder may
//! internally re-slice character payloads for whitespace handling but never
//! mutates a token.

use super::{AtomId, TextSpan};

/// HTML attribute with interned name and optional value.
///
/// Determinism contract:
/// - Attributes on a `StartTag` are stored in encounter order.
/// - Duplicate attributes in a single start tag are dropped after the first
///   occurrence (HTML tokenizer "first-wins" behavior).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    pub name: AtomId,
    pub value: Option<AttributeValue>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttributeValue {
    /// Borrowed span into the tokenizer's decoded input buffer.
    Span(TextSpan),
    /// Owned value (e.g., after entity decoding or buffer compaction).
    Owned(String),
}

/// Text payload for character token emission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TextValue {
    /// Borrowed span into the tokenizer's decoded input buffer.
    Span(TextSpan),
    /// Owned value (e.g., after decoding/replacement or compaction).
    Owned(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    Doctype {
        /// Name atomized with HTML ASCII-folding rules.
        name: Option<AtomId>,
        /// Doctype IDs are owned strings; they are sparse and never sit on a
        /// hot path, so span-lifetime coupling buys nothing here.
        public_id: Option<String>,
        system_id: Option<String>,
        force_quirks: bool,
    },
    StartTag {
        name: AtomId,
        attrs: Vec<Attribute>,
        self_closing: bool,
    },
    EndTag {
        name: AtomId,
    },
    Comment {
        text: TextValue,
    },
    /// Character run in the HTML5 stream.
    ///
    /// Order is source order; payload storage (`Span` vs `Owned`) is an
    /// implementation detail of the producing tokenizer.
    Text {
        text: TextValue,
    },
    Eof,
}
