//! Tree sink and tokenizer control boundaries.
//!
//! The tree builder never owns DOM nodes: the sink owns node lifetime and the
//! builder holds non-owning [`NodeId`] handles in its stack/list state. All
//! tree mutation goes through [`TreeSink`]; all tokenizer-state feedback goes
//! through [`TokenizerControl`].

use crate::html5::shared::Namespace;
use std::sync::Arc;

/// Opaque non-owning handle into the sink's node space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Reserved sentinel for "unassigned" identity; never passed to a sink.
    pub const INVALID: NodeId = NodeId(0);
}

/// Attribute namespace for adjusted foreign attributes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttrNamespace {
    XLink,
    Xml,
    Xmlns,
}

/// Attribute as handed to the sink: resolved name/value, optional namespace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementAttr {
    pub name: Arc<str>,
    pub value: Option<String>,
    pub ns: Option<AttrNamespace>,
}

/// Document compatibility mode, decided by doctype processing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QuirksMode {
    #[default]
    NoQuirks,
    LimitedQuirks,
    Quirks,
}

/// DOM construction interface called by the tree builder.
///
/// Contracts:
/// - Nodes are created and inserted in strict document order as tokens are
///   consumed; the adoption agency is the only source of re-parenting.
/// - `append` and `reparent` detach the child from any previous parent first.
/// - `append_text` merges into a trailing text-node child when one exists.
/// - The `*_before_sibling` operations return `false` when the sibling has no
///   parent; the builder then falls back to a plain append (foster-parenting
///   fallback probe).
/// - `flush` is called before every non-character token and always before
///   end-of-file; sinks that queue mutations must apply them there.
pub trait TreeSink {
    /// Handle of the document (or fragment root) node.
    fn document(&self) -> NodeId;

    fn set_quirks_mode(&mut self, _mode: QuirksMode) {}

    fn append_doctype(&mut self, name: &str, public_id: &str, system_id: &str);

    fn create_element(
        &mut self,
        name: Arc<str>,
        ns: Namespace,
        attrs: Vec<ElementAttr>,
    ) -> NodeId;

    fn create_comment(&mut self, text: &str) -> NodeId;

    fn append(&mut self, parent: NodeId, child: NodeId);

    fn append_text(&mut self, parent: NodeId, text: &str);

    fn insert_before_sibling(&mut self, sibling: NodeId, child: NodeId) -> bool;

    fn insert_text_before_sibling(&mut self, sibling: NodeId, text: &str) -> bool;

    /// Move every child of `from` to the end of `to`, preserving order.
    fn take_all_children(&mut self, from: NodeId, to: NodeId);

    fn reparent(&mut self, child: NodeId, new_parent: NodeId);

    /// Detach a node from its parent without destroying it.
    fn remove_from_parent(&mut self, node: NodeId);

    /// Add only those attributes the element does not already carry.
    ///
    /// Used by stray `<html>`/`<body>` start tags inside the body.
    fn add_attrs_if_missing(&mut self, element: NodeId, attrs: Vec<ElementAttr>);

    /// Associate a form-associated element with its form owner.
    fn associate_form(&mut self, _element: NodeId, _form: Option<NodeId>) {}

    fn flush(&mut self) {}

    /// Called exactly once, after the end-of-file token closes the document.
    fn finished(&mut self) {}
}

/// Tokenizer states the tree builder can request.
///
/// The lexing rules themselves are out of scope; these names exist so the
/// dispatcher (and the speculative simulator) can drive an external
/// tokenizer's mode switches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TokenizerState {
    #[default]
    Data,
    Rcdata,
    Rawtext,
    ScriptData,
    Plaintext,
}

/// Mutable tokenizer state driven by the dispatcher after each token.
pub trait TokenizerControl {
    fn set_state(&mut self, state: TokenizerState);
    fn set_force_null_character_replacement(&mut self, enabled: bool);
    fn set_allow_cdata(&mut self, enabled: bool);
}

/// No-op control for drivers without a live tokenizer (tests, replays).
impl TokenizerControl for () {
    fn set_state(&mut self, _state: TokenizerState) {}
    fn set_force_null_character_replacement(&mut self, _enabled: bool) {}
    fn set_allow_cdata(&mut self, _enabled: bool) {}
}
