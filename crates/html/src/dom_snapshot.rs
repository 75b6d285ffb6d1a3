//! Deterministic DOM arena and snapshot rendering for tests.
//!
//! [`SnapshotDom`] is a reference [`TreeSink`] backed by a flat node arena;
//! the snapshot is a line-oriented serialization used for golden comparisons.
//! Not a public stable format; intended for internal test comparisons.
//!
//! Equivalence rules:
//! - Node kinds, names, and namespaces must match.
//! - Attribute list order is significant; names and values must match.
//! - Adjacent text is merged at insertion time, so text nodes compare whole.
//! - Comments and doctypes must match exactly.

use crate::html5::shared::Namespace;
use crate::html5::tree_builder::{ElementAttr, NodeId, QuirksMode, TreeSink};
use std::fmt::Write as _;
use std::sync::Arc;

#[derive(Debug)]
enum NodeKind {
    Document {
        doctype: Option<String>,
    },
    Element {
        name: Arc<str>,
        ns: Namespace,
        attrs: Vec<ElementAttr>,
    },
    Text {
        text: String,
    },
    Comment {
        text: String,
    },
}

#[derive(Debug)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

/// Arena-backed reference DOM.
#[derive(Debug)]
pub struct SnapshotDom {
    nodes: Vec<Node>,
    quirks: QuirksMode,
    finished: bool,
}

impl SnapshotDom {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Document { doctype: None },
            }],
            quirks: QuirksMode::NoQuirks,
            finished: false,
        }
    }

    pub fn quirks_mode(&self) -> QuirksMode {
        self.quirks
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            kind,
        });
        // Ids are offset by one so NodeId::INVALID stays unused.
        NodeId(self.nodes.len() as u32)
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize - 1]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize - 1]
    }

    fn detach(&mut self, child: NodeId) {
        if let Some(parent) = self.node(child).parent {
            self.node_mut(parent).children.retain(|c| *c != child);
            self.node_mut(child).parent = None;
        }
    }

    fn attach_at(&mut self, parent: NodeId, child: NodeId, index: Option<usize>) {
        self.detach(child);
        match index {
            Some(index) => self.node_mut(parent).children.insert(index, child),
            None => self.node_mut(parent).children.push(child),
        }
        self.node_mut(child).parent = Some(parent);
    }

    fn last_text_child(&self, parent: NodeId) -> Option<NodeId> {
        let last = *self.node(parent).children.last()?;
        matches!(self.node(last).kind, NodeKind::Text { .. }).then_some(last)
    }

    /// Line-oriented rendering of the whole document.
    pub fn snapshot(&self) -> Vec<String> {
        let mut lines = Vec::new();
        self.walk(NodeId(1), 0, &mut lines);
        lines
    }

    pub fn render(&self) -> String {
        self.snapshot().join("\n")
    }

    /// Re-serialize the tree as markup in document order.
    ///
    /// Used by re-parse stability tests: void elements get no end tag, text
    /// and attribute values are emitted raw. Only meaningful for trees whose
    /// text holds no markup-significant characters.
    pub fn serialize_markup(&self) -> String {
        let mut out = String::new();
        self.serialize_node(NodeId(1), &mut out);
        out
    }

    fn serialize_node(&self, id: NodeId, out: &mut String) {
        let node = self.node(id);
        match &node.kind {
            NodeKind::Document { doctype } => {
                if let Some(doctype) = doctype {
                    let _ = write!(out, "<!DOCTYPE {doctype}>");
                }
            }
            NodeKind::Element { name, ns, attrs } => {
                let _ = write!(out, "<{name}");
                for attr in attrs {
                    let _ = write!(out, " {}", attr.name);
                    if let Some(value) = &attr.value {
                        let _ = write!(out, "=\"{value}\"");
                    }
                }
                out.push('>');
                if *ns == Namespace::Html
                    && crate::html5::tree_builder::tags::element_cannot_have_end_tag(name)
                {
                    return;
                }
                for child in &node.children {
                    self.serialize_node(*child, out);
                }
                let _ = write!(out, "</{name}>");
                return;
            }
            NodeKind::Text { text } => {
                out.push_str(text);
                return;
            }
            NodeKind::Comment { text } => {
                let _ = write!(out, "<!--{text}-->");
                return;
            }
        }
        for child in &node.children {
            self.serialize_node(*child, out);
        }
    }

    fn walk(&self, id: NodeId, depth: usize, out: &mut Vec<String>) {
        let node = self.node(id);
        let mut line = " ".repeat(depth * 2);
        match &node.kind {
            NodeKind::Document { doctype } => {
                line.push_str("#document");
                out.push(line);
                if let Some(doctype) = doctype {
                    out.push(format!("  <!DOCTYPE {doctype}>"));
                }
            }
            NodeKind::Element { name, ns, attrs } => {
                line.push('<');
                match ns {
                    Namespace::Html => {}
                    Namespace::Svg => line.push_str("svg "),
                    Namespace::MathMl => line.push_str("math "),
                }
                line.push_str(name);
                for attr in attrs {
                    let _ = write!(line, " {}", attr.name);
                    if let Some(value) = &attr.value {
                        let _ = write!(line, "=\"{}\"", escape(value));
                    }
                }
                line.push('>');
                out.push(line);
            }
            NodeKind::Text { text } => {
                let _ = write!(line, "\"{}\"", escape(text));
                out.push(line);
            }
            NodeKind::Comment { text } => {
                let _ = write!(line, "<!-- {} -->", escape(text));
                out.push(line);
            }
        }
        for child in &node.children {
            self.walk(*child, depth + 1, out);
        }
    }
}

impl Default for SnapshotDom {
    fn default() -> Self {
        Self::new()
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

impl TreeSink for SnapshotDom {
    fn document(&self) -> NodeId {
        NodeId(1)
    }

    fn set_quirks_mode(&mut self, mode: QuirksMode) {
        self.quirks = mode;
    }

    fn append_doctype(&mut self, name: &str, public_id: &str, system_id: &str) {
        let mut rendered = name.to_string();
        if !public_id.is_empty() || !system_id.is_empty() {
            let _ = write!(rendered, " \"{public_id}\" \"{system_id}\"");
        }
        let document = self.document();
        if let NodeKind::Document { doctype } = &mut self.node_mut(document).kind {
            *doctype = Some(rendered);
        }
    }

    fn create_element(
        &mut self,
        name: Arc<str>,
        ns: Namespace,
        attrs: Vec<ElementAttr>,
    ) -> NodeId {
        self.alloc(NodeKind::Element { name, ns, attrs })
    }

    fn create_comment(&mut self, text: &str) -> NodeId {
        self.alloc(NodeKind::Comment {
            text: text.to_string(),
        })
    }

    fn append(&mut self, parent: NodeId, child: NodeId) {
        self.attach_at(parent, child, None);
    }

    fn append_text(&mut self, parent: NodeId, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(last) = self.last_text_child(parent) {
            if let NodeKind::Text { text: existing } = &mut self.node_mut(last).kind {
                existing.push_str(text);
                return;
            }
        }
        let node = self.alloc(NodeKind::Text {
            text: text.to_string(),
        });
        self.attach_at(parent, node, None);
    }

    fn insert_before_sibling(&mut self, sibling: NodeId, child: NodeId) -> bool {
        let Some(parent) = self.node(sibling).parent else {
            return false;
        };
        let index = self
            .node(parent)
            .children
            .iter()
            .position(|c| *c == sibling)
            .expect("sibling is a child of its parent");
        self.attach_at(parent, child, Some(index));
        true
    }

    fn insert_text_before_sibling(&mut self, sibling: NodeId, text: &str) -> bool {
        let Some(parent) = self.node(sibling).parent else {
            return false;
        };
        let index = self
            .node(parent)
            .children
            .iter()
            .position(|c| *c == sibling)
            .expect("sibling is a child of its parent");
        // Merge with a text node immediately before the sibling.
        if index > 0 {
            let before = self.node(parent).children[index - 1];
            if let NodeKind::Text { text: existing } = &mut self.node_mut(before).kind {
                existing.push_str(text);
                return true;
            }
        }
        let node = self.alloc(NodeKind::Text {
            text: text.to_string(),
        });
        self.attach_at(parent, node, Some(index));
        true
    }

    fn take_all_children(&mut self, from: NodeId, to: NodeId) {
        let children = std::mem::take(&mut self.node_mut(from).children);
        for child in children {
            self.node_mut(child).parent = None;
            self.attach_at(to, child, None);
        }
    }

    fn reparent(&mut self, child: NodeId, new_parent: NodeId) {
        self.attach_at(new_parent, child, None);
    }

    fn remove_from_parent(&mut self, node: NodeId) {
        self.detach(node);
    }

    fn add_attrs_if_missing(&mut self, element: NodeId, attrs: Vec<ElementAttr>) {
        if let NodeKind::Element { attrs: existing, .. } = &mut self.node_mut(element).kind {
            for attr in attrs {
                if !existing.iter().any(|e| e.name == attr.name) {
                    existing.push(attr);
                }
            }
        }
    }

    fn finished(&mut self) {
        self.finished = true;
    }
}
