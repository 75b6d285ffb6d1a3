//! Stack of open elements.
//!
//! Entries hold non-owning node handles plus the metadata the algorithm
//! queries (name, namespace, saved attributes for cloning). The stack is
//! Vec-backed: O(1) top access, O(n) scoped search, positional removal and
//! insertion for the adoption agency.

use super::sink::{ElementAttr, NodeId};
use super::tags;
use crate::html5::shared::{AtomId, Namespace};
use std::sync::Arc;

/// One entry on the stack of open elements or the active formatting list.
///
/// Each item backs exactly one DOM node owned by the sink; the item itself
/// owns only metadata. Attributes are saved at creation time because the
/// adoption agency and formatting reconstruction clone elements from the
/// token they were created from.
#[derive(Clone, Debug)]
pub(crate) struct StackItem {
    pub(crate) node: NodeId,
    pub(crate) name: AtomId,
    pub(crate) local: Arc<str>,
    pub(crate) ns: Namespace,
    pub(crate) attrs: Arc<[ElementAttr]>,
    /// Synthetic root/context entry used in fragment parsing.
    pub(crate) synthetic_root: bool,
    /// Precomputed for `annotation-xml`: encoding makes it an HTML
    /// integration point.
    pub(crate) annotation_xml_integration: bool,
}

impl StackItem {
    pub(crate) fn is_html_element_named(&self, name: &str) -> bool {
        self.ns == Namespace::Html && &*self.local == name
    }

    pub(crate) fn is_special(&self) -> bool {
        tags::is_special(&self.local, self.ns)
    }

    pub(crate) fn is_mathml_text_integration_point(&self) -> bool {
        tags::is_mathml_text_integration_point(&self.local, self.ns)
    }

    pub(crate) fn is_html_integration_point(&self) -> bool {
        tags::is_svg_html_integration_point(&self.local, self.ns)
            || (self.ns == Namespace::MathMl
                && &*self.local == "annotation-xml"
                && self.annotation_xml_integration)
    }
}

/// Scope flavors used by scoped stack queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ScopeKind {
    /// Baseline "has an element in scope".
    Default,
    /// "In list-item scope" (default + ol, ul).
    ListItem,
    /// "In button scope" (default + button).
    Button,
    /// "In table scope" (html, table, template only).
    Table,
    /// "In select scope" (every tag except optgroup/option is a boundary).
    Select,
}

fn is_scope_boundary(item: &StackItem, kind: ScopeKind) -> bool {
    match kind {
        ScopeKind::Default => match item.ns {
            Namespace::Html => matches!(
                &*item.local,
                "applet" | "caption" | "html" | "table" | "td" | "th" | "marquee" | "object"
                    | "template"
            ),
            // Foreign integration points bound HTML scopes.
            Namespace::MathMl => matches!(
                &*item.local,
                "mi" | "mo" | "mn" | "ms" | "mtext" | "annotation-xml"
            ),
            Namespace::Svg => matches!(&*item.local, "foreignObject" | "desc" | "title"),
        },
        ScopeKind::ListItem => {
            is_scope_boundary(item, ScopeKind::Default)
                || (item.ns == Namespace::Html && matches!(&*item.local, "ol" | "ul"))
        }
        ScopeKind::Button => {
            is_scope_boundary(item, ScopeKind::Default)
                || (item.ns == Namespace::Html && &*item.local == "button")
        }
        ScopeKind::Table => {
            item.ns == Namespace::Html && matches!(&*item.local, "html" | "table" | "template")
        }
        ScopeKind::Select => {
            !(item.ns == Namespace::Html && matches!(&*item.local, "optgroup" | "option"))
        }
    }
}

/// Stack of open elements.
///
/// Invariant: never empty during active parsing; the bottom entry is the
/// `<html>` root (or the synthetic root in fragment parsing).
#[derive(Clone, Debug, Default)]
pub(crate) struct OpenElementsStack {
    items: Vec<StackItem>,
}

impl OpenElementsStack {
    pub(crate) fn clear(&mut self) {
        self.items.clear();
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn push(&mut self, item: StackItem) {
        self.items.push(item);
    }

    pub(crate) fn pop(&mut self) -> Option<StackItem> {
        debug_assert!(self.items.len() > 1 || self.items.first().is_none_or(|i| !i.synthetic_root));
        self.items.pop()
    }

    /// Current (innermost) open element.
    pub(crate) fn top(&self) -> Option<&StackItem> {
        self.items.last()
    }

    /// Bottom-most entry: document root, or the context item in fragments.
    pub(crate) fn bottom(&self) -> Option<&StackItem> {
        self.items.first()
    }

    pub(crate) fn at(&self, index: usize) -> &StackItem {
        &self.items[index]
    }

    pub(crate) fn iter(&self) -> std::slice::Iter<'_, StackItem> {
        self.items.iter()
    }

    pub(crate) fn find(&self, node: NodeId) -> Option<usize> {
        self.items.iter().rposition(|item| item.node == node)
    }

    pub(crate) fn contains(&self, node: NodeId) -> bool {
        self.find(node).is_some()
    }

    pub(crate) fn contains_html_element(&self, name: &str) -> bool {
        self.items.iter().any(|item| item.is_html_element_named(name))
    }

    pub(crate) fn remove(&mut self, node: NodeId) -> Option<StackItem> {
        let index = self.find(node)?;
        Some(self.items.remove(index))
    }

    /// Insert `item` immediately above the entry backing `reference`.
    ///
    /// Caller invariant: `reference` is on the stack (adoption agency only
    /// calls this for the furthest block, which it just located).
    pub(crate) fn insert_above(&mut self, item: StackItem, reference: NodeId) {
        match self.find(reference) {
            Some(index) => self.items.insert(index + 1, item),
            None => {
                debug_assert!(false, "insert_above reference not on stack");
                self.items.push(item);
            }
        }
    }

    /// Walk from the top downward; true if an element with `name` is found
    /// before any scope boundary of `kind`.
    pub(crate) fn in_scope(&self, name: &str, kind: ScopeKind) -> bool {
        for item in self.items.iter().rev() {
            if item.is_html_element_named(name) {
                return true;
            }
            if is_scope_boundary(item, kind) {
                return false;
            }
        }
        false
    }

    /// Scope query for a specific element rather than a tag name.
    pub(crate) fn element_in_scope(&self, node: NodeId, kind: ScopeKind) -> bool {
        for item in self.items.iter().rev() {
            if item.node == node {
                return true;
            }
            if is_scope_boundary(item, kind) {
                return false;
            }
        }
        false
    }

    pub(crate) fn numbered_header_in_scope(&self) -> bool {
        for item in self.items.iter().rev() {
            if item.ns == Namespace::Html && tags::is_numbered_header(&item.local) {
                return true;
            }
            if is_scope_boundary(item, ScopeKind::Default) {
                return false;
            }
        }
        false
    }

    /// Pop repeatedly, inclusive, until an HTML element named `name` has been
    /// popped.
    ///
    /// Caller invariant: the target is known present (checked via a prior
    /// scope query). In release builds a missing target stops at the bottom
    /// sentinel instead of underflowing.
    pub(crate) fn pop_until_popped(&mut self, name: &str) {
        debug_assert!(self.contains_html_element(name), "pop_until_popped target missing");
        while self.items.len() > 1 {
            let popped = self.items.pop();
            if popped.is_some_and(|item| item.is_html_element_named(name)) {
                return;
            }
        }
    }

    /// Pop repeatedly, inclusive, until the entry backing `node` is popped.
    pub(crate) fn pop_until_popped_element(&mut self, node: NodeId) {
        debug_assert!(self.contains(node), "pop_until_popped_element target missing");
        while self.items.len() > 1 {
            let popped = self.items.pop();
            if popped.is_some_and(|item| item.node == node) {
                return;
            }
        }
    }

    pub(crate) fn pop_until_numbered_header_popped(&mut self) {
        while self.items.len() > 1 {
            let popped = self.items.pop();
            if popped
                .is_some_and(|item| item.ns == Namespace::Html && tags::is_numbered_header(&item.local))
            {
                return;
            }
        }
    }

    /// Pop until the top is a table-structure boundary (`table`, `template`,
    /// or the root). Exclusive: the boundary stays on the stack.
    pub(crate) fn pop_until_table_scope_marker(&mut self) {
        self.pop_until_marker(|item| {
            matches!(&*item.local, "table" | "template" | "html") && item.ns == Namespace::Html
        });
    }

    /// Pop until the top is tbody/tfoot/thead/template/html.
    pub(crate) fn pop_until_table_body_scope_marker(&mut self) {
        self.pop_until_marker(|item| {
            item.ns == Namespace::Html
                && (tags::is_table_body_context(&item.local)
                    || matches!(&*item.local, "template" | "html"))
        });
    }

    /// Pop until the top is tr/template/html.
    pub(crate) fn pop_until_table_row_scope_marker(&mut self) {
        self.pop_until_marker(|item| {
            item.ns == Namespace::Html && matches!(&*item.local, "tr" | "template" | "html")
        });
    }

    fn pop_until_marker(&mut self, is_marker: impl Fn(&StackItem) -> bool) {
        while let Some(top) = self.items.last() {
            if top.synthetic_root || is_marker(top) {
                return;
            }
            let _ = self.items.pop();
        }
    }

    /// Pop until the current node is in the HTML namespace (foreign-content
    /// breakout recovery).
    pub(crate) fn pop_until_foreign_content_scope_marker(&mut self) {
        while let Some(top) = self.items.last() {
            if top.ns == Namespace::Html
                || top.is_mathml_text_integration_point()
                || top.is_html_integration_point()
            {
                return;
            }
            let _ = self.items.pop();
        }
    }

    /// Topmost element above `formatting_element`'s position that is special.
    ///
    /// Returns the stack index of the furthest block, or `None` when no
    /// special element sits between the formatting element and the top.
    pub(crate) fn furthest_block_index(&self, formatting_element: NodeId) -> Option<usize> {
        let start = self.find(formatting_element)?;
        self.items[start + 1..]
            .iter()
            .position(|item| item.is_special())
            .map(|offset| start + 1 + offset)
    }

    // Fragment-parsing support predicates.

    pub(crate) fn has_only_one_element(&self) -> bool {
        self.items.len() == 1
    }

    pub(crate) fn second_element_is_body(&self) -> bool {
        self.items
            .get(1)
            .is_some_and(|item| item.is_html_element_named("body"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(node: u32, name: &str, ns: Namespace) -> StackItem {
        StackItem {
            node: NodeId(node),
            name: AtomId(node),
            local: Arc::from(name),
            ns,
            attrs: Arc::from([]),
            synthetic_root: false,
            annotation_xml_integration: false,
        }
    }

    #[test]
    fn scope_query_stops_at_boundary() {
        let mut stack = OpenElementsStack::default();
        stack.push(item(1, "html", Namespace::Html));
        stack.push(item(2, "body", Namespace::Html));
        stack.push(item(3, "p", Namespace::Html));
        assert!(stack.in_scope("p", ScopeKind::Default));
        stack.push(item(4, "table", Namespace::Html));
        assert!(!stack.in_scope("p", ScopeKind::Default));
        // Target above the boundary is still visible.
        stack.push(item(5, "p", Namespace::Html));
        assert!(stack.in_scope("p", ScopeKind::Default));
    }

    #[test]
    fn button_and_list_item_scopes_add_boundaries() {
        let mut stack = OpenElementsStack::default();
        stack.push(item(1, "html", Namespace::Html));
        stack.push(item(2, "p", Namespace::Html));
        assert!(stack.in_scope("p", ScopeKind::Button));
        stack.push(item(3, "button", Namespace::Html));
        assert!(!stack.in_scope("p", ScopeKind::Button));
        assert!(stack.in_scope("p", ScopeKind::Default));

        let mut list = OpenElementsStack::default();
        list.push(item(1, "html", Namespace::Html));
        list.push(item(2, "li", Namespace::Html));
        list.push(item(3, "ul", Namespace::Html));
        assert!(!list.in_scope("li", ScopeKind::ListItem));
        assert!(list.in_scope("li", ScopeKind::Default));
    }

    #[test]
    fn select_scope_inverts_boundaries() {
        let mut stack = OpenElementsStack::default();
        stack.push(item(1, "select", Namespace::Html));
        stack.push(item(2, "optgroup", Namespace::Html));
        stack.push(item(3, "option", Namespace::Html));
        assert!(stack.in_scope("select", ScopeKind::Select));
        stack.push(item(4, "div", Namespace::Html));
        assert!(!stack.in_scope("select", ScopeKind::Select));
    }

    #[test]
    fn foreign_integration_points_bound_default_scope() {
        let mut stack = OpenElementsStack::default();
        stack.push(item(1, "html", Namespace::Html));
        stack.push(item(2, "p", Namespace::Html));
        stack.push(item(3, "svg", Namespace::Svg));
        // svg itself is not a boundary...
        assert!(stack.in_scope("p", ScopeKind::Default));
        // ...but an integration point is.
        stack.push(item(4, "foreignObject", Namespace::Svg));
        assert!(!stack.in_scope("p", ScopeKind::Default));
    }

    #[test]
    fn pop_until_popped_removes_target_inclusive() {
        let mut stack = OpenElementsStack::default();
        stack.push(item(1, "html", Namespace::Html));
        stack.push(item(2, "div", Namespace::Html));
        stack.push(item(3, "span", Namespace::Html));
        stack.pop_until_popped("div");
        assert!(!stack.in_scope("div", ScopeKind::Default));
        assert_eq!(stack.top().map(|i| i.node), Some(NodeId(1)));
    }

    #[test]
    fn table_scope_markers_stop_exclusive() {
        let mut stack = OpenElementsStack::default();
        stack.push(item(1, "html", Namespace::Html));
        stack.push(item(2, "table", Namespace::Html));
        stack.push(item(3, "b", Namespace::Html));
        stack.push(item(4, "span", Namespace::Html));
        stack.pop_until_table_scope_marker();
        assert_eq!(stack.top().map(|i| i.node), Some(NodeId(2)));
    }

    #[test]
    fn furthest_block_is_topmost_special_above_formatting_element() {
        let mut stack = OpenElementsStack::default();
        stack.push(item(1, "html", Namespace::Html));
        stack.push(item(2, "b", Namespace::Html));
        stack.push(item(3, "i", Namespace::Html));
        stack.push(item(4, "p", Namespace::Html));
        stack.push(item(5, "span", Namespace::Html));
        // First special above <b> is <p> at index 3.
        assert_eq!(stack.furthest_block_index(NodeId(2)), Some(3));
        // Nothing special above <p>.
        assert_eq!(stack.furthest_block_index(NodeId(4)), None);
    }

    #[test]
    fn positional_insert_and_remove() {
        let mut stack = OpenElementsStack::default();
        stack.push(item(1, "html", Namespace::Html));
        stack.push(item(2, "b", Namespace::Html));
        stack.push(item(3, "p", Namespace::Html));
        let _ = stack.remove(NodeId(2));
        assert_eq!(stack.len(), 2);
        stack.insert_above(item(4, "b", Namespace::Html), NodeId(3));
        assert_eq!(stack.top().map(|i| i.node), Some(NodeId(4)));
    }
}
