//! Active formatting elements list.
//!
//! Tracks formatting elements (`<b>`, `<a>`, ...) eligible for reconstruction
//! after intervening block content, separated by markers that block
//! reconstruction across cell/caption/applet/object/marquee/template
//! boundaries. Positional replace/lookup is required by the adoption agency,
//! which records a bookmark because the list mutates while it runs.

use super::sink::NodeId;
use super::stack::{OpenElementsStack, StackItem};

#[derive(Clone, Debug)]
pub(crate) enum FormattingEntry {
    /// Sentinel blocking reconstruction across a container boundary.
    Marker,
    Element(StackItem),
}

impl FormattingEntry {
    pub(crate) fn element(&self) -> Option<&StackItem> {
        match self {
            FormattingEntry::Marker => None,
            FormattingEntry::Element(item) => Some(item),
        }
    }
}

/// Position in the list where the adoption agency re-inserts the clone of the
/// formatting element. Recorded before the list mutates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Bookmark(pub(crate) usize);

/// How many identical entries may exist between the last marker and the end
/// of the list before the earliest is evicted.
const NOAHS_ARK_CAPACITY: usize = 3;

#[derive(Clone, Debug, Default)]
pub(crate) struct ActiveFormattingElements {
    entries: Vec<FormattingEntry>,
}

impl ActiveFormattingElements {
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn entry(&self, index: usize) -> &FormattingEntry {
        &self.entries[index]
    }

    /// Replace the element at `index` in place (formatting reconstruction
    /// advances entries to reference freshly inserted clones).
    pub(crate) fn set_element(&mut self, index: usize, item: StackItem) {
        self.entries[index] = FormattingEntry::Element(item);
    }

    /// Append a formatting element, enforcing the Noah's Ark clause: if three
    /// entries between the last marker and the end already match this
    /// element's name, namespace, and attribute multiset, the earliest match
    /// is removed first.
    pub(crate) fn append(&mut self, item: StackItem) {
        let start = self.index_after_last_marker();
        let mut matches: Vec<usize> = Vec::new();
        for (offset, entry) in self.entries[start..].iter().enumerate() {
            if let Some(existing) = entry.element()
                && existing.name == item.name
                && existing.ns == item.ns
                && attr_multisets_equal(&existing.attrs, &item.attrs)
            {
                matches.push(start + offset);
            }
        }
        if matches.len() >= NOAHS_ARK_CAPACITY {
            let _ = self.entries.remove(matches[0]);
        }
        self.entries.push(FormattingEntry::Element(item));
    }

    /// Index of the first entry after the last marker, or 0 when the list has
    /// no marker. Bounds the Noah's Ark scan to the current container.
    fn index_after_last_marker(&self) -> usize {
        self.entries
            .iter()
            .rposition(|entry| matches!(entry, FormattingEntry::Marker))
            .map_or(0, |index| index + 1)
    }

    pub(crate) fn append_marker(&mut self) {
        self.entries.push(FormattingEntry::Marker);
    }

    /// Remove entries back through and including the last marker.
    pub(crate) fn clear_to_last_marker(&mut self) {
        while let Some(entry) = self.entries.pop() {
            if matches!(entry, FormattingEntry::Marker) {
                return;
            }
        }
    }

    pub(crate) fn find(&self, node: NodeId) -> Option<usize> {
        self.entries
            .iter()
            .rposition(|entry| entry.element().is_some_and(|item| item.node == node))
    }

    pub(crate) fn contains(&self, node: NodeId) -> bool {
        self.find(node).is_some()
    }

    pub(crate) fn remove(&mut self, node: NodeId) {
        if let Some(index) = self.find(node) {
            let _ = self.entries.remove(index);
        }
    }

    /// Record the position of `node`'s entry for later re-insertion.
    pub(crate) fn bookmark_for(&self, node: NodeId) -> Option<Bookmark> {
        self.find(node).map(Bookmark)
    }

    /// Remove `old` and insert `new_item` at the bookmarked position,
    /// compensating for the index shift when the removal precedes the
    /// bookmark.
    pub(crate) fn swap_to(&mut self, old: NodeId, new_item: StackItem, bookmark: Bookmark) {
        let Some(old_index) = self.find(old) else {
            debug_assert!(false, "swap_to target not in list");
            return;
        };
        let _ = self.entries.remove(old_index);
        let mut at = bookmark.0;
        if old_index < at {
            at -= 1;
        }
        let at = at.min(self.entries.len());
        self.entries.insert(at, FormattingEntry::Element(new_item));
    }

    /// Innermost formatting element with `name` between the end of the list
    /// and the last marker.
    pub(crate) fn closest_element_in_scope_with_name(&self, name: &str) -> Option<&StackItem> {
        for entry in self.entries.iter().rev() {
            match entry {
                FormattingEntry::Marker => return None,
                FormattingEntry::Element(item) => {
                    if &*item.local == name {
                        return Some(item);
                    }
                }
            }
        }
        None
    }

    /// First entry that needs reconstruction, or `None` when nothing does.
    ///
    /// This is the rewind step of "reconstruct the active formatting
    /// elements": walk backward while entries are neither markers nor open,
    /// then report the earliest such entry. The dominant fast path (empty
    /// list / last entry is a marker / last entry already open) returns
    /// `None` without scanning.
    pub(crate) fn first_unopened_index(&self, open: &OpenElementsStack) -> Option<usize> {
        let last = self.entries.last()?;
        if last
            .element()
            .is_none_or(|item| open.contains(item.node))
        {
            return None;
        }
        let mut index = self.entries.len() - 1;
        while index > 0 {
            let previous = &self.entries[index - 1];
            if previous
                .element()
                .is_none_or(|item| open.contains(item.node))
            {
                break;
            }
            index -= 1;
        }
        Some(index)
    }
}

/// Order-insensitive attribute comparison. Names are unique per first-wins
/// tokenization, so pairwise containment plus equal length is multiset
/// equality.
fn attr_multisets_equal(
    a: &[super::sink::ElementAttr],
    b: &[super::sink::ElementAttr],
) -> bool {
    a.len() == b.len()
        && a.iter().all(|attr| {
            b.iter()
                .any(|other| attr.name == other.name && attr.value == other.value && attr.ns == other.ns)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html5::shared::{AtomId, Namespace};
    use crate::html5::tree_builder::sink::ElementAttr;
    use std::sync::Arc;

    fn entry(node: u32, name: &str, attrs: &[(&str, &str)]) -> StackItem {
        let attrs: Vec<ElementAttr> = attrs
            .iter()
            .map(|(name, value)| ElementAttr {
                name: Arc::from(*name),
                value: Some((*value).to_string()),
                ns: None,
            })
            .collect();
        StackItem {
            node: NodeId(node),
            name: AtomId(1),
            local: Arc::from(name),
            ns: Namespace::Html,
            attrs: Arc::from(attrs.as_slice()),
            synthetic_root: false,
            annotation_xml_integration: false,
        }
    }

    #[test]
    fn noahs_ark_evicts_fourth_identical_entry() {
        let mut list = ActiveFormattingElements::default();
        for node in 1..=4 {
            list.append(entry(node, "b", &[("class", "x")]));
        }
        assert_eq!(list.len(), 3);
        assert!(!list.contains(NodeId(1)), "earliest entry must be evicted");
        assert!(list.contains(NodeId(4)));
    }

    #[test]
    fn noahs_ark_distinguishes_attribute_sets() {
        let mut list = ActiveFormattingElements::default();
        list.append(entry(1, "b", &[("class", "x")]));
        list.append(entry(2, "b", &[("class", "y")]));
        list.append(entry(3, "b", &[("class", "x")]));
        list.append(entry(4, "b", &[("class", "x")]));
        list.append(entry(5, "b", &[("class", "x")]));
        // Three "x" entries allowed; the "y" entry never counts against them.
        assert_eq!(list.len(), 4);
        assert!(!list.contains(NodeId(1)));
        assert!(list.contains(NodeId(2)));
    }

    #[test]
    fn noahs_ark_resets_at_marker() {
        let mut list = ActiveFormattingElements::default();
        for node in 1..=3 {
            list.append(entry(node, "b", &[]));
        }
        list.append_marker();
        list.append(entry(4, "b", &[]));
        assert_eq!(list.len(), 5, "marker shields earlier entries");
        assert!(list.contains(NodeId(1)));
    }

    #[test]
    fn clear_to_last_marker_is_inclusive() {
        let mut list = ActiveFormattingElements::default();
        list.append(entry(1, "b", &[]));
        list.append_marker();
        list.append(entry(2, "i", &[]));
        list.clear_to_last_marker();
        assert_eq!(list.len(), 1);
        assert!(list.contains(NodeId(1)));
    }

    #[test]
    fn closest_in_scope_stops_at_marker() {
        let mut list = ActiveFormattingElements::default();
        list.append(entry(1, "a", &[]));
        list.append_marker();
        list.append(entry(2, "b", &[]));
        assert!(list.closest_element_in_scope_with_name("a").is_none());
        assert_eq!(
            list.closest_element_in_scope_with_name("b").map(|i| i.node),
            Some(NodeId(2))
        );
    }

    #[test]
    fn swap_to_adjusts_bookmark_after_removal() {
        let mut list = ActiveFormattingElements::default();
        list.append(entry(1, "b", &[]));
        list.append(entry(2, "i", &[]));
        list.append(entry(3, "u", &[]));
        // Bookmark after <u>, then remove <b> (before the bookmark).
        let bookmark = Bookmark(3);
        list.swap_to(NodeId(1), entry(4, "b", &[]), bookmark);
        assert_eq!(list.len(), 3);
        assert_eq!(
            list.entry(2).element().map(|i| i.node),
            Some(NodeId(4)),
            "clone lands where the bookmark pointed, shifted by the removal"
        );
    }
}
