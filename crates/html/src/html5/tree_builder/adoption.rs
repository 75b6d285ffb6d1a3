//! The adoption agency algorithm.
//!
//! Repairs misnested formatting elements for end tags like `</b>` whose
//! element is no longer the current node. The iteration caps (8 outer, 3
//! inner) are load-bearing: they guarantee termination on pathological input
//! and bound how much cloning a hostile document can force.

use super::{EngineInvariantError, Html5TreeBuilder, Step, TreeBuilderError};
use crate::html5::shared::{Namespace, ParseErrorCode};
use crate::html5::tree_builder::formatting::Bookmark;
use crate::html5::tree_builder::sink::NodeId;
use crate::html5::tree_builder::stack::{ScopeKind, StackItem};

const OUTER_ITERATION_LIMIT: usize = 8;
const INNER_ITERATION_LIMIT: usize = 3;

impl Html5TreeBuilder {
    /// Run the adoption agency for a formatting end tag.
    ///
    /// Returns `Ok(false)` when no matching formatting element exists and the
    /// caller must fall back to the generic "any other end tag" handling.
    pub(crate) fn call_the_adoption_agency(
        &mut self,
        step: &mut Step<'_>,
        subject: &str,
    ) -> Result<bool, TreeBuilderError> {
        log::trace!(target: "html5.tree_builder", "adoption agency for </{subject}>");
        step.ctx.counters.adoption_agency_runs += 1;

        // Fast path: the current node matches and is not tracked for
        // reconstruction, so a plain pop closes it.
        if let Some(top) = self.open.top() {
            if top.is_html_element_named(subject) && !self.formatting.contains(top.node) {
                let _ = self.open.pop();
                return Ok(true);
            }
        }

        for _ in 0..OUTER_ITERATION_LIMIT {
            let Some(formatting_element) = self
                .formatting
                .closest_element_in_scope_with_name(subject)
                .cloned()
            else {
                return Ok(false);
            };
            let fe = formatting_element.node;

            if !self.open.contains(fe) {
                self.record_error(step, ParseErrorCode::MisnestedFormattingElement);
                self.formatting.remove(fe);
                return Ok(true);
            }
            if !self.open.element_in_scope(fe, ScopeKind::Default) {
                self.record_error(step, ParseErrorCode::MisnestedFormattingElement);
                return Ok(true);
            }
            if self.open.top().map(|top| top.node) != Some(fe) {
                // Legacy misnesting: an error, but processing continues.
                self.record_error(step, ParseErrorCode::MisnestedFormattingElement);
            }

            let Some(furthest_block_index) = self.open.furthest_block_index(fe) else {
                // Simple case: no special element intervenes.
                self.open.pop_until_popped_element(fe);
                self.formatting.remove(fe);
                return Ok(true);
            };
            let furthest_block = self.open.at(furthest_block_index).clone();

            let fe_index = self.open.find(fe).ok_or(EngineInvariantError)?;
            let common_ancestor = self
                .open
                .at(fe_index.checked_sub(1).ok_or(EngineInvariantError)?)
                .clone();

            let mut bookmark = self
                .formatting
                .bookmark_for(fe)
                .ok_or(EngineInvariantError)?;

            // Node-relocation loop: walk the elements between the furthest
            // block and the formatting element, cloning entries still in the
            // active list and unlinking the rest.
            let mut node_index = furthest_block_index;
            let mut last_node = furthest_block.node;
            let mut inner = 0usize;
            loop {
                inner += 1;
                node_index = node_index.checked_sub(1).ok_or(EngineInvariantError)?;
                let node = self.open.at(node_index).clone();
                if node.node == fe {
                    break;
                }
                if inner > INNER_ITERATION_LIMIT && self.formatting.contains(node.node) {
                    self.formatting.remove(node.node);
                }
                if !self.formatting.contains(node.node) {
                    let _ = self.open.remove(node.node);
                    continue;
                }
                // Clone the node from its saved token; the clone takes over
                // both the stack entry and the active-list entry.
                let clone = self.clone_without_insert(step, &node);
                let afe_index = self
                    .formatting
                    .find(node.node)
                    .ok_or(EngineInvariantError)?;
                self.formatting.set_element(afe_index, clone.clone());
                self.replace_stack_entry(node_index, clone.clone());
                if last_node == furthest_block.node {
                    bookmark = Bookmark(afe_index + 1);
                }
                step.sink.reparent(last_node, clone.node);
                last_node = clone.node;
            }

            self.insert_already_parsed_child(step, last_node, &common_ancestor)?;

            // Wrap the furthest block's content in a fresh clone of the
            // formatting element.
            let clone = self.clone_without_insert(step, &formatting_element);
            step.sink.take_all_children(furthest_block.node, clone.node);
            step.sink.reparent(clone.node, furthest_block.node);

            self.formatting.swap_to(fe, clone.clone(), bookmark);
            let _ = self.open.remove(fe);
            self.open.insert_above(clone, furthest_block.node);
        }
        Ok(true)
    }

    /// Create a fresh element from a saved token without attaching it to the
    /// tree or the stack; adoption wires it up positionally.
    fn clone_without_insert(&mut self, step: &mut Step<'_>, template: &StackItem) -> StackItem {
        let node = step.sink.create_element(
            std::sync::Arc::clone(&template.local),
            template.ns,
            template.attrs.to_vec(),
        );
        StackItem {
            node,
            name: template.name,
            local: std::sync::Arc::clone(&template.local),
            ns: template.ns,
            attrs: std::sync::Arc::clone(&template.attrs),
            synthetic_root: false,
            annotation_xml_integration: template.annotation_xml_integration,
        }
    }

    fn replace_stack_entry(&mut self, index: usize, item: StackItem) {
        let old = self.open.at(index).node;
        let _ = self.open.remove(old);
        if index == 0 {
            debug_assert!(false, "replacing bottom stack entry");
            self.open.push(item);
        } else {
            let below = self.open.at(index - 1).node;
            self.open.insert_above(item, below);
        }
    }

    /// Move an already-parsed node under `target`, foster-parenting when the
    /// target is table structure.
    fn insert_already_parsed_child(
        &mut self,
        step: &mut Step<'_>,
        child: NodeId,
        target: &StackItem,
    ) -> Result<(), TreeBuilderError> {
        let fosterish = target.ns == Namespace::Html
            && matches!(&*target.local, "table" | "tbody" | "tfoot" | "thead" | "tr");
        if fosterish {
            self.foster_parent_node(step, child)
        } else {
            step.sink.reparent(child, target.node);
            Ok(())
        }
    }
}
