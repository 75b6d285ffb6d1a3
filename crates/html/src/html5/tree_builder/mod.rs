//! HTML5 tree builder public API.
//!
//! Consumes HTML5 tokens and materializes a DOM through the [`TreeSink`]
//! boundary. The builder owns all tree-construction state (insertion modes,
//! stack of open elements, active formatting list, template mode stack) and
//! is resumable across token boundaries.
//!
//! Invariants:
//! - Single-threaded and non-reentrant: one token is fully processed,
//!   including any cascade of synthesized tokens, before the next is
//!   accepted.
//! - Nodes are inserted in strict document order; the adoption agency is the
//!   only source of re-parenting.
//! - Every input produces a well-formed tree; malformed markup is recovered
//!   through the algorithm's defined actions and recorded as parse errors in
//!   the document context.

use crate::html5::shared::{
    AtomId, AtomTable, Attribute, AttributeValue, DocumentParseContext, Namespace, ParseError,
    ParseErrorCode, TextResolver, TextValue, Token,
};
use std::sync::Arc;

mod adoption;
mod foreign;
mod formatting;
mod modes;
mod rules;
pub mod simulator;
mod sink;
mod stack;
pub(crate) mod tags;

#[cfg(test)]
mod tests;

pub use modes::InsertionMode;
pub use sink::{
    AttrNamespace, ElementAttr, NodeId, QuirksMode, TokenizerControl, TokenizerState, TreeSink,
};

use formatting::{ActiveFormattingElements, FormattingEntry};
use stack::{OpenElementsStack, ScopeKind, StackItem};

/// Engine invariant violation (bug/corruption), not a recoverable HTML error.
#[derive(Clone, Debug)]
pub struct EngineInvariantError;

pub type TreeBuilderError = EngineInvariantError;

/// Tree builder step result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeBuilderStepResult {
    Continue,
    Suspend(SuspendReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SuspendReason {
    /// A `</script>` completed; the driver should execute the pending script
    /// element before pushing further tokens.
    Script,
    Other,
}

#[derive(Clone, Debug)]
pub struct TreeBuilderConfig {
    /// Whether scripting is enabled for this parse; affects `<noscript>`
    /// handling. This library never executes scripts itself, so the default
    /// is off.
    pub scripting_enabled: bool,
}

impl Default for TreeBuilderConfig {
    fn default() -> Self {
        Self {
            scripting_enabled: false,
        }
    }
}

/// Context element for fragment parsing.
///
/// The context element belongs to the caller's document, not to the tree
/// under construction; only its name, namespace, and form owner matter here.
#[derive(Clone, Debug)]
pub struct FragmentContext {
    pub name: Arc<str>,
    pub ns: Namespace,
    pub form_owner: Option<NodeId>,
}

/// External interfaces for one token step.
pub(crate) struct Step<'a> {
    pub(crate) ctx: &'a mut DocumentParseContext,
    pub(crate) text: &'a dyn TextResolver,
    pub(crate) sink: &'a mut dyn TreeSink,
    pub(crate) tokenizer: &'a mut dyn TokenizerControl,
}

pub(crate) fn resolve_name(
    atoms: &AtomTable,
    id: AtomId,
) -> Result<Arc<str>, TreeBuilderError> {
    atoms.resolve_arc(id).ok_or(EngineInvariantError)
}

pub(crate) fn resolve_text<'a>(
    text: &'a dyn TextResolver,
    value: &'a TextValue,
) -> Result<&'a str, TreeBuilderError> {
    match value {
        TextValue::Span(span) => text.resolve_span(*span).map_err(|_| EngineInvariantError),
        TextValue::Owned(owned) => Ok(owned.as_str()),
    }
}

/// Resolve a start tag's attributes into sink form (names canonical, values
/// owned). Attribute order is encounter order; duplicates were already
/// dropped by the tokenizer.
pub(crate) fn resolve_attrs(
    atoms: &AtomTable,
    text: &dyn TextResolver,
    attrs: &[Attribute],
) -> Result<Vec<ElementAttr>, TreeBuilderError> {
    let mut resolved = Vec::with_capacity(attrs.len());
    for attr in attrs {
        let name = resolve_name(atoms, attr.name)?;
        let value = match &attr.value {
            None => None,
            Some(AttributeValue::Owned(owned)) => Some(owned.clone()),
            Some(AttributeValue::Span(span)) => Some(
                text.resolve_span(*span)
                    .map_err(|_| EngineInvariantError)?
                    .to_string(),
            ),
        };
        resolved.push(ElementAttr {
            name,
            value,
            ns: None,
        });
    }
    Ok(resolved)
}

fn is_parser_whitespace(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\x0C' | '\r' | ' ')
}

fn split_leading_whitespace(text: &str) -> (&str, &str) {
    let rest = text.trim_start_matches(is_parser_whitespace);
    let ws_len = text.len() - rest.len();
    (&text[..ws_len], rest)
}

/// HTML5 tree builder.
pub struct Html5TreeBuilder {
    config: TreeBuilderConfig,
    atoms_id: u64,
    mode: InsertionMode,
    original_mode: InsertionMode,
    template_modes: Vec<InsertionMode>,
    open: OpenElementsStack,
    formatting: ActiveFormattingElements,
    fragment: Option<FragmentContext>,
    head: Option<StackItem>,
    form: Option<NodeId>,
    frameset_ok: bool,
    quirks: QuirksMode,
    foster_parenting: bool,
    pending_table_text: String,
    pending_table_text_has_non_ws: bool,
    skip_next_newline: bool,
    pending_script: Option<NodeId>,
    detached: bool,
    finished: bool,
    token_index: usize,
}

impl Html5TreeBuilder {
    pub fn new(config: TreeBuilderConfig, ctx: &mut DocumentParseContext) -> Self {
        Self {
            config,
            atoms_id: ctx.atoms.id(),
            mode: InsertionMode::Initial,
            original_mode: InsertionMode::Initial,
            template_modes: Vec::new(),
            open: OpenElementsStack::default(),
            formatting: ActiveFormattingElements::default(),
            fragment: None,
            head: None,
            form: None,
            frameset_ok: true,
            quirks: QuirksMode::NoQuirks,
            foster_parenting: false,
            pending_table_text: String::new(),
            pending_table_text_has_non_ws: false,
            skip_next_newline: false,
            pending_script: None,
            detached: false,
            finished: false,
            token_index: 0,
        }
    }

    /// Builder for fragment parsing: a synthetic `<html>` root is created in
    /// the sink's fragment, the insertion mode is reset against the context
    /// element, and the form pointer is taken from the context's form owner.
    pub fn new_fragment(
        config: TreeBuilderConfig,
        ctx: &mut DocumentParseContext,
        fragment: FragmentContext,
        sink: &mut dyn TreeSink,
    ) -> Result<Self, TreeBuilderError> {
        let mut builder = Self::new(config, ctx);
        let html = ctx
            .atoms
            .intern_ascii_folded("html")
            .map_err(|_| EngineInvariantError)?;
        let local = resolve_name(&ctx.atoms, html)?;
        let node = sink.create_element(Arc::clone(&local), Namespace::Html, Vec::new());
        sink.append(sink.document(), node);
        builder.open.push(StackItem {
            node,
            name: html,
            local,
            ns: Namespace::Html,
            attrs: Arc::from([]),
            synthetic_root: true,
            annotation_xml_integration: false,
        });
        if &*fragment.name == "template" && fragment.ns == Namespace::Html {
            builder.template_modes.push(InsertionMode::InTemplate);
        }
        builder.form = fragment.form_owner;
        builder.fragment = Some(fragment);
        builder.reset_insertion_mode_appropriately();
        Ok(builder)
    }

    /// Initial tokenizer state for a fragment parse, derived from the context
    /// element the way the full document parser would drive the tokenizer on
    /// seeing that start tag.
    pub fn tokenizer_state_for_context(name: &str, scripting_enabled: bool) -> TokenizerState {
        if tags::is_rcdata_tag(name) {
            TokenizerState::Rcdata
        } else if tags::is_rawtext_tag(name) || (name == "noscript" && scripting_enabled) {
            TokenizerState::Rawtext
        } else if name == "script" {
            TokenizerState::ScriptData
        } else if name == "plaintext" {
            TokenizerState::Plaintext
        } else {
            TokenizerState::Data
        }
    }

    pub fn insertion_mode(&self) -> InsertionMode {
        self.mode
    }

    pub fn quirks_mode(&self) -> QuirksMode {
        self.quirks
    }

    /// Script element popped by the last `</script>`; valid after a
    /// `Suspend(Script)` step result until the next pushed token.
    pub fn take_pending_script(&mut self) -> Option<NodeId> {
        self.pending_script.take()
    }

    /// Synchronous teardown, safe mid-parse. Clears all construction state
    /// without further tree-sink calls; subsequent tokens are ignored.
    pub fn detach(&mut self) {
        self.detached = true;
        self.open.clear();
        self.formatting.clear();
        self.template_modes.clear();
        self.head = None;
        self.form = None;
        self.pending_script = None;
        self.pending_table_text.clear();
    }

    /// Push a token into the tree builder. The sole entry point.
    pub fn push_token(
        &mut self,
        token: &Token,
        ctx: &mut DocumentParseContext,
        text: &dyn TextResolver,
        sink: &mut dyn TreeSink,
        tokenizer: &mut dyn TokenizerControl,
    ) -> Result<TreeBuilderStepResult, TreeBuilderError> {
        if self.detached || self.finished {
            return Ok(TreeBuilderStepResult::Continue);
        }
        if ctx.atoms.id() != self.atoms_id {
            debug_assert!(false, "tree builder is bound to a single atom table");
            return Err(EngineInvariantError);
        }
        self.token_index += 1;
        ctx.counters.tokens_processed += 1;
        self.pending_script = None;

        let mut step = Step {
            ctx,
            text,
            sink,
            tokenizer,
        };

        // Queued tree mutations are applied before any non-character token
        // and always before end-of-file.
        if !matches!(token, Token::Text { .. }) {
            if self.mode == InsertionMode::InTableText {
                self.flush_pending_table_text(&mut step)?;
            }
            step.sink.flush();
        }

        self.dispatch(&mut step, token)?;

        if self.finished {
            step.sink.flush();
            step.sink.finished();
        } else {
            let foreign = self.in_foreign_content();
            step.tokenizer
                .set_force_null_character_replacement(self.mode == InsertionMode::Text || foreign);
            step.tokenizer.set_allow_cdata(foreign);
        }

        if self.pending_script.is_some() {
            Ok(TreeBuilderStepResult::Suspend(SuspendReason::Script))
        } else {
            Ok(TreeBuilderStepResult::Continue)
        }
    }

    // ---------------------------------------------------------------------
    // Dispatch
    // ---------------------------------------------------------------------

    fn dispatch(&mut self, step: &mut Step<'_>, token: &Token) -> Result<(), TreeBuilderError> {
        if self.should_process_as_foreign(step, token)? {
            return self.process_token_in_foreign_content(step, token);
        }
        self.process_token(step, token)
    }

    fn process_token(
        &mut self,
        step: &mut Step<'_>,
        token: &Token,
    ) -> Result<(), TreeBuilderError> {
        match token {
            Token::Text { text } => {
                let run = resolve_text(step.text, text)?.to_string();
                self.process_characters(step, &run)
            }
            Token::Doctype {
                name,
                public_id,
                system_id,
                force_quirks,
            } => self.process_doctype(
                step,
                name.as_ref().copied(),
                public_id.as_deref(),
                system_id.as_deref(),
                *force_quirks,
            ),
            Token::Comment { text } => {
                let run = resolve_text(step.text, text)?.to_string();
                self.process_comment(step, &run)
            }
            Token::StartTag {
                name,
                attrs,
                self_closing,
            } => {
                self.skip_next_newline = false;
                let local = resolve_name(&step.ctx.atoms, *name)?;
                self.process_start_tag(step, *name, &local, attrs, *self_closing)
            }
            Token::EndTag { name } => {
                self.skip_next_newline = false;
                let local = resolve_name(&step.ctx.atoms, *name)?;
                self.process_end_tag(step, &local)
            }
            Token::Eof => self.process_eof(step),
        }
    }

    fn process_by_mode(
        &mut self,
        step: &mut Step<'_>,
        mode: InsertionMode,
        token: &Token,
    ) -> Result<(), TreeBuilderError> {
        let saved = self.mode;
        self.mode = mode;
        let result = self.process_token(step, token);
        // Handlers that did not themselves change the mode leave it restored.
        if self.mode == mode {
            self.mode = saved;
        }
        result
    }

    fn set_mode(&mut self, mode: InsertionMode) {
        #[cfg(any(test, feature = "debug-stats"))]
        if self.mode != mode {
            log::trace!(
                target: "html5.tree_builder",
                "insertion mode {:?} -> {:?}",
                self.mode,
                mode
            );
        }
        self.mode = mode;
    }

    pub(crate) fn record_error(&mut self, step: &mut Step<'_>, code: ParseErrorCode) {
        log::trace!(
            target: "html5.tree_builder",
            "parse error {:?} at token {}",
            code,
            self.token_index
        );
        step.ctx.counters.parse_errors += 1;
        step.ctx.errors.push(ParseError {
            code,
            position: self.token_index,
        });
    }

    // ---------------------------------------------------------------------
    // Foreign-content gate
    // ---------------------------------------------------------------------

    /// Name/namespace view of the adjusted current node. In fragment parsing
    /// with only the root open this is the context element, which lives in
    /// the caller's document and has no stack item of its own.
    pub(crate) fn adjusted_current_name_ns(&self) -> Option<(Arc<str>, Namespace)> {
        if self.fragment.is_some() && self.open.has_only_one_element() {
            self.fragment
                .as_ref()
                .map(|fragment| (Arc::clone(&fragment.name), fragment.ns))
        } else {
            self.open
                .top()
                .map(|item| (Arc::clone(&item.local), item.ns))
        }
    }

    pub(crate) fn in_foreign_content(&self) -> bool {
        if self.open.is_empty() {
            return false;
        }
        if self.fragment.is_some() && self.open.has_only_one_element() {
            return self
                .fragment
                .as_ref()
                .is_some_and(|fragment| fragment.ns != Namespace::Html);
        }
        self.open.top().is_some_and(|item| {
            item.ns != Namespace::Html
                && !item.is_mathml_text_integration_point()
                && !item.is_html_integration_point()
        })
    }

    // ---------------------------------------------------------------------
    // Construction-site helpers
    // ---------------------------------------------------------------------

    fn current_node(&self) -> Result<NodeId, TreeBuilderError> {
        self.open.top().map(|item| item.node).ok_or(EngineInvariantError)
    }

    fn should_foster_parent(&self) -> bool {
        self.foster_parenting
            && self.open.top().is_some_and(|top| {
                top.ns == Namespace::Html
                    && matches!(&*top.local, "table" | "tbody" | "tfoot" | "thead" | "tr")
            })
    }

    /// Foster target: the topmost `<table>` plus the element below it on the
    /// stack as the parentless-table fallback. `None` when no table is open
    /// (fragment parsing inside table structure); the caller then appends to
    /// the root.
    fn foster_anchor(&self) -> Option<(NodeId, NodeId)> {
        let index = (0..self.open.len())
            .rev()
            .find(|&i| self.open.at(i).is_html_element_named("table"))?;
        let fallback = self.open.at(index.checked_sub(1)?).node;
        Some((self.open.at(index).node, fallback))
    }

    pub(crate) fn insert_node(
        &mut self,
        step: &mut Step<'_>,
        node: NodeId,
    ) -> Result<(), TreeBuilderError> {
        if self.should_foster_parent() {
            return self.foster_parent_node(step, node);
        }
        let parent = self.current_node()?;
        step.sink.append(parent, node);
        Ok(())
    }

    /// Insert before the topmost table (or append to the element below a
    /// parentless table); used for foster parenting and by the adoption
    /// agency's relocation step.
    pub(crate) fn foster_parent_node(
        &mut self,
        step: &mut Step<'_>,
        node: NodeId,
    ) -> Result<(), TreeBuilderError> {
        match self.foster_anchor() {
            Some((table, fallback)) => {
                if !step.sink.insert_before_sibling(table, node) {
                    step.sink.append(fallback, node);
                }
            }
            None => {
                let root = self.open.bottom().ok_or(EngineInvariantError)?.node;
                step.sink.append(root, node);
            }
        }
        Ok(())
    }

    pub(crate) fn insert_text_run(
        &mut self,
        step: &mut Step<'_>,
        text: &str,
    ) -> Result<(), TreeBuilderError> {
        if text.is_empty() {
            return Ok(());
        }
        if self.should_foster_parent() {
            match self.foster_anchor() {
                Some((table, fallback)) => {
                    if !step.sink.insert_text_before_sibling(table, text) {
                        step.sink.append_text(fallback, text);
                    }
                }
                None => {
                    let root = self.open.bottom().ok_or(EngineInvariantError)?.node;
                    step.sink.append_text(root, text);
                }
            }
            return Ok(());
        }
        let parent = self.current_node()?;
        step.sink.append_text(parent, text);
        Ok(())
    }

    fn make_item(
        &self,
        step: &mut Step<'_>,
        name: AtomId,
        local: &Arc<str>,
        ns: Namespace,
        attrs: Vec<ElementAttr>,
    ) -> StackItem {
        let annotation_xml_integration = ns == Namespace::MathMl
            && &**local == "annotation-xml"
            && tags::annotation_xml_is_integration_point(
                attrs
                    .iter()
                    .find(|attr| &*attr.name == "encoding")
                    .and_then(|attr| attr.value.as_deref()),
            );
        let node = step
            .sink
            .create_element(Arc::clone(local), ns, attrs.clone());
        StackItem {
            node,
            name,
            local: Arc::clone(local),
            ns,
            attrs: Arc::from(attrs),
            synthetic_root: false,
            annotation_xml_integration,
        }
    }

    /// Insert an HTML element for a start tag and push it onto the stack.
    pub(crate) fn insert_html_element(
        &mut self,
        step: &mut Step<'_>,
        name: AtomId,
        local: &Arc<str>,
        attrs: &[Attribute],
    ) -> Result<(), TreeBuilderError> {
        let resolved = resolve_attrs(&step.ctx.atoms, step.text, attrs)?;
        let item = self.make_item(step, name, local, Namespace::Html, resolved);
        self.insert_node(step, item.node)?;
        self.open.push(item);
        Ok(())
    }

    /// Insert a void/self-closing HTML element; nothing is pushed.
    fn insert_self_closing(
        &mut self,
        step: &mut Step<'_>,
        name: AtomId,
        local: &Arc<str>,
        attrs: &[Attribute],
    ) -> Result<(), TreeBuilderError> {
        let resolved = resolve_attrs(&step.ctx.atoms, step.text, attrs)?;
        let item = self.make_item(step, name, local, Namespace::Html, resolved);
        self.insert_node(step, item.node)
    }

    /// Insert a synthesized element with no attributes (missing-tag repair).
    fn insert_phantom(
        &mut self,
        step: &mut Step<'_>,
        name: &str,
    ) -> Result<(), TreeBuilderError> {
        let atom = step
            .ctx
            .atoms
            .intern_ascii_folded(name)
            .map_err(|_| EngineInvariantError)?;
        let local = resolve_name(&step.ctx.atoms, atom)?;
        let item = self.make_item(step, atom, &local, Namespace::Html, Vec::new());
        self.insert_node(step, item.node)?;
        self.open.push(item);
        Ok(())
    }

    /// Re-insert a clone of a formatting entry (reconstruction / adoption).
    pub(crate) fn clone_and_insert(
        &mut self,
        step: &mut Step<'_>,
        template: &StackItem,
    ) -> Result<StackItem, TreeBuilderError> {
        let item = self.make_item(
            step,
            template.name,
            &Arc::clone(&template.local),
            template.ns,
            template.attrs.to_vec(),
        );
        self.insert_node(step, item.node)?;
        self.open.push(item.clone());
        Ok(item)
    }

    fn insert_comment(&mut self, step: &mut Step<'_>, text: &str) -> Result<(), TreeBuilderError> {
        let comment = step.sink.create_comment(text);
        self.insert_node(step, comment)
    }

    fn insert_comment_on_document(&mut self, step: &mut Step<'_>, text: &str) {
        let comment = step.sink.create_comment(text);
        let document = step.sink.document();
        step.sink.append(document, comment);
    }

    fn insert_comment_on_html(
        &mut self,
        step: &mut Step<'_>,
        text: &str,
    ) -> Result<(), TreeBuilderError> {
        let comment = step.sink.create_comment(text);
        let html = self.open.bottom().map(|item| item.node).ok_or(EngineInvariantError)?;
        step.sink.append(html, comment);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Implied end tags and friends
    // ---------------------------------------------------------------------

    fn generate_implied_end_tags(&mut self, except: Option<&str>) {
        while let Some(top) = self.open.top() {
            if top.ns != Namespace::Html {
                return;
            }
            let name = &*top.local;
            let implied = matches!(
                name,
                "dd" | "dt" | "li" | "optgroup" | "option" | "p" | "rb" | "rp" | "rt" | "rtc"
            );
            if !implied || except == Some(name) {
                return;
            }
            let _ = self.open.pop();
        }
    }

    fn generate_implied_end_tags_thoroughly(&mut self) {
        while let Some(top) = self.open.top() {
            if top.ns != Namespace::Html {
                return;
            }
            let implied = matches!(
                &*top.local,
                "caption" | "colgroup" | "dd" | "dt" | "li" | "optgroup" | "option" | "p" | "rb"
                    | "rp" | "rt" | "rtc" | "tbody" | "td" | "tfoot" | "th" | "thead" | "tr"
            );
            if !implied {
                return;
            }
            let _ = self.open.pop();
        }
    }

    fn close_p_element(&mut self, step: &mut Step<'_>) {
        self.generate_implied_end_tags(Some("p"));
        if !self.open.top().is_some_and(|top| top.is_html_element_named("p")) {
            self.record_error(step, ParseErrorCode::UnexpectedEndTag);
        }
        self.open.pop_until_popped("p");
    }

    fn close_p_if_in_button_scope(&mut self, step: &mut Step<'_>) {
        if self.open.in_scope("p", ScopeKind::Button) {
            self.close_p_element(step);
        }
    }

    fn process_fake_start_tag(
        &mut self,
        step: &mut Step<'_>,
        name: &str,
    ) -> Result<(), TreeBuilderError> {
        let atom = step
            .ctx
            .atoms
            .intern_ascii_folded(name)
            .map_err(|_| EngineInvariantError)?;
        let fake = Token::StartTag {
            name: atom,
            attrs: Vec::new(),
            self_closing: false,
        };
        self.process_token(step, &fake)
    }

    pub(crate) fn process_fake_end_tag(
        &mut self,
        step: &mut Step<'_>,
        name: &str,
    ) -> Result<(), TreeBuilderError> {
        let atom = step
            .ctx
            .atoms
            .intern_ascii_folded(name)
            .map_err(|_| EngineInvariantError)?;
        let fake = Token::EndTag { name: atom };
        self.process_token(step, &fake)
    }

    /// Reconstruct the active formatting elements.
    ///
    /// The no-op fast path (empty list, last entry a marker, or last entry
    /// still open) is checked first; it dominates real-world input.
    pub(crate) fn reconstruct_active_formatting_elements(
        &mut self,
        step: &mut Step<'_>,
    ) -> Result<(), TreeBuilderError> {
        let Some(mut index) = self.formatting.first_unopened_index(&self.open) else {
            return Ok(());
        };
        step.ctx.counters.formatting_reconstructions += 1;
        loop {
            let template = match self.formatting.entry(index) {
                FormattingEntry::Element(item) => item.clone(),
                FormattingEntry::Marker => {
                    debug_assert!(false, "marker inside reconstruction suffix");
                    return Ok(());
                }
            };
            let clone = self.clone_and_insert(step, &template)?;
            self.formatting.set_element(index, clone);
            index += 1;
            if index == self.formatting.len() {
                return Ok(());
            }
        }
    }

    // ---------------------------------------------------------------------
    // Mode reset
    // ---------------------------------------------------------------------

    pub(crate) fn reset_insertion_mode_appropriately(&mut self) {
        let len = self.open.len();
        for index in (0..len).rev() {
            let last = index == 0;
            let (local, _ns) = if last && self.fragment.is_some() {
                let fragment = self.fragment.as_ref().expect("fragment context");
                (Arc::clone(&fragment.name), fragment.ns)
            } else {
                let item = self.open.at(index);
                (Arc::clone(&item.local), item.ns)
            };
            match &*local {
                "select" => {
                    if !last {
                        for below in (0..index).rev() {
                            let ancestor = self.open.at(below);
                            if ancestor.is_html_element_named("template") {
                                break;
                            }
                            if ancestor.is_html_element_named("table") {
                                self.set_mode(InsertionMode::InSelectInTable);
                                return;
                            }
                        }
                    }
                    self.set_mode(InsertionMode::InSelect);
                    return;
                }
                "td" | "th" if !last => {
                    self.set_mode(InsertionMode::InCell);
                    return;
                }
                "tr" => {
                    self.set_mode(InsertionMode::InRow);
                    return;
                }
                "tbody" | "thead" | "tfoot" => {
                    self.set_mode(InsertionMode::InTableBody);
                    return;
                }
                "caption" => {
                    self.set_mode(InsertionMode::InCaption);
                    return;
                }
                "colgroup" => {
                    self.set_mode(InsertionMode::InColumnGroup);
                    return;
                }
                "table" => {
                    self.set_mode(InsertionMode::InTable);
                    return;
                }
                "template" => {
                    let mode = self
                        .template_modes
                        .last()
                        .copied()
                        .unwrap_or(InsertionMode::InTemplate);
                    self.set_mode(mode);
                    return;
                }
                "head" if !last => {
                    self.set_mode(InsertionMode::InHead);
                    return;
                }
                "body" => {
                    self.set_mode(InsertionMode::InBody);
                    return;
                }
                "frameset" => {
                    self.set_mode(InsertionMode::InFrameset);
                    return;
                }
                "html" => {
                    if self.head.is_none() {
                        self.set_mode(InsertionMode::BeforeHead);
                    } else {
                        self.set_mode(InsertionMode::AfterHead);
                    }
                    return;
                }
                _ => {}
            }
            if last {
                self.set_mode(InsertionMode::InBody);
                return;
            }
        }
        self.set_mode(InsertionMode::InBody);
    }

    // ---------------------------------------------------------------------
    // Doctype / comment / EOF
    // ---------------------------------------------------------------------

    fn process_doctype(
        &mut self,
        step: &mut Step<'_>,
        name: Option<AtomId>,
        public_id: Option<&str>,
        system_id: Option<&str>,
        force_quirks: bool,
    ) -> Result<(), TreeBuilderError> {
        if self.mode != InsertionMode::Initial {
            self.record_error(step, ParseErrorCode::UnexpectedDoctype);
            return Ok(());
        }
        let name_str = match name {
            Some(id) => Some(resolve_name(&step.ctx.atoms, id)?),
            None => None,
        };
        step.sink.append_doctype(
            name_str.as_deref().unwrap_or(""),
            public_id.unwrap_or(""),
            system_id.unwrap_or(""),
        );
        self.quirks = quirks_mode_from_doctype(
            name_str.as_deref(),
            public_id,
            system_id,
            force_quirks,
        );
        step.sink.set_quirks_mode(self.quirks);
        self.set_mode(InsertionMode::BeforeHtml);
        Ok(())
    }

    fn process_comment(
        &mut self,
        step: &mut Step<'_>,
        text: &str,
    ) -> Result<(), TreeBuilderError> {
        match self.mode {
            InsertionMode::Initial
            | InsertionMode::BeforeHtml
            | InsertionMode::AfterAfterBody
            | InsertionMode::AfterAfterFrameset => {
                self.insert_comment_on_document(step, text);
                Ok(())
            }
            InsertionMode::AfterBody => self.insert_comment_on_html(step, text),
            _ => self.insert_comment(step, text),
        }
    }

    fn process_eof(&mut self, step: &mut Step<'_>) -> Result<(), TreeBuilderError> {
        match self.mode {
            InsertionMode::Initial => {
                self.default_for_initial(step);
                self.process_eof(step)
            }
            InsertionMode::BeforeHtml => {
                self.default_for_before_html(step)?;
                self.process_eof(step)
            }
            InsertionMode::BeforeHead => {
                self.default_for_before_head(step)?;
                self.process_eof(step)
            }
            InsertionMode::InHead => {
                self.default_for_in_head(step)?;
                self.process_eof(step)
            }
            InsertionMode::InHeadNoscript => {
                self.record_error(step, ParseErrorCode::UnexpectedEof);
                self.default_for_in_head_noscript(step)?;
                self.process_eof(step)
            }
            InsertionMode::AfterHead => {
                self.default_for_after_head(step)?;
                self.process_eof(step)
            }
            InsertionMode::Text => {
                self.record_error(step, ParseErrorCode::UnexpectedEof);
                let _ = self.open.pop();
                self.set_mode(self.original_mode);
                self.process_eof(step)
            }
            InsertionMode::InTableText => {
                self.flush_pending_table_text(step)?;
                self.process_eof(step)
            }
            InsertionMode::InTemplate => {
                if !self.open.contains_html_element("template") {
                    self.stop_parsing();
                    return Ok(());
                }
                self.record_error(step, ParseErrorCode::UnexpectedEof);
                self.open.pop_until_popped("template");
                self.formatting.clear_to_last_marker();
                let _ = self.template_modes.pop();
                self.reset_insertion_mode_appropriately();
                self.process_eof(step)
            }
            InsertionMode::InBody
            | InsertionMode::InTable
            | InsertionMode::InCaption
            | InsertionMode::InColumnGroup
            | InsertionMode::InTableBody
            | InsertionMode::InRow
            | InsertionMode::InCell
            | InsertionMode::InSelect
            | InsertionMode::InSelectInTable => {
                if !self.template_modes.is_empty() {
                    return self.process_by_mode(step, InsertionMode::InTemplate, &Token::Eof);
                }
                if self.open.iter().any(|item| {
                    item.ns == Namespace::Html
                        && !matches!(
                            &*item.local,
                            "dd" | "dt"
                                | "li"
                                | "optgroup"
                                | "option"
                                | "p"
                                | "rb"
                                | "rp"
                                | "rt"
                                | "rtc"
                                | "tbody"
                                | "td"
                                | "tfoot"
                                | "th"
                                | "thead"
                                | "tr"
                                | "body"
                                | "html"
                        )
                }) {
                    self.record_error(step, ParseErrorCode::UnexpectedEof);
                }
                self.stop_parsing();
                Ok(())
            }
            InsertionMode::InFrameset => {
                if !self.open.has_only_one_element() {
                    self.record_error(step, ParseErrorCode::UnexpectedEof);
                }
                self.stop_parsing();
                Ok(())
            }
            InsertionMode::AfterBody
            | InsertionMode::AfterFrameset
            | InsertionMode::AfterAfterBody
            | InsertionMode::AfterAfterFrameset => {
                self.stop_parsing();
                Ok(())
            }
        }
    }

    fn stop_parsing(&mut self) {
        match self.mode {
            InsertionMode::InFrameset
            | InsertionMode::AfterFrameset
            | InsertionMode::AfterAfterFrameset => {
                self.set_mode(InsertionMode::AfterAfterFrameset);
            }
            _ => self.set_mode(InsertionMode::AfterAfterBody),
        }
        self.finished = true;
    }

    // ---------------------------------------------------------------------
    // Default ("missing tag") actions
    //
    // These are the explicit reimplementation of the source's switch
    // fallthrough cascades: each default takes the action the mode defines
    // for "anything else" and leaves the mode advanced so the caller can
    // reprocess the same token.
    // ---------------------------------------------------------------------

    fn default_for_initial(&mut self, step: &mut Step<'_>) {
        self.quirks = QuirksMode::Quirks;
        step.sink.set_quirks_mode(self.quirks);
        self.set_mode(InsertionMode::BeforeHtml);
    }

    fn default_for_before_html(&mut self, step: &mut Step<'_>) -> Result<(), TreeBuilderError> {
        let atom = step
            .ctx
            .atoms
            .intern_ascii_folded("html")
            .map_err(|_| EngineInvariantError)?;
        let local = resolve_name(&step.ctx.atoms, atom)?;
        let item = self.make_item(step, atom, &local, Namespace::Html, Vec::new());
        let document = step.sink.document();
        step.sink.append(document, item.node);
        self.open.push(item);
        self.set_mode(InsertionMode::BeforeHead);
        Ok(())
    }

    fn default_for_before_head(&mut self, step: &mut Step<'_>) -> Result<(), TreeBuilderError> {
        self.insert_phantom(step, "head")?;
        self.head = self.open.top().cloned();
        self.set_mode(InsertionMode::InHead);
        Ok(())
    }

    fn default_for_in_head(&mut self, _step: &mut Step<'_>) -> Result<(), TreeBuilderError> {
        let _ = self.open.pop();
        self.set_mode(InsertionMode::AfterHead);
        Ok(())
    }

    fn default_for_in_head_noscript(
        &mut self,
        _step: &mut Step<'_>,
    ) -> Result<(), TreeBuilderError> {
        let _ = self.open.pop();
        self.set_mode(InsertionMode::InHead);
        Ok(())
    }

    fn default_for_after_head(&mut self, step: &mut Step<'_>) -> Result<(), TreeBuilderError> {
        self.insert_phantom(step, "body")?;
        self.set_mode(InsertionMode::InBody);
        Ok(())
    }
}

/// Quirks-mode determination from the doctype token.
///
/// The prefix tables are the standard compatibility lists; matching is
/// ASCII-case-insensitive.
fn quirks_mode_from_doctype(
    name: Option<&str>,
    public_id: Option<&str>,
    system_id: Option<&str>,
    force_quirks: bool,
) -> QuirksMode {
    const QUIRKY_PUBLIC_PREFIXES: &[&str] = &[
        "+//silmaril//dtd html pro v0r11 19970101//",
        "-//as//dtd html 3.0 aswedit + extensions//",
        "-//advasoft ltd//dtd html 3.0 aswedit + extensions//",
        "-//ietf//dtd html 2.0 level 1//",
        "-//ietf//dtd html 2.0 level 2//",
        "-//ietf//dtd html 2.0 strict level 1//",
        "-//ietf//dtd html 2.0 strict level 2//",
        "-//ietf//dtd html 2.0 strict//",
        "-//ietf//dtd html 2.0//",
        "-//ietf//dtd html 2.1e//",
        "-//ietf//dtd html 3.0//",
        "-//ietf//dtd html 3.2 final//",
        "-//ietf//dtd html 3.2//",
        "-//ietf//dtd html 3//",
        "-//ietf//dtd html level 0//",
        "-//ietf//dtd html level 1//",
        "-//ietf//dtd html level 2//",
        "-//ietf//dtd html level 3//",
        "-//ietf//dtd html strict level 0//",
        "-//ietf//dtd html strict level 1//",
        "-//ietf//dtd html strict level 2//",
        "-//ietf//dtd html strict level 3//",
        "-//ietf//dtd html strict//",
        "-//ietf//dtd html//",
        "-//metrius//dtd metrius presentational//",
        "-//microsoft//dtd internet explorer 2.0 html strict//",
        "-//microsoft//dtd internet explorer 2.0 html//",
        "-//microsoft//dtd internet explorer 2.0 tables//",
        "-//microsoft//dtd internet explorer 3.0 html strict//",
        "-//microsoft//dtd internet explorer 3.0 html//",
        "-//microsoft//dtd internet explorer 3.0 tables//",
        "-//netscape comm. corp.//dtd html//",
        "-//netscape comm. corp.//dtd strict html//",
        "-//o'reilly and associates//dtd html 2.0//",
        "-//o'reilly and associates//dtd html extended 1.0//",
        "-//o'reilly and associates//dtd html extended relaxed 1.0//",
        "-//sq//dtd html 2.0 hotmetal + extensions//",
        "-//softquad software//dtd hotmetal pro 6.0::19990601::extensions to html 4.0//",
        "-//softquad//dtd hotmetal pro 4.0::19971010::extensions to html 4.0//",
        "-//spyglass//dtd html 2.0 extended//",
        "-//sun microsystems corp.//dtd hotjava html//",
        "-//sun microsystems corp.//dtd hotjava strict html//",
        "-//w3c//dtd html 3 1995-03-24//",
        "-//w3c//dtd html 3.2 draft//",
        "-//w3c//dtd html 3.2 final//",
        "-//w3c//dtd html 3.2//",
        "-//w3c//dtd html 3.2s draft//",
        "-//w3c//dtd html 4.0 frameset//",
        "-//w3c//dtd html 4.0 transitional//",
        "-//w3c//dtd html experimental 19960712//",
        "-//w3c//dtd html experimental 970421//",
        "-//w3c//dtd w3 html//",
        "-//w3o//dtd w3 html 3.0//",
        "-//webtechs//dtd mozilla html 2.0//",
        "-//webtechs//dtd mozilla html//",
    ];
    const LIMITED_QUIRKS_PUBLIC_PREFIXES: &[&str] = &[
        "-//w3c//dtd xhtml 1.0 frameset//",
        "-//w3c//dtd xhtml 1.0 transitional//",
    ];

    if force_quirks {
        return QuirksMode::Quirks;
    }
    if name != Some("html") {
        return QuirksMode::Quirks;
    }
    let public_lower = public_id.map(str::to_ascii_lowercase);
    let system_lower = system_id.map(str::to_ascii_lowercase);
    if let Some(public) = public_lower.as_deref() {
        if matches!(
            public,
            "-//w3o//dtd w3 html strict 3.0//en//" | "-/w3c/dtd html 4.0 transitional/en" | "html"
        ) {
            return QuirksMode::Quirks;
        }
        if QUIRKY_PUBLIC_PREFIXES
            .iter()
            .any(|prefix| public.starts_with(prefix))
        {
            return QuirksMode::Quirks;
        }
        let frameset_or_transitional = [
            "-//w3c//dtd html 4.01 frameset//",
            "-//w3c//dtd html 4.01 transitional//",
        ];
        if frameset_or_transitional
            .iter()
            .any(|prefix| public.starts_with(prefix))
        {
            return if system_lower.is_none() {
                QuirksMode::Quirks
            } else {
                QuirksMode::LimitedQuirks
            };
        }
        if LIMITED_QUIRKS_PUBLIC_PREFIXES
            .iter()
            .any(|prefix| public.starts_with(prefix))
        {
            return QuirksMode::LimitedQuirks;
        }
    }
    if system_lower.as_deref()
        == Some("http://www.ibm.com/data/dtd/v11/ibmxhtml1-transitional.dtd")
    {
        return QuirksMode::Quirks;
    }
    QuirksMode::NoQuirks
}
