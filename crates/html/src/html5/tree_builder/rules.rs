//! Per-insertion-mode token handling rules.
//!
//! Each mode's handler is a deterministic function of (mode, token). Handlers
//! mutate the stacks/lists, call the sink, switch modes, and re-dispatch
//! synthesized tokens. "Process using the rules for X" is a direct call into
//! mode X's handler; "reprocess" is a recursive dispatch after a mode switch.
//! Both make structural progress (pop something or advance the mode), so the
//! mutual recursion is bounded.

use super::{
    resolve_name, EngineInvariantError, Html5TreeBuilder, InsertionMode, QuirksMode, Step,
    TreeBuilderError, split_leading_whitespace,
};
use crate::html5::shared::{
    AtomId, AtomTable, Attribute, AttributeValue, Namespace, ParseErrorCode, TextResolver,
};
use crate::html5::tree_builder::stack::ScopeKind;
use crate::html5::tree_builder::tags;
use crate::html5::tree_builder::TokenizerState;
use std::sync::Arc;

/// Resolve the value of a named attribute on a start tag, if present.
/// An attribute without a value resolves to the empty string.
pub(crate) fn find_attr_value(
    atoms: &AtomTable,
    text: &dyn TextResolver,
    attrs: &[Attribute],
    name: &str,
) -> Result<Option<String>, TreeBuilderError> {
    for attr in attrs {
        if atoms.resolve(attr.name) == Some(name) {
            return Ok(Some(match &attr.value {
                None => String::new(),
                Some(AttributeValue::Owned(value)) => value.clone(),
                Some(AttributeValue::Span(span)) => text
                    .resolve_span(*span)
                    .map_err(|_| EngineInvariantError)?
                    .to_string(),
            }));
        }
    }
    Ok(None)
}

impl Html5TreeBuilder {
    // -----------------------------------------------------------------
    // Character buffer
    // -----------------------------------------------------------------

    /// Whitespace-sensitive character processing.
    ///
    /// Consumes a character run left to right, applying the current mode's
    /// rules to each whitespace/non-whitespace segment: leading-whitespace
    /// skipping in the pre-body modes, the one-newline peel after
    /// pre/textarea/listing, and pending-table-text accumulation inside
    /// table structure.
    pub(super) fn process_characters(
        &mut self,
        step: &mut Step<'_>,
        text: &str,
    ) -> Result<(), TreeBuilderError> {
        let mut rest: &str = text;
        if self.skip_next_newline {
            self.skip_next_newline = false;
            rest = rest.strip_prefix('\n').unwrap_or(rest);
        }
        while !rest.is_empty() {
            match self.mode {
                InsertionMode::Initial => {
                    let (_ws, tail) = split_leading_whitespace(rest);
                    if tail.is_empty() {
                        return Ok(());
                    }
                    self.record_error(step, ParseErrorCode::UnexpectedCharacter);
                    self.default_for_initial(step);
                    rest = tail;
                }
                InsertionMode::BeforeHtml => {
                    let (_ws, tail) = split_leading_whitespace(rest);
                    if tail.is_empty() {
                        return Ok(());
                    }
                    self.default_for_before_html(step)?;
                    rest = tail;
                }
                InsertionMode::BeforeHead => {
                    let (_ws, tail) = split_leading_whitespace(rest);
                    if tail.is_empty() {
                        return Ok(());
                    }
                    self.default_for_before_head(step)?;
                    rest = tail;
                }
                InsertionMode::InHead => {
                    let (ws, tail) = split_leading_whitespace(rest);
                    self.insert_text_run(step, ws)?;
                    if tail.is_empty() {
                        return Ok(());
                    }
                    self.default_for_in_head(step)?;
                    rest = tail;
                }
                InsertionMode::InHeadNoscript => {
                    let (ws, tail) = split_leading_whitespace(rest);
                    self.insert_text_run(step, ws)?;
                    if tail.is_empty() {
                        return Ok(());
                    }
                    self.record_error(step, ParseErrorCode::UnexpectedCharacter);
                    self.default_for_in_head_noscript(step)?;
                    rest = tail;
                }
                InsertionMode::AfterHead => {
                    let (ws, tail) = split_leading_whitespace(rest);
                    self.insert_text_run(step, ws)?;
                    if tail.is_empty() {
                        return Ok(());
                    }
                    self.default_for_after_head(step)?;
                    rest = tail;
                }
                InsertionMode::Text => {
                    return self.insert_text_run(step, rest);
                }
                InsertionMode::InBody
                | InsertionMode::InCaption
                | InsertionMode::InCell
                | InsertionMode::InTemplate => {
                    return self.in_body_characters(step, rest);
                }
                InsertionMode::InTable | InsertionMode::InTableBody | InsertionMode::InRow => {
                    let buffer_here = self.open.top().is_some_and(|top| {
                        top.ns == Namespace::Html
                            && matches!(
                                &*top.local,
                                "table" | "tbody" | "tfoot" | "thead" | "tr"
                            )
                    });
                    if buffer_here {
                        self.original_mode = self.mode;
                        self.set_mode(InsertionMode::InTableText);
                    } else {
                        self.record_error(step, ParseErrorCode::UnexpectedCharacter);
                        self.foster_parenting = true;
                        let result = self.in_body_characters(step, rest);
                        self.foster_parenting = false;
                        return result;
                    }
                }
                InsertionMode::InTableText => {
                    // U+0000 is a parse error and dropped at accumulation time.
                    if memchr::memchr(b'\0', rest.as_bytes()).is_some() {
                        self.record_error(step, ParseErrorCode::UnexpectedCharacter);
                    }
                    for segment in rest.split('\0') {
                        self.pending_table_text.push_str(segment);
                        if !segment.chars().all(super::is_parser_whitespace) {
                            self.pending_table_text_has_non_ws = true;
                        }
                    }
                    return Ok(());
                }
                InsertionMode::InColumnGroup => {
                    let (ws, tail) = split_leading_whitespace(rest);
                    self.insert_text_run(step, ws)?;
                    if tail.is_empty() {
                        return Ok(());
                    }
                    if !self
                        .open
                        .top()
                        .is_some_and(|top| top.is_html_element_named("colgroup"))
                    {
                        self.record_error(step, ParseErrorCode::UnexpectedCharacter);
                        return Ok(());
                    }
                    let _ = self.open.pop();
                    self.set_mode(InsertionMode::InTable);
                    rest = tail;
                }
                InsertionMode::InSelect | InsertionMode::InSelectInTable => {
                    if rest.contains('\0') {
                        self.record_error(step, ParseErrorCode::UnexpectedCharacter);
                    }
                    for segment in rest.split('\0') {
                        self.insert_text_run(step, segment)?;
                    }
                    return Ok(());
                }
                InsertionMode::InFrameset | InsertionMode::AfterFrameset => {
                    let (ws, tail) = split_leading_whitespace(rest);
                    self.insert_text_run(step, ws)?;
                    if tail.is_empty() {
                        return Ok(());
                    }
                    self.record_error(step, ParseErrorCode::UnexpectedCharacter);
                    let mut chars = tail.chars();
                    let _ = chars.next();
                    rest = chars.as_str();
                }
                InsertionMode::AfterBody => {
                    let (ws, tail) = split_leading_whitespace(rest);
                    self.in_body_characters(step, ws)?;
                    if tail.is_empty() {
                        return Ok(());
                    }
                    self.record_error(step, ParseErrorCode::UnexpectedCharacter);
                    self.set_mode(InsertionMode::InBody);
                    rest = tail;
                }
                InsertionMode::AfterAfterBody => {
                    let (ws, tail) = split_leading_whitespace(rest);
                    self.in_body_characters(step, ws)?;
                    if tail.is_empty() {
                        return Ok(());
                    }
                    self.record_error(step, ParseErrorCode::UnexpectedCharacter);
                    self.set_mode(InsertionMode::InBody);
                    rest = tail;
                }
                InsertionMode::AfterAfterFrameset => {
                    let (ws, tail) = split_leading_whitespace(rest);
                    self.in_body_characters(step, ws)?;
                    if tail.is_empty() {
                        return Ok(());
                    }
                    self.record_error(step, ParseErrorCode::UnexpectedCharacter);
                    let mut chars = tail.chars();
                    let _ = chars.next();
                    rest = chars.as_str();
                }
            }
        }
        Ok(())
    }

    fn in_body_characters(
        &mut self,
        step: &mut Step<'_>,
        run: &str,
    ) -> Result<(), TreeBuilderError> {
        if run.is_empty() {
            return Ok(());
        }
        self.reconstruct_active_formatting_elements(step)?;
        // U+0000 is a parse error and ignored in body content.
        if memchr::memchr(b'\0', run.as_bytes()).is_some() {
            self.record_error(step, ParseErrorCode::UnexpectedCharacter);
            for segment in run.split('\0') {
                self.insert_text_run(step, segment)?;
                if !segment.chars().all(super::is_parser_whitespace) {
                    self.frameset_ok = false;
                }
            }
            return Ok(());
        }
        self.insert_text_run(step, run)?;
        if !run.chars().all(super::is_parser_whitespace) {
            self.frameset_ok = false;
        }
        Ok(())
    }

    /// Flush pending table character data: whitespace-only batches are
    /// inserted in place; batches with non-whitespace are foster-parented
    /// through the in-body rules.
    pub(super) fn flush_pending_table_text(
        &mut self,
        step: &mut Step<'_>,
    ) -> Result<(), TreeBuilderError> {
        let pending = std::mem::take(&mut self.pending_table_text);
        let has_non_ws = std::mem::take(&mut self.pending_table_text_has_non_ws);
        if has_non_ws {
            self.record_error(step, ParseErrorCode::UnexpectedCharacter);
            self.foster_parenting = true;
            let result = self.in_body_characters(step, &pending);
            self.foster_parenting = false;
            result?;
        } else {
            self.insert_text_run(step, &pending)?;
        }
        self.set_mode(self.original_mode);
        Ok(())
    }

    // -----------------------------------------------------------------
    // Start tags
    // -----------------------------------------------------------------

    pub(super) fn process_start_tag(
        &mut self,
        step: &mut Step<'_>,
        name: AtomId,
        local: &Arc<str>,
        attrs: &[Attribute],
        self_closing: bool,
    ) -> Result<(), TreeBuilderError> {
        match self.mode {
            InsertionMode::Initial => {
                self.record_error(step, ParseErrorCode::UnexpectedStartTag);
                self.default_for_initial(step);
                self.process_start_tag(step, name, local, attrs, self_closing)
            }
            InsertionMode::BeforeHtml => {
                if &**local == "html" {
                    let resolved = super::resolve_attrs(&step.ctx.atoms, step.text, attrs)?;
                    let item = self.make_item(step, name, local, Namespace::Html, resolved);
                    let document = step.sink.document();
                    step.sink.append(document, item.node);
                    self.open.push(item);
                    self.set_mode(InsertionMode::BeforeHead);
                    Ok(())
                } else {
                    self.default_for_before_html(step)?;
                    self.process_start_tag(step, name, local, attrs, self_closing)
                }
            }
            InsertionMode::BeforeHead => {
                self.before_head_start_tag(step, name, local, attrs, self_closing)
            }
            InsertionMode::InHead => {
                self.in_head_start_tag(step, name, local, attrs, self_closing)
            }
            InsertionMode::InHeadNoscript => {
                self.in_head_noscript_start_tag(step, name, local, attrs, self_closing)
            }
            InsertionMode::AfterHead => {
                self.after_head_start_tag(step, name, local, attrs, self_closing)
            }
            InsertionMode::InBody => {
                self.in_body_start_tag(step, name, local, attrs, self_closing)
            }
            InsertionMode::Text => {
                debug_assert!(false, "start tag in text mode");
                Ok(())
            }
            InsertionMode::InTable => {
                self.in_table_start_tag(step, name, local, attrs, self_closing)
            }
            InsertionMode::InTableText => {
                debug_assert!(false, "unflushed table text at start tag");
                self.flush_pending_table_text(step)?;
                self.process_start_tag(step, name, local, attrs, self_closing)
            }
            InsertionMode::InCaption => {
                self.in_caption_start_tag(step, name, local, attrs, self_closing)
            }
            InsertionMode::InColumnGroup => {
                self.in_column_group_start_tag(step, name, local, attrs, self_closing)
            }
            InsertionMode::InTableBody => {
                self.in_table_body_start_tag(step, name, local, attrs, self_closing)
            }
            InsertionMode::InRow => self.in_row_start_tag(step, name, local, attrs, self_closing),
            InsertionMode::InCell => {
                self.in_cell_start_tag(step, name, local, attrs, self_closing)
            }
            InsertionMode::InSelect => {
                self.in_select_start_tag(step, name, local, attrs, self_closing)
            }
            InsertionMode::InSelectInTable => {
                self.in_select_in_table_start_tag(step, name, local, attrs, self_closing)
            }
            InsertionMode::InTemplate => {
                self.in_template_start_tag(step, name, local, attrs, self_closing)
            }
            InsertionMode::AfterBody => {
                if &**local == "html" {
                    self.in_body_start_tag(step, name, local, attrs, self_closing)
                } else {
                    self.record_error(step, ParseErrorCode::UnexpectedStartTag);
                    self.set_mode(InsertionMode::InBody);
                    self.process_start_tag(step, name, local, attrs, self_closing)
                }
            }
            InsertionMode::InFrameset => match &**local {
                "html" => self.in_body_start_tag(step, name, local, attrs, self_closing),
                "frameset" => self.insert_html_element(step, name, local, attrs),
                "frame" => self.insert_self_closing(step, name, local, attrs),
                "noframes" => self.in_head_start_tag(step, name, local, attrs, self_closing),
                _ => {
                    self.record_error(step, ParseErrorCode::UnexpectedStartTag);
                    Ok(())
                }
            },
            InsertionMode::AfterFrameset => match &**local {
                "html" => self.in_body_start_tag(step, name, local, attrs, self_closing),
                "noframes" => self.in_head_start_tag(step, name, local, attrs, self_closing),
                _ => {
                    self.record_error(step, ParseErrorCode::UnexpectedStartTag);
                    Ok(())
                }
            },
            InsertionMode::AfterAfterBody => {
                if &**local == "html" {
                    self.in_body_start_tag(step, name, local, attrs, self_closing)
                } else {
                    self.record_error(step, ParseErrorCode::UnexpectedStartTag);
                    self.set_mode(InsertionMode::InBody);
                    self.process_start_tag(step, name, local, attrs, self_closing)
                }
            }
            InsertionMode::AfterAfterFrameset => match &**local {
                "html" => self.in_body_start_tag(step, name, local, attrs, self_closing),
                "noframes" => self.in_head_start_tag(step, name, local, attrs, self_closing),
                _ => {
                    self.record_error(step, ParseErrorCode::UnexpectedStartTag);
                    Ok(())
                }
            },
        }
    }

    fn before_head_start_tag(
        &mut self,
        step: &mut Step<'_>,
        name: AtomId,
        local: &Arc<str>,
        attrs: &[Attribute],
        self_closing: bool,
    ) -> Result<(), TreeBuilderError> {
        match &**local {
            "html" => self.in_body_start_tag(step, name, local, attrs, self_closing),
            "head" => {
                self.insert_html_element(step, name, local, attrs)?;
                self.head = self.open.top().cloned();
                self.set_mode(InsertionMode::InHead);
                Ok(())
            }
            _ => {
                self.default_for_before_head(step)?;
                self.process_start_tag(step, name, local, attrs, self_closing)
            }
        }
    }

    fn follow_generic_rawtext(
        &mut self,
        step: &mut Step<'_>,
        name: AtomId,
        local: &Arc<str>,
        attrs: &[Attribute],
    ) -> Result<(), TreeBuilderError> {
        self.insert_html_element(step, name, local, attrs)?;
        step.tokenizer.set_state(TokenizerState::Rawtext);
        self.original_mode = self.mode;
        self.set_mode(InsertionMode::Text);
        Ok(())
    }

    fn follow_generic_rcdata(
        &mut self,
        step: &mut Step<'_>,
        name: AtomId,
        local: &Arc<str>,
        attrs: &[Attribute],
    ) -> Result<(), TreeBuilderError> {
        self.insert_html_element(step, name, local, attrs)?;
        step.tokenizer.set_state(TokenizerState::Rcdata);
        self.original_mode = self.mode;
        self.set_mode(InsertionMode::Text);
        Ok(())
    }

    fn in_head_start_tag(
        &mut self,
        step: &mut Step<'_>,
        name: AtomId,
        local: &Arc<str>,
        attrs: &[Attribute],
        self_closing: bool,
    ) -> Result<(), TreeBuilderError> {
        match &**local {
            "html" => self.in_body_start_tag(step, name, local, attrs, self_closing),
            "base" | "basefont" | "bgsound" | "link" | "meta" => {
                self.insert_self_closing(step, name, local, attrs)
            }
            "title" => self.follow_generic_rcdata(step, name, local, attrs),
            "noscript" if !self.config.scripting_enabled => {
                self.insert_html_element(step, name, local, attrs)?;
                self.set_mode(InsertionMode::InHeadNoscript);
                Ok(())
            }
            "noscript" | "noframes" | "style" => {
                self.follow_generic_rawtext(step, name, local, attrs)
            }
            "script" => {
                self.insert_html_element(step, name, local, attrs)?;
                step.tokenizer.set_state(TokenizerState::ScriptData);
                self.original_mode = self.mode;
                self.set_mode(InsertionMode::Text);
                Ok(())
            }
            "template" => {
                self.insert_html_element(step, name, local, attrs)?;
                self.formatting.append_marker();
                self.frameset_ok = false;
                self.set_mode(InsertionMode::InTemplate);
                self.template_modes.push(InsertionMode::InTemplate);
                Ok(())
            }
            "head" => {
                self.record_error(step, ParseErrorCode::UnexpectedStartTag);
                Ok(())
            }
            _ => {
                self.default_for_in_head(step)?;
                self.process_start_tag(step, name, local, attrs, self_closing)
            }
        }
    }

    fn in_head_noscript_start_tag(
        &mut self,
        step: &mut Step<'_>,
        name: AtomId,
        local: &Arc<str>,
        attrs: &[Attribute],
        self_closing: bool,
    ) -> Result<(), TreeBuilderError> {
        match &**local {
            "html" => self.in_body_start_tag(step, name, local, attrs, self_closing),
            "basefont" | "bgsound" | "link" | "meta" | "noframes" | "style" => {
                self.in_head_start_tag(step, name, local, attrs, self_closing)
            }
            "head" | "noscript" => {
                self.record_error(step, ParseErrorCode::UnexpectedStartTag);
                Ok(())
            }
            _ => {
                self.record_error(step, ParseErrorCode::UnexpectedStartTag);
                self.default_for_in_head_noscript(step)?;
                self.process_start_tag(step, name, local, attrs, self_closing)
            }
        }
    }

    fn after_head_start_tag(
        &mut self,
        step: &mut Step<'_>,
        name: AtomId,
        local: &Arc<str>,
        attrs: &[Attribute],
        self_closing: bool,
    ) -> Result<(), TreeBuilderError> {
        match &**local {
            "html" => self.in_body_start_tag(step, name, local, attrs, self_closing),
            "body" => {
                self.insert_html_element(step, name, local, attrs)?;
                self.frameset_ok = false;
                self.set_mode(InsertionMode::InBody);
                Ok(())
            }
            "frameset" => {
                self.insert_html_element(step, name, local, attrs)?;
                self.set_mode(InsertionMode::InFrameset);
                Ok(())
            }
            "base" | "basefont" | "bgsound" | "link" | "meta" | "noframes" | "script" | "style"
            | "template" | "title" => {
                self.record_error(step, ParseErrorCode::UnexpectedStartTag);
                let Some(head) = self.head.clone() else {
                    debug_assert!(false, "after-head without head pointer");
                    return Ok(());
                };
                self.open.push(head.clone());
                self.in_head_start_tag(step, name, local, attrs, self_closing)?;
                let _ = self.open.remove(head.node);
                Ok(())
            }
            "head" => {
                self.record_error(step, ParseErrorCode::UnexpectedStartTag);
                Ok(())
            }
            _ => {
                self.default_for_after_head(step)?;
                self.process_start_tag(step, name, local, attrs, self_closing)
            }
        }
    }

    fn in_body_start_tag(
        &mut self,
        step: &mut Step<'_>,
        name: AtomId,
        local: &Arc<str>,
        attrs: &[Attribute],
        self_closing: bool,
    ) -> Result<(), TreeBuilderError> {
        match &**local {
            "html" => {
                self.record_error(step, ParseErrorCode::UnexpectedStartTag);
                if self.open.contains_html_element("template") {
                    return Ok(());
                }
                let resolved = super::resolve_attrs(&step.ctx.atoms, step.text, attrs)?;
                let root = self
                    .open
                    .bottom()
                    .map(|item| item.node)
                    .ok_or(EngineInvariantError)?;
                step.sink.add_attrs_if_missing(root, resolved);
                Ok(())
            }
            "base" | "basefont" | "bgsound" | "link" | "meta" | "noframes" | "script" | "style"
            | "template" | "title" => {
                self.in_head_start_tag(step, name, local, attrs, self_closing)
            }
            "body" => {
                self.record_error(step, ParseErrorCode::UnexpectedStartTag);
                if self.open.has_only_one_element()
                    || !self.open.second_element_is_body()
                    || self.open.contains_html_element("template")
                {
                    return Ok(());
                }
                self.frameset_ok = false;
                let resolved = super::resolve_attrs(&step.ctx.atoms, step.text, attrs)?;
                let body = self.open.at(1).node;
                step.sink.add_attrs_if_missing(body, resolved);
                Ok(())
            }
            "frameset" => {
                self.record_error(step, ParseErrorCode::UnexpectedStartTag);
                if !self.open.second_element_is_body() || !self.frameset_ok {
                    return Ok(());
                }
                let body = self.open.at(1).node;
                step.sink.remove_from_parent(body);
                while self.open.len() > 1 {
                    let _ = self.open.pop();
                }
                self.insert_html_element(step, name, local, attrs)?;
                self.set_mode(InsertionMode::InFrameset);
                Ok(())
            }
            "address" | "article" | "aside" | "blockquote" | "center" | "details" | "dialog"
            | "dir" | "div" | "dl" | "fieldset" | "figcaption" | "figure" | "footer" | "header"
            | "hgroup" | "main" | "menu" | "nav" | "ol" | "p" | "section" | "summary" | "ul" => {
                self.close_p_if_in_button_scope(step);
                self.insert_html_element(step, name, local, attrs)
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.close_p_if_in_button_scope(step);
                if self
                    .open
                    .top()
                    .is_some_and(|top| top.ns == Namespace::Html && tags::is_numbered_header(&top.local))
                {
                    self.record_error(step, ParseErrorCode::UnexpectedStartTag);
                    let _ = self.open.pop();
                }
                self.insert_html_element(step, name, local, attrs)
            }
            "pre" | "listing" => {
                self.close_p_if_in_button_scope(step);
                self.insert_html_element(step, name, local, attrs)?;
                self.skip_next_newline = true;
                self.frameset_ok = false;
                Ok(())
            }
            "form" => {
                if self.form.is_some() && !self.open.contains_html_element("template") {
                    self.record_error(step, ParseErrorCode::UnexpectedStartTag);
                    return Ok(());
                }
                self.close_p_if_in_button_scope(step);
                self.insert_html_element(step, name, local, attrs)?;
                if !self.open.contains_html_element("template") {
                    self.form = self.open.top().map(|item| item.node);
                }
                Ok(())
            }
            "li" => {
                self.frameset_ok = false;
                self.close_list_item_ancestors(step, &["li"])?;
                self.close_p_if_in_button_scope(step);
                self.insert_html_element(step, name, local, attrs)
            }
            "dd" | "dt" => {
                self.frameset_ok = false;
                self.close_list_item_ancestors(step, &["dd", "dt"])?;
                self.close_p_if_in_button_scope(step);
                self.insert_html_element(step, name, local, attrs)
            }
            "plaintext" => {
                self.close_p_if_in_button_scope(step);
                self.insert_html_element(step, name, local, attrs)?;
                step.tokenizer.set_state(TokenizerState::Plaintext);
                Ok(())
            }
            "button" => {
                if self.open.in_scope("button", ScopeKind::Default) {
                    self.record_error(step, ParseErrorCode::UnexpectedStartTag);
                    self.generate_implied_end_tags(None);
                    self.open.pop_until_popped("button");
                }
                self.reconstruct_active_formatting_elements(step)?;
                self.insert_html_element(step, name, local, attrs)?;
                self.frameset_ok = false;
                Ok(())
            }
            "a" => {
                if let Some(existing) = self
                    .formatting
                    .closest_element_in_scope_with_name("a")
                    .map(|item| item.node)
                {
                    self.record_error(step, ParseErrorCode::MisnestedFormattingElement);
                    let _ = self.call_the_adoption_agency(step, "a")?;
                    self.formatting.remove(existing);
                    let _ = self.open.remove(existing);
                }
                self.reconstruct_active_formatting_elements(step)?;
                self.insert_html_element(step, name, local, attrs)?;
                self.append_top_to_formatting_list()
            }
            "nobr" => {
                self.reconstruct_active_formatting_elements(step)?;
                if self.open.in_scope("nobr", ScopeKind::Default) {
                    self.record_error(step, ParseErrorCode::MisnestedFormattingElement);
                    let _ = self.call_the_adoption_agency(step, "nobr")?;
                    self.reconstruct_active_formatting_elements(step)?;
                }
                self.insert_html_element(step, name, local, attrs)?;
                self.append_top_to_formatting_list()
            }
            _ if tags::is_non_anchor_formatting_tag(local) => {
                self.reconstruct_active_formatting_elements(step)?;
                self.insert_html_element(step, name, local, attrs)?;
                self.append_top_to_formatting_list()
            }
            "applet" | "marquee" | "object" => {
                self.reconstruct_active_formatting_elements(step)?;
                self.insert_html_element(step, name, local, attrs)?;
                self.formatting.append_marker();
                self.frameset_ok = false;
                Ok(())
            }
            "table" => {
                if self.quirks != QuirksMode::Quirks {
                    self.close_p_if_in_button_scope(step);
                }
                self.insert_html_element(step, name, local, attrs)?;
                self.frameset_ok = false;
                self.set_mode(InsertionMode::InTable);
                Ok(())
            }
            "area" | "br" | "embed" | "img" | "keygen" | "wbr" => {
                self.reconstruct_active_formatting_elements(step)?;
                self.insert_self_closing(step, name, local, attrs)?;
                self.frameset_ok = false;
                Ok(())
            }
            "input" => {
                self.reconstruct_active_formatting_elements(step)?;
                let type_value =
                    find_attr_value(&step.ctx.atoms, step.text, attrs, "type")?;
                self.insert_self_closing(step, name, local, attrs)?;
                if !type_value.is_some_and(|value| value.eq_ignore_ascii_case("hidden")) {
                    self.frameset_ok = false;
                }
                Ok(())
            }
            "param" | "source" | "track" => self.insert_self_closing(step, name, local, attrs),
            "hr" => {
                self.close_p_if_in_button_scope(step);
                self.insert_self_closing(step, name, local, attrs)?;
                self.frameset_ok = false;
                Ok(())
            }
            "image" => {
                // Legacy repair: retreat to <img>.
                self.record_error(step, ParseErrorCode::UnexpectedStartTag);
                let img = step
                    .ctx
                    .atoms
                    .intern_ascii_folded("img")
                    .map_err(|_| EngineInvariantError)?;
                let img_local = resolve_name(&step.ctx.atoms, img)?;
                self.process_start_tag(step, img, &img_local, attrs, self_closing)
            }
            "textarea" => {
                self.insert_html_element(step, name, local, attrs)?;
                self.skip_next_newline = true;
                step.tokenizer.set_state(TokenizerState::Rcdata);
                self.original_mode = self.mode;
                self.frameset_ok = false;
                self.set_mode(InsertionMode::Text);
                Ok(())
            }
            "xmp" => {
                self.close_p_if_in_button_scope(step);
                self.reconstruct_active_formatting_elements(step)?;
                self.frameset_ok = false;
                self.follow_generic_rawtext(step, name, local, attrs)
            }
            "iframe" => {
                self.frameset_ok = false;
                self.follow_generic_rawtext(step, name, local, attrs)
            }
            "noembed" => self.follow_generic_rawtext(step, name, local, attrs),
            "noscript" if self.config.scripting_enabled => {
                self.follow_generic_rawtext(step, name, local, attrs)
            }
            "select" => {
                self.reconstruct_active_formatting_elements(step)?;
                self.insert_html_element(step, name, local, attrs)?;
                self.frameset_ok = false;
                let mode = if matches!(
                    self.mode,
                    InsertionMode::InTable
                        | InsertionMode::InCaption
                        | InsertionMode::InTableBody
                        | InsertionMode::InRow
                        | InsertionMode::InCell
                ) {
                    InsertionMode::InSelectInTable
                } else {
                    InsertionMode::InSelect
                };
                self.set_mode(mode);
                Ok(())
            }
            "optgroup" | "option" => {
                if self
                    .open
                    .top()
                    .is_some_and(|top| top.is_html_element_named("option"))
                {
                    let _ = self.open.pop();
                }
                self.reconstruct_active_formatting_elements(step)?;
                self.insert_html_element(step, name, local, attrs)
            }
            "rb" | "rtc" => {
                if self.open.in_scope("ruby", ScopeKind::Default) {
                    self.generate_implied_end_tags(None);
                    if !self
                        .open
                        .top()
                        .is_some_and(|top| top.is_html_element_named("ruby"))
                    {
                        self.record_error(step, ParseErrorCode::UnexpectedStartTag);
                    }
                }
                self.insert_html_element(step, name, local, attrs)
            }
            "rp" | "rt" => {
                if self.open.in_scope("ruby", ScopeKind::Default) {
                    self.generate_implied_end_tags(Some("rtc"));
                    if !self.open.top().is_some_and(|top| {
                        top.is_html_element_named("ruby") || top.is_html_element_named("rtc")
                    }) {
                        self.record_error(step, ParseErrorCode::UnexpectedStartTag);
                    }
                }
                self.insert_html_element(step, name, local, attrs)
            }
            "math" => {
                self.reconstruct_active_formatting_elements(step)?;
                self.insert_foreign_element_for_token(
                    step,
                    local,
                    attrs,
                    Namespace::MathMl,
                    self_closing,
                )
            }
            "svg" => {
                self.reconstruct_active_formatting_elements(step)?;
                self.insert_foreign_element_for_token(
                    step,
                    local,
                    attrs,
                    Namespace::Svg,
                    self_closing,
                )
            }
            "caption" | "col" | "colgroup" | "frame" | "head" | "tbody" | "td" | "tfoot"
            | "th" | "thead" | "tr" => {
                self.record_error(step, ParseErrorCode::UnexpectedStartTag);
                Ok(())
            }
            _ => {
                self.reconstruct_active_formatting_elements(step)?;
                self.insert_html_element(step, name, local, attrs)
            }
        }
    }

    fn append_top_to_formatting_list(&mut self) -> Result<(), TreeBuilderError> {
        let item = self.open.top().cloned().ok_or(EngineInvariantError)?;
        self.formatting.append(item);
        Ok(())
    }

    /// The li/dd/dt ancestor walk: close an open item of the same family,
    /// stopping at any special element other than address/div/p.
    fn close_list_item_ancestors(
        &mut self,
        step: &mut Step<'_>,
        family: &[&str],
    ) -> Result<(), TreeBuilderError> {
        for index in (0..self.open.len()).rev() {
            let item = self.open.at(index);
            if item.ns == Namespace::Html && family.contains(&&*item.local) {
                let target = item.local.to_string();
                self.process_fake_end_tag(step, &target)?;
                return Ok(());
            }
            if item.is_special() && !matches!(&*item.local, "address" | "div" | "p") {
                return Ok(());
            }
        }
        Ok(())
    }

    fn in_table_start_tag(
        &mut self,
        step: &mut Step<'_>,
        name: AtomId,
        local: &Arc<str>,
        attrs: &[Attribute],
        self_closing: bool,
    ) -> Result<(), TreeBuilderError> {
        match &**local {
            "caption" => {
                self.open.pop_until_table_scope_marker();
                self.formatting.append_marker();
                self.insert_html_element(step, name, local, attrs)?;
                self.set_mode(InsertionMode::InCaption);
                Ok(())
            }
            "colgroup" => {
                self.open.pop_until_table_scope_marker();
                self.insert_html_element(step, name, local, attrs)?;
                self.set_mode(InsertionMode::InColumnGroup);
                Ok(())
            }
            "col" => {
                self.process_fake_start_tag(step, "colgroup")?;
                self.process_start_tag(step, name, local, attrs, self_closing)
            }
            "tbody" | "tfoot" | "thead" => {
                self.open.pop_until_table_scope_marker();
                self.insert_html_element(step, name, local, attrs)?;
                self.set_mode(InsertionMode::InTableBody);
                Ok(())
            }
            "td" | "th" | "tr" => {
                self.process_fake_start_tag(step, "tbody")?;
                self.process_start_tag(step, name, local, attrs, self_closing)
            }
            "table" => {
                self.record_error(step, ParseErrorCode::UnexpectedStartTag);
                if !self.open.in_scope("table", ScopeKind::Table) {
                    return Ok(());
                }
                self.open.pop_until_popped("table");
                self.reset_insertion_mode_appropriately();
                self.process_start_tag(step, name, local, attrs, self_closing)
            }
            "style" | "script" | "template" => {
                self.in_head_start_tag(step, name, local, attrs, self_closing)
            }
            "input" => {
                let type_value =
                    find_attr_value(&step.ctx.atoms, step.text, attrs, "type")?;
                if type_value.is_some_and(|value| value.eq_ignore_ascii_case("hidden")) {
                    self.record_error(step, ParseErrorCode::UnexpectedStartTag);
                    self.insert_self_closing(step, name, local, attrs)
                } else {
                    self.in_table_anything_else_start(step, name, local, attrs, self_closing)
                }
            }
            "form" => {
                self.record_error(step, ParseErrorCode::UnexpectedStartTag);
                if self.open.contains_html_element("template") || self.form.is_some() {
                    return Ok(());
                }
                self.insert_html_element(step, name, local, attrs)?;
                self.form = self.open.top().map(|item| item.node);
                let _ = self.open.pop();
                Ok(())
            }
            _ => self.in_table_anything_else_start(step, name, local, attrs, self_closing),
        }
    }

    fn in_table_anything_else_start(
        &mut self,
        step: &mut Step<'_>,
        name: AtomId,
        local: &Arc<str>,
        attrs: &[Attribute],
        self_closing: bool,
    ) -> Result<(), TreeBuilderError> {
        self.record_error(step, ParseErrorCode::UnexpectedStartTag);
        self.foster_parenting = true;
        let result = self.in_body_start_tag(step, name, local, attrs, self_closing);
        self.foster_parenting = false;
        result
    }

    /// Close the open caption if one is in table scope; true when closed.
    fn close_caption(&mut self, step: &mut Step<'_>) -> Result<bool, TreeBuilderError> {
        if !self.open.in_scope("caption", ScopeKind::Table) {
            self.record_error(step, ParseErrorCode::UnexpectedEndTag);
            return Ok(false);
        }
        self.generate_implied_end_tags(None);
        if !self
            .open
            .top()
            .is_some_and(|top| top.is_html_element_named("caption"))
        {
            self.record_error(step, ParseErrorCode::UnexpectedEndTag);
        }
        self.open.pop_until_popped("caption");
        self.formatting.clear_to_last_marker();
        self.set_mode(InsertionMode::InTable);
        Ok(true)
    }

    fn in_caption_start_tag(
        &mut self,
        step: &mut Step<'_>,
        name: AtomId,
        local: &Arc<str>,
        attrs: &[Attribute],
        self_closing: bool,
    ) -> Result<(), TreeBuilderError> {
        match &**local {
            "caption" | "col" | "colgroup" | "tbody" | "td" | "tfoot" | "th" | "thead" | "tr" => {
                if self.close_caption(step)? {
                    self.process_start_tag(step, name, local, attrs, self_closing)
                } else {
                    Ok(())
                }
            }
            _ => self.in_body_start_tag(step, name, local, attrs, self_closing),
        }
    }

    fn in_column_group_start_tag(
        &mut self,
        step: &mut Step<'_>,
        name: AtomId,
        local: &Arc<str>,
        attrs: &[Attribute],
        self_closing: bool,
    ) -> Result<(), TreeBuilderError> {
        match &**local {
            "html" => self.in_body_start_tag(step, name, local, attrs, self_closing),
            "col" => self.insert_self_closing(step, name, local, attrs),
            "template" => self.in_head_start_tag(step, name, local, attrs, self_closing),
            _ => {
                if !self
                    .open
                    .top()
                    .is_some_and(|top| top.is_html_element_named("colgroup"))
                {
                    self.record_error(step, ParseErrorCode::UnexpectedStartTag);
                    return Ok(());
                }
                let _ = self.open.pop();
                self.set_mode(InsertionMode::InTable);
                self.process_start_tag(step, name, local, attrs, self_closing)
            }
        }
    }

    fn in_table_body_start_tag(
        &mut self,
        step: &mut Step<'_>,
        name: AtomId,
        local: &Arc<str>,
        attrs: &[Attribute],
        self_closing: bool,
    ) -> Result<(), TreeBuilderError> {
        match &**local {
            "tr" => {
                self.open.pop_until_table_body_scope_marker();
                self.insert_html_element(step, name, local, attrs)?;
                self.set_mode(InsertionMode::InRow);
                Ok(())
            }
            "th" | "td" => {
                self.record_error(step, ParseErrorCode::UnexpectedStartTag);
                self.process_fake_start_tag(step, "tr")?;
                self.process_start_tag(step, name, local, attrs, self_closing)
            }
            "caption" | "col" | "colgroup" | "tbody" | "tfoot" | "thead" => {
                if !self.table_body_context_in_table_scope() {
                    self.record_error(step, ParseErrorCode::UnexpectedStartTag);
                    return Ok(());
                }
                self.open.pop_until_table_body_scope_marker();
                let _ = self.open.pop();
                self.set_mode(InsertionMode::InTable);
                self.process_start_tag(step, name, local, attrs, self_closing)
            }
            _ => self.in_table_start_tag(step, name, local, attrs, self_closing),
        }
    }

    fn table_body_context_in_table_scope(&self) -> bool {
        self.open.in_scope("tbody", ScopeKind::Table)
            || self.open.in_scope("thead", ScopeKind::Table)
            || self.open.in_scope("tfoot", ScopeKind::Table)
    }

    fn in_row_start_tag(
        &mut self,
        step: &mut Step<'_>,
        name: AtomId,
        local: &Arc<str>,
        attrs: &[Attribute],
        self_closing: bool,
    ) -> Result<(), TreeBuilderError> {
        match &**local {
            "th" | "td" => {
                self.open.pop_until_table_row_scope_marker();
                self.insert_html_element(step, name, local, attrs)?;
                self.set_mode(InsertionMode::InCell);
                self.formatting.append_marker();
                Ok(())
            }
            "caption" | "col" | "colgroup" | "tbody" | "tfoot" | "thead" | "tr" => {
                if !self.open.in_scope("tr", ScopeKind::Table) {
                    self.record_error(step, ParseErrorCode::UnexpectedStartTag);
                    return Ok(());
                }
                self.open.pop_until_table_row_scope_marker();
                let _ = self.open.pop();
                self.set_mode(InsertionMode::InTableBody);
                self.process_start_tag(step, name, local, attrs, self_closing)
            }
            _ => self.in_table_start_tag(step, name, local, attrs, self_closing),
        }
    }

    fn close_cell(&mut self, step: &mut Step<'_>) -> Result<(), TreeBuilderError> {
        if self.open.in_scope("td", ScopeKind::Table) {
            self.process_fake_end_tag(step, "td")
        } else {
            self.process_fake_end_tag(step, "th")
        }
    }

    fn in_cell_start_tag(
        &mut self,
        step: &mut Step<'_>,
        name: AtomId,
        local: &Arc<str>,
        attrs: &[Attribute],
        self_closing: bool,
    ) -> Result<(), TreeBuilderError> {
        match &**local {
            "caption" | "col" | "colgroup" | "tbody" | "td" | "tfoot" | "th" | "thead" | "tr" => {
                if !self.open.in_scope("td", ScopeKind::Table)
                    && !self.open.in_scope("th", ScopeKind::Table)
                {
                    self.record_error(step, ParseErrorCode::UnexpectedStartTag);
                    return Ok(());
                }
                self.close_cell(step)?;
                self.process_start_tag(step, name, local, attrs, self_closing)
            }
            _ => self.in_body_start_tag(step, name, local, attrs, self_closing),
        }
    }

    fn in_select_start_tag(
        &mut self,
        step: &mut Step<'_>,
        name: AtomId,
        local: &Arc<str>,
        attrs: &[Attribute],
        self_closing: bool,
    ) -> Result<(), TreeBuilderError> {
        match &**local {
            "html" => self.in_body_start_tag(step, name, local, attrs, self_closing),
            "option" => {
                if self
                    .open
                    .top()
                    .is_some_and(|top| top.is_html_element_named("option"))
                {
                    let _ = self.open.pop();
                }
                self.insert_html_element(step, name, local, attrs)
            }
            "optgroup" => {
                if self
                    .open
                    .top()
                    .is_some_and(|top| top.is_html_element_named("option"))
                {
                    let _ = self.open.pop();
                }
                if self
                    .open
                    .top()
                    .is_some_and(|top| top.is_html_element_named("optgroup"))
                {
                    let _ = self.open.pop();
                }
                self.insert_html_element(step, name, local, attrs)
            }
            "select" => {
                self.record_error(step, ParseErrorCode::UnexpectedStartTag);
                if self.open.in_scope("select", ScopeKind::Select) {
                    self.open.pop_until_popped("select");
                    self.reset_insertion_mode_appropriately();
                }
                Ok(())
            }
            "input" | "keygen" | "textarea" => {
                self.record_error(step, ParseErrorCode::UnexpectedStartTag);
                if !self.open.in_scope("select", ScopeKind::Select) {
                    return Ok(());
                }
                self.open.pop_until_popped("select");
                self.reset_insertion_mode_appropriately();
                self.process_start_tag(step, name, local, attrs, self_closing)
            }
            "script" | "template" => {
                self.in_head_start_tag(step, name, local, attrs, self_closing)
            }
            _ => {
                self.record_error(step, ParseErrorCode::UnexpectedStartTag);
                Ok(())
            }
        }
    }

    fn in_select_in_table_start_tag(
        &mut self,
        step: &mut Step<'_>,
        name: AtomId,
        local: &Arc<str>,
        attrs: &[Attribute],
        self_closing: bool,
    ) -> Result<(), TreeBuilderError> {
        match &**local {
            "caption" | "table" | "tbody" | "tfoot" | "thead" | "tr" | "td" | "th" => {
                self.record_error(step, ParseErrorCode::UnexpectedStartTag);
                self.open.pop_until_popped("select");
                self.reset_insertion_mode_appropriately();
                self.process_start_tag(step, name, local, attrs, self_closing)
            }
            _ => self.in_select_start_tag(step, name, local, attrs, self_closing),
        }
    }

    fn in_template_start_tag(
        &mut self,
        step: &mut Step<'_>,
        name: AtomId,
        local: &Arc<str>,
        attrs: &[Attribute],
        self_closing: bool,
    ) -> Result<(), TreeBuilderError> {
        match &**local {
            "base" | "basefont" | "bgsound" | "link" | "meta" | "noframes" | "script" | "style"
            | "template" | "title" => {
                self.in_head_start_tag(step, name, local, attrs, self_closing)
            }
            "caption" | "colgroup" | "tbody" | "tfoot" | "thead" => {
                self.retarget_template_mode(InsertionMode::InTable);
                self.process_start_tag(step, name, local, attrs, self_closing)
            }
            "col" => {
                self.retarget_template_mode(InsertionMode::InColumnGroup);
                self.process_start_tag(step, name, local, attrs, self_closing)
            }
            "tr" => {
                self.retarget_template_mode(InsertionMode::InTableBody);
                self.process_start_tag(step, name, local, attrs, self_closing)
            }
            "td" | "th" => {
                self.retarget_template_mode(InsertionMode::InRow);
                self.process_start_tag(step, name, local, attrs, self_closing)
            }
            _ => {
                self.retarget_template_mode(InsertionMode::InBody);
                self.process_start_tag(step, name, local, attrs, self_closing)
            }
        }
    }

    fn retarget_template_mode(&mut self, mode: InsertionMode) {
        let _ = self.template_modes.pop();
        self.template_modes.push(mode);
        self.set_mode(mode);
    }

    // -----------------------------------------------------------------
    // End tags
    // -----------------------------------------------------------------

    pub(super) fn process_end_tag(
        &mut self,
        step: &mut Step<'_>,
        local: &Arc<str>,
    ) -> Result<(), TreeBuilderError> {
        match self.mode {
            InsertionMode::Initial => {
                self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                self.default_for_initial(step);
                self.process_end_tag(step, local)
            }
            InsertionMode::BeforeHtml => match &**local {
                "head" | "body" | "html" | "br" => {
                    self.default_for_before_html(step)?;
                    self.process_end_tag(step, local)
                }
                _ => {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                    Ok(())
                }
            },
            InsertionMode::BeforeHead => match &**local {
                "head" | "body" | "html" | "br" => {
                    self.default_for_before_head(step)?;
                    self.process_end_tag(step, local)
                }
                _ => {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                    Ok(())
                }
            },
            InsertionMode::InHead => self.in_head_end_tag(step, local),
            InsertionMode::InHeadNoscript => match &**local {
                "noscript" => {
                    let _ = self.open.pop();
                    self.set_mode(InsertionMode::InHead);
                    Ok(())
                }
                "br" => {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                    self.default_for_in_head_noscript(step)?;
                    self.process_end_tag(step, local)
                }
                _ => {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                    Ok(())
                }
            },
            InsertionMode::AfterHead => match &**local {
                "body" | "html" | "br" => {
                    self.default_for_after_head(step)?;
                    self.process_end_tag(step, local)
                }
                "template" => self.in_head_end_tag(step, local),
                _ => {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                    Ok(())
                }
            },
            InsertionMode::InBody => self.in_body_end_tag(step, local),
            InsertionMode::Text => {
                if &**local == "script" {
                    self.pending_script = self.open.top().map(|item| item.node);
                }
                let _ = self.open.pop();
                self.set_mode(self.original_mode);
                Ok(())
            }
            InsertionMode::InTable => self.in_table_end_tag(step, local),
            InsertionMode::InTableText => {
                debug_assert!(false, "unflushed table text at end tag");
                self.flush_pending_table_text(step)?;
                self.process_end_tag(step, local)
            }
            InsertionMode::InCaption => self.in_caption_end_tag(step, local),
            InsertionMode::InColumnGroup => match &**local {
                "colgroup" => {
                    if !self
                        .open
                        .top()
                        .is_some_and(|top| top.is_html_element_named("colgroup"))
                    {
                        self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                        return Ok(());
                    }
                    let _ = self.open.pop();
                    self.set_mode(InsertionMode::InTable);
                    Ok(())
                }
                "col" => {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                    Ok(())
                }
                "template" => self.in_head_end_tag(step, local),
                _ => {
                    if !self
                        .open
                        .top()
                        .is_some_and(|top| top.is_html_element_named("colgroup"))
                    {
                        self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                        return Ok(());
                    }
                    let _ = self.open.pop();
                    self.set_mode(InsertionMode::InTable);
                    self.process_end_tag(step, local)
                }
            },
            InsertionMode::InTableBody => self.in_table_body_end_tag(step, local),
            InsertionMode::InRow => self.in_row_end_tag(step, local),
            InsertionMode::InCell => self.in_cell_end_tag(step, local),
            InsertionMode::InSelect => self.in_select_end_tag(step, local),
            InsertionMode::InSelectInTable => match &**local {
                "caption" | "table" | "tbody" | "tfoot" | "thead" | "tr" | "td" | "th" => {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                    if !self.open.in_scope(local, ScopeKind::Table) {
                        return Ok(());
                    }
                    self.open.pop_until_popped("select");
                    self.reset_insertion_mode_appropriately();
                    self.process_end_tag(step, local)
                }
                _ => self.in_select_end_tag(step, local),
            },
            InsertionMode::InTemplate => {
                if &**local == "template" {
                    self.in_head_end_tag(step, local)
                } else {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                    Ok(())
                }
            }
            InsertionMode::AfterBody => {
                if &**local == "html" {
                    if self.fragment.is_some() {
                        self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                        return Ok(());
                    }
                    self.set_mode(InsertionMode::AfterAfterBody);
                    Ok(())
                } else {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                    self.set_mode(InsertionMode::InBody);
                    self.process_end_tag(step, local)
                }
            }
            InsertionMode::InFrameset => {
                if &**local == "frameset" {
                    if self.open.has_only_one_element() {
                        self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                        return Ok(());
                    }
                    let _ = self.open.pop();
                    if self.fragment.is_none()
                        && !self
                            .open
                            .top()
                            .is_some_and(|top| top.is_html_element_named("frameset"))
                    {
                        self.set_mode(InsertionMode::AfterFrameset);
                    }
                    Ok(())
                } else {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                    Ok(())
                }
            }
            InsertionMode::AfterFrameset => match &**local {
                "html" => {
                    self.set_mode(InsertionMode::AfterAfterFrameset);
                    Ok(())
                }
                _ => {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                    Ok(())
                }
            },
            InsertionMode::AfterAfterBody => {
                self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                self.set_mode(InsertionMode::InBody);
                self.process_end_tag(step, local)
            }
            InsertionMode::AfterAfterFrameset => {
                self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                Ok(())
            }
        }
    }

    fn in_head_end_tag(
        &mut self,
        step: &mut Step<'_>,
        local: &Arc<str>,
    ) -> Result<(), TreeBuilderError> {
        match &**local {
            "head" => {
                let _ = self.open.pop();
                self.set_mode(InsertionMode::AfterHead);
                Ok(())
            }
            "body" | "html" | "br" => {
                self.default_for_in_head(step)?;
                self.process_end_tag(step, local)
            }
            "template" => self.template_end_tag(step),
            _ => {
                self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                Ok(())
            }
        }
    }

    pub(super) fn template_end_tag(
        &mut self,
        step: &mut Step<'_>,
    ) -> Result<(), TreeBuilderError> {
        if !self.open.contains_html_element("template") {
            self.record_error(step, ParseErrorCode::UnexpectedEndTag);
            return Ok(());
        }
        self.generate_implied_end_tags_thoroughly();
        if !self
            .open
            .top()
            .is_some_and(|top| top.is_html_element_named("template"))
        {
            self.record_error(step, ParseErrorCode::UnexpectedEndTag);
        }
        self.open.pop_until_popped("template");
        self.formatting.clear_to_last_marker();
        let _ = self.template_modes.pop();
        self.reset_insertion_mode_appropriately();
        Ok(())
    }

    fn in_body_end_tag(
        &mut self,
        step: &mut Step<'_>,
        local: &Arc<str>,
    ) -> Result<(), TreeBuilderError> {
        match &**local {
            "template" => self.template_end_tag(step),
            "body" => {
                if !self.open.in_scope("body", ScopeKind::Default) {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                    return Ok(());
                }
                self.report_unclosed_at_body_end(step);
                self.set_mode(InsertionMode::AfterBody);
                Ok(())
            }
            "html" => {
                if !self.open.in_scope("body", ScopeKind::Default) {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                    return Ok(());
                }
                self.report_unclosed_at_body_end(step);
                self.set_mode(InsertionMode::AfterBody);
                self.process_end_tag(step, local)
            }
            "address" | "article" | "aside" | "blockquote" | "button" | "center" | "details"
            | "dialog" | "dir" | "div" | "dl" | "fieldset" | "figcaption" | "figure" | "footer"
            | "header" | "hgroup" | "listing" | "main" | "menu" | "nav" | "ol" | "pre"
            | "section" | "summary" | "ul" => {
                if !self.open.in_scope(local, ScopeKind::Default) {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                    return Ok(());
                }
                self.generate_implied_end_tags(None);
                if !self
                    .open
                    .top()
                    .is_some_and(|top| top.is_html_element_named(local))
                {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                }
                self.open.pop_until_popped(local);
                Ok(())
            }
            "form" => self.in_body_form_end_tag(step),
            "p" => {
                if !self.open.in_scope("p", ScopeKind::Button) {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                    self.insert_phantom(step, "p")?;
                }
                self.close_p_element(step);
                Ok(())
            }
            "li" => {
                if !self.open.in_scope("li", ScopeKind::ListItem) {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                    return Ok(());
                }
                self.generate_implied_end_tags(Some("li"));
                if !self
                    .open
                    .top()
                    .is_some_and(|top| top.is_html_element_named("li"))
                {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                }
                self.open.pop_until_popped("li");
                Ok(())
            }
            "dd" | "dt" => {
                if !self.open.in_scope(local, ScopeKind::Default) {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                    return Ok(());
                }
                self.generate_implied_end_tags(Some(&**local));
                if !self
                    .open
                    .top()
                    .is_some_and(|top| top.is_html_element_named(local))
                {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                }
                self.open.pop_until_popped(local);
                Ok(())
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                if !self.open.numbered_header_in_scope() {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                    return Ok(());
                }
                self.generate_implied_end_tags(None);
                if !self
                    .open
                    .top()
                    .is_some_and(|top| top.is_html_element_named(local))
                {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                }
                self.open.pop_until_numbered_header_popped();
                Ok(())
            }
            "applet" | "marquee" | "object" => {
                if !self.open.in_scope(local, ScopeKind::Default) {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                    return Ok(());
                }
                self.generate_implied_end_tags(None);
                if !self
                    .open
                    .top()
                    .is_some_and(|top| top.is_html_element_named(local))
                {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                }
                self.open.pop_until_popped(local);
                self.formatting.clear_to_last_marker();
                Ok(())
            }
            "br" => {
                // Legacy repair: </br> acts as a bare <br> start tag.
                self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                self.reconstruct_active_formatting_elements(step)?;
                let br = step
                    .ctx
                    .atoms
                    .intern_ascii_folded("br")
                    .map_err(|_| EngineInvariantError)?;
                let br_local = resolve_name(&step.ctx.atoms, br)?;
                self.insert_self_closing(step, br, &br_local, &[])?;
                self.frameset_ok = false;
                Ok(())
            }
            _ if tags::is_formatting_tag(local) => {
                if self.call_the_adoption_agency(step, local)? {
                    Ok(())
                } else {
                    self.any_other_end_tag(step, local)
                }
            }
            _ => self.any_other_end_tag(step, local),
        }
    }

    fn report_unclosed_at_body_end(&mut self, step: &mut Step<'_>) {
        let ok = self.open.iter().all(|item| {
            item.ns != Namespace::Html
                || matches!(
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
        });
        if !ok {
            self.record_error(step, ParseErrorCode::UnexpectedEndTag);
        }
    }

    fn in_body_form_end_tag(&mut self, step: &mut Step<'_>) -> Result<(), TreeBuilderError> {
        if !self.open.contains_html_element("template") {
            let node = self.form.take();
            let in_scope = node
                .is_some_and(|node| self.open.element_in_scope(node, ScopeKind::Default));
            if !in_scope {
                self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                return Ok(());
            }
            let node = node.expect("checked above");
            self.generate_implied_end_tags(None);
            if self.open.top().map(|top| top.node) != Some(node) {
                self.record_error(step, ParseErrorCode::UnexpectedEndTag);
            }
            let _ = self.open.remove(node);
            Ok(())
        } else {
            if !self.open.in_scope("form", ScopeKind::Default) {
                self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                return Ok(());
            }
            self.generate_implied_end_tags(None);
            if !self
                .open
                .top()
                .is_some_and(|top| top.is_html_element_named("form"))
            {
                self.record_error(step, ParseErrorCode::UnexpectedEndTag);
            }
            self.open.pop_until_popped("form");
            Ok(())
        }
    }

    /// The "any other end tag" walk: close a matching open element, or
    /// ignore the token at the first special element.
    pub(crate) fn any_other_end_tag(
        &mut self,
        step: &mut Step<'_>,
        local: &str,
    ) -> Result<(), TreeBuilderError> {
        for index in (0..self.open.len()).rev() {
            let item = self.open.at(index);
            if item.is_html_element_named(local) {
                let node = item.node;
                self.generate_implied_end_tags(Some(local));
                if self.open.top().map(|top| top.node) != Some(node) {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                }
                self.open.pop_until_popped_element(node);
                return Ok(());
            }
            if item.is_special() {
                self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                return Ok(());
            }
        }
        Ok(())
    }

    fn in_table_end_tag(
        &mut self,
        step: &mut Step<'_>,
        local: &Arc<str>,
    ) -> Result<(), TreeBuilderError> {
        match &**local {
            "table" => {
                if !self.open.in_scope("table", ScopeKind::Table) {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                    return Ok(());
                }
                self.open.pop_until_popped("table");
                self.reset_insertion_mode_appropriately();
                Ok(())
            }
            "body" | "caption" | "col" | "colgroup" | "html" | "tbody" | "td" | "tfoot" | "th"
            | "thead" | "tr" => {
                self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                Ok(())
            }
            "template" => self.in_head_end_tag(step, local),
            _ => {
                self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                self.foster_parenting = true;
                let result = self.in_body_end_tag(step, local);
                self.foster_parenting = false;
                result
            }
        }
    }

    fn in_caption_end_tag(
        &mut self,
        step: &mut Step<'_>,
        local: &Arc<str>,
    ) -> Result<(), TreeBuilderError> {
        match &**local {
            "caption" => {
                let _ = self.close_caption(step)?;
                Ok(())
            }
            "table" => {
                if self.close_caption(step)? {
                    self.process_end_tag(step, local)
                } else {
                    Ok(())
                }
            }
            "body" | "col" | "colgroup" | "html" | "tbody" | "td" | "tfoot" | "th" | "thead"
            | "tr" => {
                self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                Ok(())
            }
            _ => self.in_body_end_tag(step, local),
        }
    }

    fn in_table_body_end_tag(
        &mut self,
        step: &mut Step<'_>,
        local: &Arc<str>,
    ) -> Result<(), TreeBuilderError> {
        match &**local {
            "tbody" | "tfoot" | "thead" => {
                if !self.open.in_scope(local, ScopeKind::Table) {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                    return Ok(());
                }
                self.open.pop_until_table_body_scope_marker();
                let _ = self.open.pop();
                self.set_mode(InsertionMode::InTable);
                Ok(())
            }
            "table" => {
                if !self.table_body_context_in_table_scope() {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                    return Ok(());
                }
                self.open.pop_until_table_body_scope_marker();
                let _ = self.open.pop();
                self.set_mode(InsertionMode::InTable);
                self.process_end_tag(step, local)
            }
            "body" | "caption" | "col" | "colgroup" | "html" | "td" | "th" | "tr" => {
                self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                Ok(())
            }
            _ => self.in_table_end_tag(step, local),
        }
    }

    fn in_row_end_tag(
        &mut self,
        step: &mut Step<'_>,
        local: &Arc<str>,
    ) -> Result<(), TreeBuilderError> {
        match &**local {
            "tr" => {
                if !self.open.in_scope("tr", ScopeKind::Table) {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                    return Ok(());
                }
                self.open.pop_until_table_row_scope_marker();
                let _ = self.open.pop();
                self.set_mode(InsertionMode::InTableBody);
                Ok(())
            }
            "table" => {
                if !self.open.in_scope("tr", ScopeKind::Table) {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                    return Ok(());
                }
                self.open.pop_until_table_row_scope_marker();
                let _ = self.open.pop();
                self.set_mode(InsertionMode::InTableBody);
                self.process_end_tag(step, local)
            }
            "tbody" | "tfoot" | "thead" => {
                if !self.open.in_scope(local, ScopeKind::Table) {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                    return Ok(());
                }
                if !self.open.in_scope("tr", ScopeKind::Table) {
                    return Ok(());
                }
                self.open.pop_until_table_row_scope_marker();
                let _ = self.open.pop();
                self.set_mode(InsertionMode::InTableBody);
                self.process_end_tag(step, local)
            }
            "body" | "caption" | "col" | "colgroup" | "html" | "td" | "th" => {
                self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                Ok(())
            }
            _ => self.in_table_end_tag(step, local),
        }
    }

    fn in_cell_end_tag(
        &mut self,
        step: &mut Step<'_>,
        local: &Arc<str>,
    ) -> Result<(), TreeBuilderError> {
        match &**local {
            "td" | "th" => {
                if !self.open.in_scope(local, ScopeKind::Table) {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                    return Ok(());
                }
                self.generate_implied_end_tags(None);
                if !self
                    .open
                    .top()
                    .is_some_and(|top| top.is_html_element_named(local))
                {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                }
                self.open.pop_until_popped(local);
                self.formatting.clear_to_last_marker();
                self.set_mode(InsertionMode::InRow);
                Ok(())
            }
            "body" | "caption" | "col" | "colgroup" | "html" => {
                self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                Ok(())
            }
            "table" | "tbody" | "tfoot" | "thead" | "tr" => {
                if !self.open.in_scope(local, ScopeKind::Table) {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                    return Ok(());
                }
                self.close_cell(step)?;
                self.process_end_tag(step, local)
            }
            _ => self.in_body_end_tag(step, local),
        }
    }

    fn in_select_end_tag(
        &mut self,
        step: &mut Step<'_>,
        local: &Arc<str>,
    ) -> Result<(), TreeBuilderError> {
        match &**local {
            "optgroup" => {
                let top_is_option = self
                    .open
                    .top()
                    .is_some_and(|top| top.is_html_element_named("option"));
                if top_is_option
                    && self.open.len() >= 2
                    && self
                        .open
                        .at(self.open.len() - 2)
                        .is_html_element_named("optgroup")
                {
                    let _ = self.open.pop();
                }
                if self
                    .open
                    .top()
                    .is_some_and(|top| top.is_html_element_named("optgroup"))
                {
                    let _ = self.open.pop();
                } else {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                }
                Ok(())
            }
            "option" => {
                if self
                    .open
                    .top()
                    .is_some_and(|top| top.is_html_element_named("option"))
                {
                    let _ = self.open.pop();
                } else {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                }
                Ok(())
            }
            "select" => {
                if !self.open.in_scope("select", ScopeKind::Select) {
                    self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                    return Ok(());
                }
                self.open.pop_until_popped("select");
                self.reset_insertion_mode_appropriately();
                Ok(())
            }
            "template" => self.in_head_end_tag(step, local),
            _ => {
                self.record_error(step, ParseErrorCode::UnexpectedEndTag);
                Ok(())
            }
        }
    }
}
