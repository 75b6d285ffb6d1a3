use super::{
    Html5TreeBuilder, Step, SuspendReason, TokenizerControl, TokenizerState, TreeBuilderConfig,
    TreeBuilderStepResult,
};
use crate::dom_snapshot::SnapshotDom;
use crate::html5::shared::{
    Attribute, AttributeValue, DocumentParseContext, Namespace, NoSpans, TextValue, Token,
};
use crate::html5::tree_builder::{FragmentContext, QuirksMode};
use std::sync::Arc;

struct Harness {
    ctx: DocumentParseContext,
    builder: Html5TreeBuilder,
    dom: SnapshotDom,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(TreeBuilderConfig::default())
    }

    fn with_config(config: TreeBuilderConfig) -> Self {
        let mut ctx = DocumentParseContext::new();
        let builder = Html5TreeBuilder::new(config, &mut ctx);
        Self {
            ctx,
            builder,
            dom: SnapshotDom::new(),
        }
    }

    fn fragment(context_name: &str) -> Self {
        let mut ctx = DocumentParseContext::new();
        let mut dom = SnapshotDom::new();
        let builder = Html5TreeBuilder::new_fragment(
            TreeBuilderConfig::default(),
            &mut ctx,
            FragmentContext {
                name: Arc::from(context_name),
                ns: Namespace::Html,
                form_owner: None,
            },
            &mut dom,
        )
        .expect("fragment builder");
        Self { ctx, builder, dom }
    }

    fn push(&mut self, token: Token) -> TreeBuilderStepResult {
        self.builder
            .push_token(&token, &mut self.ctx, &NoSpans, &mut self.dom, &mut ())
            .expect("push_token")
    }

    fn start(&mut self, name: &str) -> TreeBuilderStepResult {
        let token = self.start_token(name, &[]);
        self.push(token)
    }

    fn start_with_attrs(&mut self, name: &str, attrs: &[(&str, &str)]) -> TreeBuilderStepResult {
        let token = self.start_token(name, attrs);
        self.push(token)
    }

    fn start_token(&mut self, name: &str, attrs: &[(&str, &str)]) -> Token {
        let name = self.ctx.atoms.intern_ascii_folded(name).expect("atom");
        let attrs = attrs
            .iter()
            .map(|(attr, value)| Attribute {
                name: self.ctx.atoms.intern_ascii_folded(attr).expect("atom"),
                value: Some(AttributeValue::Owned((*value).to_string())),
            })
            .collect();
        Token::StartTag {
            name,
            attrs,
            self_closing: false,
        }
    }

    fn end(&mut self, name: &str) -> TreeBuilderStepResult {
        let name = self.ctx.atoms.intern_ascii_folded(name).expect("atom");
        self.push(Token::EndTag { name })
    }

    fn text(&mut self, text: &str) -> TreeBuilderStepResult {
        self.push(Token::Text {
            text: TextValue::Owned(text.to_string()),
        })
    }

    fn doctype_html(&mut self) -> TreeBuilderStepResult {
        let name = self.ctx.atoms.intern_ascii_folded("html").expect("atom");
        self.push(Token::Doctype {
            name: Some(name),
            public_id: None,
            system_id: None,
            force_quirks: false,
        })
    }

    fn finish(&mut self) -> Vec<String> {
        let _ = self.push(Token::Eof);
        self.dom.snapshot()
    }
}

fn assert_snapshot(actual: &[String], expected: &[&str]) {
    let actual_joined = actual.join("\n");
    let expected_joined = expected.join("\n");
    assert_eq!(
        actual_joined, expected_joined,
        "\n--- actual ---\n{actual_joined}\n--- expected ---\n{expected_joined}\n"
    );
}

#[test]
fn bare_text_synthesizes_document_structure() {
    let mut h = Harness::new();
    let _ = h.text("hi");
    let snapshot = h.finish();
    assert_snapshot(
        &snapshot,
        &[
            "#document",
            "  <html>",
            "    <head>",
            "    <body>",
            "      \"hi\"",
        ],
    );
    assert!(h.dom.is_finished());
}

#[test]
fn missing_doctype_switches_to_quirks() {
    let mut h = Harness::new();
    let _ = h.start("div");
    let _ = h.finish();
    assert_eq!(h.builder.quirks_mode(), QuirksMode::Quirks);
    assert_eq!(h.dom.quirks_mode(), QuirksMode::Quirks);
}

#[test]
fn html_doctype_is_no_quirks() {
    let mut h = Harness::new();
    let _ = h.doctype_html();
    let _ = h.start("div");
    let _ = h.finish();
    assert_eq!(h.builder.quirks_mode(), QuirksMode::NoQuirks);
}

#[test]
fn legacy_public_id_prefix_is_quirks() {
    let mut h = Harness::new();
    let name = h.ctx.atoms.intern_ascii_folded("html").expect("atom");
    let _ = h.push(Token::Doctype {
        name: Some(name),
        public_id: Some("-//W3C//DTD HTML 3.2 Final//EN".to_string()),
        system_id: None,
        force_quirks: false,
    });
    assert_eq!(h.builder.quirks_mode(), QuirksMode::Quirks);
}

#[test]
fn formatting_element_is_reconstructed_after_paragraph_close() {
    // <p>1<b>2</p>3
    let mut h = Harness::new();
    let _ = h.start("p");
    let _ = h.text("1");
    let _ = h.start("b");
    let _ = h.text("2");
    let _ = h.end("p");
    let _ = h.text("3");
    let snapshot = h.finish();
    assert_snapshot(
        &snapshot,
        &[
            "#document",
            "  <html>",
            "    <head>",
            "    <body>",
            "      <p>",
            "        \"1\"",
            "        <b>",
            "          \"2\"",
            "      <b>",
            "        \"3\"",
        ],
    );
}

#[test]
fn sibling_paragraph_is_not_nested_and_carries_reconstructed_formatting() {
    // <p>1<b>2<p>3
    let mut h = Harness::new();
    let _ = h.start("p");
    let _ = h.text("1");
    let _ = h.start("b");
    let _ = h.text("2");
    let _ = h.start("p");
    let _ = h.text("3");
    let snapshot = h.finish();
    assert_snapshot(
        &snapshot,
        &[
            "#document",
            "  <html>",
            "    <head>",
            "    <body>",
            "      <p>",
            "        \"1\"",
            "        <b>",
            "          \"2\"",
            "      <p>",
            "        <b>",
            "          \"3\"",
        ],
    );
}

#[test]
fn adoption_agency_repairs_misnested_formatting() {
    // <b><i><p>X</b>Y
    let mut h = Harness::new();
    let _ = h.start("b");
    let _ = h.start("i");
    let _ = h.start("p");
    let _ = h.text("X");
    let _ = h.end("b");
    let _ = h.text("Y");
    let snapshot = h.finish();
    assert_snapshot(
        &snapshot,
        &[
            "#document",
            "  <html>",
            "    <head>",
            "    <body>",
            "      <b>",
            "        <i>",
            "      <i>",
            "        <p>",
            "          <b>",
            "            \"X\"",
            "          \"Y\"",
        ],
    );
}

#[test]
fn adoption_agency_simple_case_closes_formatting_element() {
    // <a>1<p>2</a>3</p>
    let mut h = Harness::new();
    let _ = h.start("a");
    let _ = h.text("1");
    let _ = h.start("p");
    let _ = h.text("2");
    let _ = h.end("a");
    let _ = h.text("3");
    let _ = h.end("p");
    let snapshot = h.finish();
    assert_snapshot(
        &snapshot,
        &[
            "#document",
            "  <html>",
            "    <head>",
            "    <body>",
            "      <a>",
            "        \"1\"",
            "      <p>",
            "        <a>",
            "          \"2\"",
            "        \"3\"",
        ],
    );
}

#[test]
fn table_text_is_foster_parented_before_the_table() {
    // <table>A<td>B</table>
    let mut h = Harness::new();
    let _ = h.start("table");
    let _ = h.text("A");
    let _ = h.start("td");
    let _ = h.text("B");
    let _ = h.end("table");
    let snapshot = h.finish();
    assert_snapshot(
        &snapshot,
        &[
            "#document",
            "  <html>",
            "    <head>",
            "    <body>",
            "      \"A\"",
            "      <table>",
            "        <tbody>",
            "          <tr>",
            "            <td>",
            "              \"B\"",
        ],
    );
}

#[test]
fn whitespace_only_table_text_stays_in_the_table() {
    let mut h = Harness::new();
    let _ = h.start("table");
    let _ = h.text("  ");
    let _ = h.end("table");
    let snapshot = h.finish();
    assert_snapshot(
        &snapshot,
        &[
            "#document",
            "  <html>",
            "    <head>",
            "    <body>",
            "      <table>",
            "        \"  \"",
        ],
    );
}

#[test]
fn foreign_object_contents_are_html() {
    // <svg><foreignObject><div>X
    let mut h = Harness::new();
    let _ = h.start("svg");
    let _ = h.start("foreignObject");
    let _ = h.start("div");
    let _ = h.text("X");
    let snapshot = h.finish();
    assert_snapshot(
        &snapshot,
        &[
            "#document",
            "  <html>",
            "    <head>",
            "    <body>",
            "      <svg svg>",
            "        <svg foreignObject>",
            "          <div>",
            "            \"X\"",
        ],
    );
}

#[test]
fn foreign_breakout_tag_returns_to_html() {
    // <svg><rect><div>X: the div breaks out of SVG entirely.
    let mut h = Harness::new();
    let _ = h.start("svg");
    let _ = h.start("rect");
    let _ = h.start("div");
    let _ = h.text("X");
    let snapshot = h.finish();
    assert_snapshot(
        &snapshot,
        &[
            "#document",
            "  <html>",
            "    <head>",
            "    <body>",
            "      <svg svg>",
            "        <svg rect>",
            "      <div>",
            "        \"X\"",
        ],
    );
}

#[test]
fn svg_tag_and_attribute_names_are_case_adjusted() {
    let mut h = Harness::new();
    let _ = h.start("svg");
    let _ = h.start_with_attrs("lineargradient", &[("gradientunits", "userSpaceOnUse")]);
    let snapshot = h.finish();
    assert_snapshot(
        &snapshot,
        &[
            "#document",
            "  <html>",
            "    <head>",
            "    <body>",
            "      <svg svg>",
            "        <svg linearGradient gradientUnits=\"userSpaceOnUse\">",
        ],
    );
}

#[test]
fn select_pops_open_option_before_next_option() {
    let mut h = Harness::new();
    let _ = h.start("select");
    let _ = h.start("option");
    let _ = h.text("A");
    let _ = h.start("option");
    let _ = h.text("B");
    let snapshot = h.finish();
    assert_snapshot(
        &snapshot,
        &[
            "#document",
            "  <html>",
            "    <head>",
            "    <body>",
            "      <select>",
            "        <option>",
            "          \"A\"",
            "        <option>",
            "          \"B\"",
        ],
    );
}

#[test]
fn closed_template_clears_formatting_across_its_boundary() {
    // <template><b></template>x: the <b> must not be reconstructed outside.
    let mut h = Harness::new();
    let _ = h.start("template");
    let _ = h.start("b");
    let _ = h.end("template");
    let _ = h.text("x");
    let snapshot = h.finish();
    assert_snapshot(
        &snapshot,
        &[
            "#document",
            "  <html>",
            "    <head>",
            "      <template>",
            "        <b>",
            "    <body>",
            "      \"x\"",
        ],
    );
}

#[test]
fn script_end_tag_suspends_for_execution() {
    let mut h = Harness::new();
    let _ = h.start("script");
    let _ = h.text("x()");
    let result = h.end("script");
    assert_eq!(
        result,
        TreeBuilderStepResult::Suspend(SuspendReason::Script)
    );
    assert!(h.builder.take_pending_script().is_some());
    let snapshot = h.finish();
    assert_snapshot(
        &snapshot,
        &[
            "#document",
            "  <html>",
            "    <head>",
            "      <script>",
            "        \"x()\"",
            "    <body>",
        ],
    );
}

#[test]
fn pre_skips_the_newline_right_after_the_start_tag() {
    let mut h = Harness::new();
    let _ = h.start("pre");
    let _ = h.text("\nkeep\n");
    let snapshot = h.finish();
    assert_snapshot(
        &snapshot,
        &[
            "#document",
            "  <html>",
            "    <head>",
            "    <body>",
            "      <pre>",
            "        \"keep\\n\"",
        ],
    );
}

#[test]
fn any_other_end_tag_closes_through_non_special_elements() {
    let mut h = Harness::new();
    let _ = h.start("x-foo");
    let _ = h.start("span");
    let _ = h.end("x-foo");
    let _ = h.text("after");
    let snapshot = h.finish();
    assert_snapshot(
        &snapshot,
        &[
            "#document",
            "  <html>",
            "    <head>",
            "    <body>",
            "      <x-foo>",
            "        <span>",
            "      \"after\"",
        ],
    );
}

#[test]
fn reconstruction_is_idempotent_without_intervening_mutation() {
    let mut h = Harness::new();
    let _ = h.start("p");
    let _ = h.start("b");
    let _ = h.end("p");
    // <b> is now in the active list but no longer open.
    let mut unit = ();
    let mut step = Step {
        ctx: &mut h.ctx,
        text: &NoSpans,
        sink: &mut h.dom,
        tokenizer: &mut unit,
    };
    h.builder
        .reconstruct_active_formatting_elements(&mut step)
        .expect("reconstruct");
    drop(step);
    let first = h.dom.snapshot();
    let mut step = Step {
        ctx: &mut h.ctx,
        text: &NoSpans,
        sink: &mut h.dom,
        tokenizer: &mut unit,
    };
    h.builder
        .reconstruct_active_formatting_elements(&mut step)
        .expect("reconstruct again");
    drop(step);
    assert_eq!(first, h.dom.snapshot(), "second reconstruction is a no-op");
}

#[test]
fn detach_stops_all_sink_traffic() {
    let mut h = Harness::new();
    let _ = h.start("div");
    let before = h.dom.snapshot();
    h.builder.detach();
    let _ = h.text("ignored");
    let _ = h.start("span");
    let _ = h.push(Token::Eof);
    assert_eq!(before, h.dom.snapshot());
    assert!(!h.dom.is_finished(), "detached parses never finish the sink");
}

#[test]
fn fragment_parse_in_table_context_synthesizes_table_sections() {
    let mut h = Harness::fragment("table");
    let _ = h.start("tr");
    let _ = h.text("x");
    let snapshot = h.finish();
    // The stray "x" is foster-parented, but the context table itself is not
    // part of the fragment, so the text falls back to the fragment root.
    assert_snapshot(
        &snapshot,
        &[
            "#document",
            "  <html>",
            "    <tbody>",
            "      <tr>",
            "    \"x\"",
        ],
    );
}

#[test]
fn fragment_parse_in_template_context_starts_in_template_mode() {
    let mut h = Harness::fragment("template");
    let _ = h.start("td");
    let snapshot = h.finish();
    // The template mode stack retargets to "in row", which inserts the cell
    // directly; no table sections are synthesized in a template.
    assert_snapshot(
        &snapshot,
        &[
            "#document",
            "  <html>",
            "    <td>",
        ],
    );
}

#[derive(Default)]
struct RecordingTokenizer {
    states: Vec<TokenizerState>,
    force_null: bool,
    allow_cdata: bool,
}

impl TokenizerControl for RecordingTokenizer {
    fn set_state(&mut self, state: TokenizerState) {
        self.states.push(state);
    }
    fn set_force_null_character_replacement(&mut self, enabled: bool) {
        self.force_null = enabled;
    }
    fn set_allow_cdata(&mut self, enabled: bool) {
        self.allow_cdata = enabled;
    }
}

#[test]
fn dispatcher_drives_tokenizer_states() {
    let mut ctx = DocumentParseContext::new();
    let mut builder = Html5TreeBuilder::new(TreeBuilderConfig::default(), &mut ctx);
    let mut dom = SnapshotDom::new();
    let mut tokenizer = RecordingTokenizer::default();

    let mut push_start = |name: &str,
                          ctx: &mut DocumentParseContext,
                          builder: &mut Html5TreeBuilder,
                          dom: &mut SnapshotDom,
                          tokenizer: &mut RecordingTokenizer| {
        let name = ctx.atoms.intern_ascii_folded(name).expect("atom");
        let token = Token::StartTag {
            name,
            attrs: Vec::new(),
            self_closing: false,
        };
        builder
            .push_token(&token, ctx, &NoSpans, dom, tokenizer)
            .expect("push");
        let end = Token::EndTag { name };
        builder
            .push_token(&end, ctx, &NoSpans, dom, tokenizer)
            .expect("push");
    };

    push_start("title", &mut ctx, &mut builder, &mut dom, &mut tokenizer);
    push_start("style", &mut ctx, &mut builder, &mut dom, &mut tokenizer);
    push_start("script", &mut ctx, &mut builder, &mut dom, &mut tokenizer);
    push_start("textarea", &mut ctx, &mut builder, &mut dom, &mut tokenizer);
    assert_eq!(
        tokenizer.states,
        vec![
            TokenizerState::Rcdata,
            TokenizerState::Rawtext,
            TokenizerState::ScriptData,
            TokenizerState::Rcdata,
        ]
    );
    assert!(!tokenizer.allow_cdata);

    // Entering SVG permits CDATA until an integration point is opened.
    let svg = ctx.atoms.intern_ascii_folded("svg").expect("atom");
    builder
        .push_token(
            &Token::StartTag {
                name: svg,
                attrs: Vec::new(),
                self_closing: false,
            },
            &mut ctx,
            &NoSpans,
            &mut dom,
            &mut tokenizer,
        )
        .expect("push");
    assert!(tokenizer.allow_cdata);
    assert!(tokenizer.force_null);
}

#[test]
fn tokens_after_eof_are_ignored() {
    let mut h = Harness::new();
    let _ = h.text("x");
    let snapshot = h.finish();
    let _ = h.start("div");
    let _ = h.text("y");
    assert_eq!(snapshot, h.dom.snapshot());
}

#[test]
fn parse_errors_are_recorded_not_fatal() {
    let mut h = Harness::new();
    let _ = h.end("p");
    let _ = h.end("b");
    let _ = h.text("ok");
    let _ = h.finish();
    assert!(h.ctx.counters.parse_errors > 0);
    assert_eq!(h.ctx.counters.parse_errors as usize, h.ctx.errors.len());
}
