//! Parity between the speculative namespace simulator and the full builder.
//!
//! The simulator exists to pre-compute tokenizer decisions on another thread;
//! its namespace bookkeeping must match the full algorithm's. This drives
//! both over the golden fixture corpus and compares every decision.

use html::dom_snapshot::SnapshotDom;
use html::html5::{
    DocumentParseContext, Html5TreeBuilder, NoSpans, Token, TokenizerControl, TokenizerState,
    TreeBuilderConfig, TreeBuilderSimulator,
};
use html_test_support::fixtures::load_fixture_dir;
use html_test_support::markup;
use std::path::{Path, PathBuf};

fn fixture_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

#[derive(Default)]
struct Recorder {
    last_state: Option<TokenizerState>,
    allow_cdata: bool,
    force_null: bool,
}

impl TokenizerControl for Recorder {
    fn set_state(&mut self, state: TokenizerState) {
        self.last_state = Some(state);
    }
    fn set_force_null_character_replacement(&mut self, enabled: bool) {
        self.force_null = enabled;
    }
    fn set_allow_cdata(&mut self, enabled: bool) {
        self.allow_cdata = enabled;
    }
}

#[test]
fn simulator_matches_full_builder_on_fixture_corpus() {
    let fixtures = load_fixture_dir(&fixture_dir());
    assert!(!fixtures.is_empty(), "no fixtures found");
    for (name, fixture) in fixtures {
        if fixture.fragment.is_some() {
            continue;
        }
        let mut ctx = DocumentParseContext::new();
        let tokens = markup::tokens(&fixture.input, fixture.scripting, &mut ctx);
        let mut builder = Html5TreeBuilder::new(
            TreeBuilderConfig {
                scripting_enabled: fixture.scripting,
            },
            &mut ctx,
        );
        let mut dom = SnapshotDom::new();
        let mut recorder = Recorder::default();
        let mut simulator = TreeBuilderSimulator::new(fixture.scripting);

        for token in &tokens {
            recorder.last_state = None;
            builder
                .push_token(token, &mut ctx, &NoSpans, &mut dom, &mut recorder)
                .expect("push_token");
            match token {
                Token::StartTag {
                    name: tag_name,
                    attrs,
                    ..
                } => {
                    let tag = ctx.atoms.resolve(*tag_name).expect("atom").to_string();
                    let owned: Vec<(String, String)> = attrs
                        .iter()
                        .map(|attr| {
                            let attr_name =
                                ctx.atoms.resolve(attr.name).expect("atom").to_string();
                            let value = match &attr.value {
                                Some(html::html5::AttributeValue::Owned(value)) => value.clone(),
                                _ => String::new(),
                            };
                            (attr_name, value)
                        })
                        .collect();
                    let pairs: Vec<(&str, &str)> = owned
                        .iter()
                        .map(|(attr, value)| (attr.as_str(), value.as_str()))
                        .collect();
                    let feedback = simulator.process_start_tag(&tag, &pairs);
                    assert_eq!(
                        feedback.tokenizer_state, recorder.last_state,
                        "fixture '{name}': tokenizer state for <{tag}>"
                    );
                    assert_eq!(
                        feedback.allow_cdata, recorder.allow_cdata,
                        "fixture '{name}': CDATA permission after <{tag}>"
                    );
                }
                Token::EndTag { name: tag_name } => {
                    let tag = ctx.atoms.resolve(*tag_name).expect("atom").to_string();
                    let feedback = simulator.process_end_tag(&tag);
                    assert_eq!(
                        feedback.allow_cdata, recorder.allow_cdata,
                        "fixture '{name}': CDATA permission after </{tag}>"
                    );
                }
                _ => {}
            }
        }
        let _ = recorder.force_null;
    }
}
