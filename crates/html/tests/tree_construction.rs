//! Golden tree-construction fixtures.
//!
//! Each fixture is markup plus the expected DOM snapshot; the corpus lives in
//! `tests/fixtures/*.toml`. Failures print both trees for diffing.

use html_test_support::driver::run_tree_builder;
use html_test_support::fixtures::load_fixture_dir;
use std::path::{Path, PathBuf};

fn fixture_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

#[test]
fn golden_tree_construction_whole_input() {
    let fixtures = load_fixture_dir(&fixture_dir());
    assert!(!fixtures.is_empty(), "no fixtures found");
    for (name, fixture) in fixtures {
        let output = run_tree_builder(
            &fixture.input,
            fixture.scripting,
            fixture.fragment.as_deref(),
        );
        let expected = fixture.expected_lines();
        assert_eq!(
            output.lines,
            expected,
            "fixture '{name}' mismatch\n--- actual ---\n{}\n--- expected ---\n{}\n",
            output.lines.join("\n"),
            expected.join("\n"),
        );
    }
}

#[test]
fn golden_tree_construction_is_deterministic() {
    for (name, fixture) in load_fixture_dir(&fixture_dir()) {
        let first = run_tree_builder(
            &fixture.input,
            fixture.scripting,
            fixture.fragment.as_deref(),
        );
        let second = run_tree_builder(
            &fixture.input,
            fixture.scripting,
            fixture.fragment.as_deref(),
        );
        assert_eq!(first.lines, second.lines, "fixture '{name}' not deterministic");
        assert_eq!(
            first.parse_errors, second.parse_errors,
            "fixture '{name}' error count not deterministic"
        );
    }
}

/// Re-parse stability: serializing the produced tree and parsing it again
/// must reproduce the same tree. Fragment fixtures are excluded (their
/// serialization includes the synthetic root).
#[test]
fn golden_tree_construction_reparse_stability() {
    use html::dom_snapshot::SnapshotDom;
    use html::html5::{DocumentParseContext, Html5TreeBuilder, NoSpans, TreeBuilderConfig};
    use html_test_support::markup;

    for (name, fixture) in load_fixture_dir(&fixture_dir()) {
        if fixture.fragment.is_some() {
            continue;
        }
        let run = |input: &str| -> (Vec<String>, String) {
            let mut ctx = DocumentParseContext::new();
            let mut dom = SnapshotDom::new();
            let mut builder = Html5TreeBuilder::new(
                TreeBuilderConfig {
                    scripting_enabled: fixture.scripting,
                },
                &mut ctx,
            );
            for token in &markup::tokens(input, fixture.scripting, &mut ctx) {
                builder
                    .push_token(token, &mut ctx, &NoSpans, &mut dom, &mut ())
                    .expect("push_token");
            }
            (dom.snapshot(), dom.serialize_markup())
        };
        let (first_lines, serialized) = run(&fixture.input);
        let (second_lines, _) = run(&serialized);
        assert_eq!(
            first_lines,
            second_lines,
            "fixture '{name}' unstable under re-parse\nserialized: {serialized}\n--- first ---\n{}\n--- reparsed ---\n{}\n",
            first_lines.join("\n"),
            second_lines.join("\n"),
        );
    }
}
