//! Shared fixtures and drivers for the html crate's integration tests.
//!
//! The fixture corpus lives in TOML files next to the tests; this crate owns
//! the fixture model, a test-only markup lexer that stands in for the real
//! tokenizer, and the tree-builder driver used by the golden tests.

pub mod fixtures;
#[cfg(feature = "html5")]
pub mod markup;

pub use fixtures::{Fixture, FixtureFile, load_fixture_file};

#[cfg(feature = "dom-snapshot")]
pub mod driver {
    //! End-to-end fixture driver: markup through the tree builder into a
    //! snapshot.

    use crate::markup;
    use html::dom_snapshot::SnapshotDom;
    use html::html5::{
        DocumentParseContext, FragmentContext, Html5TreeBuilder, Namespace, NoSpans,
        TreeBuilderConfig,
    };
    use std::sync::Arc;

    pub struct RunOutput {
        pub lines: Vec<String>,
        pub parse_errors: usize,
    }

    /// Run a fixture input through the tree builder and snapshot the DOM.
    pub fn run_tree_builder(
        input: &str,
        scripting: bool,
        fragment: Option<&str>,
    ) -> RunOutput {
        let mut ctx = DocumentParseContext::new();
        let mut dom = SnapshotDom::new();
        let config = TreeBuilderConfig {
            scripting_enabled: scripting,
        };
        let mut builder = match fragment {
            None => Html5TreeBuilder::new(config, &mut ctx),
            Some(context) => Html5TreeBuilder::new_fragment(
                config,
                &mut ctx,
                FragmentContext {
                    name: Arc::from(context),
                    ns: Namespace::Html,
                    form_owner: None,
                },
                &mut dom,
            )
            .expect("fragment builder"),
        };
        let tokens = markup::tokens(input, scripting, &mut ctx);
        for token in &tokens {
            builder
                .push_token(token, &mut ctx, &NoSpans, &mut dom, &mut ())
                .expect("tree builder accepts every token");
        }
        RunOutput {
            lines: dom.snapshot(),
            parse_errors: ctx.errors.len(),
        }
    }
}
