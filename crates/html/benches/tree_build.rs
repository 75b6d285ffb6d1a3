use criterion::{Criterion, black_box, criterion_group, criterion_main};
use html::html5::{
    DocumentParseContext, ElementAttr, Html5TreeBuilder, Namespace, NoSpans, NodeId,
    TreeBuilderConfig, TreeSink,
};
use html_test_support::markup;
use std::sync::Arc;

const SMALL_BLOCKS: usize = 64;
const LARGE_BLOCKS: usize = 20_000;

fn make_blocks(blocks: usize) -> String {
    "<div class=box><span>hello</span><img src=x></div>".repeat(blocks)
}

fn make_misnested(blocks: usize) -> String {
    "<b><i><p>x</b>y</p>".repeat(blocks)
}

/// Sink that allocates ids and discards every mutation; isolates the
/// builder's own cost from DOM bookkeeping.
struct NullSink {
    next: u32,
}

impl NullSink {
    fn new() -> Self {
        Self { next: 1 }
    }
}

impl TreeSink for NullSink {
    fn document(&self) -> NodeId {
        NodeId(1)
    }
    fn append_doctype(&mut self, _name: &str, _public_id: &str, _system_id: &str) {}
    fn create_element(
        &mut self,
        _name: Arc<str>,
        _ns: Namespace,
        _attrs: Vec<ElementAttr>,
    ) -> NodeId {
        self.next += 1;
        NodeId(self.next)
    }
    fn create_comment(&mut self, _text: &str) -> NodeId {
        self.next += 1;
        NodeId(self.next)
    }
    fn append(&mut self, _parent: NodeId, _child: NodeId) {}
    fn append_text(&mut self, _parent: NodeId, _text: &str) {}
    fn insert_before_sibling(&mut self, _sibling: NodeId, _child: NodeId) -> bool {
        true
    }
    fn insert_text_before_sibling(&mut self, _sibling: NodeId, _text: &str) -> bool {
        true
    }
    fn take_all_children(&mut self, _from: NodeId, _to: NodeId) {}
    fn reparent(&mut self, _child: NodeId, _new_parent: NodeId) {}
    fn remove_from_parent(&mut self, _node: NodeId) {}
    fn add_attrs_if_missing(&mut self, _element: NodeId, _attrs: Vec<ElementAttr>) {}
}

fn bench_with_input(c: &mut Criterion, name: &str, input: &str) {
    let mut ctx = DocumentParseContext::new();
    let tokens = markup::tokens(input, false, &mut ctx);
    c.bench_function(name, |b| {
        b.iter(|| {
            let mut builder = Html5TreeBuilder::new(TreeBuilderConfig::default(), &mut ctx);
            let mut sink = NullSink::new();
            for token in &tokens {
                let _ = builder
                    .push_token(token, &mut ctx, &NoSpans, &mut sink, &mut ())
                    .expect("tree builder should accept tokens");
            }
            black_box(sink.next);
        });
    });
}

fn bench_tree_build_small(c: &mut Criterion) {
    bench_with_input(c, "bench_tree_build_small", &make_blocks(SMALL_BLOCKS));
}

fn bench_tree_build_large(c: &mut Criterion) {
    bench_with_input(c, "bench_tree_build_large", &make_blocks(LARGE_BLOCKS));
}

fn bench_tree_build_adoption_heavy(c: &mut Criterion) {
    bench_with_input(
        c,
        "bench_tree_build_adoption_heavy",
        &make_misnested(2_000),
    );
}

criterion_group!(
    benches,
    bench_tree_build_small,
    bench_tree_build_large,
    bench_tree_build_adoption_heavy
);
criterion_main!(benches);
