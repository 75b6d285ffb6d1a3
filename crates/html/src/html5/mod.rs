//! HTML5 tree-construction path.

pub(crate) mod shared;
pub mod tree_builder;

// Public re-exports: consumers should import from `html::html5::*` rather than `shared::*`.
pub use shared::{
    AtomError, AtomId, AtomTable, Attribute, AttributeValue, Counters, DocumentParseContext,
    Namespace, NoSpans, ParseError, ParseErrorCode, Span, TextResolveError, TextResolver,
    TextSpan, TextValue, Token,
};
pub use tree_builder::{
    AttrNamespace, ElementAttr, FragmentContext, Html5TreeBuilder, InsertionMode, NodeId,
    QuirksMode, SuspendReason, TokenizerControl, TokenizerState, TreeBuilderConfig,
    TreeBuilderError, TreeBuilderStepResult, TreeSink,
};
pub use tree_builder::simulator::{SimulatorFeedback, TreeBuilderSimulator};
