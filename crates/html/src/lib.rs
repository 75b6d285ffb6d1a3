//! HTML5 tree construction.
//!
//! This crate implements the WHATWG tree-construction state machine: the
//! insertion-mode dispatcher, the stack of open elements, the active
//! formatting elements list, the adoption agency algorithm, and foreign
//! (SVG/MathML) content handling. Tokenization and the DOM itself are
//! external collaborators: tokens come from an outside tokenizer, and all
//! tree mutation goes through the [`html5::TreeSink`] trait.

#[cfg(any(test, feature = "dom-snapshot"))]
pub mod dom_snapshot;
pub mod html5;

pub use html5::{
    DocumentParseContext, Html5TreeBuilder, Token, TreeBuilderConfig, TreeBuilderError,
    TreeBuilderStepResult, TreeSink,
};
