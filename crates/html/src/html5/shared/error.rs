//! Parse errors for tree construction.
//!
//! There are no fatal errors in this component: every input produces some
//! well-formed tree via the algorithm's recovery actions. Parse errors are
//! recorded as data and never abort parsing.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseErrorCode {
    UnexpectedDoctype,
    UnexpectedStartTag,
    UnexpectedEndTag,
    UnexpectedCharacter,
    UnexpectedEof,
    MisnestedFormattingElement,
    ForeignContentBreakout,
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseError {
    pub code: ParseErrorCode,
    /// Index of the token being processed when the error was recorded.
    pub position: usize,
}
