//! Element namespaces tracked during tree construction.

/// Namespace of an element on the stack of open elements.
///
/// Tokens themselves are namespace-less; the tree builder assigns a namespace
/// at element-creation time and uses it for foreign-content dispatch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Namespace {
    #[default]
    Html,
    Svg,
    MathMl,
}

impl Namespace {
    /// Canonical namespace URI, as handed to the tree sink.
    pub fn uri(self) -> &'static str {
        match self {
            Namespace::Html => "http://www.w3.org/1999/xhtml",
            Namespace::Svg => "http://www.w3.org/2000/svg",
            Namespace::MathMl => "http://www.w3.org/1998/Math/MathML",
        }
    }
}
