//! Tag classification predicates.
//!
//! Pure, stateless predicates over a tag's local name (plus namespace where
//! the algorithm requires it). These are shared between the full tree builder
//! and the speculative namespace simulator so the two cannot drift.

use crate::html5::shared::Namespace;

/// h1 through h6.
pub fn is_numbered_header(name: &str) -> bool {
    matches!(name, "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

pub fn is_caption_col_or_colgroup(name: &str) -> bool {
    matches!(name, "caption" | "col" | "colgroup")
}

/// td/th.
pub fn is_table_cell_context(name: &str) -> bool {
    matches!(name, "td" | "th")
}

/// tbody/thead/tfoot.
pub fn is_table_body_context(name: &str) -> bool {
    matches!(name, "tbody" | "thead" | "tfoot")
}

pub fn is_non_anchor_formatting_tag(name: &str) -> bool {
    matches!(
        name,
        "b" | "big"
            | "code"
            | "em"
            | "font"
            | "i"
            | "nobr"
            | "s"
            | "small"
            | "strike"
            | "strong"
            | "tt"
            | "u"
    )
}

/// Formatting tags tracked in the active formatting elements list.
pub fn is_formatting_tag(name: &str) -> bool {
    name == "a" || is_non_anchor_formatting_tag(name)
}

/// HTML elements whose serialized end tag must be suppressed (void-like
/// elements treated specially by legacy end-tag handling).
pub fn element_cannot_have_end_tag(name: &str) -> bool {
    matches!(
        name,
        "area"
            | "base"
            | "basefont"
            | "bgsound"
            | "br"
            | "col"
            | "embed"
            | "frame"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

/// "Special" elements per the tree-construction algorithm.
///
/// The furthest-block search of the adoption agency and the generic end-tag
/// walk both key off this category.
pub fn is_special(name: &str, ns: Namespace) -> bool {
    match ns {
        Namespace::Html => matches!(
            name,
            "address"
                | "applet"
                | "area"
                | "article"
                | "aside"
                | "base"
                | "basefont"
                | "bgsound"
                | "blockquote"
                | "body"
                | "br"
                | "button"
                | "caption"
                | "center"
                | "col"
                | "colgroup"
                | "dd"
                | "details"
                | "dir"
                | "div"
                | "dl"
                | "dt"
                | "embed"
                | "fieldset"
                | "figcaption"
                | "figure"
                | "footer"
                | "form"
                | "frame"
                | "frameset"
                | "h1"
                | "h2"
                | "h3"
                | "h4"
                | "h5"
                | "h6"
                | "head"
                | "header"
                | "hgroup"
                | "hr"
                | "html"
                | "iframe"
                | "img"
                | "input"
                | "li"
                | "link"
                | "listing"
                | "main"
                | "marquee"
                | "menu"
                | "meta"
                | "nav"
                | "noembed"
                | "noframes"
                | "noscript"
                | "object"
                | "ol"
                | "p"
                | "param"
                | "plaintext"
                | "pre"
                | "script"
                | "section"
                | "select"
                | "source"
                | "style"
                | "summary"
                | "table"
                | "tbody"
                | "td"
                | "template"
                | "textarea"
                | "tfoot"
                | "th"
                | "thead"
                | "title"
                | "tr"
                | "track"
                | "ul"
                | "wbr"
                | "xmp"
        ),
        Namespace::MathMl => {
            matches!(name, "mi" | "mo" | "mn" | "ms" | "mtext" | "annotation-xml")
        }
        Namespace::Svg => matches!(name, "foreignObject" | "desc" | "title"),
    }
}

/// Start tags that break out of foreign (SVG/MathML) content back into HTML.
///
/// `font` is in this set only when it carries a color/face/size attribute;
/// the caller checks that separately via [`is_font_breakout_attr`].
pub fn is_foreign_breakout_tag(name: &str) -> bool {
    matches!(
        name,
        "b" | "big"
            | "blockquote"
            | "body"
            | "br"
            | "center"
            | "code"
            | "dd"
            | "div"
            | "dl"
            | "dt"
            | "em"
            | "embed"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "head"
            | "hr"
            | "i"
            | "img"
            | "li"
            | "listing"
            | "menu"
            | "meta"
            | "nobr"
            | "ol"
            | "p"
            | "pre"
            | "ruby"
            | "s"
            | "small"
            | "span"
            | "strong"
            | "strike"
            | "sub"
            | "sup"
            | "table"
            | "tt"
            | "u"
            | "ul"
            | "var"
    )
}

/// Attribute names that turn a foreign `<font>` into a breakout tag.
pub fn is_font_breakout_attr(attr_name: &str) -> bool {
    matches!(attr_name, "color" | "face" | "size")
}

/// MathML text integration points.
pub fn is_mathml_text_integration_point(name: &str, ns: Namespace) -> bool {
    ns == Namespace::MathMl && matches!(name, "mi" | "mo" | "mn" | "ms" | "mtext")
}

/// HTML integration points inside foreign content.
///
/// `annotation-xml` is an integration point only for `encoding` values of
/// `text/html` / `application/xhtml+xml`; the caller resolves the attribute
/// and passes the decision through `annotation_xml_is_integration_point`.
pub fn is_svg_html_integration_point(name: &str, ns: Namespace) -> bool {
    ns == Namespace::Svg && matches!(name, "foreignObject" | "desc" | "title")
}

pub fn annotation_xml_is_integration_point(encoding: Option<&str>) -> bool {
    let Some(encoding) = encoding else {
        return false;
    };
    encoding.eq_ignore_ascii_case("text/html")
        || encoding.eq_ignore_ascii_case("application/xhtml+xml")
}

/// Tags whose content is lexed as RAWTEXT regardless of insertion mode.
pub fn is_rawtext_tag(name: &str) -> bool {
    matches!(name, "style" | "xmp" | "iframe" | "noembed" | "noframes")
}

/// Tags whose content is lexed as RCDATA.
pub fn is_rcdata_tag(name: &str) -> bool {
    matches!(name, "title" | "textarea")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html5::shared::Namespace;

    #[test]
    fn formatting_tags_include_anchor_only_in_full_set() {
        assert!(is_formatting_tag("a"));
        assert!(!is_non_anchor_formatting_tag("a"));
        assert!(is_non_anchor_formatting_tag("nobr"));
        assert!(!is_formatting_tag("div"));
    }

    #[test]
    fn special_is_namespace_sensitive() {
        assert!(is_special("p", Namespace::Html));
        assert!(!is_special("p", Namespace::Svg));
        assert!(is_special("foreignObject", Namespace::Svg));
        assert!(!is_special("foreignObject", Namespace::Html));
        assert!(is_special("mtext", Namespace::MathMl));
    }

    #[test]
    fn font_breaks_out_only_with_presentational_attrs() {
        assert!(!is_foreign_breakout_tag("font"));
        assert!(is_font_breakout_attr("color"));
        assert!(is_font_breakout_attr("face"));
        assert!(is_font_breakout_attr("size"));
        assert!(!is_font_breakout_attr("style"));
    }

    #[test]
    fn integration_point_checks() {
        assert!(is_mathml_text_integration_point("mi", Namespace::MathMl));
        assert!(!is_mathml_text_integration_point("mi", Namespace::Html));
        assert!(is_svg_html_integration_point("desc", Namespace::Svg));
        assert!(annotation_xml_is_integration_point(Some("TEXT/HTML")));
        assert!(!annotation_xml_is_integration_point(Some("text/plain")));
        assert!(!annotation_xml_is_integration_point(None));
    }
}
