//! Stateless tree-builder simulator for speculative pre-parsing.
//!
//! Tracks only a namespace stack (HTML/SVG/MathML) driven by start/end tag
//! names, with no atom table and no DOM access, so it can run on a separate
//! pre-parsing thread ahead of the main tree-construction thread. Its job is
//! to pre-compute tokenizer state transitions (RAWTEXT for `<style>`, CDATA
//! permission in foreign content, ...) that the main thread may use as hints
//! or discard.
//!
//! The namespace bookkeeping mirrors the full builder's: same breakout set,
//! same integration-point rules, same SVG case adjustments, shared through
//! the `tags` predicates so the two cannot drift. The one knowable
//! difference: inside an HTML integration point the simulator does not track
//! individual HTML elements, so end tags there are ignored unless they close
//! the integration point itself.

use super::foreign::svg_tag_adjustments;
use super::sink::TokenizerState;
use super::tags;
use crate::html5::shared::Namespace;

/// Speculative per-token decision.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimulatorFeedback {
    /// Tokenizer state the real parser would switch to after this tag.
    pub tokenizer_state: Option<TokenizerState>,
    /// Whether `<![CDATA[` sections would be permitted after this tag.
    pub allow_cdata: bool,
}

#[derive(Clone, Debug)]
struct ForeignEntry {
    /// Case-adjusted local name (SVG camelCase applied).
    name: String,
    ns: Namespace,
    integration_point: bool,
}

/// Namespace-only tree-builder simulator.
///
/// Shares no mutable state with the main builder; safe to drive from another
/// thread.
#[derive(Clone, Debug)]
pub struct TreeBuilderSimulator {
    ns_stack: Vec<ForeignEntry>,
    scripting_enabled: bool,
}

impl TreeBuilderSimulator {
    pub fn new(scripting_enabled: bool) -> Self {
        Self {
            ns_stack: Vec::new(),
            scripting_enabled,
        }
    }

    pub fn in_foreign_content(&self) -> bool {
        self.ns_stack.last().is_some_and(|top| {
            !top.integration_point
                && !tags::is_mathml_text_integration_point(&top.name, top.ns)
        })
    }

    /// Process a start tag name (any case) with its attribute name/value
    /// pairs, returning the speculative tokenizer decision.
    pub fn process_start_tag(&mut self, name: &str, attrs: &[(&str, &str)]) -> SimulatorFeedback {
        let lower = name.to_ascii_lowercase();
        let under_html_rules = match self.ns_stack.last() {
            None => true,
            Some(top) => {
                (tags::is_mathml_text_integration_point(&top.name, top.ns)
                    && !matches!(lower.as_str(), "mglyph" | "malignmark"))
                    || top.integration_point
            }
        };
        if under_html_rules {
            self.html_start_tag(&lower, attrs)
        } else {
            self.foreign_start_tag(&lower, attrs)
        }
    }

    pub fn process_end_tag(&mut self, name: &str) -> SimulatorFeedback {
        let lower = name.to_ascii_lowercase();
        if let Some(position) = self.matching_foreign_entry(&lower) {
            self.ns_stack.truncate(position);
        }
        self.feedback(None)
    }

    fn html_start_tag(&mut self, lower: &str, attrs: &[(&str, &str)]) -> SimulatorFeedback {
        match lower {
            "svg" => {
                self.push_foreign(lower, Namespace::Svg, attrs);
                self.feedback(None)
            }
            "math" => {
                self.push_foreign(lower, Namespace::MathMl, attrs);
                self.feedback(None)
            }
            _ if tags::is_rcdata_tag(lower) => self.feedback(Some(TokenizerState::Rcdata)),
            _ if tags::is_rawtext_tag(lower) => self.feedback(Some(TokenizerState::Rawtext)),
            "noscript" if self.scripting_enabled => {
                self.feedback(Some(TokenizerState::Rawtext))
            }
            "script" => self.feedback(Some(TokenizerState::ScriptData)),
            "plaintext" => self.feedback(Some(TokenizerState::Plaintext)),
            _ => self.feedback(None),
        }
    }

    fn foreign_start_tag(&mut self, lower: &str, attrs: &[(&str, &str)]) -> SimulatorFeedback {
        let font_breakout = lower == "font"
            && attrs
                .iter()
                .any(|(name, _)| tags::is_font_breakout_attr(&name.to_ascii_lowercase()));
        if tags::is_foreign_breakout_tag(lower) || font_breakout {
            while self
                .ns_stack
                .last()
                .is_some_and(|top| !top.integration_point
                    && !tags::is_mathml_text_integration_point(&top.name, top.ns))
            {
                let _ = self.ns_stack.pop();
            }
            return self.feedback(None);
        }
        let ns = self
            .ns_stack
            .last()
            .map(|top| top.ns)
            .unwrap_or(Namespace::Html);
        // `<svg>` directly inside annotation-xml re-enters SVG even when the
        // annotation is not an integration point.
        let ns = if lower == "svg" { Namespace::Svg } else { ns };
        self.push_foreign(lower, ns, attrs);
        self.feedback(None)
    }

    fn push_foreign(&mut self, lower: &str, ns: Namespace, attrs: &[(&str, &str)]) {
        let name = if ns == Namespace::Svg {
            svg_tag_adjustments()
                .get(lower)
                .map(|camel| (*camel).to_string())
                .unwrap_or_else(|| lower.to_string())
        } else {
            lower.to_string()
        };
        let integration_point = tags::is_svg_html_integration_point(&name, ns)
            || (ns == Namespace::MathMl
                && name == "annotation-xml"
                && attrs.iter().any(|(attr, value)| {
                    attr.eq_ignore_ascii_case("encoding")
                        && tags::annotation_xml_is_integration_point(Some(value))
                }));
        self.ns_stack.push(ForeignEntry {
            name,
            ns,
            integration_point,
        });
    }

    /// Innermost foreign entry matching an end tag, unless an integration
    /// point shields it (HTML rules apply inside it).
    fn matching_foreign_entry(&self, lower: &str) -> Option<usize> {
        for (index, entry) in self.ns_stack.iter().enumerate().rev() {
            if entry.name.eq_ignore_ascii_case(lower) {
                return Some(index);
            }
            if entry.integration_point {
                return None;
            }
        }
        None
    }

    fn feedback(&self, tokenizer_state: Option<TokenizerState>) -> SimulatorFeedback {
        SimulatorFeedback {
            tokenizer_state,
            allow_cdata: self.in_foreign_content(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_attrs() -> &'static [(&'static str, &'static str)] {
        &[]
    }

    #[test]
    fn style_switches_to_rawtext_only_in_html() {
        let mut sim = TreeBuilderSimulator::new(false);
        assert_eq!(
            sim.process_start_tag("style", no_attrs()).tokenizer_state,
            Some(TokenizerState::Rawtext)
        );
        let _ = sim.process_start_tag("svg", no_attrs());
        assert_eq!(
            sim.process_start_tag("style", no_attrs()).tokenizer_state,
            None,
            "SVG style is a normal foreign element"
        );
    }

    #[test]
    fn cdata_allowed_only_in_non_integration_foreign_content() {
        let mut sim = TreeBuilderSimulator::new(false);
        assert!(!sim.process_start_tag("div", no_attrs()).allow_cdata);
        assert!(sim.process_start_tag("svg", no_attrs()).allow_cdata);
        assert!(
            !sim.process_start_tag("foreignObject", no_attrs()).allow_cdata,
            "integration point restores HTML rules"
        );
        let _ = sim.process_end_tag("foreignObject");
        assert!(sim.in_foreign_content());
    }

    #[test]
    fn breakout_tag_leaves_foreign_content() {
        let mut sim = TreeBuilderSimulator::new(false);
        let _ = sim.process_start_tag("svg", no_attrs());
        let _ = sim.process_start_tag("rect", no_attrs());
        let _ = sim.process_start_tag("div", no_attrs());
        assert!(!sim.in_foreign_content());
    }

    #[test]
    fn case_insensitive_matching_adjusts_svg_names() {
        let mut sim = TreeBuilderSimulator::new(false);
        let _ = sim.process_start_tag("SVG", no_attrs());
        let _ = sim.process_start_tag("FOREIGNOBJECT", no_attrs());
        let _ = sim.process_end_tag("foreignobject");
        assert!(sim.in_foreign_content(), "back inside plain svg");
        let _ = sim.process_end_tag("svg");
        assert!(!sim.in_foreign_content());
    }

    #[test]
    fn annotation_xml_encoding_creates_integration_point() {
        let mut sim = TreeBuilderSimulator::new(false);
        let _ = sim.process_start_tag("math", no_attrs());
        let feedback =
            sim.process_start_tag("annotation-xml", &[("encoding", "text/html")]);
        assert!(!feedback.allow_cdata);
        assert_eq!(
            sim.process_start_tag("style", no_attrs()).tokenizer_state,
            Some(TokenizerState::Rawtext),
            "HTML rules apply inside the integration point"
        );
    }
}
