//! Foreign-content (SVG/MathML) rules.
//!
//! Decides when tokens are processed under foreign rules instead of HTML
//! rules, adjusts tag/attribute names and attribute namespaces, and handles
//! the HTML breakout tag set. The case-adjustment tables are process-wide
//! frozen maps built once behind an initialization guard.

use super::{
    resolve_name, resolve_text, EngineInvariantError, Html5TreeBuilder, Step, TreeBuilderError,
};
use crate::html5::shared::{Attribute, Namespace, ParseErrorCode, Token};
use crate::html5::tree_builder::sink::{AttrNamespace, ElementAttr};
use crate::html5::tree_builder::tags;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

pub(crate) fn svg_tag_adjustments() -> &'static HashMap<&'static str, &'static str> {
    static MAP: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    MAP.get_or_init(|| {
        [
            "altGlyph",
            "altGlyphDef",
            "altGlyphItem",
            "animateColor",
            "animateMotion",
            "animateTransform",
            "clipPath",
            "feBlend",
            "feColorMatrix",
            "feComponentTransfer",
            "feComposite",
            "feConvolveMatrix",
            "feDiffuseLighting",
            "feDisplacementMap",
            "feDistantLight",
            "feDropShadow",
            "feFlood",
            "feFuncA",
            "feFuncB",
            "feFuncG",
            "feFuncR",
            "feGaussianBlur",
            "feImage",
            "feMerge",
            "feMergeNode",
            "feMorphology",
            "feOffset",
            "fePointLight",
            "feSpecularLighting",
            "feSpotLight",
            "feTile",
            "feTurbulence",
            "foreignObject",
            "glyphRef",
            "linearGradient",
            "radialGradient",
            "textPath",
        ]
        .iter()
        .map(|camel| (Box::leak(camel.to_ascii_lowercase().into_boxed_str()) as &str, *camel))
        .collect()
    })
}

fn svg_attr_adjustments() -> &'static HashMap<&'static str, &'static str> {
    static MAP: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    MAP.get_or_init(|| {
        [
            "attributeName",
            "attributeType",
            "baseFrequency",
            "baseProfile",
            "calcMode",
            "clipPathUnits",
            "diffuseConstant",
            "edgeMode",
            "filterUnits",
            "glyphRef",
            "gradientTransform",
            "gradientUnits",
            "kernelMatrix",
            "kernelUnitLength",
            "keyPoints",
            "keySplines",
            "keyTimes",
            "lengthAdjust",
            "limitingConeAngle",
            "markerHeight",
            "markerUnits",
            "markerWidth",
            "maskContentUnits",
            "maskUnits",
            "numOctaves",
            "pathLength",
            "patternContentUnits",
            "patternTransform",
            "patternUnits",
            "pointsAtX",
            "pointsAtY",
            "pointsAtZ",
            "preserveAlpha",
            "preserveAspectRatio",
            "primitiveUnits",
            "refX",
            "refY",
            "repeatCount",
            "repeatDur",
            "requiredExtensions",
            "requiredFeatures",
            "specularConstant",
            "specularExponent",
            "spreadMethod",
            "startOffset",
            "stdDeviation",
            "stitchTiles",
            "surfaceScale",
            "systemLanguage",
            "tableValues",
            "targetX",
            "targetY",
            "textLength",
            "viewBox",
            "viewTarget",
            "xChannelSelector",
            "yChannelSelector",
            "zoomAndPan",
        ]
        .iter()
        .map(|camel| (Box::leak(camel.to_ascii_lowercase().into_boxed_str()) as &str, *camel))
        .collect()
    })
}

fn foreign_attr_adjustments() -> &'static HashMap<&'static str, AttrNamespace> {
    static MAP: OnceLock<HashMap<&'static str, AttrNamespace>> = OnceLock::new();
    MAP.get_or_init(|| {
        HashMap::from([
            ("xlink:actuate", AttrNamespace::XLink),
            ("xlink:arcrole", AttrNamespace::XLink),
            ("xlink:href", AttrNamespace::XLink),
            ("xlink:role", AttrNamespace::XLink),
            ("xlink:show", AttrNamespace::XLink),
            ("xlink:title", AttrNamespace::XLink),
            ("xlink:type", AttrNamespace::XLink),
            ("xml:lang", AttrNamespace::Xml),
            ("xml:space", AttrNamespace::Xml),
            ("xmlns", AttrNamespace::Xmlns),
            ("xmlns:xlink", AttrNamespace::Xmlns),
        ])
    })
}

fn adjust_attributes(attrs: &mut [ElementAttr], ns: Namespace) {
    for attr in attrs {
        match ns {
            Namespace::Svg => {
                if let Some(camel) = svg_attr_adjustments().get(&*attr.name) {
                    attr.name = Arc::from(*camel);
                }
            }
            Namespace::MathMl => {
                if &*attr.name == "definitionurl" {
                    attr.name = Arc::from("definitionURL");
                }
            }
            Namespace::Html => {}
        }
        if let Some(attr_ns) = foreign_attr_adjustments().get(&*attr.name) {
            attr.ns = Some(*attr_ns);
        }
    }
}

impl Html5TreeBuilder {
    /// Whether the next token must be processed under foreign-content rules.
    pub(super) fn should_process_as_foreign(
        &self,
        step: &Step<'_>,
        token: &Token,
    ) -> Result<bool, TreeBuilderError> {
        let Some((local, ns)) = self.adjusted_current_name_ns() else {
            return Ok(false);
        };
        if ns == Namespace::Html {
            return Ok(false);
        }
        if matches!(token, Token::Eof) {
            return Ok(false);
        }
        let html_ip = if self.fragment.is_some() && self.open.has_only_one_element() {
            // Context element: only the SVG integration points are knowable
            // without the caller's attribute state.
            tags::is_svg_html_integration_point(&local, ns)
        } else {
            self.open
                .top()
                .is_some_and(|item| item.is_html_integration_point())
        };
        if tags::is_mathml_text_integration_point(&local, ns) {
            match token {
                Token::Text { .. } => return Ok(false),
                Token::StartTag { name, .. } => {
                    let tag = resolve_name(&step.ctx.atoms, *name)?;
                    if !matches!(&*tag, "mglyph" | "malignmark") {
                        return Ok(false);
                    }
                }
                _ => {}
            }
        }
        if ns == Namespace::MathMl && &*local == "annotation-xml" {
            if let Token::StartTag { name, .. } = token {
                let tag = resolve_name(&step.ctx.atoms, *name)?;
                if &*tag == "svg" {
                    return Ok(false);
                }
            }
        }
        if html_ip && matches!(token, Token::StartTag { .. } | Token::Text { .. }) {
            return Ok(false);
        }
        Ok(true)
    }

    pub(super) fn process_token_in_foreign_content(
        &mut self,
        step: &mut Step<'_>,
        token: &Token,
    ) -> Result<(), TreeBuilderError> {
        match token {
            Token::Text { text } => {
                let run = resolve_text(step.text, text)?.to_string();
                self.foreign_characters(step, &run)
            }
            Token::Comment { text } => {
                let run = resolve_text(step.text, text)?.to_string();
                self.insert_comment(step, &run)
            }
            Token::Doctype { .. } => {
                self.record_error(step, ParseErrorCode::UnexpectedDoctype);
                Ok(())
            }
            Token::StartTag {
                name,
                attrs,
                self_closing,
            } => {
                let local = resolve_name(&step.ctx.atoms, *name)?;
                self.foreign_start_tag(step, &local, attrs, *self_closing, token)
            }
            Token::EndTag { name } => {
                let local = resolve_name(&step.ctx.atoms, *name)?;
                self.foreign_end_tag(step, &local, token)
            }
            Token::Eof => self.process_token(step, token),
        }
    }

    fn foreign_characters(
        &mut self,
        step: &mut Step<'_>,
        run: &str,
    ) -> Result<(), TreeBuilderError> {
        let has_null = memchr::memchr(b'\0', run.as_bytes()).is_some();
        if has_null {
            self.record_error(step, ParseErrorCode::UnexpectedCharacter);
        }
        let replaced: std::borrow::Cow<'_, str> = if has_null {
            std::borrow::Cow::Owned(run.replace('\0', "\u{FFFD}"))
        } else {
            std::borrow::Cow::Borrowed(run)
        };
        if run
            .chars()
            .any(|c| !super::is_parser_whitespace(c) && c != '\0')
        {
            self.frameset_ok = false;
        }
        self.insert_text_run(step, &replaced)
    }

    fn foreign_start_tag(
        &mut self,
        step: &mut Step<'_>,
        local: &Arc<str>,
        attrs: &[Attribute],
        self_closing: bool,
        token: &Token,
    ) -> Result<(), TreeBuilderError> {
        let font_breakout = &**local == "font"
            && attrs.iter().any(|attr| {
                step.ctx
                    .atoms
                    .resolve(attr.name)
                    .is_some_and(tags::is_font_breakout_attr)
            });
        if tags::is_foreign_breakout_tag(local) || font_breakout {
            self.record_error(step, ParseErrorCode::ForeignContentBreakout);
            self.open.pop_until_foreign_content_scope_marker();
            return self.process_token(step, token);
        }
        let ns = self
            .adjusted_current_name_ns()
            .map(|(_, ns)| ns)
            .ok_or(EngineInvariantError)?;
        self.insert_foreign_element_for_token(step, local, attrs, ns, self_closing)
    }

    /// Create and insert a foreign element: SVG tag-name case adjustment,
    /// SVG/MathML attribute adjustment, and foreign attribute namespacing.
    pub(crate) fn insert_foreign_element_for_token(
        &mut self,
        step: &mut Step<'_>,
        local: &Arc<str>,
        attrs: &[Attribute],
        ns: Namespace,
        self_closing: bool,
    ) -> Result<(), TreeBuilderError> {
        let adjusted: Arc<str> = if ns == Namespace::Svg {
            match svg_tag_adjustments().get(&**local) {
                Some(camel) => {
                    let atom = step
                        .ctx
                        .atoms
                        .intern_exact(camel)
                        .map_err(|_| EngineInvariantError)?;
                    resolve_name(&step.ctx.atoms, atom)?
                }
                None => Arc::clone(local),
            }
        } else {
            Arc::clone(local)
        };
        let name_atom = step
            .ctx
            .atoms
            .intern_exact(&adjusted)
            .map_err(|_| EngineInvariantError)?;
        let mut resolved = super::resolve_attrs(&step.ctx.atoms, step.text, attrs)?;
        adjust_attributes(&mut resolved, ns);
        let item = self.make_item(step, name_atom, &adjusted, ns, resolved);
        self.insert_node(step, item.node)?;
        if self_closing {
            if ns == Namespace::Svg && &*adjusted == "script" {
                self.pending_script = Some(item.node);
            }
        } else {
            self.open.push(item);
        }
        Ok(())
    }

    fn foreign_end_tag(
        &mut self,
        step: &mut Step<'_>,
        local: &Arc<str>,
        token: &Token,
    ) -> Result<(), TreeBuilderError> {
        // `</script>` on an open SVG script pops and hands the element to the
        // driver for execution.
        if &**local == "script"
            && self.open.top().is_some_and(|top| {
                top.ns == Namespace::Svg && &*top.local == "script"
            })
        {
            self.pending_script = self.open.top().map(|item| item.node);
            let _ = self.open.pop();
            return Ok(());
        }
        if !self
            .open
            .top()
            .is_some_and(|top| top.local.eq_ignore_ascii_case(local))
        {
            self.record_error(step, ParseErrorCode::UnexpectedEndTag);
        }
        let mut index = match self.open.len() {
            0 => return Ok(()),
            len => len - 1,
        };
        loop {
            if index == 0 {
                // Fragment case: the walk reached the root.
                return Ok(());
            }
            let item = self.open.at(index);
            if item.local.eq_ignore_ascii_case(local) {
                let node = item.node;
                self.open.pop_until_popped_element(node);
                return Ok(());
            }
            index -= 1;
            if self.open.at(index).ns == Namespace::Html {
                // An HTML ancestor takes over: normal end-tag processing.
                return self.process_token(step, token);
            }
        }
    }
}
