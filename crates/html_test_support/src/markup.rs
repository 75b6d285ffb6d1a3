//! Minimal markup lexer for fixtures.
//!
//! This is test tooling, not a tokenizer: it turns well-formed-enough fixture
//! markup into the token stream an external tokenizer would produce, including
//! the raw-text behavior of script/style/title/etc. so fixtures can exercise
//! the tree builder's Text-mode handling. No entity decoding, no error
//! recovery; fixtures must not rely on tokenizer-level quirks.

use html::html5::{Attribute, AttributeValue, DocumentParseContext, TextValue, Token};

fn is_ws(byte: u8) -> bool {
    matches!(byte, b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

fn raw_text_tag(name: &str, scripting: bool) -> bool {
    matches!(
        name,
        "script" | "style" | "title" | "textarea" | "xmp" | "iframe" | "noembed" | "noframes"
    ) || (name == "noscript" && scripting)
}

/// Lex fixture markup into tokens, ending with `Token::Eof`.
pub fn tokens(markup: &str, scripting: bool, ctx: &mut DocumentParseContext) -> Vec<Token> {
    let bytes = markup.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0usize;
    while pos < bytes.len() {
        if bytes[pos] == b'<' && pos + 1 < bytes.len() {
            let next = bytes[pos + 1];
            if bytes[pos..].starts_with(b"<!--") {
                let start = pos + 4;
                let end = find(bytes, start, b"-->").unwrap_or(bytes.len());
                tokens.push(Token::Comment {
                    text: TextValue::Owned(markup[start..end].to_string()),
                });
                pos = (end + 3).min(bytes.len());
                continue;
            }
            if next == b'!' {
                let start = pos + 2;
                let end = find(bytes, start, b">").unwrap_or(bytes.len());
                tokens.push(doctype_token(&markup[start..end], ctx));
                pos = (end + 1).min(bytes.len());
                continue;
            }
            if next == b'/' {
                let (name, end) = read_name(markup, pos + 2);
                let close = find(bytes, end, b">").map_or(bytes.len(), |i| i + 1);
                let name = ctx.atoms.intern_ascii_folded(&name).expect("atom");
                tokens.push(Token::EndTag { name });
                pos = close;
                continue;
            }
            if next.is_ascii_alphabetic() {
                let (name, attrs, self_closing, end) = read_start_tag(markup, pos + 1, ctx);
                let name_atom = ctx.atoms.intern_ascii_folded(&name).expect("atom");
                tokens.push(Token::StartTag {
                    name: name_atom,
                    attrs,
                    self_closing,
                });
                pos = end;
                if name == "plaintext" {
                    if pos < bytes.len() {
                        tokens.push(Token::Text {
                            text: TextValue::Owned(markup[pos..].to_string()),
                        });
                    }
                    pos = bytes.len();
                } else if !self_closing && raw_text_tag(&name, scripting) {
                    pos = push_raw_text(markup, pos, &name, &mut tokens);
                }
                continue;
            }
        }
        let end = next_tag_open(bytes, pos);
        tokens.push(Token::Text {
            text: TextValue::Owned(markup[pos..end].to_string()),
        });
        pos = end;
    }
    tokens.push(Token::Eof);
    tokens
}

fn find(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from >= bytes.len() {
        return None;
    }
    bytes[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| from + offset)
}

/// Position of the next `<` that opens a tag-like construct; a stray `<` is
/// part of the text run.
fn next_tag_open(bytes: &[u8], from: usize) -> usize {
    let mut pos = from;
    loop {
        pos += 1;
        if pos >= bytes.len() {
            return bytes.len();
        }
        if bytes[pos] == b'<'
            && bytes
                .get(pos + 1)
                .is_some_and(|b| b.is_ascii_alphabetic() || *b == b'/' || *b == b'!')
        {
            return pos;
        }
    }
}

fn read_name(markup: &str, from: usize) -> (String, usize) {
    let bytes = markup.as_bytes();
    let mut end = from;
    while end < bytes.len() && !is_ws(bytes[end]) && !matches!(bytes[end], b'>' | b'/' | b'=') {
        end += 1;
    }
    (markup[from..end].to_ascii_lowercase(), end)
}

fn read_start_tag(
    markup: &str,
    from: usize,
    ctx: &mut DocumentParseContext,
) -> (String, Vec<Attribute>, bool, usize) {
    let bytes = markup.as_bytes();
    let (name, mut pos) = read_name(markup, from);
    let mut attrs: Vec<Attribute> = Vec::new();
    let mut self_closing = false;
    loop {
        while pos < bytes.len() && is_ws(bytes[pos]) {
            pos += 1;
        }
        if pos >= bytes.len() {
            break;
        }
        if bytes[pos] == b'>' {
            pos += 1;
            break;
        }
        if bytes[pos] == b'/' {
            if bytes.get(pos + 1) == Some(&b'>') {
                self_closing = true;
                pos += 2;
                break;
            }
            pos += 1;
            continue;
        }
        let (attr_name, after_name) = read_name(markup, pos);
        pos = after_name;
        while pos < bytes.len() && is_ws(bytes[pos]) {
            pos += 1;
        }
        let value = if bytes.get(pos) == Some(&b'=') {
            pos += 1;
            while pos < bytes.len() && is_ws(bytes[pos]) {
                pos += 1;
            }
            let (value, after_value) = read_attr_value(markup, pos);
            pos = after_value;
            Some(value)
        } else {
            None
        };
        if attr_name.is_empty() {
            pos += 1;
            continue;
        }
        let atom = ctx.atoms.intern_ascii_folded(&attr_name).expect("atom");
        // First-wins duplicate handling, as the real tokenizer does.
        if !attrs.iter().any(|attr| attr.name == atom) {
            attrs.push(Attribute {
                name: atom,
                value: value.map(AttributeValue::Owned),
            });
        }
    }
    (name, attrs, self_closing, pos)
}

fn read_attr_value(markup: &str, from: usize) -> (String, usize) {
    let bytes = markup.as_bytes();
    match bytes.get(from) {
        Some(&quote) if quote == b'"' || quote == b'\'' => {
            let start = from + 1;
            let end = bytes[start..]
                .iter()
                .position(|b| *b == quote)
                .map_or(bytes.len(), |offset| start + offset);
            (markup[start..end].to_string(), (end + 1).min(bytes.len()))
        }
        _ => {
            let mut end = from;
            while end < bytes.len() && !is_ws(bytes[end]) && bytes[end] != b'>' {
                end += 1;
            }
            (markup[from..end].to_string(), end)
        }
    }
}

fn push_raw_text(markup: &str, from: usize, name: &str, tokens: &mut Vec<Token>) -> usize {
    let bytes = markup.as_bytes();
    let close = format!("</{name}");
    let mut pos = from;
    let end = loop {
        match find(bytes, pos, b"</") {
            None => break bytes.len(),
            Some(candidate) => {
                if markup[candidate..]
                    .get(..close.len())
                    .is_some_and(|prefix| prefix.eq_ignore_ascii_case(&close))
                {
                    break candidate;
                }
                pos = candidate + 2;
            }
        }
    };
    if end > from {
        tokens.push(Token::Text {
            text: TextValue::Owned(markup[from..end].to_string()),
        });
    }
    end
}


fn doctype_token(content: &str, ctx: &mut DocumentParseContext) -> Token {
    let mut words = SplitQuoted::new(content);
    let keyword = words.next().unwrap_or_default();
    debug_assert!(keyword.eq_ignore_ascii_case("doctype"), "fixture doctype");
    let name = words
        .next()
        .map(|word| ctx.atoms.intern_ascii_folded(&word).expect("atom"));
    let mut public_id = None;
    let mut system_id = None;
    match words.next() {
        Some(word) if word.eq_ignore_ascii_case("public") => {
            public_id = words.next();
            system_id = words.next();
        }
        Some(word) if word.eq_ignore_ascii_case("system") => {
            system_id = words.next();
        }
        _ => {}
    }
    Token::Doctype {
        name,
        public_id,
        system_id,
        force_quirks: false,
    }
}

/// Whitespace-separated words, with double-quoted runs kept as one word.
struct SplitQuoted<'a> {
    rest: &'a str,
}

impl<'a> SplitQuoted<'a> {
    fn new(text: &'a str) -> Self {
        Self { rest: text }
    }
}

impl Iterator for SplitQuoted<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.rest = self.rest.trim_start();
        if self.rest.is_empty() {
            return None;
        }
        if let Some(stripped) = self.rest.strip_prefix('"') {
            let end = stripped.find('"').unwrap_or(stripped.len());
            let word = stripped[..end].to_string();
            self.rest = stripped.get(end + 1..).unwrap_or("");
            return Some(word);
        }
        let end = self
            .rest
            .find(char::is_whitespace)
            .unwrap_or(self.rest.len());
        let word = self.rest[..end].to_string();
        self.rest = &self.rest[end..];
        Some(word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use html::html5::DocumentParseContext;

    fn names(tokens: &[Token], ctx: &DocumentParseContext) -> Vec<String> {
        tokens
            .iter()
            .map(|token| match token {
                Token::StartTag { name, .. } => {
                    format!("<{}>", ctx.atoms.resolve(*name).unwrap())
                }
                Token::EndTag { name } => format!("</{}>", ctx.atoms.resolve(*name).unwrap()),
                Token::Text { text } => match text {
                    TextValue::Owned(text) => format!("\"{text}\""),
                    TextValue::Span(_) => unreachable!("lexer emits owned text"),
                },
                Token::Comment { .. } => "<!---->".to_string(),
                Token::Doctype { .. } => "<!DOCTYPE>".to_string(),
                Token::Eof => "EOF".to_string(),
            })
            .collect()
    }

    #[test]
    fn lexes_tags_text_and_comments() {
        let mut ctx = DocumentParseContext::new();
        let tokens = tokens("<p class=a>hi<!--c--></p>", false, &mut ctx);
        assert_eq!(
            names(&tokens, &ctx),
            vec!["<p>", "\"hi\"", "<!---->", "</p>", "EOF"]
        );
    }

    #[test]
    fn folds_tag_case_and_keeps_first_duplicate_attribute() {
        let mut ctx = DocumentParseContext::new();
        let tokens = tokens("<DIV ID=1 id=2>", false, &mut ctx);
        let Token::StartTag { name, attrs, .. } = &tokens[0] else {
            panic!("expected start tag");
        };
        assert_eq!(ctx.atoms.resolve(*name), Some("div"));
        assert_eq!(attrs.len(), 1);
        assert_eq!(
            attrs[0].value,
            Some(AttributeValue::Owned("1".to_string()))
        );
    }

    #[test]
    fn script_contents_are_raw() {
        let mut ctx = DocumentParseContext::new();
        let tokens = tokens("<script>a < b && c</script>x", false, &mut ctx);
        assert_eq!(
            names(&tokens, &ctx),
            vec!["<script>", "\"a < b && c\"", "</script>", "\"x\"", "EOF"]
        );
    }

    #[test]
    fn stray_less_than_is_text() {
        let mut ctx = DocumentParseContext::new();
        let tokens = tokens("a < b", false, &mut ctx);
        assert_eq!(names(&tokens, &ctx), vec!["\"a < b\"", "EOF"]);
    }

    #[test]
    fn doctype_with_public_id() {
        let mut ctx = DocumentParseContext::new();
        let tokens = tokens(
            "<!DOCTYPE html PUBLIC \"-//W3C//DTD HTML 4.01//EN\">",
            false,
            &mut ctx,
        );
        let Token::Doctype {
            name, public_id, ..
        } = &tokens[0]
        else {
            panic!("expected doctype");
        };
        assert_eq!(ctx.atoms.resolve(name.unwrap()), Some("html"));
        assert_eq!(public_id.as_deref(), Some("-//W3C//DTD HTML 4.01//EN"));
    }
}
