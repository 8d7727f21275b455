//! SVG ingest: a minimal streaming tokenizer over an immutable `&str`,
//! followed by a second pass that turns `path d` attributes into
//! `DrawSet`s.
//!
//! Never mutates its input, and tracks nesting depth explicitly rather
//! than via a pointer stack.

use crate::error::{Error, Result};
use crate::path::{DrawOp, DrawSet, Document, Point, MAX_DRAW_SETS};

const MAX_FILE_BYTES: usize = 1024 * 1024;
const MAX_NESTING_DEPTH: usize = 1024;

/// Parse `src` into a `Document`. Accepts `<svg width height>`, `<g>`,
/// `<path d=…>`, with `d` tokens `M`, `L`, `C`, `z` (absolute only).
pub fn parse(src: &str) -> Result<Document> {
    if src.is_empty() {
        return Err(Error::InputParse("empty document".into()));
    }
    if src.len() > MAX_FILE_BYTES {
        return Err(Error::InputParse(format!(
            "file size {} exceeds {}-byte cap",
            src.len(),
            MAX_FILE_BYTES
        )));
    }

    let mut builder = Builder::default();
    let mut tokens = Tokenizer::new(src);
    walk(&mut tokens, 0, &mut builder)?;

    if builder.width == 0 || builder.height == 0 {
        return Err(Error::InputParse("missing or zero svg width/height".into()));
    }

    Ok(Document::new(builder.width, builder.height, builder.draw_sets))
}

#[derive(Default)]
struct Builder {
    width: u32,
    height: u32,
    draw_sets: Vec<DrawSet>,
}

/// One parsed tag open, with its attributes as raw `(name, value)` pairs.
struct OpenTag<'a> {
    name: &'a str,
    attrs: Vec<(&'a str, &'a str)>,
    self_closing: bool,
}

struct Tokenizer<'a> {
    rest: &'a str,
}

impl<'a> Tokenizer<'a> {
    fn new(src: &'a str) -> Self {
        Tokenizer { rest: src }
    }

    fn skip_ws(&mut self) {
        self.rest = self.rest.trim_start();
    }

    /// Consume the next tag open (`<name ...>` or `<name .../>`),
    /// skipping comments and `<?...?>` directives first. Returns `None`
    /// at end of input, or when the next thing is a closing tag (which
    /// the caller is responsible for consuming via `expect_close`).
    fn next_open(&mut self) -> Result<Option<OpenTag<'a>>> {
        loop {
            self.skip_ws();
            if self.rest.is_empty() {
                return Ok(None);
            }
            if !self.rest.starts_with('<') {
                return Err(Error::InputParse(format!(
                    "expected '<', found {:?}",
                    &self.rest[..self.rest.len().min(16)]
                )));
            }
            if self.rest.starts_with("<!--") {
                let end = self.rest.find("-->").ok_or_else(|| {
                    Error::InputParse("unterminated comment".into())
                })?;
                self.rest = &self.rest[end + 3..];
                continue;
            }
            if self.rest.starts_with("<?") {
                let end = self
                    .rest
                    .find("?>")
                    .ok_or_else(|| Error::InputParse("unterminated directive".into()))?;
                self.rest = &self.rest[end + 2..];
                continue;
            }
            if self.rest.starts_with("</") {
                return Ok(None);
            }
            break;
        }

        let mut s = &self.rest[1..];
        let name_end = s
            .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
            .unwrap_or(s.len());
        let name = &s[..name_end];
        s = &s[name_end..];

        let mut attrs = Vec::new();
        loop {
            s = s.trim_start();
            if s.starts_with("/>") {
                self.rest = &s[2..];
                return Ok(Some(OpenTag { name, attrs, self_closing: true }));
            }
            if s.starts_with('>') {
                self.rest = &s[1..];
                return Ok(Some(OpenTag { name, attrs, self_closing: false }));
            }
            if s.is_empty() {
                return Err(Error::InputParse(format!("unterminated tag <{}", name)));
            }
            let attr_name_end = s
                .find(|c: char| c.is_whitespace() || c == '=' || c == '/' || c == '>')
                .unwrap_or(s.len());
            let attr_name = &s[..attr_name_end];
            s = s[attr_name_end..].trim_start();
            if let Some(rest) = s.strip_prefix('=') {
                let rest = rest.trim_start();
                let quote = rest
                    .chars()
                    .next()
                    .filter(|&c| c == '"' || c == '\'')
                    .ok_or_else(|| Error::InputParse(format!("unquoted value for {}", attr_name)))?;
                let rest = &rest[1..];
                let value_end = rest
                    .find(quote)
                    .ok_or_else(|| Error::InputParse(format!("unterminated value for {}", attr_name)))?;
                attrs.push((attr_name, &rest[..value_end]));
                s = &rest[value_end + 1..];
            } else {
                attrs.push((attr_name, ""));
            }
        }
    }

    /// Consume a `</name>` closing tag, verifying it matches `name`.
    fn expect_close(&mut self, name: &str) -> Result<()> {
        self.skip_ws();
        if !self.rest.starts_with("</") {
            return Err(Error::InputParse(format!("expected closing tag for <{}>", name)));
        }
        let s = &self.rest[2..];
        let end = s.find('>').ok_or_else(|| Error::InputParse("unterminated closing tag".into()))?;
        let found = s[..end].trim();
        if found != name {
            return Err(Error::InputParse(format!(
                "mismatched closing tag: expected </{}>, found </{}>",
                name, found
            )));
        }
        self.rest = &s[end + 1..];
        Ok(())
    }
}

fn walk(tokens: &mut Tokenizer, depth: usize, builder: &mut Builder) -> Result<()> {
    if depth > MAX_NESTING_DEPTH {
        return Err(Error::InputParse(format!(
            "nesting depth exceeds {} levels",
            MAX_NESTING_DEPTH
        )));
    }
    while let Some(tag) = tokens.next_open()? {
        match tag.name {
            "svg" => {
                for (k, v) in &tag.attrs {
                    match *k {
                        "width" => builder.width = parse_dimension(v)?,
                        "height" => builder.height = parse_dimension(v)?,
                        _ => {}
                    }
                }
            }
            "path" => {
                if let Some((_, d)) = tag.attrs.iter().find(|(k, _)| *k == "d") {
                    if builder.draw_sets.len() >= MAX_DRAW_SETS {
                        // Silently discard further sets past the cap.
                        continue;
                    }
                    if let Some(draw_set) = parse_draw_list(d)? {
                        builder.draw_sets.push(draw_set);
                    }
                }
            }
            _ => {}
        }

        if !tag.self_closing {
            walk(tokens, depth + 1, builder)?;
            tokens.expect_close(tag.name)?;
        }
    }
    Ok(())
}

fn parse_dimension(v: &str) -> Result<u32> {
    // Accept a trailing unit suffix (e.g. "200px") by taking the leading
    // numeric run and ignoring the rest.
    let digits: String = v.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits
        .parse()
        .map_err(|_| Error::InputParse(format!("invalid dimension {:?}", v)))
}

/// Parse one `d` attribute into a `DrawSet`. Returns `Ok(None)` for an
/// empty chain, `Err` only for a malformed opcode.
fn parse_draw_list(d: &str) -> Result<Option<DrawSet>> {
    let mut cursor = DCursor::new(d);
    let mut ops = Vec::new();

    while let Some(op_char) = cursor.next_opcode() {
        match op_char {
            'M' => ops.push(DrawOp::Move(cursor.next_point()?)),
            'L' => ops.push(DrawOp::Line(cursor.next_point()?)),
            'C' => {
                let ctl1 = cursor.next_point()?;
                let ctl2 = cursor.next_point()?;
                let end = cursor.next_point()?;
                ops.push(DrawOp::Cubic(ctl1, ctl2, end));
            }
            'z' | 'Z' => {
                // Closepath is consumed but not materialized.
            }
            other => {
                return Err(Error::InputParse(format!("unsupported path opcode '{}'", other)));
            }
        }
    }

    if ops.is_empty() {
        return Ok(None);
    }
    if !matches!(ops[0], DrawOp::Move(_)) {
        return Err(Error::InputParse("draw set does not start with M".into()));
    }
    Ok(Some(DrawSet::from(ops)))
}

struct DCursor<'a> {
    rest: &'a str,
}

impl<'a> DCursor<'a> {
    fn new(s: &'a str) -> Self {
        DCursor { rest: s.trim() }
    }

    fn skip_seps(&mut self) {
        self.rest = self.rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
    }

    /// Consume the next opcode letter, if any.
    fn next_opcode(&mut self) -> Option<char> {
        self.skip_seps();
        let c = self.rest.chars().next()?;
        if c.is_ascii_alphabetic() {
            self.rest = &self.rest[c.len_utf8()..];
            Some(c)
        } else {
            None
        }
    }

    /// Consume one `x,y` or `x y` coordinate pair.
    fn next_point(&mut self) -> Result<Point> {
        self.skip_seps();
        let x = self.next_number()?;
        self.skip_seps();
        let y = self.next_number()?;
        Ok(Point::new(x, y))
    }

    /// Consume one SVG number token: optional leading sign, digits, an
    /// optional fractional part, an optional exponent — a '-' or '+'
    /// past position 0 starts the *next* token instead of extending this
    /// one, so coordinate pairs written without separators (`"1-2"`,
    /// meaning `1,-2`) still parse correctly.
    fn next_number(&mut self) -> Result<f64> {
        let bytes = self.rest.as_bytes();
        let mut end = 0;
        if end < bytes.len() && (bytes[end] == b'-' || bytes[end] == b'+') {
            end += 1;
        }
        let digits_start = end;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        if end < bytes.len() && bytes[end] == b'.' {
            end += 1;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
        }
        if end == digits_start || (end == digits_start + 1 && bytes[digits_start] == b'.') {
            return Err(Error::InputParse(format!(
                "expected number, found {:?}",
                &self.rest[..self.rest.len().min(16)]
            )));
        }
        if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
            let mut exp_end = end + 1;
            if exp_end < bytes.len() && (bytes[exp_end] == b'-' || bytes[exp_end] == b'+') {
                exp_end += 1;
            }
            let exp_digits_start = exp_end;
            while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
                exp_end += 1;
            }
            if exp_end > exp_digits_start {
                end = exp_end;
            }
        }
        let tok = &self.rest[..end];
        self.rest = &self.rest[end..];
        tok.parse()
            .map_err(|_| Error::InputParse(format!("invalid number {:?}", tok)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_svg() {
        let src = r#"<svg width="200" height="200"><g><path d="M 0,0 L 100,100 z"/></g></svg>"#;
        let doc = parse(src).unwrap();
        assert_eq!(doc.width, 200);
        assert_eq!(doc.height, 200);
        assert_eq!(doc.draw_sets.len(), 1);
        assert_eq!(
            doc.draw_sets[0].ops(),
            &[
                DrawOp::Move(Point::new(0.0, 0.0)),
                DrawOp::Line(Point::new(100.0, 100.0)),
            ]
        );
    }

    #[test]
    fn parses_cubic_with_comma_and_space_pairs() {
        let src = r#"<svg width="10" height="10"><path d="M 0,0 C 1,1 2,2 3,3"/></svg>"#;
        let doc = parse(src).unwrap();
        assert_eq!(
            doc.draw_sets[0].ops()[1],
            DrawOp::Cubic(Point::new(1.0, 1.0), Point::new(2.0, 2.0), Point::new(3.0, 3.0))
        );
    }

    #[test]
    fn parses_compact_coordinates_without_separators() {
        let src = r#"<svg width="10" height="10"><path d="M 0,0 L1-2"/></svg>"#;
        let doc = parse(src).unwrap();
        assert_eq!(doc.draw_sets[0].ops()[1], DrawOp::Line(Point::new(1.0, -2.0)));
    }

    #[test]
    fn rejects_relative_lowercase_opcode() {
        let src = r#"<svg width="10" height="10"><path d="m 0,0 l 1,1"/></svg>"#;
        let err = parse(src).unwrap_err();
        assert!(matches!(err, Error::InputParse(_)));
    }

    #[test]
    fn missing_dimensions_is_input_parse_error() {
        let src = r#"<svg><path d="M 0,0 L 1,1"/></svg>"#;
        let err = parse(src).unwrap_err();
        assert!(matches!(err, Error::InputParse(_)));
    }

    #[test]
    fn multiple_paths_become_multiple_draw_sets() {
        let src = r#"<svg width="10" height="10">
            <path d="M 0,0 L 1,1"/>
            <path d="M 2,2 L 3,3"/>
        </svg>"#;
        let doc = parse(src).unwrap();
        assert_eq!(doc.draw_sets.len(), 2);
    }

    #[test]
    fn empty_document_is_input_parse_error() {
        let err = parse("").unwrap_err();
        assert!(matches!(err, Error::InputParse(_)));
    }

    #[test]
    fn oversized_file_is_input_parse_error() {
        let mut src = String::from(r#"<svg width="10" height="10">"#);
        src.push_str(&"x".repeat(MAX_FILE_BYTES + 1));
        src.push_str("</svg>");
        let err = parse(&src).unwrap_err();
        assert!(matches!(err, Error::InputParse(_)));
    }
}
