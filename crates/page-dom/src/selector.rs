//! CSS selector subset used by site adapters.
//!
//! Supported: type selectors, `*`, `.class`, `#id`, attribute selectors with
//! `=`, `$=`, `^=` and `*=`, compound selectors, the descendant combinator and
//! comma separated lists.

use crate::errors::DomError;
use crate::node::ElementData;

#[derive(Clone, Debug, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals,
    EndsWith,
    StartsWith,
    Contains,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct AttrSelector {
    name: String,
    op: AttrOp,
    value: String,
}

impl AttrSelector {
    fn matches(&self, el: &ElementData) -> bool {
        let Some(actual) = el.attr(&self.name) else {
            return false;
        };
        match self.op {
            AttrOp::Exists => true,
            AttrOp::Equals => actual == self.value,
            AttrOp::EndsWith => !self.value.is_empty() && actual.ends_with(&self.value),
            AttrOp::StartsWith => !self.value.is_empty() && actual.starts_with(&self.value),
            AttrOp::Contains => !self.value.is_empty() && actual.contains(&self.value),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrSelector>,
}

impl Compound {
    pub fn matches(&self, el: &ElementData) -> bool {
        if let Some(tag) = &self.tag {
            if tag != &el.tag {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if el.attr("id") != Some(id.as_str()) {
                return false;
            }
        }
        self.classes.iter().all(|class| el.has_class(class))
            && self.attrs.iter().all(|attr| attr.matches(el))
    }
}

/// Compounds joined by descendant combinators, left to right.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Complex(Vec<Compound>);

impl Complex {
    pub fn compounds(&self) -> &[Compound] {
        &self.0
    }
}

/// Parsed selector list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectorList {
    source: String,
    complexes: Vec<Complex>,
}

impl SelectorList {
    pub fn parse(input: &str) -> Result<Self, DomError> {
        let mut complexes = Vec::new();
        for part in split_top_level(input, ',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(DomError::selector(input, "empty selector in list"));
            }
            let mut compounds = Vec::new();
            for token in split_top_level(part, ' ') {
                let token = token.trim();
                if token.is_empty() {
                    continue;
                }
                if token.starts_with(['>', '+', '~']) {
                    return Err(DomError::selector(
                        input,
                        format!("unsupported combinator '{}'", &token[..1]),
                    ));
                }
                compounds.push(parse_compound(input, token)?);
            }
            complexes.push(Complex(compounds));
        }
        if complexes.is_empty() {
            return Err(DomError::selector(input, "empty selector"));
        }
        Ok(Self {
            source: input.to_string(),
            complexes,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub(crate) fn complexes(&self) -> &[Complex] {
        &self.complexes
    }
}

/// Splits on `sep` outside of brackets and quotes.
fn split_top_level(input: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (idx, ch) in input.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, c) if c == sep && depth == 0 => {
                parts.push(&input[start..idx]);
                start = idx + ch.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn take_ident(chars: &[char], pos: &mut usize) -> String {
    let start = *pos;
    while *pos < chars.len() && is_ident_char(chars[*pos]) {
        *pos += 1;
    }
    chars[start..*pos].iter().collect()
}

fn parse_compound(source: &str, token: &str) -> Result<Compound, DomError> {
    let chars: Vec<char> = token.chars().collect();
    let mut pos = 0;
    let mut compound = Compound::default();

    if chars.first() == Some(&'*') {
        pos = 1;
    } else {
        let tag = take_ident(&chars, &mut pos);
        if !tag.is_empty() {
            compound.tag = Some(tag.to_ascii_lowercase());
        }
    }

    while pos < chars.len() {
        match chars[pos] {
            '.' => {
                pos += 1;
                let class = take_ident(&chars, &mut pos);
                if class.is_empty() {
                    return Err(DomError::selector(source, "expected class name after '.'"));
                }
                compound.classes.push(class);
            }
            '#' => {
                pos += 1;
                let id = take_ident(&chars, &mut pos);
                if id.is_empty() {
                    return Err(DomError::selector(source, "expected id after '#'"));
                }
                compound.id = Some(id);
            }
            '[' => {
                let close = chars[pos..]
                    .iter()
                    .position(|c| *c == ']')
                    .map(|offset| pos + offset)
                    .ok_or_else(|| DomError::selector(source, "unterminated attribute selector"))?;
                let body: String = chars[pos + 1..close].iter().collect();
                compound.attrs.push(parse_attr(source, &body)?);
                pos = close + 1;
            }
            other => {
                return Err(DomError::selector(
                    source,
                    format!("unexpected character '{other}'"),
                ));
            }
        }
    }
    Ok(compound)
}

fn parse_attr(source: &str, body: &str) -> Result<AttrSelector, DomError> {
    let body = body.trim();
    let ops = [
        ("$=", AttrOp::EndsWith),
        ("^=", AttrOp::StartsWith),
        ("*=", AttrOp::Contains),
        ("=", AttrOp::Equals),
    ];
    for (token, op) in ops {
        if let Some(idx) = body.find(token) {
            let name = body[..idx].trim();
            let raw = body[idx + token.len()..].trim();
            if name.is_empty() || !name.chars().all(is_ident_char) {
                return Err(DomError::selector(source, "invalid attribute name"));
            }
            let value = raw
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| raw.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(raw);
            return Ok(AttrSelector {
                name: name.to_ascii_lowercase(),
                op,
                value: value.to_string(),
            });
        }
    }
    if body.is_empty() || !body.chars().all(is_ident_char) {
        return Err(DomError::selector(source, "invalid attribute name"));
    }
    Ok(AttrSelector {
        name: body.to_ascii_lowercase(),
        op: AttrOp::Exists,
        value: String::new(),
    })
}
