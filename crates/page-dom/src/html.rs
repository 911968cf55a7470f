//! Tolerant HTML fragment parsing and serialisation.

use crate::node::{NodeData, NodeId, Tree};

const VOID_ELEMENTS: [&str; 13] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];
const RAW_TEXT_ELEMENTS: [&str; 2] = ["script", "style"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Fragment {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
        children: Vec<Fragment>,
    },
    Text(String),
}

struct Frame {
    tag: String,
    attrs: Vec<(String, String)>,
    children: Vec<Fragment>,
}

impl Frame {
    fn into_fragment(self) -> Fragment {
        Fragment::Element {
            tag: self.tag,
            attrs: self.attrs,
            children: self.children,
        }
    }
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if pred(c)) {
            self.bump();
        }
        &self.src[start..self.pos]
    }
}

type StartTag = (String, Vec<(String, String)>, bool, usize);

/// Parses `<tag attr=...>` at the start of `input`. `None` means "not a tag",
/// in which case the caller treats the `<` as text.
fn parse_start_tag(input: &str) -> Option<StartTag> {
    let mut cur = Cursor { src: input, pos: 1 };
    let tag = cur
        .take_while(|c| c.is_ascii_alphanumeric() || c == '-' || c == ':')
        .to_ascii_lowercase();
    if tag.is_empty() {
        return None;
    }
    let mut attrs = Vec::new();
    loop {
        cur.skip_ws();
        match cur.peek()? {
            '>' => {
                cur.bump();
                return Some((tag, attrs, false, cur.pos));
            }
            '/' => {
                cur.bump();
                cur.skip_ws();
                if cur.peek() == Some('>') {
                    cur.bump();
                    return Some((tag, attrs, true, cur.pos));
                }
            }
            _ => {
                let name = cur
                    .take_while(|c| !c.is_whitespace() && c != '=' && c != '>' && c != '/')
                    .to_ascii_lowercase();
                if name.is_empty() {
                    cur.bump();
                    continue;
                }
                cur.skip_ws();
                let value = if cur.peek() == Some('=') {
                    cur.bump();
                    cur.skip_ws();
                    match cur.peek() {
                        Some(quote @ ('"' | '\'')) => {
                            cur.bump();
                            let raw = cur.take_while(move |c| c != quote);
                            cur.bump();
                            unescape(raw)
                        }
                        _ => unescape(cur.take_while(|c| !c.is_whitespace() && c != '>')),
                    }
                } else {
                    String::new()
                };
                if !attrs.iter().any(|(existing, _)| existing == &name) {
                    attrs.push((name, value));
                }
            }
        }
    }
}

fn flush_text(stack: &mut [Frame], text: &mut String) {
    if text.is_empty() {
        return;
    }
    if let Some(top) = stack.last_mut() {
        top.children.push(Fragment::Text(unescape(text)));
    }
    text.clear();
}

fn close_element(stack: &mut Vec<Frame>, name: &str) {
    let Some(idx) = stack.iter().rposition(|frame| frame.tag == name) else {
        return;
    };
    if idx == 0 {
        return;
    }
    while stack.len() > idx {
        if let Some(frame) = stack.pop() {
            if let Some(parent) = stack.last_mut() {
                parent.children.push(frame.into_fragment());
            }
        }
    }
}

pub(crate) fn parse_fragment(input: &str) -> Vec<Fragment> {
    let mut stack = vec![Frame {
        tag: String::new(),
        attrs: Vec::new(),
        children: Vec::new(),
    }];
    let mut text = String::new();
    let mut pos = 0;

    while pos < input.len() {
        let rest = &input[pos..];
        if rest.starts_with("<!--") {
            flush_text(&mut stack, &mut text);
            pos += rest.find("-->").map(|i| i + 3).unwrap_or(rest.len());
            continue;
        }
        if rest.starts_with("<!") || rest.starts_with("<?") {
            flush_text(&mut stack, &mut text);
            pos += rest.find('>').map(|i| i + 1).unwrap_or(rest.len());
            continue;
        }
        if let Some(after) = rest.strip_prefix("</") {
            if let Some(end) = after.find('>') {
                flush_text(&mut stack, &mut text);
                let name = after[..end].trim().to_ascii_lowercase();
                close_element(&mut stack, &name);
                pos += end + 3;
                continue;
            }
        }
        if rest.starts_with('<') {
            if let Some((tag, attrs, self_closing, consumed)) = parse_start_tag(rest) {
                flush_text(&mut stack, &mut text);
                pos += consumed;
                if self_closing || VOID_ELEMENTS.contains(&tag.as_str()) {
                    if let Some(top) = stack.last_mut() {
                        top.children.push(Fragment::Element {
                            tag,
                            attrs,
                            children: Vec::new(),
                        });
                    }
                } else if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) {
                    let body = &input[pos..];
                    let closing = format!("</{tag}");
                    let end = body
                        .to_ascii_lowercase()
                        .find(&closing)
                        .unwrap_or(body.len());
                    let mut children = Vec::new();
                    if end > 0 {
                        children.push(Fragment::Text(body[..end].to_string()));
                    }
                    pos += end;
                    pos += input[pos..].find('>').map(|i| i + 1).unwrap_or(0);
                    if let Some(top) = stack.last_mut() {
                        top.children.push(Fragment::Element {
                            tag,
                            attrs,
                            children,
                        });
                    }
                } else {
                    stack.push(Frame {
                        tag,
                        attrs,
                        children: Vec::new(),
                    });
                }
                continue;
            }
        }
        match rest.chars().next() {
            Some(ch) => {
                text.push(ch);
                pos += ch.len_utf8();
            }
            None => break,
        }
    }

    flush_text(&mut stack, &mut text);
    while stack.len() > 1 {
        if let Some(frame) = stack.pop() {
            if let Some(parent) = stack.last_mut() {
                parent.children.push(frame.into_fragment());
            }
        }
    }
    stack.pop().map(|root| root.children).unwrap_or_default()
}

pub(crate) fn escape_text(raw: &str, out: &mut String) {
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
}

pub(crate) fn escape_attr(raw: &str, out: &mut String) {
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
}

pub(crate) fn unescape(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(idx) = rest.find('&') {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx..];
        let decoded = tail.find(';').filter(|end| *end <= 10).and_then(|end| {
            let entity = &tail[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|ch| (ch, end + 1))
        });
        match decoded {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Allocates `fragments` under `parent`, returning the new top-level ids.
pub(crate) fn build(tree: &mut Tree, parent: NodeId, fragments: Vec<Fragment>) -> Vec<NodeId> {
    let mut added = Vec::with_capacity(fragments.len());
    for fragment in fragments {
        let id = match fragment {
            Fragment::Text(text) => tree.alloc(NodeData::Text(text)),
            Fragment::Element {
                tag,
                attrs,
                children,
            } => {
                let mut data = crate::node::ElementData::new(&tag);
                data.attrs = attrs;
                let id = tree.alloc(NodeData::Element(data));
                build(tree, id, children);
                id
            }
        };
        if tree.attach(parent, id, None).is_ok() {
            added.push(id);
        }
    }
    added
}

pub(crate) fn serialize_children(tree: &Tree, id: NodeId, out: &mut String) {
    if let Ok(node) = tree.node(id) {
        for child in &node.children {
            serialize(tree, *child, out);
        }
    }
}

pub(crate) fn serialize(tree: &Tree, id: NodeId, out: &mut String) {
    let Ok(node) = tree.node(id) else {
        return;
    };
    match &node.data {
        NodeData::Text(text) => {
            let raw_parent = node
                .parent
                .and_then(|parent| tree.element(parent).ok())
                .map(|el| RAW_TEXT_ELEMENTS.contains(&el.tag.as_str()))
                .unwrap_or(false);
            if raw_parent {
                out.push_str(text);
            } else {
                escape_text(text, out);
            }
        }
        NodeData::Element(el) => {
            out.push('<');
            out.push_str(&el.tag);
            for (key, value) in &el.attrs {
                out.push(' ');
                out.push_str(key);
                out.push_str("=\"");
                escape_attr(value, out);
                out.push('"');
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&el.tag.as_str()) {
                return;
            }
            serialize_children(tree, id, out);
            out.push_str("</");
            out.push_str(&el.tag);
            out.push('>');
        }
    }
}
