//! Constrained rich-text rendering for backend-supplied markup.
//!
//! Assistant replies may contain a little HTML (bold text, lists, line
//! breaks). Nothing from the backend is injected verbatim: [`sanitize`] keeps
//! a small allowlist of formatting tags with every attribute stripped,
//! drops all other tags, discards the contents of script-like elements and
//! escapes the remaining text. Output is always balanced.
//!
//! # Example
//!
//! ```rust
//! use appointment_chat::markup::sanitize;
//!
//! assert_eq!(sanitize("<b onclick=\"x()\">Sure</b>"), "<b>Sure</b>");
//! assert_eq!(sanitize("<script>alert(1)</script>ok"), "ok");
//! ```

/// Formatting tags that survive sanitization.
const ALLOWED: &[&str] = &[
    "b",
    "strong",
    "i",
    "em",
    "u",
    "p",
    "br",
    "ul",
    "ol",
    "li",
    "code",
    "pre",
    "blockquote",
    "h3",
    "h4",
];

/// Tags that never have a closing tag.
const VOID: &[&str] = &["br"];

/// Elements whose whole content is discarded.
const DROP_CONTENT: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "noscript", "template", "textarea", "title",
    "svg", "math",
];

/// Escape text for safe inclusion in HTML content or attribute values.
#[must_use]
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        push_escaped(&mut out, c);
    }
    out
}

fn push_escaped(out: &mut String, c: char) {
    match c {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        '"' => out.push_str("&quot;"),
        '\'' => out.push_str("&#39;"),
        _ => out.push(c),
    }
}

/// Reduce untrusted markup to the allowed formatting subset.
#[must_use]
pub fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut open: Vec<&'static str> = Vec::new();
    let mut rest = input;

    while let Some(pos) = rest.find(['<', '>', '&', '"', '\'']) {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];

        if let Some(after) = rest.strip_prefix("<!--") {
            rest = after.find("-->").map_or("", |end| &after[end + 3..]);
            continue;
        }

        if rest.starts_with('<') {
            let Some(tag) = parse_tag(rest) else {
                out.push_str("&lt;");
                rest = &rest[1..];
                continue;
            };
            rest = &rest[tag.len..];

            if !tag.closing && DROP_CONTENT.contains(&tag.name.as_str()) {
                rest = skip_element(rest, &tag.name);
            } else if let Some(allowed) = ALLOWED.iter().copied().find(|t| *t == tag.name) {
                emit_tag(&mut out, &mut open, allowed, tag.closing);
            }
            continue;
        }

        if rest.starts_with('&') {
            let len = entity_len(rest);
            if len > 0 {
                out.push_str(&rest[..len]);
                rest = &rest[len..];
                continue;
            }
        }

        // A single ASCII special character.
        push_escaped(&mut out, char::from(rest.as_bytes()[0]));
        rest = &rest[1..];
    }
    out.push_str(rest);

    while let Some(tag) = open.pop() {
        push_close(&mut out, tag);
    }
    out
}

#[derive(Debug)]
struct Tag {
    /// Lowercased tag name; empty for declarations such as `<!DOCTYPE>`.
    name: String,
    closing: bool,
    /// Bytes consumed, including both angle brackets.
    len: usize,
}

/// Parse a tag at the start of `s` (which begins with `<`).
///
/// Returns `None` when the `<` does not start a tag, in which case it is
/// plain text.
fn parse_tag(s: &str) -> Option<Tag> {
    let body = &s[1..];
    let (closing, name_start) = match body.as_bytes().first() {
        Some(b'/') => (true, 1),
        Some(b'!' | b'?') => {
            let end = body.find('>')?;
            return Some(Tag {
                name: String::new(),
                closing: false,
                len: end + 2,
            });
        }
        Some(_) => (false, 0),
        None => return None,
    };

    let name: String = body[name_start..]
        .chars()
        .take_while(char::is_ascii_alphanumeric)
        .collect();
    if name.is_empty() || !name.as_bytes()[0].is_ascii_alphabetic() {
        return None;
    }

    let attrs_start = name_start + name.len();
    let end = find_tag_end(&body[attrs_start..])? + attrs_start;
    Some(Tag {
        name: name.to_ascii_lowercase(),
        closing,
        len: end + 2,
    })
}

/// Offset of the `>` closing a tag, skipping quoted attribute values.
fn find_tag_end(s: &str) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (idx, b) in s.bytes().enumerate() {
        match (quote, b) {
            (Some(q), _) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"' | b'\'') => quote = Some(b),
            (None, b'>') => return Some(idx),
            (None, b'<') => return None,
            (None, _) => {}
        }
    }
    None
}

/// Skip past the closing tag of a dropped element.
fn skip_element<'a>(rest: &'a str, name: &str) -> &'a str {
    let lowered = rest.to_ascii_lowercase();
    let Some(start) = lowered.find(&format!("</{name}")) else {
        return "";
    };
    rest[start..].find('>').map_or("", |end| &rest[start + end + 1..])
}

fn emit_tag(out: &mut String, open: &mut Vec<&'static str>, tag: &'static str, closing: bool) {
    if VOID.contains(&tag) {
        if !closing {
            out.push('<');
            out.push_str(tag);
            out.push('>');
        }
        return;
    }

    if closing {
        if let Some(idx) = open.iter().rposition(|t| *t == tag) {
            while open.len() > idx {
                if let Some(inner) = open.pop() {
                    push_close(out, inner);
                }
            }
        }
    } else {
        out.push('<');
        out.push_str(tag);
        out.push('>');
        open.push(tag);
    }
}

fn push_close(out: &mut String, tag: &str) {
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

/// Length of a well-formed character reference at the start of `s`, or 0.
fn entity_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut idx = 1;
    let (max, valid): (usize, fn(&u8) -> bool) = match bytes.get(1) {
        Some(b'#') => {
            idx += 1;
            if matches!(bytes.get(2), Some(b'x' | b'X')) {
                idx += 1;
                (8, u8::is_ascii_hexdigit)
            } else {
                (8, u8::is_ascii_digit)
            }
        }
        _ => (32, u8::is_ascii_alphanumeric),
    };

    let start = idx;
    while idx < bytes.len() && idx - start < max && valid(&bytes[idx]) {
        idx += 1;
    }
    if idx > start && bytes.get(idx) == Some(&b';') {
        idx + 1
    } else {
        0
    }
}
