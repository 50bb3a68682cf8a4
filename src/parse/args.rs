//! Argument text → structured values.
//!
//! Handles the Groovy call shapes used by declarative directives:
//! `sh 'make'`, `git branch: 'main', url: '…'`,
//! `choice(name: 'ENV', choices: ['dev', 'prod'])`,
//! `buildDiscarder(logRotator(numToKeepStr: '10'))`. Anything else is kept
//! as [`ArgValue::Raw`].

use indexmap::IndexMap;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value")]
pub enum ArgValue {
    Str(String),
    Bool(bool),
    Int(i64),
    List(Vec<ArgValue>),
    Call { name: String, args: Args },
    Raw(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Args {
    pub positional: Vec<ArgValue>,
    pub named: IndexMap<String, ArgValue>,
}

impl ArgValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ArgValue::Bool(b) => Some(*b),
            ArgValue::Str(s) if s == "true" => Some(true),
            ArgValue::Str(s) if s == "false" => Some(false),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ArgValue::Int(i) => Some(*i),
            ArgValue::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Text form of scalars, joined form of lists of scalars.
    pub fn to_text(&self) -> String {
        match self {
            ArgValue::Str(s) | ArgValue::Raw(s) => s.clone(),
            ArgValue::Bool(b) => b.to_string(),
            ArgValue::Int(i) => i.to_string(),
            ArgValue::List(items) => items
                .iter()
                .map(ArgValue::to_text)
                .collect::<Vec<_>>()
                .join(", "),
            ArgValue::Call { name, .. } => format!("{name}(…)"),
        }
    }

    /// Flatten a list, or a newline-separated string, into scalar strings.
    /// `choices: ['a', 'b']` and `choices: 'a\nb'` both yield `["a", "b"]`.
    pub fn string_items(&self) -> Vec<String> {
        match self {
            ArgValue::List(items) => items.iter().map(ArgValue::to_text).collect(),
            ArgValue::Str(s) => s
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect(),
            other => vec![other.to_text()],
        }
    }
}

impl Args {
    pub fn parse(text: &str) -> Args {
        let mut text = text.trim();
        if let Some(inner) = strip_outer_parens(text) {
            text = inner.trim();
        }
        let mut args = Args::default();
        if text.is_empty() {
            return args;
        }
        for part in split_top_level(text, ',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            match split_named(part) {
                Some((key, value)) => {
                    args.named.insert(key.to_string(), parse_value(value));
                }
                None => args.positional.push(parse_value(part)),
            }
        }
        args
    }

    pub fn get(&self, key: &str) -> Option<&ArgValue> {
        self.named.get(key)
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ArgValue::as_str)
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(ArgValue::as_bool)
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(ArgValue::as_int)
    }

    pub fn first(&self) -> Option<&ArgValue> {
        self.positional.first()
    }

    pub fn first_str(&self) -> Option<&str> {
        self.first().and_then(ArgValue::as_str)
    }

    /// Named `key`, falling back to the first positional argument.
    pub fn str_or_first(&self, key: &str) -> Option<&str> {
        self.str(key).or_else(|| self.first_str())
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

fn parse_value(text: &str) -> ArgValue {
    let text = text.trim();
    if text.is_empty() {
        return ArgValue::Raw(String::new());
    }
    if let Some(s) = parse_string_literal(text) {
        return ArgValue::Str(s);
    }
    match text {
        "true" => return ArgValue::Bool(true),
        "false" => return ArgValue::Bool(false),
        _ => {}
    }
    if let Ok(i) = text.parse::<i64>() {
        return ArgValue::Int(i);
    }
    if text.starts_with('[') && matching_close(text, 0) == Some(text.len() - 1) {
        let inner = text[1..text.len() - 1].trim();
        if inner.is_empty() {
            return ArgValue::List(vec![]);
        }
        if inner == ":" {
            return ArgValue::Raw(text.to_string());
        }
        let parts = split_top_level(inner, ',');
        // Map literals stay raw.
        if parts.iter().any(|p| split_named(p.trim()).is_some()) {
            return ArgValue::Raw(text.to_string());
        }
        return ArgValue::List(
            parts
                .iter()
                .filter(|p| !p.trim().is_empty())
                .map(|p| parse_value(p))
                .collect(),
        );
    }
    let name_len = text
        .char_indices()
        .take_while(|(_, c)| c.is_ascii_alphanumeric() || *c == '_' || *c == '.' || *c == '$')
        .count();
    if name_len > 0 {
        let rest = text[name_len..].trim_start();
        if rest.starts_with('(') {
            let offset = text.len() - rest.len();
            if matching_close(text, offset) == Some(text.len() - 1) {
                return ArgValue::Call {
                    name: text[..name_len].to_string(),
                    args: Args::parse(rest),
                };
            }
        }
    }
    ArgValue::Raw(text.to_string())
}

/// Returns the unescaped content if `text` is exactly one string literal.
pub fn parse_string_literal(text: &str) -> Option<String> {
    let text = text.trim();
    let quote = if text.starts_with("'''") {
        "'''"
    } else if text.starts_with("\"\"\"") {
        "\"\"\""
    } else if text.starts_with('\'') {
        "'"
    } else if text.starts_with('"') {
        "\""
    } else {
        return None;
    };
    if text.len() < quote.len() * 2 || !text.ends_with(quote) {
        return None;
    }
    let end = string_end(text, 0)?;
    if end != text.len() {
        return None;
    }
    Some(unescape(&text[quote.len()..text.len() - quote.len()]))
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('$') => out.push('$'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Byte index just past the string literal starting at `start`.
fn string_end(text: &str, start: usize) -> Option<usize> {
    let rest = &text[start..];
    let quote = if rest.starts_with("'''") {
        "'''"
    } else if rest.starts_with("\"\"\"") {
        "\"\"\""
    } else if rest.starts_with('\'') {
        "'"
    } else if rest.starts_with('"') {
        "\""
    } else {
        return None;
    };
    let bytes = text.as_bytes();
    let mut i = start + quote.len();
    while i < text.len() {
        if bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        if bytes[i..].starts_with(quote.as_bytes()) {
            return Some(i + quote.len());
        }
        i += 1;
    }
    None
}

/// Index of the bracket closing the one at `open`, respecting strings.
fn matching_close(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = open;
    while i < text.len() {
        match bytes[i] {
            b'\'' | b'"' => {
                i = string_end(text, i)?;
                continue;
            }
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn strip_outer_parens(text: &str) -> Option<&str> {
    if text.starts_with('(') && matching_close(text, 0) == Some(text.len() - 1) {
        Some(&text[1..text.len() - 1])
    } else {
        None
    }
}

/// Split on `sep` outside strings and brackets.
pub fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;
    while i < text.len() {
        match bytes[i] {
            b'\'' | b'"' => match string_end(text, i) {
                Some(end) => {
                    i = end;
                    continue;
                }
                None => break,
            },
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            b if depth == 0 && b == sep as u8 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&text[start..]);
    parts
}

/// `key: value` → `(key, value)` when the colon follows a bare identifier.
fn split_named(part: &str) -> Option<(&str, &str)> {
    let key_len = part
        .char_indices()
        .take_while(|(_, c)| c.is_ascii_alphanumeric() || *c == '_')
        .count();
    if key_len == 0 || part.as_bytes()[0].is_ascii_digit() {
        return None;
    }
    let rest = part[key_len..].trim_start();
    let value = rest.strip_prefix(':')?;
    if value.starts_with(':') {
        return None;
    }
    Some((&part[..key_len], value.trim()))
}
