//! Brace-balance scanner: source text → [`BlockTree`].
//!
//! Tracks string state (`'…'`, `"…"`, `'''…'''`, `"""…"""`, `${…}` inside
//! GStrings) and comment state, so braces inside literals never move block
//! boundaries.

use crate::error::ConvertError;

use super::args::Args;
use super::types::{Block, BlockTree, Item, Preamble, Statement};

/// Trailing tokens that continue a statement onto the next line.
const CONTINUATION_SUFFIXES: &[&str] = &[",", "&&", "||", "+", "(", "["];
/// Leading tokens that continue the previous line's statement.
const CONTINUATION_PREFIXES: &[&str] = &[".", "&&", "||", "?", ":"];

pub struct Scanner {
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl Scanner {
    pub fn new(source: &str) -> Self {
        Scanner {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    pub fn parse_document(mut self) -> Result<BlockTree, ConvertError> {
        if self.starts_with("#!") {
            self.skip_line();
        }
        let preamble = self.parse_preamble()?;

        self.skip_trivia()?;
        let word = self.peek_word();
        let line = self.line;
        match word.as_str() {
            "pipeline" => {}
            "node" => {
                return Err(ConvertError::parse(
                    "P002",
                    "scripted pipeline (`node { … }`) is not supported; only declarative `pipeline { … }` sources convert",
                    line,
                ));
            }
            "" if self.peek().is_none() => {
                return Err(ConvertError::parse("P001", "empty source, expected `pipeline {`", line));
            }
            _ => {
                return Err(ConvertError::parse(
                    "P001",
                    format!("expected `pipeline {{`, found `{}`", self.snippet_here()),
                    line,
                ));
            }
        }

        let pipeline = match self.parse_item()? {
            Item::Block(b) if b.name == "pipeline" && b.args.is_empty() => b,
            _ => {
                return Err(ConvertError::parse("P001", "`pipeline` must be followed by `{`", line));
            }
        };

        let mut trailing = Vec::new();
        loop {
            self.skip_trivia()?;
            if self.peek().is_none() {
                break;
            }
            let line = self.line;
            match self.parse_item()? {
                Item::Block(b) if b.name == "def" || b.name == "void" => trailing.push(b),
                other => {
                    return Err(ConvertError::parse(
                        "P006",
                        format!("unexpected content after the pipeline block: `{}`", other.snippet()),
                        line,
                    ));
                }
            }
        }

        Ok(BlockTree {
            preamble,
            pipeline,
            trailing,
        })
    }

    fn parse_preamble(&mut self) -> Result<Preamble, ConvertError> {
        let mut preamble = Preamble::default();
        loop {
            self.skip_trivia()?;
            if self.peek() == Some('@') {
                let (text, _) = self.read_statement()?;
                if let Some(rest) = text.trim().strip_prefix("@Library") {
                    let rest = rest.trim().trim_end_matches('_').trim();
                    let args = Args::parse(rest);
                    for value in args.positional.iter().chain(args.named.values()) {
                        preamble.libraries.extend(value.string_items());
                    }
                }
            } else if self.peek_word() == "import" {
                let (text, _) = self.read_statement()?;
                preamble.imports.push(text.trim().to_string());
            } else {
                return Ok(preamble);
            }
        }
    }

    /// Parse items until `}` or end of input. The caller consumes the `}`.
    fn parse_items(&mut self) -> Result<Vec<Item>, ConvertError> {
        let mut items = Vec::new();
        loop {
            self.skip_trivia()?;
            match self.peek() {
                None | Some('}') => return Ok(items),
                Some(';') => {
                    self.bump();
                }
                Some(_) => items.push(self.parse_item()?),
            }
        }
    }

    fn parse_item(&mut self) -> Result<Item, ConvertError> {
        let line = self.line;
        let (text, opens_block) = self.read_statement()?;
        let (name, args) = split_head(&text);

        if !opens_block {
            if text.trim().is_empty() {
                // A stray closing bracket or similar; report it as unbalanced.
                return Err(ConvertError::parse(
                    "P004",
                    format!("unexpected `{}`", self.snippet_here()),
                    line,
                ));
            }
            return Ok(Item::Statement(Statement {
                name,
                args,
                text: text.trim().to_string(),
                line,
            }));
        }

        self.bump(); // '{'
        let body_start = self.pos;
        let items = self.parse_items()?;
        if self.peek() != Some('}') {
            return Err(ConvertError::parse(
                "P004",
                format!("unbalanced braces: block `{}` opened here is never closed", compact_head(&text)),
                line,
            ));
        }
        let body: String = self.chars[body_start..self.pos].iter().collect();
        self.bump(); // '}'

        Ok(Item::Block(Block {
            name,
            args,
            items,
            body,
            line,
        }))
    }

    /// Read one logical statement. Returns its text and whether it is the
    /// header of a block (the scanner is then positioned on `{`).
    fn read_statement(&mut self) -> Result<(String, bool), ConvertError> {
        let mut buf = String::new();
        let mut depth = 0usize;
        let start_line = self.line;

        loop {
            let Some(c) = self.peek() else {
                if depth > 0 {
                    return Err(ConvertError::parse(
                        "P004",
                        "unbalanced brackets: statement never closes",
                        start_line,
                    ));
                }
                return Ok((buf, false));
            };
            match c {
                '\'' | '"' => {
                    let s = self.read_string()?;
                    buf.push_str(&s);
                }
                '/' if self.peek_at(1) == Some('/') => self.skip_line_comment(),
                '/' if self.peek_at(1) == Some('*') => self.skip_block_comment()?,
                '(' | '[' => {
                    depth += 1;
                    buf.push(c);
                    self.bump();
                }
                ')' | ']' => {
                    if depth == 0 {
                        return Err(ConvertError::parse(
                            "P004",
                            format!("unbalanced brackets: unexpected `{c}`"),
                            self.line,
                        ));
                    }
                    depth -= 1;
                    buf.push(c);
                    self.bump();
                }
                '{' if depth == 0 => return Ok((buf, true)),
                '{' => {
                    depth += 1;
                    buf.push(c);
                    self.bump();
                }
                '}' if depth == 0 => return Ok((buf, false)),
                '}' => {
                    depth -= 1;
                    buf.push(c);
                    self.bump();
                }
                ';' if depth == 0 => {
                    self.bump();
                    return Ok((buf, false));
                }
                '\n' if depth > 0 => {
                    buf.push('\n');
                    self.bump();
                }
                '\n' => {
                    let trimmed = buf.trim_end();
                    if !trimmed.is_empty()
                        && CONTINUATION_SUFFIXES.iter().any(|s| trimmed.ends_with(s))
                    {
                        buf.push('\n');
                        self.bump();
                        continue;
                    }
                    match self.next_significant() {
                        Some(p) if self.chars[p] == '{' => {
                            self.skip_trivia()?;
                            return Ok((buf, true));
                        }
                        Some(p) if CONTINUATION_PREFIXES.iter().any(|s| self.starts_with_at(p, s)) => {
                            buf.push('\n');
                            self.bump();
                        }
                        _ => {
                            self.bump();
                            return Ok((buf, false));
                        }
                    }
                }
                _ => {
                    buf.push(c);
                    self.bump();
                }
            }
        }
    }

    /// Read a string literal verbatim, quotes included.
    fn read_string(&mut self) -> Result<String, ConvertError> {
        let start_line = self.line;
        let quote: &str = if self.starts_with("'''") {
            "'''"
        } else if self.starts_with("\"\"\"") {
            "\"\"\""
        } else if self.peek() == Some('\'') {
            "'"
        } else {
            "\""
        };
        let triple = quote.len() == 3;
        let interpolates = quote.starts_with('"');

        let mut out = String::from(quote);
        for _ in 0..quote.len() {
            self.bump();
        }
        loop {
            let Some(c) = self.peek() else {
                return Err(ConvertError::parse(
                    "P003",
                    format!("unterminated string starting with {quote}"),
                    start_line,
                ));
            };
            if c == '\\' {
                out.push(c);
                self.bump();
                if let Some(next) = self.peek() {
                    out.push(next);
                    self.bump();
                }
                continue;
            }
            if self.starts_with(quote) {
                out.push_str(quote);
                for _ in 0..quote.len() {
                    self.bump();
                }
                return Ok(out);
            }
            if c == '\n' && !triple {
                return Err(ConvertError::parse(
                    "P003",
                    format!("unterminated string starting with {quote}"),
                    start_line,
                ));
            }
            if interpolates && c == '$' && self.peek_at(1) == Some('{') {
                self.read_interpolation(&mut out, start_line)?;
                continue;
            }
            out.push(c);
            self.bump();
        }
    }

    /// Copy a `${ … }` span, balancing braces.
    fn read_interpolation(&mut self, out: &mut String, start_line: usize) -> Result<(), ConvertError> {
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            out.push(c);
            self.bump();
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
        Err(ConvertError::parse(
            "P003",
            "unterminated `${` interpolation",
            start_line,
        ))
    }

    /// Skip whitespace (newlines included) and comments.
    fn skip_trivia(&mut self) -> Result<(), ConvertError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek_at(1) == Some('/') => self.skip_line_comment(),
                Some('/') if self.peek_at(1) == Some('*') => self.skip_block_comment()?,
                _ => return Ok(()),
            }
        }
    }

    /// Position of the next non-whitespace, non-comment char, without moving.
    fn next_significant(&self) -> Option<usize> {
        let mut p = self.pos;
        while p < self.chars.len() {
            let c = self.chars[p];
            if c.is_whitespace() {
                p += 1;
            } else if c == '/' && self.chars.get(p + 1) == Some(&'/') {
                while p < self.chars.len() && self.chars[p] != '\n' {
                    p += 1;
                }
            } else if c == '/' && self.chars.get(p + 1) == Some(&'*') {
                p += 2;
                while p + 1 < self.chars.len() && !(self.chars[p] == '*' && self.chars[p + 1] == '/') {
                    p += 1;
                }
                p += 2;
            } else {
                return Some(p);
            }
        }
        None
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                return;
            }
            self.bump();
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), ConvertError> {
        let start_line = self.line;
        self.bump();
        self.bump();
        while self.peek().is_some() {
            if self.starts_with("*/") {
                self.bump();
                self.bump();
                return Ok(());
            }
            self.bump();
        }
        Err(ConvertError::parse("P005", "unterminated block comment", start_line))
    }

    fn skip_line(&mut self) {
        self.skip_line_comment();
        self.bump();
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn peek_word(&self) -> String {
        self.chars[self.pos..]
            .iter()
            .take_while(|c| c.is_alphanumeric() || **c == '_')
            .collect()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn starts_with(&self, s: &str) -> bool {
        self.starts_with_at(self.pos, s)
    }

    fn starts_with_at(&self, at: usize, s: &str) -> bool {
        let mut p = at;
        for c in s.chars() {
            if self.chars.get(p) != Some(&c) {
                return false;
            }
            p += 1;
        }
        true
    }

    fn snippet_here(&self) -> String {
        self.chars[self.pos..]
            .iter()
            .take_while(|c| **c != '\n')
            .take(40)
            .collect::<String>()
            .trim()
            .to_string()
    }
}

/// `stage('Build')` → (`stage`, `('Build')`); `sh 'make'` → (`sh`, `'make'`).
fn split_head(text: &str) -> (String, String) {
    let text = text.trim();
    let name_len = text
        .char_indices()
        .take_while(|(_, c)| c.is_alphanumeric() || *c == '_' || *c == '.' || *c == '$' || *c == '@')
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0);
    (
        text[..name_len].to_string(),
        text[name_len..].trim().to_string(),
    )
}

fn compact_head(text: &str) -> String {
    super::types::compact(text)
}
