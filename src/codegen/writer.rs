//! Indent-aware string builder for YAML documents.
//!
//! Structure (nesting, comments, blank lines) is written here; every value
//! goes through [`super::yaml`]. GitHub Actions files use 2-space
//! indentation and sequence items are written as `- key: value` with the
//! following keys aligned under the first.

use serde::Serialize;

use super::yaml;

pub struct YamlWriter {
    buf: String,
    indent_level: usize,
}

impl YamlWriter {
    pub fn new() -> Self {
        Self {
            buf: String::with_capacity(4096),
            indent_level: 0,
        }
    }

    /// Write a complete line at the current indent.
    pub fn line(&mut self, text: &str) {
        for _ in 0..self.indent_level {
            self.buf.push_str("  ");
        }
        self.buf.push_str(text);
        self.buf.push('\n');
    }

    pub fn blank(&mut self) {
        self.buf.push('\n');
    }

    pub fn indent(&mut self) {
        self.indent_level += 1;
    }

    pub fn dedent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    /// `# text`, one comment line per source line.
    pub fn comment(&mut self, text: &str) {
        for l in text.lines() {
            if l.trim().is_empty() {
                self.line("#");
            } else {
                self.line(&format!("# {}", l.trim_end()));
            }
        }
    }

    /// Write `key:` and indent for a nested mapping or sequence.
    pub fn key(&mut self, name: &str) {
        self.line(&format!("{}:", yaml::key(name)));
        self.indent();
    }

    /// `key:` with nothing under it.
    pub fn empty_key(&mut self, name: &str) {
        self.line(&format!("{}:", yaml::key(name)));
    }

    /// Close what [`YamlWriter::key`] or [`YamlWriter::item`] opened.
    pub fn close(&mut self) {
        self.dedent();
    }

    /// `key: value`; strings, numbers, booleans and lists.
    pub fn field<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) {
        self.splice(&yaml::entry(key, value), "", "");
    }

    /// Start a sequence item with its first `key: value`; the rest of the
    /// item is written one level deeper until [`YamlWriter::close`].
    pub fn item<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) {
        self.splice(&yaml::entry(key, value), "- ", "  ");
        self.indent();
    }

    /// A scalar sequence item.
    pub fn item_value<T: Serialize + ?Sized>(&mut self, value: &T) {
        self.splice(&yaml::seq_item(value), "", "");
    }

    /// Serialized lines at the current indent. Empty lines stay empty so
    /// block scalars keep their content.
    fn splice(&mut self, lines: &[String], first: &str, rest: &str) {
        for (i, l) in lines.iter().enumerate() {
            if l.is_empty() {
                self.blank();
            } else {
                self.line(&format!("{}{}", if i == 0 { first } else { rest }, l));
            }
        }
    }

    pub fn finish(self) -> String {
        self.buf
    }
}

impl Default for YamlWriter {
    fn default() -> Self {
        Self::new()
    }
}
