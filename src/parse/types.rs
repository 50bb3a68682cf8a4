//! Block tree produced by the scanner.
//!
//! The tree is untyped: every `name args { … }` construct becomes a [`Block`]
//! and every other logical line becomes a [`Statement`]. Interpretation of
//! directives happens in the lowering pass, so unknown directives survive
//! parsing verbatim.

use serde::Serialize;

use super::args::Args;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockTree {
    pub preamble: Preamble,
    /// The outer `pipeline { … }` block.
    pub pipeline: Block,
    /// Definitions following the pipeline block (`def helper() { … }`).
    pub trailing: Vec<Block>,
}

/// Lines allowed before `pipeline {`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Preamble {
    /// Library names from `@Library('name@ref') _` annotations.
    pub libraries: Vec<String>,
    pub imports: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Item {
    Statement(Statement),
    Block(Block),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    /// Leading identifier, e.g. `sh`, `agent`, `env.FOO`.
    pub name: String,
    /// Everything after the identifier, trimmed.
    pub args: String,
    /// Full statement text with comments removed.
    pub text: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    pub name: String,
    /// Raw header text between the name and `{`, e.g. `('Build')`.
    pub args: String,
    pub items: Vec<Item>,
    /// Raw text between the braces, comments included.
    pub body: String,
    pub line: usize,
}

impl Statement {
    pub fn parsed_args(&self) -> Args {
        Args::parse(&self.args)
    }
}

impl Block {
    pub fn parsed_args(&self) -> Args {
        Args::parse(&self.args)
    }

    /// Header as written, e.g. `stage('Build')`.
    pub fn header(&self) -> String {
        if self.args.is_empty() {
            self.name.clone()
        } else if self.args.starts_with('(') {
            format!("{}{}", self.name, self.args)
        } else {
            format!("{} {}", self.name, self.args)
        }
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.items.iter().filter_map(|i| match i {
            Item::Block(b) => Some(b),
            Item::Statement(_) => None,
        })
    }

    pub fn statements(&self) -> impl Iterator<Item = &Statement> {
        self.items.iter().filter_map(|i| match i {
            Item::Statement(s) => Some(s),
            Item::Block(_) => None,
        })
    }

    pub fn find_block(&self, name: &str) -> Option<&Block> {
        self.blocks().find(|b| b.name == name)
    }

    pub fn find_statement(&self, name: &str) -> Option<&Statement> {
        self.statements().find(|s| s.name == name)
    }

    /// The body collapsed onto one line, used for manual-item snippets.
    pub fn compact_body(&self) -> String {
        compact(&self.body)
    }
}

impl Item {
    pub fn name(&self) -> &str {
        match self {
            Item::Statement(s) => &s.name,
            Item::Block(b) => &b.name,
        }
    }

    pub fn line(&self) -> usize {
        match self {
            Item::Statement(s) => s.line,
            Item::Block(b) => b.line,
        }
    }

    /// Source-like rendering for manual-item snippets.
    pub fn snippet(&self) -> String {
        match self {
            Item::Statement(s) => compact(&s.text),
            Item::Block(b) => format!("{} {{ {} }}", b.header(), b.compact_body()),
        }
    }
}

/// Collapse runs of whitespace into single spaces.
pub fn compact(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_collapses_whitespace() {
        assert_eq!(compact("  a\n   b\tc  "), "a b c");
    }

    #[test]
    fn header_formats_paren_and_bare_args() {
        let mut b = Block {
            name: "stage".into(),
            args: "('Build')".into(),
            items: vec![],
            body: String::new(),
            line: 1,
        };
        assert_eq!(b.header(), "stage('Build')");
        b.name = "withSonarQubeEnv".into();
        b.args = "'sonar'".into();
        assert_eq!(b.header(), "withSonarQubeEnv 'sonar'");
    }
}
