//! Parse phase: Jenkinsfile text → block tree.

pub mod args;
mod scanner;
pub mod types;

pub use args::{ArgValue, Args};
pub use types::*;

use crate::error::ConvertError;

/// Scan a declarative Jenkinsfile into an untyped [`BlockTree`].
pub fn parse(source: &str) -> Result<BlockTree, ConvertError> {
    let tree = scanner::Scanner::new(source).parse_document()?;
    log::debug!(
        "parsed pipeline block: {} top-level items, {} trailing definitions",
        tree.pipeline.items.len(),
        tree.trailing.len()
    );
    Ok(tree)
}
