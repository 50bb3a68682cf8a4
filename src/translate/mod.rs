//! Jenkins → GitHub Actions translators.
//!
//! Each translator is a pure function over IR fragments. They return `None`
//! (or a degradation reason) instead of guessing when a construct falls
//! outside what they can map faithfully.

pub mod condition;
pub mod credentials;
pub mod post;
pub mod runner;
pub mod schedule;
pub mod variables;

/// Quote a string for use inside a GitHub Actions expression.
pub fn expr_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
