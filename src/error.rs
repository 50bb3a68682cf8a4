//! Unified converter error type used across all phases.
//!
//! Only fatal conditions are errors. Fidelity losses are recorded as
//! [`crate::ir::ManualItem`]s and never abort a conversion.

use serde::Serialize;
use thiserror::Error;

use crate::ir::validate::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Parse,
    Lower,
    Validate,
    Resolve,
    Config,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Parse => write!(f, "Parse"),
            Phase::Lower => write!(f, "Lower"),
            Phase::Validate => write!(f, "Validate"),
            Phase::Resolve => write!(f, "Resolve"),
            Phase::Config => write!(f, "Config"),
        }
    }
}

/// A fatal conversion error. Nothing is emitted when one is returned.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("[{phase}:{code}] {message}")]
pub struct ConvertError {
    pub code: String,
    pub phase: Phase,
    pub message: String,
    /// 1-based source line, when the error points at the input text.
    pub line: Option<usize>,
    /// Owning stage name, when the error is scoped to a stage.
    pub stage: Option<String>,
}

impl From<ValidationError> for ConvertError {
    fn from(e: ValidationError) -> Self {
        ConvertError {
            code: e.code.to_string(),
            phase: Phase::Validate,
            message: e.message,
            line: None,
            stage: e.stage,
        }
    }
}

impl ConvertError {
    /// A StructuralParseError: unbalanced blocks, unterminated text or a
    /// non-declarative source.
    pub fn parse(code: &str, message: impl Into<String>, line: usize) -> Self {
        ConvertError {
            code: code.into(),
            phase: Phase::Parse,
            message: format!("line {}: {}", line, message.into()),
            line: Some(line),
            stage: None,
        }
    }

    pub fn lower(code: &str, message: impl Into<String>, stage: Option<String>) -> Self {
        ConvertError {
            code: code.into(),
            phase: Phase::Lower,
            message: message.into(),
            line: None,
            stage,
        }
    }

    pub fn resolve(code: &str, message: impl Into<String>, stage: Option<String>) -> Self {
        ConvertError {
            code: code.into(),
            phase: Phase::Resolve,
            message: message.into(),
            line: None,
            stage,
        }
    }

    pub fn config(code: &str, message: impl Into<String>) -> Self {
        ConvertError {
            code: code.into(),
            phase: Phase::Config,
            message: message.into(),
            line: None,
            stage: None,
        }
    }

    /// True for the StructuralParseError class of failures.
    pub fn is_structural_parse(&self) -> bool {
        self.phase == Phase::Parse
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_phase_and_code() {
        let e = ConvertError::parse("P001", "expected `pipeline {`", 3);
        assert_eq!(e.to_string(), "[Parse:P001] line 3: expected `pipeline {`");
        assert!(e.is_structural_parse());
    }

    #[test]
    fn validation_error_converts_with_stage() {
        let e: ConvertError = ValidationError {
            code: "V002",
            message: "Duplicate stage name 'Build'".into(),
            stage: Some("Build".into()),
        }
        .into();
        assert_eq!(e.phase, Phase::Validate);
        assert_eq!(e.stage.as_deref(), Some("Build"));
        assert!(!e.is_structural_parse());
    }
}
