//! WASM entry points for browser use.

use wasm_bindgen::prelude::*;

use crate::codegen::ConversionSummary;
use crate::config::ConvertOptions;
use crate::error::ConvertError;

/// Full conversion with default options.
/// Returns a JSON object with either `files` and `summary` or `errors`.
#[wasm_bindgen]
pub fn convert_jenkinsfile(source: &str) -> JsValue {
    let result = convert_inner(source, None);
    serde_wasm_bindgen::to_value(&result).unwrap_or(JsValue::NULL)
}

/// Full conversion with options given as a TOML document.
#[wasm_bindgen]
pub fn convert_jenkinsfile_with_options(source: &str, options_toml: &str) -> JsValue {
    let result = convert_inner(source, Some(options_toml));
    serde_wasm_bindgen::to_value(&result).unwrap_or(JsValue::NULL)
}

/// Summary only: complexity, feasibility and manual items.
#[wasm_bindgen]
pub fn analyze_jenkinsfile(source: &str) -> JsValue {
    let result = match crate::convert::analyze(source, &ConvertOptions::default()) {
        Ok(summary) => AnalyzeResult::Success { summary },
        Err(errors) => AnalyzeResult::Errors {
            errors: errors.into_iter().map(ErrorDto::from).collect(),
        },
    };
    serde_wasm_bindgen::to_value(&result).unwrap_or(JsValue::NULL)
}

fn convert_inner(source: &str, options_toml: Option<&str>) -> ConvertResult {
    let options = match options_toml.map(ConvertOptions::from_toml_str).transpose() {
        Ok(options) => options.unwrap_or_default(),
        Err(e) => {
            return ConvertResult::Errors {
                errors: vec![ErrorDto::from(e)],
            };
        }
    };

    match crate::convert::convert(source, &options) {
        Ok(output) => ConvertResult::Success {
            files: output
                .files()
                .map(|f| FileDto {
                    path: f.path.clone(),
                    content: f.content.clone(),
                })
                .collect(),
            summary: output.summary,
        },
        Err(errors) => ConvertResult::Errors {
            errors: errors.into_iter().map(ErrorDto::from).collect(),
        },
    }
}

// ---------------------------------------------------------------------------
// DTOs for serialization to JS
// ---------------------------------------------------------------------------

#[derive(serde::Serialize, serde::Deserialize)]
struct ErrorDto {
    code: String,
    phase: String,
    message: String,
    line: Option<usize>,
    stage: Option<String>,
}

impl From<ConvertError> for ErrorDto {
    fn from(e: ConvertError) -> Self {
        ErrorDto {
            code: e.code,
            phase: e.phase.to_string(),
            message: e.message,
            line: e.line,
            stage: e.stage,
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct FileDto {
    path: String,
    content: String,
}

#[derive(serde::Serialize, serde::Deserialize)]
#[serde(tag = "status")]
enum ConvertResult {
    #[serde(rename = "success")]
    Success {
        files: Vec<FileDto>,
        summary: ConversionSummary,
    },
    #[serde(rename = "errors")]
    Errors { errors: Vec<ErrorDto> },
}

#[derive(serde::Serialize, serde::Deserialize)]
#[serde(tag = "status")]
enum AnalyzeResult {
    #[serde(rename = "success")]
    Success { summary: ConversionSummary },
    #[serde(rename = "errors")]
    Errors { errors: Vec<ErrorDto> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_result_is_tagged() {
        let result = convert_inner("pipeline { stages { stage('A') { steps { sh 'a' } } } }", None);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["files"][0]["path"], ".github/workflows/ci.yml");
        assert_eq!(json["summary"]["jobCount"], 1);
    }

    #[test]
    fn bad_options_are_reported_as_errors() {
        let result = convert_inner("pipeline { stages { } }", Some("default-branches = 3"));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "errors");
        assert_eq!(json["errors"][0]["code"], "C001");
        assert_eq!(json["errors"][0]["phase"], "Config");
    }
}
