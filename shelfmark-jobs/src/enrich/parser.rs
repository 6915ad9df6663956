//! Parsing of the model's structured enrichment output.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use shelfmark_job_queue::JobError;

/// Model output may wrap the JSON object in prose or markdown fences; we
/// take the widest `{...}` span and parse that.
static JSON_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[\s\S]*\}").unwrap());

/// The structured result requested from the model.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentResult {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub detailed_description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Locate and parse the single JSON object inside raw model text.
///
/// Failure is fatal for the job: a model that cannot produce the shape now
/// is unlikely to produce it on a retry, and the raw text is preserved for
/// operator inspection.
pub fn parse_from_model_text(model_text: &str) -> Result<EnrichmentResult, JobError> {
    let trimmed = model_text.trim();
    let Some(found) = JSON_OBJECT.find(trimmed) else {
        return Err(JobError::OutputParsing {
            message: "no JSON object found in model output".into(),
            raw_response: trimmed.to_string(),
        });
    };
    serde_json::from_str(found.as_str()).map_err(|e| JobError::OutputParsing {
        message: format!("model output is not a valid enrichment object: {e}"),
        raw_response: trimmed.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_object() {
        let parsed = parse_from_model_text(
            r#"{"title": "T", "description": "D", "detailedDescription": "DD", "tags": ["a", "b"]}"#,
        )
        .unwrap();
        assert_eq!(parsed.title.as_deref(), Some("T"));
        assert_eq!(parsed.detailed_description.as_deref(), Some("DD"));
        assert_eq!(parsed.tags, vec!["a", "b"]);
    }

    #[test]
    fn extracts_object_from_surrounding_prose() {
        let parsed = parse_from_model_text(
            "Sure! Here is the JSON you asked for:\n```json\n{\"title\": \"T\", \"tags\": []}\n```\nHope that helps.",
        )
        .unwrap();
        assert_eq!(parsed.title.as_deref(), Some("T"));
        assert!(parsed.tags.is_empty());
    }

    #[test]
    fn missing_fields_default() {
        let parsed = parse_from_model_text(r#"{"description": "only this"}"#).unwrap();
        assert!(parsed.title.is_none());
        assert!(parsed.tags.is_empty());
    }

    #[test]
    fn prose_without_json_is_fatal_with_raw_preserved() {
        let err = parse_from_model_text("I cannot help with that.").unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.raw_response(), Some("I cannot help with that."));
    }

    #[test]
    fn broken_json_is_fatal() {
        let err = parse_from_model_text("{\"title\": }").unwrap_err();
        assert!(matches!(err, JobError::OutputParsing { .. }));
    }
}
