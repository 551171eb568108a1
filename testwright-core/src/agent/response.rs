//! Agent responses and structured-output payloads
//!
//! Every executor returns an [`AgentResponse`]: best-effort free text plus,
//! for roles registered with a [`ResponseSchema`], a decoded JSON value.
//! A missing or malformed payload is `value: None`, never an error.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// The result of one agent invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Free text, possibly empty
    pub text: String,

    /// Decoded structured payload, only for schema roles
    pub value: Option<Value>,
}

impl AgentResponse {
    /// Text-only response
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            value: None,
        }
    }

    /// Response carrying a structured payload
    pub fn structured(text: impl Into<String>, value: Value) -> Self {
        Self {
            text: text.into(),
            value: Some(value),
        }
    }

    /// Decode the structured payload into `T`
    ///
    /// Returns `None` when there is no payload or it does not fit `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Option<T> {
        let value = self.value.as_ref()?;
        match serde_json::from_value(value.clone()) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                debug!(error = %e, "Structured payload did not match the expected type");
                None
            }
        }
    }
}

/// A JSON schema registered for a role's final answer
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    /// Schema name, sent as `json_schema.name`
    pub name: &'static str,

    /// Top-level keys the payload must carry
    pub required: &'static [&'static str],

    /// The JSON schema document
    pub schema: Value,
}

impl ResponseSchema {
    /// Whether `value` is an object carrying every required key
    pub fn accepts(&self, value: &Value) -> bool {
        value
            .as_object()
            .map(|obj| self.required.iter().all(|k| obj.contains_key(*k)))
            .unwrap_or(false)
    }

    /// Find the payload in free text
    ///
    /// Tries the whole text, then the last JSON object in the text that
    /// carries the required keys (fenced or inline).
    pub fn extract(&self, text: &str) -> Option<Value> {
        let trimmed = text.trim();
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            if self.accepts(&value) {
                return Some(value);
            }
        }

        let starts: Vec<usize> = trimmed.match_indices('{').map(|(i, _)| i).collect();
        for start in starts.into_iter().rev() {
            let mut stream =
                serde_json::Deserializer::from_str(&trimmed[start..]).into_iter::<Value>();
            if let Some(Ok(value)) = stream.next() {
                if self.accepts(&value) {
                    return Some(value);
                }
            }
        }

        None
    }

    /// Instructions appended to prompts for executors without native
    /// structured output
    pub fn instructions(&self) -> String {
        format!(
            "End your answer with a single JSON object matching this schema:\n```json\n{}\n```",
            serde_json::to_string_pretty(&self.schema).unwrap_or_default()
        )
    }
}

/// Verifier decision payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierOutput {
    #[serde(rename = "testsExistAndCorrect", alias = "tests_exist_and_correct")]
    pub tests_exist_and_correct: bool,

    #[serde(default)]
    pub feedback: String,
}

impl VerifierOutput {
    pub fn schema() -> ResponseSchema {
        ResponseSchema {
            name: "verifier_output",
            required: &["testsExistAndCorrect"],
            schema: json!({
                "type": "object",
                "properties": {
                    "testsExistAndCorrect": {
                        "type": "boolean",
                        "description": "True when adequate, passing unit tests already exist"
                    },
                    "feedback": {
                        "type": "string",
                        "description": "What is covered, what is missing, and why"
                    }
                },
                "required": ["testsExistAndCorrect", "feedback"],
                "additionalProperties": false
            }),
        }
    }
}

/// Reviewer decision payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewerOutput {
    pub approved: bool,

    #[serde(default)]
    pub feedback: String,
}

impl ReviewerOutput {
    pub fn schema() -> ResponseSchema {
        ResponseSchema {
            name: "reviewer_output",
            required: &["approved"],
            schema: json!({
                "type": "object",
                "properties": {
                    "approved": {
                        "type": "boolean",
                        "description": "True when the tests are ready to merge"
                    },
                    "feedback": {
                        "type": "string",
                        "description": "Review summary or the changes required"
                    }
                },
                "required": ["approved", "feedback"],
                "additionalProperties": false
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_camel_and_snake_case() {
        let camel = AgentResponse::structured(
            "",
            json!({"testsExistAndCorrect": true, "feedback": "ok"}),
        );
        let snake = AgentResponse::structured("", json!({"tests_exist_and_correct": false}));

        assert_eq!(
            camel.decode::<VerifierOutput>(),
            Some(VerifierOutput {
                tests_exist_and_correct: true,
                feedback: "ok".to_string()
            })
        );
        let snake = snake.decode::<VerifierOutput>().unwrap();
        assert!(!snake.tests_exist_and_correct);
        assert!(snake.feedback.is_empty());
    }

    #[test]
    fn test_decode_mismatch_is_none() {
        let response = AgentResponse::structured("", json!({"approved": "maybe"}));
        assert!(response.decode::<ReviewerOutput>().is_none());
        assert!(AgentResponse::text("no payload").decode::<ReviewerOutput>().is_none());
    }

    #[test]
    fn test_extract_from_fenced_block() {
        let text = r#"I looked at the tests.

```json
{"approved": false, "feedback": "cover divide by zero"}
```"#;
        let value = ReviewerOutput::schema().extract(text).unwrap();
        assert_eq!(value["feedback"], "cover divide by zero");
    }

    #[test]
    fn test_extract_takes_last_matching_object() {
        let text =
            r#"Example: {"approved": true}. Final: {"approved": false, "feedback": "x"} done"#;
        let value = ReviewerOutput::schema().extract(text).unwrap();
        assert_eq!(value["approved"], false);
    }

    #[test]
    fn test_extract_ignores_objects_without_required_keys() {
        let text = r#"config is {"timeout": 5}"#;
        assert!(VerifierOutput::schema().extract(text).is_none());
        assert!(VerifierOutput::schema().extract("").is_none());
    }
}
