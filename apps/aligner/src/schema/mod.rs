//! Schema Layer: the data contracts every model response must satisfy.
//!
//! Model output arrives as untyped JSON. `validate` turns it into a typed
//! value or fails with a `SchemaValidationError` naming the offending field by
//! path (`matches[2].score`). Nothing is defaulted: a missing or `null`
//! required field is always an error.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub mod analysis;
pub mod generative;

pub use analysis::{
    AnalysisResult, KeywordGap, KeywordGapSet, MatchType, Priority, Provenance, RejectedItem,
    ScoreBreakdown, SectionFailure, SectionOutcome, SemanticMatch, SemanticMatchSet, TaskRecord,
};
pub use generative::{CoverLetter, GroundedCoverLetter, TailoredBullet, TailoredBulletDraft, TailoredBulletSet};

/// The model-backed tasks the engine knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    SemanticMatch,
    KeywordGap,
    CoverLetter,
    TailoredBullets,
}

impl TaskKind {
    pub const ALL: [TaskKind; 4] = [
        TaskKind::SemanticMatch,
        TaskKind::KeywordGap,
        TaskKind::CoverLetter,
        TaskKind::TailoredBullets,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::SemanticMatch => "semantic_matches",
            TaskKind::KeywordGap => "keyword_gaps",
            TaskKind::CoverLetter => "cover_letter",
            TaskKind::TailoredBullets => "tailored_bullets",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("schema validation failed at `{field}`: {message}")]
pub struct SchemaValidationError {
    pub field: String,
    pub message: String,
}

impl SchemaValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// A contract that can be checked against an untyped record.
pub trait Schema: Sized {
    /// Builds the typed value from `value`, reporting errors under path `at`.
    fn from_record(value: &Value, at: &str) -> Result<Self, SchemaValidationError>;
}

/// Validates an untyped record against `T`'s contract.
pub fn validate<T: Schema>(value: &Value) -> Result<T, SchemaValidationError> {
    T::from_record(value, "$")
}

/// Parses raw model text into JSON and validates it.
pub fn validate_text<T: Schema>(raw: &str) -> Result<T, SchemaValidationError> {
    let body = extract_json_object(raw);
    let value: Value = serde_json::from_str(body).map_err(|e| {
        SchemaValidationError::new("$", format!("response is not valid JSON: {e}"))
    })?;
    validate(&value)
}

/// Strips ```json fences and any prose around the outermost JSON object.
pub fn extract_json_object(text: &str) -> &str {
    let text = strip_json_fences(text);
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from model output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Field accessors
// ────────────────────────────────────────────────────────────────────────────

/// Read-only view over one JSON object, producing path-qualified errors.
pub(crate) struct Record<'a> {
    obj: &'a Map<String, Value>,
    at: String,
}

impl<'a> Record<'a> {
    pub fn open(value: &'a Value, at: &str) -> Result<Self, SchemaValidationError> {
        let obj = value.as_object().ok_or_else(|| {
            SchemaValidationError::new(at, format!("expected an object, found {}", json_kind(value)))
        })?;
        Ok(Self {
            obj,
            at: at.to_string(),
        })
    }

    pub fn path(&self, field: &str) -> String {
        if self.at == "$" {
            field.to_string()
        } else {
            format!("{}.{field}", self.at)
        }
    }

    fn required(&self, field: &str) -> Result<&'a Value, SchemaValidationError> {
        match self.obj.get(field) {
            None | Some(Value::Null) => Err(SchemaValidationError::new(
                self.path(field),
                "required field is missing",
            )),
            Some(v) => Ok(v),
        }
    }

    /// A non-blank string.
    pub fn text(&self, field: &str) -> Result<String, SchemaValidationError> {
        let value = self.required(field)?;
        let s = value.as_str().ok_or_else(|| {
            SchemaValidationError::new(
                self.path(field),
                format!("expected a string, found {}", json_kind(value)),
            )
        })?;
        if s.trim().is_empty() {
            return Err(SchemaValidationError::new(self.path(field), "must not be blank"));
        }
        Ok(s.trim().to_string())
    }

    /// A number bounded to [0, 1].
    pub fn unit_score(&self, field: &str) -> Result<f32, SchemaValidationError> {
        let value = self.required(field)?;
        let n = value.as_f64().ok_or_else(|| {
            SchemaValidationError::new(
                self.path(field),
                format!("expected a number, found {}", json_kind(value)),
            )
        })?;
        if !(0.0..=1.0).contains(&n) {
            return Err(SchemaValidationError::new(
                self.path(field),
                format!("must be between 0 and 1, got {n}"),
            ));
        }
        Ok(n as f32)
    }

    /// A string naming one variant of a snake_case enum. Case-insensitive.
    pub fn variant<T: DeserializeOwned>(&self, field: &str) -> Result<T, SchemaValidationError> {
        let raw = self.text(field)?;
        serde_json::from_value(Value::String(raw.to_lowercase())).map_err(|_| {
            SchemaValidationError::new(self.path(field), format!("unrecognised value '{raw}'"))
        })
    }

    /// A non-negative integer id.
    pub fn id<T: DeserializeOwned>(&self, field: &str) -> Result<T, SchemaValidationError> {
        let value = self.required(field)?;
        id_value(value, &self.path(field))
    }

    /// A non-empty array of integer ids.
    pub fn id_list<T: DeserializeOwned>(&self, field: &str) -> Result<Vec<T>, SchemaValidationError> {
        let items = self.list(field)?;
        if items.is_empty() {
            return Err(SchemaValidationError::new(
                self.path(field),
                "must reference at least one id",
            ));
        }
        items
            .iter()
            .enumerate()
            .map(|(i, v)| id_value(v, &format!("{}[{i}]", self.path(field))))
            .collect()
    }

    /// A non-empty array of non-blank strings.
    pub fn text_list(&self, field: &str) -> Result<Vec<String>, SchemaValidationError> {
        let items = self.list(field)?;
        if items.is_empty() {
            return Err(SchemaValidationError::new(self.path(field), "must not be empty"));
        }
        items
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let at = format!("{}[{i}]", self.path(field));
                match v.as_str() {
                    Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
                    Some(_) => Err(SchemaValidationError::new(at, "must not be blank")),
                    None => Err(SchemaValidationError::new(
                        at,
                        format!("expected a string, found {}", json_kind(v)),
                    )),
                }
            })
            .collect()
    }

    /// An array field (may be empty).
    pub fn list(&self, field: &str) -> Result<&'a Vec<Value>, SchemaValidationError> {
        let value = self.required(field)?;
        value.as_array().ok_or_else(|| {
            SchemaValidationError::new(
                self.path(field),
                format!("expected an array, found {}", json_kind(value)),
            )
        })
    }

    /// Validates every element of an array field as `T`.
    pub fn records<T: Schema>(&self, field: &str) -> Result<Vec<T>, SchemaValidationError> {
        self.list(field)?
            .iter()
            .enumerate()
            .map(|(i, v)| T::from_record(v, &format!("{}[{i}]", self.path(field))))
            .collect()
    }
}

fn id_value<T: DeserializeOwned>(value: &Value, at: &str) -> Result<T, SchemaValidationError> {
    if value.as_u64().is_none() {
        return Err(SchemaValidationError::new(
            at,
            format!("expected a non-negative integer id, found {}", json_kind(value)),
        ));
    }
    serde_json::from_value(value.clone())
        .map_err(|e| SchemaValidationError::new(at, format!("id out of range: {e}")))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
