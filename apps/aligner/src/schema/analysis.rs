//! Contracts for the two analysis tasks and the aggregate `AnalysisResult`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm_client::BackendKind;
use crate::models::{FactId, RequirementId, Section};
use crate::schema::{Record, Schema, SchemaValidationError};

// ────────────────────────────────────────────────────────────────────────────
// Semantic matches
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Same terminology on both sides.
    Exact,
    /// Different words, same concept ("Team Captain" → "Leadership").
    Semantic,
    /// Related skill that carries over ("JavaScript" → "Frontend development").
    Transferable,
}

/// One or more resume facts mapped onto one job requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticMatch {
    pub fact_ids: Vec<FactId>,
    pub requirement_id: RequirementId,
    /// Relative confidence in [0, 1].
    pub score: f32,
    pub match_type: MatchType,
    pub reasoning: String,
}

impl Schema for SemanticMatch {
    fn from_record(value: &Value, at: &str) -> Result<Self, SchemaValidationError> {
        let record = Record::open(value, at)?;
        Ok(SemanticMatch {
            fact_ids: record.id_list("fact_ids")?,
            requirement_id: record.id("requirement_id")?,
            score: record.unit_score("score")?,
            match_type: record.variant("match_type")?,
            reasoning: record.text("reasoning")?,
        })
    }
}

/// Response envelope for the semantic-match task: `{"matches": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticMatchSet {
    pub matches: Vec<SemanticMatch>,
}

impl Schema for SemanticMatchSet {
    fn from_record(value: &Value, at: &str) -> Result<Self, SchemaValidationError> {
        let record = Record::open(value, at)?;
        Ok(SemanticMatchSet {
            matches: record.records("matches")?,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Keyword gaps
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    /// Higher is more urgent. Used for display ordering.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
        }
    }
}

/// A job-description keyword the resume does not mention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordGap {
    pub keyword: String,
    pub priority: Priority,
    pub suggested_section: Section,
    /// The job-description phrase the keyword was found in.
    pub context_in_job: String,
    pub integration_suggestion: String,
}

impl Schema for KeywordGap {
    fn from_record(value: &Value, at: &str) -> Result<Self, SchemaValidationError> {
        let record = Record::open(value, at)?;
        Ok(KeywordGap {
            keyword: record.text("keyword")?,
            priority: record.variant("priority")?,
            suggested_section: record.variant("suggested_section")?,
            context_in_job: record.text("context_in_job")?,
            integration_suggestion: record.text("integration_suggestion")?,
        })
    }
}

/// Response envelope for the keyword-gap task: `{"gaps": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordGapSet {
    pub gaps: Vec<KeywordGap>,
}

impl Schema for KeywordGapSet {
    fn from_record(value: &Value, at: &str) -> Result<Self, SchemaValidationError> {
        let record = Record::open(value, at)?;
        Ok(KeywordGapSet {
            gaps: record.records("gaps")?,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Task records and provenance
// ────────────────────────────────────────────────────────────────────────────

/// Which backend produced a task output, and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub backend: BackendKind,
    pub model: String,
    pub generated_at: DateTime<Utc>,
    /// Model invocations spent, including repair attempts.
    pub attempts: u32,
}

/// An item the model produced that failed a referential check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedItem {
    pub index: usize,
    pub reason: String,
    pub item: Value,
}

/// Validated output of one task run. This is what the cache stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord<T> {
    pub items: T,
    pub rejected: Vec<RejectedItem>,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionFailure {
    /// `backend_unavailable` | `unparseable_response` | `backend_error`
    pub error_kind: String,
    pub message: String,
}

/// Outcome of one analysis section. `Completed` with an empty list means the
/// model found nothing; `Failed` means there is no answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SectionOutcome<T> {
    Completed(TaskRecord<Vec<T>>),
    Failed(SectionFailure),
}

impl<T> SectionOutcome<T> {
    pub fn items(&self) -> Option<&[T]> {
        match self {
            SectionOutcome::Completed(record) => Some(&record.items),
            SectionOutcome::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SectionOutcome::Failed(_))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Aggregate result
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchTypeSummary {
    pub count: usize,
    pub mean_score: f32,
}

/// Per-type match counts and per-priority gap counts for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub exact: MatchTypeSummary,
    pub semantic: MatchTypeSummary,
    pub transferable: MatchTypeSummary,
    pub high_priority_gaps: usize,
    pub medium_priority_gaps: usize,
    pub low_priority_gaps: usize,
}

impl ScoreBreakdown {
    pub fn compute(matches: &[SemanticMatch], gaps: &[KeywordGap]) -> Self {
        let summary = |kind: MatchType| {
            let scores: Vec<f32> = matches
                .iter()
                .filter(|m| m.match_type == kind)
                .map(|m| m.score)
                .collect();
            MatchTypeSummary {
                count: scores.len(),
                mean_score: if scores.is_empty() {
                    0.0
                } else {
                    scores.iter().sum::<f32>() / scores.len() as f32
                },
            }
        };
        let count = |p: Priority| gaps.iter().filter(|g| g.priority == p).count();

        ScoreBreakdown {
            exact: summary(MatchType::Exact),
            semantic: summary(MatchType::Semantic),
            transferable: summary(MatchType::Transferable),
            high_priority_gaps: count(Priority::High),
            medium_priority_gaps: count(Priority::Medium),
            low_priority_gaps: count(Priority::Low),
        }
    }
}

/// Every match and gap for one (resume, job description) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Content fingerprint of the (resume, job description) pair.
    pub fingerprint: String,
    pub semantic_matches: SectionOutcome<SemanticMatch>,
    pub keyword_gaps: SectionOutcome<KeywordGap>,
    /// Share of job requirements covered by at least one match.
    /// `None` when the semantic-match section failed.
    pub alignment_score: Option<f32>,
    pub breakdown: ScoreBreakdown,
    pub strengths: Vec<String>,
    pub recommendations: Vec<String>,
}

impl AnalysisResult {
    pub fn matches(&self) -> &[SemanticMatch] {
        self.semantic_matches.items().unwrap_or_default()
    }

    pub fn gaps(&self) -> &[KeywordGap] {
        self.keyword_gaps.items().unwrap_or_default()
    }

    pub fn is_partial(&self) -> bool {
        self.semantic_matches.is_failed() || self.keyword_gaps.is_failed()
    }
}

const ANALYSIS_REQUIRED: &[&str] = &[
    "fingerprint",
    "semantic_matches",
    "keyword_gaps",
    "breakdown",
    "strengths",
    "recommendations",
];

impl Schema for AnalysisResult {
    fn from_record(value: &Value, at: &str) -> Result<Self, SchemaValidationError> {
        let record = Record::open(value, at)?;
        for field in ANALYSIS_REQUIRED {
            if value.get(*field).map_or(true, Value::is_null) {
                return Err(SchemaValidationError::new(
                    record.path(field),
                    "required field is missing",
                ));
            }
        }

        let result: AnalysisResult = serde_json::from_value(value.clone())
            .map_err(|e| SchemaValidationError::new(at, e.to_string()))?;

        if let Some(score) = result.alignment_score {
            if !(0.0..=1.0).contains(&score) {
                return Err(SchemaValidationError::new(
                    record.path("alignment_score"),
                    format!("must be between 0 and 1, got {score}"),
                ));
            }
        }
        for (i, m) in result.matches().iter().enumerate() {
            if !(0.0..=1.0).contains(&m.score) {
                return Err(SchemaValidationError::new(
                    format!("{}.items[{i}].score", record.path("semantic_matches")),
                    format!("must be between 0 and 1, got {}", m.score),
                ));
            }
            if m.fact_ids.is_empty() {
                return Err(SchemaValidationError::new(
                    format!("{}.items[{i}].fact_ids", record.path("semantic_matches")),
                    "must reference at least one id",
                ));
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::validate;
    use serde_json::json;

    #[test]
    fn test_semantic_match_set_validates() {
        let value = json!({
            "matches": [{
                "fact_ids": [1],
                "requirement_id": 1,
                "score": 0.9,
                "match_type": "Semantic",
                "reasoning": "Leading a team of engineers demonstrates people management"
            }]
        });
        let set: SemanticMatchSet = validate(&value).unwrap();
        assert_eq!(set.matches[0].fact_ids, vec![FactId(1)]);
        assert_eq!(set.matches[0].match_type, MatchType::Semantic);
    }

    #[test]
    fn test_missing_score_is_named() {
        let value = json!({
            "matches": [
                {"fact_ids": [1], "requirement_id": 1, "score": 1.0, "match_type": "exact", "reasoning": "same"},
                {"fact_ids": [2], "requirement_id": 1, "match_type": "exact", "reasoning": "same"}
            ]
        });
        let err = validate::<SemanticMatchSet>(&value).unwrap_err();
        assert_eq!(err.field, "matches[1].score");
    }

    #[test]
    fn test_score_out_of_range_is_rejected() {
        let value = json!({
            "matches": [{"fact_ids": [1], "requirement_id": 1, "score": 1.4, "match_type": "exact", "reasoning": "x"}]
        });
        let err = validate::<SemanticMatchSet>(&value).unwrap_err();
        assert_eq!(err.field, "matches[0].score");
        assert!(err.message.contains("between 0 and 1"));
    }

    #[test]
    fn test_empty_fact_ids_are_rejected() {
        let value = json!({
            "matches": [{"fact_ids": [], "requirement_id": 1, "score": 0.5, "match_type": "semantic", "reasoning": "x"}]
        });
        let err = validate::<SemanticMatchSet>(&value).unwrap_err();
        assert_eq!(err.field, "matches[0].fact_ids");
    }

    #[test]
    fn test_string_ids_are_rejected() {
        let value = json!({
            "matches": [{"fact_ids": ["1"], "requirement_id": 1, "score": 0.5, "match_type": "semantic", "reasoning": "x"}]
        });
        let err = validate::<SemanticMatchSet>(&value).unwrap_err();
        assert_eq!(err.field, "matches[0].fact_ids[0]");
    }

    #[test]
    fn test_gap_priority_must_be_known() {
        let value = json!({
            "gaps": [{
                "keyword": "Kubernetes",
                "priority": "urgent",
                "suggested_section": "skills",
                "context_in_job": "Kubernetes in production",
                "integration_suggestion": "Add it to skills"
            }]
        });
        let err = validate::<KeywordGapSet>(&value).unwrap_err();
        assert_eq!(err.field, "gaps[0].priority");
        assert!(err.message.contains("urgent"));
    }

    #[test]
    fn test_gap_accepts_work_history_section() {
        let value = json!({
            "gaps": [{
                "keyword": "CI/CD",
                "priority": "medium",
                "suggested_section": "work_history",
                "context_in_job": "Maintain CI/CD pipelines",
                "integration_suggestion": "Mention pipeline work"
            }]
        });
        let set: KeywordGapSet = validate(&value).unwrap();
        assert_eq!(set.gaps[0].suggested_section, Section::Experience);
    }

    #[test]
    fn test_missing_envelope_is_hard_failure() {
        let err = validate::<KeywordGapSet>(&json!({})).unwrap_err();
        assert_eq!(err.field, "gaps");
    }

    #[test]
    fn test_empty_gap_list_is_valid() {
        let set: KeywordGapSet = validate(&json!({"gaps": []})).unwrap();
        assert!(set.gaps.is_empty());
    }

    #[test]
    fn test_breakdown_counts_and_means() {
        let matches = vec![
            SemanticMatch {
                fact_ids: vec![FactId(1)],
                requirement_id: RequirementId(1),
                score: 1.0,
                match_type: MatchType::Exact,
                reasoning: "same".into(),
            },
            SemanticMatch {
                fact_ids: vec![FactId(2)],
                requirement_id: RequirementId(2),
                score: 0.6,
                match_type: MatchType::Transferable,
                reasoning: "close".into(),
            },
            SemanticMatch {
                fact_ids: vec![FactId(3)],
                requirement_id: RequirementId(3),
                score: 0.8,
                match_type: MatchType::Transferable,
                reasoning: "close".into(),
            },
        ];
        let breakdown = ScoreBreakdown::compute(&matches, &[]);
        assert_eq!(breakdown.exact.count, 1);
        assert_eq!(breakdown.semantic.count, 0);
        assert_eq!(breakdown.semantic.mean_score, 0.0);
        assert_eq!(breakdown.transferable.count, 2);
        assert!((breakdown.transferable.mean_score - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_section_outcome_serializes_with_status_tag() {
        let failed: SectionOutcome<KeywordGap> = SectionOutcome::Failed(SectionFailure {
            error_kind: "unparseable_response".into(),
            message: "gave up".into(),
        });
        let value = serde_json::to_value(&failed).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["error_kind"], "unparseable_response");
    }
}
