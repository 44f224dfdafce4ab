//! Prompt/Parse Engine: builds task prompts, validates model output and
//! repairs it within a fixed budget.
//!
//! Flow per task: build prompt → ModelAdapter::complete → extract JSON →
//! Schema validation → (repair prompt and retry on failure) → referential
//! filtering → TaskRecord.
//!
//! Backend failures are never retried here; only schema failures are.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::alignment::prompts::{
    COVER_LETTER_TEMPLATE, KEYWORD_GAP_TEMPLATE, REPAIR_TEMPLATE, SEMANTIC_MATCH_TEMPLATE,
    TAILORED_BULLETS_TEMPLATE,
};
use crate::config::MAX_REPAIR_RETRIES_CAP;
use crate::errors::EngineError;
use crate::llm_client::prompts::{GROUNDING_INSTRUCTION, ID_INSTRUCTION, JSON_ONLY_SYSTEM};
use crate::llm_client::{CompletionOptions, ModelAdapter, Prompt};
use crate::models::{JobDescription, RequirementId, ResumeRecord, Section};
use crate::schema::{
    validate_text, CoverLetter, KeywordGap, KeywordGapSet, Provenance, RejectedItem, Schema,
    SchemaValidationError, SemanticMatch, SemanticMatchSet, TailoredBulletDraft,
    TailoredBulletSet, TaskKind, TaskRecord,
};

/// Rejected responses echoed back in repair prompts are cut to this many chars.
const MAX_ECHOED_RESPONSE_CHARS: usize = 4000;

pub struct PromptEngine {
    adapter: Arc<ModelAdapter>,
    max_repair_retries: u32,
}

impl PromptEngine {
    pub fn new(adapter: Arc<ModelAdapter>, max_repair_retries: u32) -> Self {
        Self {
            adapter,
            max_repair_retries: max_repair_retries.min(MAX_REPAIR_RETRIES_CAP),
        }
    }

    /// Model invocations a single task may spend, first call included.
    pub fn max_attempts(&self) -> u32 {
        1 + self.max_repair_retries
    }

    // ────────────────────────────────────────────────────────────────────────
    // Tasks
    // ────────────────────────────────────────────────────────────────────────

    pub async fn semantic_matches(
        &self,
        resume: &ResumeRecord,
        job: &JobDescription,
    ) -> Result<TaskRecord<Vec<SemanticMatch>>, EngineError> {
        let user = SEMANTIC_MATCH_TEMPLATE
            .replace("{id_instruction}", ID_INSTRUCTION)
            .replace("{facts_json}", &to_json(&resume.facts)?)
            .replace("{requirements_json}", &to_json(&job.requirements)?);

        let (set, provenance): (SemanticMatchSet, _) =
            self.run_task(TaskKind::SemanticMatch, user).await?;

        let fact_ids = resume.fact_ids();
        let requirement_ids = job.requirement_ids();
        let mut items = Vec::new();
        let mut rejected = Vec::new();

        for (index, mut m) in set.matches.into_iter().enumerate() {
            let unknown: Vec<String> = m
                .fact_ids
                .iter()
                .filter(|id| !fact_ids.contains(*id))
                .map(|id| id.to_string())
                .collect();
            let reason = if !unknown.is_empty() {
                Some(format!("unknown fact id(s): {}", unknown.join(", ")))
            } else if !requirement_ids.contains(&m.requirement_id) {
                Some(format!("unknown requirement id: {}", m.requirement_id))
            } else {
                None
            };

            match reason {
                Some(reason) => rejected.push(reject(index, reason, &m)),
                None => {
                    let mut seen = HashSet::new();
                    m.fact_ids.retain(|id| seen.insert(*id));
                    items.push(m);
                }
            }
        }

        log_filtered(TaskKind::SemanticMatch, items.len(), &rejected);
        Ok(TaskRecord {
            items,
            rejected,
            provenance,
        })
    }

    /// `matched` lists requirements already covered so they are not re-suggested.
    pub async fn keyword_gaps(
        &self,
        resume: &ResumeRecord,
        job: &JobDescription,
        matched: &[RequirementId],
    ) -> Result<TaskRecord<Vec<KeywordGap>>, EngineError> {
        let matched_texts: Vec<&str> = matched
            .iter()
            .filter_map(|id| job.requirement(*id))
            .map(|r| r.text.as_str())
            .collect();
        let user = KEYWORD_GAP_TEMPLATE
            .replace("{facts_json}", &to_json(&resume.facts)?)
            .replace("{matched_json}", &to_json(&matched_texts)?)
            .replace("{job_text}", &job.text);

        let (set, provenance): (KeywordGapSet, _) =
            self.run_task(TaskKind::KeywordGap, user).await?;

        let mut seen = HashSet::new();
        let mut items = Vec::new();
        let mut rejected = Vec::new();

        for (index, gap) in set.gaps.into_iter().enumerate() {
            let reason = if !job.contains_term(&gap.keyword) {
                Some("keyword does not appear in the job description")
            } else if resume.mentions(&gap.keyword) {
                Some("keyword already present in the resume")
            } else if !seen.insert(gap.keyword.to_lowercase()) {
                Some("duplicate keyword")
            } else {
                None
            };

            match reason {
                Some(reason) => rejected.push(reject(index, reason.to_string(), &gap)),
                None => items.push(gap),
            }
        }

        log_filtered(TaskKind::KeywordGap, items.len(), &rejected);
        Ok(TaskRecord {
            items,
            rejected,
            provenance,
        })
    }

    /// `strengths` are the analysis strengths, given as emphasis hints.
    pub async fn cover_letter(
        &self,
        resume: &ResumeRecord,
        job: &JobDescription,
        strengths: &[String],
    ) -> Result<TaskRecord<CoverLetter>, EngineError> {
        let user = COVER_LETTER_TEMPLATE
            .replace("{grounding_instruction}", GROUNDING_INSTRUCTION)
            .replace(
                "{candidate_name}",
                resume.candidate_name.as_deref().unwrap_or("(not provided)"),
            )
            .replace("{facts_json}", &to_json(&resume.facts)?)
            .replace("{strengths_json}", &to_json(&strengths)?)
            .replace("{job_text}", &job.text);

        let (letter, provenance) = self.run_task(TaskKind::CoverLetter, user).await?;
        Ok(TaskRecord {
            items: letter,
            rejected: Vec::new(),
            provenance,
        })
    }

    /// Rewrites experience and project facts toward the job.
    pub async fn tailored_bullets(
        &self,
        resume: &ResumeRecord,
        job: &JobDescription,
    ) -> Result<TaskRecord<Vec<TailoredBulletDraft>>, EngineError> {
        let facts = resume.facts_in(&[Section::Experience, Section::Projects]);
        if facts.is_empty() {
            return Err(EngineError::InvalidInput(
                "resume has no experience or project facts to tailor".to_string(),
            ));
        }

        let user = TAILORED_BULLETS_TEMPLATE
            .replace("{grounding_instruction}", GROUNDING_INSTRUCTION)
            .replace("{id_instruction}", ID_INSTRUCTION)
            .replace("{facts_json}", &to_json(&facts)?)
            .replace("{requirements_json}", &to_json(&job.requirements)?);

        let (set, provenance): (TailoredBulletSet, _) =
            self.run_task(TaskKind::TailoredBullets, user).await?;

        let allowed: HashSet<_> = facts.iter().map(|f| f.id).collect();
        let mut items = Vec::new();
        let mut rejected = Vec::new();

        for (index, bullet) in set.bullets.into_iter().enumerate() {
            let unknown: Vec<String> = bullet
                .source_fact_ids
                .iter()
                .filter(|id| !allowed.contains(*id))
                .map(|id| id.to_string())
                .collect();
            if unknown.is_empty() {
                items.push(bullet);
            } else {
                let reason = format!("cites fact id(s) outside the rewritten set: {}", unknown.join(", "));
                rejected.push(reject(index, reason, &bullet));
            }
        }

        log_filtered(TaskKind::TailoredBullets, items.len(), &rejected);
        Ok(TaskRecord {
            items,
            rejected,
            provenance,
        })
    }

    // ────────────────────────────────────────────────────────────────────────
    // Repair loop
    // ────────────────────────────────────────────────────────────────────────

    /// Sends `user` and validates the reply as `T`. A validation failure
    /// triggers a repair prompt carrying the error and the rejected text, up
    /// to `max_repair_retries` times.
    pub async fn run_task<T: Schema>(
        &self,
        task: TaskKind,
        user: String,
    ) -> Result<(T, Provenance), EngineError> {
        let options = options_for(task);
        let mut prompt = Prompt::new(JSON_ONLY_SYSTEM, user.clone());
        let max_attempts = self.max_attempts();
        let mut last_error = SchemaValidationError::new("$", "no response received");

        for attempt in 1..=max_attempts {
            let completion = self.adapter.complete(&prompt, &options).await?;

            match validate_text::<T>(&completion.text) {
                Ok(value) => {
                    info!(
                        "{task} validated on attempt {attempt}/{max_attempts} ({}:{})",
                        completion.backend.as_str(),
                        completion.model
                    );
                    return Ok((
                        value,
                        Provenance {
                            backend: completion.backend,
                            model: completion.model,
                            generated_at: Utc::now(),
                            attempts: attempt,
                        },
                    ));
                }
                Err(e) => {
                    warn!("{task} attempt {attempt}/{max_attempts} failed validation: {e}");
                    let repair = REPAIR_TEMPLATE
                        .replace("{previous}", &truncate(&completion.text, MAX_ECHOED_RESPONSE_CHARS))
                        .replace("{error}", &e.to_string());
                    prompt = Prompt::new(JSON_ONLY_SYSTEM, format!("{user}{repair}"));
                    last_error = e;
                }
            }
        }

        Err(EngineError::UnparseableModelResponse {
            task,
            attempts: max_attempts,
            last_error,
        })
    }
}

fn options_for(task: TaskKind) -> CompletionOptions {
    let defaults = CompletionOptions::default();
    match task {
        TaskKind::SemanticMatch | TaskKind::KeywordGap => defaults,
        TaskKind::CoverLetter | TaskKind::TailoredBullets => CompletionOptions {
            temperature: 0.4,
            ..defaults
        },
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, EngineError> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn reject<T: Serialize>(index: usize, reason: String, item: &T) -> RejectedItem {
    RejectedItem {
        index,
        reason,
        item: serde_json::to_value(item).unwrap_or_else(|_| json!(null)),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

fn log_filtered(task: TaskKind, kept: usize, rejected: &[RejectedItem]) {
    if rejected.is_empty() {
        info!("{task}: {kept} items");
        return;
    }
    for r in rejected {
        warn!("{task}: rejected item {}: {}", r.index, r.reason);
    }
    info!("{task}: {kept} items, {} rejected", rejected.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::mock::ScriptedBackend;
    use crate::llm_client::{BackendKind, CompletionBackend, LlmError};
    use crate::models::{FactId, JobRequirement, ResumeFact};
    use std::time::Duration;

    fn resume() -> ResumeRecord {
        ResumeRecord {
            candidate_name: Some("Jordan Lee".to_string()),
            facts: vec![
                ResumeFact {
                    id: FactId(1),
                    section: Section::Experience,
                    text: "Led a team of 5 engineers".to_string(),
                },
                ResumeFact {
                    id: FactId(2),
                    section: Section::Skills,
                    text: "Docker, Terraform".to_string(),
                },
            ],
        }
    }

    fn job() -> JobDescription {
        JobDescription::new(
            "We need People Management skills, Docker and Kubernetes experience.",
            Some(vec![
                JobRequirement {
                    id: RequirementId(1),
                    text: "People Management".to_string(),
                },
                JobRequirement {
                    id: RequirementId(2),
                    text: "Kubernetes".to_string(),
                },
            ]),
        )
    }

    fn engine_with(backend: Arc<ScriptedBackend>, retries: u32) -> PromptEngine {
        let adapter = ModelAdapter::new(
            vec![backend as Arc<dyn CompletionBackend>],
            Duration::from_secs(5),
        );
        PromptEngine::new(Arc::new(adapter), retries)
    }

    const LEADERSHIP_MATCH: &str = r#"{"matches": [{"fact_ids": [1], "requirement_id": 1, "score": 0.85,
        "match_type": "semantic", "reasoning": "Leading a team of 5 engineers shows team leadership, which is people management"}]}"#;

    #[tokio::test]
    async fn test_team_lead_fact_matches_people_management() {
        let backend = Arc::new(ScriptedBackend::always(BackendKind::Local, LEADERSHIP_MATCH));
        let engine = engine_with(backend.clone(), 2);

        let record = engine.semantic_matches(&resume(), &job()).await.unwrap();
        assert_eq!(record.items.len(), 1);
        let m = &record.items[0];
        assert_eq!(m.fact_ids, vec![FactId(1)]);
        assert_eq!(m.requirement_id, RequirementId(1));
        assert!(m.score > 0.0);
        assert!(m.reasoning.to_lowercase().contains("team leadership"));
        assert_eq!(record.provenance.attempts, 1);
        assert_eq!(record.provenance.backend, BackendKind::Local);

        // Facts and requirements are embedded verbatim.
        let prompt = &backend.prompts()[0];
        assert!(prompt.user.contains("Led a team of 5 engineers"));
        assert!(prompt.user.contains("People Management"));
    }

    #[tokio::test]
    async fn test_malformed_output_exhausts_repair_budget() {
        let backend = Arc::new(ScriptedBackend::always(BackendKind::Local, "I cannot produce JSON today"));
        let engine = engine_with(backend.clone(), 2);

        let err = engine.semantic_matches(&resume(), &job()).await.unwrap_err();
        match err {
            EngineError::UnparseableModelResponse {
                task,
                attempts,
                last_error,
            } => {
                assert_eq!(task, TaskKind::SemanticMatch);
                assert_eq!(attempts, 3);
                assert_eq!(last_error.field, "$");
            }
            other => panic!("expected UnparseableModelResponse, got {other:?}"),
        }
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn test_zero_retry_budget_means_one_attempt() {
        let backend = Arc::new(ScriptedBackend::always(BackendKind::Local, "{}"));
        let engine = engine_with(backend.clone(), 0);

        assert!(engine.keyword_gaps(&resume(), &job(), &[]).await.is_err());
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_repair_prompt_echoes_error_and_previous_response() {
        let backend = Arc::new(ScriptedBackend::sequence(
            BackendKind::Hosted,
            vec![
                r#"{"matches": [{"fact_ids": [1], "requirement_id": 1, "match_type": "exact", "reasoning": "x"}]}"#,
                LEADERSHIP_MATCH,
            ],
        ));
        let engine = engine_with(backend.clone(), 2);

        let record = engine.semantic_matches(&resume(), &job()).await.unwrap();
        assert_eq!(record.provenance.attempts, 2);
        assert_eq!(backend.calls(), 2);

        let repair = &backend.prompts()[1].user;
        assert!(repair.contains("YOUR PREVIOUS RESPONSE WAS REJECTED"));
        assert!(repair.contains("matches[0].score"));
        assert!(repair.contains("\"match_type\": \"exact\""));
        assert!(repair.starts_with("SEMANTIC MATCH TASK"));
    }

    #[tokio::test]
    async fn test_backend_errors_are_not_retried() {
        let backend = Arc::new(ScriptedBackend::new(BackendKind::Local, |_| {
            Err(LlmError::Api {
                status: 500,
                message: "boom".to_string(),
            })
        }));
        let engine = engine_with(backend.clone(), 2);

        let err = engine.semantic_matches(&resume(), &job()).await.unwrap_err();
        assert!(matches!(err, EngineError::Backend(LlmError::Api { status: 500, .. })));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_ids_are_rejected_not_dropped() {
        let reply = r#"{"matches": [
            {"fact_ids": [1], "requirement_id": 1, "score": 0.9, "match_type": "semantic", "reasoning": "leadership"},
            {"fact_ids": [9], "requirement_id": 1, "score": 0.9, "match_type": "semantic", "reasoning": "made up"},
            {"fact_ids": [2], "requirement_id": 42, "score": 0.6, "match_type": "transferable", "reasoning": "made up"}
        ]}"#;
        let engine = engine_with(Arc::new(ScriptedBackend::always(BackendKind::Local, reply)), 2);

        let record = engine.semantic_matches(&resume(), &job()).await.unwrap();
        let known = resume().fact_ids();
        assert!(record
            .items
            .iter()
            .all(|m| m.fact_ids.iter().all(|id| known.contains(id))));
        assert_eq!(record.items.len(), 1);
        assert_eq!(record.rejected.len(), 2);
        assert_eq!(record.rejected[0].index, 1);
        assert!(record.rejected[0].reason.contains("unknown fact id"));
        assert!(record.rejected[1].reason.contains("unknown requirement id"));
    }

    #[tokio::test]
    async fn test_kubernetes_gap_reported_when_in_job_text() {
        let reply = r#"{"gaps": [
            {"keyword": "Kubernetes", "priority": "high", "suggested_section": "skills",
             "context_in_job": "Kubernetes experience", "integration_suggestion": "Add Kubernetes to skills"},
            {"keyword": "Ansible", "priority": "low", "suggested_section": "skills",
             "context_in_job": "n/a", "integration_suggestion": "Add Ansible"},
            {"keyword": "Docker", "priority": "medium", "suggested_section": "skills",
             "context_in_job": "n/a", "integration_suggestion": "Add Docker"},
            {"keyword": "kubernetes", "priority": "high", "suggested_section": "skills",
             "context_in_job": "Kubernetes experience", "integration_suggestion": "again"}
        ]}"#;
        let engine = engine_with(Arc::new(ScriptedBackend::always(BackendKind::Local, reply)), 2);
        let jd = job();

        let record = engine.keyword_gaps(&resume(), &jd, &[RequirementId(1)]).await.unwrap();
        assert_eq!(record.items.len(), 1);
        assert_eq!(record.items[0].keyword, "Kubernetes");
        assert!(record.items.iter().all(|g| jd.contains_term(&g.keyword)));
        let reasons: Vec<&str> = record.rejected.iter().map(|r| r.reason.as_str()).collect();
        assert_eq!(
            reasons,
            vec![
                "keyword does not appear in the job description",
                "keyword already present in the resume",
                "duplicate keyword",
            ]
        );
    }

    #[tokio::test]
    async fn test_no_kubernetes_gap_when_absent_from_job_text() {
        let reply = r#"{"gaps": [{"keyword": "Kubernetes", "priority": "high", "suggested_section": "skills",
             "context_in_job": "k8s", "integration_suggestion": "Add Kubernetes"}]}"#;
        let engine = engine_with(Arc::new(ScriptedBackend::always(BackendKind::Local, reply)), 2);
        let jd = JobDescription::from_text("We need People Management skills.");

        let record = engine.keyword_gaps(&resume(), &jd, &[]).await.unwrap();
        assert!(record.items.iter().all(|g| g.keyword != "Kubernetes"));
        assert_eq!(record.rejected.len(), 1);
    }

    #[tokio::test]
    async fn test_gap_survives_longer_resume_word_containing_it() {
        let reply = r#"{"gaps": [
            {"keyword": "Java", "priority": "high", "suggested_section": "skills",
             "context_in_job": "Java", "integration_suggestion": "Add Java"},
            {"keyword": "Go", "priority": "medium", "suggested_section": "skills",
             "context_in_job": "Go", "integration_suggestion": "Add Go"},
            {"keyword": "Kubernetes", "priority": "high", "suggested_section": "skills",
             "context_in_job": "Kubernetes", "integration_suggestion": "Add Kubernetes"}
        ]}"#;
        let engine = engine_with(Arc::new(ScriptedBackend::always(BackendKind::Local, reply)), 2);
        let resume = ResumeRecord {
            candidate_name: None,
            facts: vec![
                ResumeFact {
                    id: FactId(1),
                    section: Section::Skills,
                    text: "JavaScript, TypeScript".to_string(),
                },
                ResumeFact {
                    id: FactId(2),
                    section: Section::Experience,
                    text: "Worked at Google on search ranking".to_string(),
                },
            ],
        };
        let jd = JobDescription::from_text("- Java\n- Go\n- Kubernetes");

        let record = engine.keyword_gaps(&resume, &jd, &[]).await.unwrap();
        let kept: Vec<&str> = record.items.iter().map(|g| g.keyword.as_str()).collect();
        assert_eq!(kept, vec!["Java", "Go", "Kubernetes"]);
        assert!(record.rejected.is_empty());
    }

    #[tokio::test]
    async fn test_gap_prompt_lists_matched_requirements() {
        let backend = Arc::new(ScriptedBackend::always(BackendKind::Local, r#"{"gaps": []}"#));
        let engine = engine_with(backend.clone(), 2);

        let record = engine.keyword_gaps(&resume(), &job(), &[RequirementId(1)]).await.unwrap();
        assert!(record.items.is_empty());
        let prompt = &backend.prompts()[0].user;
        assert!(prompt.contains("ALREADY MATCHED REQUIREMENTS"));
        assert!(prompt.contains("\"People Management\""));
    }

    #[tokio::test]
    async fn test_tailored_bullets_reject_foreign_citations() {
        let reply = r#"{"bullets": [
            {"text": "Led a team of 5 engineers", "source_fact_ids": [1]},
            {"text": "Expert in Docker", "source_fact_ids": [2]}
        ]}"#;
        let engine = engine_with(Arc::new(ScriptedBackend::always(BackendKind::Local, reply)), 2);

        let record = engine.tailored_bullets(&resume(), &job()).await.unwrap();
        assert_eq!(record.items.len(), 1);
        assert_eq!(record.rejected.len(), 1);
    }

    #[tokio::test]
    async fn test_tailoring_requires_experience_facts() {
        let engine = engine_with(Arc::new(ScriptedBackend::always(BackendKind::Local, "{}")), 2);
        let skills_only = ResumeRecord {
            candidate_name: None,
            facts: vec![ResumeFact {
                id: FactId(1),
                section: Section::Skills,
                text: "Rust".to_string(),
            }],
        };
        let err = engine.tailored_bullets(&skills_only, &job()).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[test]
    fn test_truncate_marks_cut() {
        assert_eq!(truncate("abcdef", 3), "abc…");
        assert_eq!(truncate("abc", 3), "abc");
    }
}
