//! Analysis Orchestrator: runs the alignment tasks through the cache and
//! assembles the records callers see.
//!
//! Flow for `analyze`: semantic matches → keyword gaps (told which
//! requirements are already matched) → alignment score, strengths,
//! recommendations, breakdown. A failed task degrades its own section; only
//! an unreachable backend fails the whole request.

use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use crate::alignment::engine::PromptEngine;
use crate::cache::{Fingerprint, ResultCache};
use crate::config::Config;
use crate::errors::EngineError;
use crate::grounding::{self, GroundingReport, GroundingVerifier};
use crate::llm_client::{LlmError, ModelAdapter};
use crate::models::{JobDescription, RequirementId, ResumeRecord};
use crate::schema::{
    AnalysisResult, GroundedCoverLetter, KeywordGap, MatchType, Priority, ScoreBreakdown,
    SectionFailure, SectionOutcome, SemanticMatch, TailoredBullet, TaskKind, TaskRecord,
};

const TOP_STRENGTHS: usize = 5;
const LOW_ALIGNMENT: f32 = 0.5;
const STRONG_ALIGNMENT: f32 = 0.75;

pub struct AnalysisOrchestrator {
    engine: PromptEngine,
    cache: Arc<ResultCache>,
}

impl AnalysisOrchestrator {
    pub fn new(engine: PromptEngine, cache: Arc<ResultCache>) -> Self {
        Self { engine, cache }
    }

    /// Wires the model adapter, engine and cache from configuration.
    pub fn from_config(config: &Config) -> Result<Self, LlmError> {
        let adapter = ModelAdapter::from_config(config)?;
        let engine = PromptEngine::new(Arc::new(adapter), config.max_repair_retries);
        let cache = ResultCache::new(config.cache_dir.clone());
        Ok(Self::new(engine, Arc::new(cache)))
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub async fn analyze(
        &self,
        resume: &ResumeRecord,
        job: &JobDescription,
    ) -> Result<AnalysisResult, EngineError> {
        check_inputs(resume, job)?;
        let fingerprint = Fingerprint::pair(resume, job);
        info!(
            "Analyzing {} facts against {} requirements ({})",
            resume.facts.len(),
            job.requirements.len(),
            &fingerprint[..12]
        );

        let matches = self
            .cached(TaskKind::SemanticMatch, resume, job, || {
                self.engine.semantic_matches(resume, job)
            })
            .await;
        let matches = fatal_if_unavailable(matches)?;

        // Gaps are only cached alongside a completed semantic section, so a
        // cached gap record always saw the matched-requirement hint.
        let gaps = match &matches {
            Ok(record) => {
                let matched: Vec<RequirementId> = record
                    .items
                    .iter()
                    .map(|m| m.requirement_id)
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                self.cached(TaskKind::KeywordGap, resume, job, || {
                    self.engine.keyword_gaps(resume, job, &matched)
                })
                .await
            }
            Err(_) => self.engine.keyword_gaps(resume, job, &[]).await,
        };
        let gaps = fatal_if_unavailable(gaps)?;

        let semantic_matches = section(TaskKind::SemanticMatch, matches);
        let keyword_gaps = section(TaskKind::KeywordGap, gaps);

        let match_items = semantic_matches.items().unwrap_or_default();
        let gap_items = keyword_gaps.items().unwrap_or_default();
        let alignment_score = semantic_matches
            .items()
            .map(|items| alignment_score(items, job));
        let breakdown = ScoreBreakdown::compute(match_items, gap_items);
        let strengths = strengths(match_items, resume, job);
        let recommendations = recommendations(
            match_items,
            gap_items,
            alignment_score,
            &semantic_matches,
            &keyword_gaps,
            resume,
        );

        let result = AnalysisResult {
            fingerprint,
            semantic_matches,
            keyword_gaps,
            alignment_score,
            breakdown,
            strengths,
            recommendations,
        };
        if result.is_partial() {
            warn!(
                "Analysis {} is partial (semantic failed: {}, gaps failed: {})",
                result.fingerprint,
                result.semantic_matches.is_failed(),
                result.keyword_gaps.is_failed()
            );
        }
        Ok(result)
    }

    /// Generates a cover letter emphasising the analysis strengths, then
    /// screens it. Flagged spans are reported, the letter is returned as is.
    pub async fn cover_letter(
        &self,
        resume: &ResumeRecord,
        job: &JobDescription,
    ) -> Result<GroundedCoverLetter, EngineError> {
        let analysis = self.analyze(resume, job).await?;

        let record = self
            .cached(TaskKind::CoverLetter, resume, job, || {
                self.engine.cover_letter(resume, job, &analysis.strengths)
            })
            .await?;

        let mut reference = job.text.clone();
        if let Some(name) = &resume.candidate_name {
            reference.push(' ');
            reference.push_str(name);
        }
        let grounding = GroundingVerifier::default()
            .with_reference_text(&reference)
            .verify(&record.items.full_text(), &resume.facts);
        let status = grounding.status();
        if !grounding.flagged_spans.is_empty() {
            warn!(
                "Cover letter has {} flagged span(s)",
                grounding.flagged_spans.len()
            );
        }

        Ok(GroundedCoverLetter {
            letter: record.items,
            grounding,
            status,
            provenance: record.provenance,
        })
    }

    /// Rewrites experience and project facts toward the job. Each bullet is
    /// screened against the facts it cites.
    pub async fn tailor_bullets(
        &self,
        resume: &ResumeRecord,
        job: &JobDescription,
    ) -> Result<TaskRecord<Vec<TailoredBullet>>, EngineError> {
        check_inputs(resume, job)?;

        let record = self
            .cached(TaskKind::TailoredBullets, resume, job, || {
                self.engine.tailored_bullets(resume, job)
            })
            .await?;

        let bullets = record
            .items
            .into_iter()
            .map(|draft| {
                let cited: Vec<_> = draft
                    .source_fact_ids
                    .iter()
                    .filter_map(|id| resume.fact(*id).cloned())
                    .collect();
                let grounding = grounding::verify(&draft.text, &cited);
                TailoredBullet {
                    status: grounding.status(),
                    text: draft.text,
                    source_fact_ids: draft.source_fact_ids,
                    grounding,
                }
            })
            .collect();

        Ok(TaskRecord {
            items: bullets,
            rejected: record.rejected,
            provenance: record.provenance,
        })
    }

    /// Screens arbitrary text against the resume facts.
    pub fn verify(&self, text: &str, resume: &ResumeRecord) -> GroundingReport {
        grounding::verify(text, &resume.facts)
    }

    /// Drops every cached task result for the pair. Returns how many entries went.
    pub async fn invalidate(
        &self,
        resume: &ResumeRecord,
        job: &JobDescription,
    ) -> Result<usize, EngineError> {
        let mut removed = 0;
        for task in TaskKind::ALL {
            if self
                .cache
                .invalidate(&Fingerprint::of(task, resume, job))
                .await?
            {
                removed += 1;
            }
        }
        info!("Invalidated {removed} cache entries");
        Ok(removed)
    }

    async fn cached<T, F, Fut>(
        &self,
        task: TaskKind,
        resume: &ResumeRecord,
        job: &JobDescription,
        compute: F,
    ) -> Result<TaskRecord<T>, EngineError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TaskRecord<T>, EngineError>>,
    {
        let key = Fingerprint::of(task, resume, job);
        self.cache.get_or_compute(&key, compute).await
    }
}

fn check_inputs(resume: &ResumeRecord, job: &JobDescription) -> Result<(), EngineError> {
    resume.check().map_err(EngineError::InvalidInput)?;
    if job.text.trim().is_empty() {
        return Err(EngineError::InvalidInput(
            "job description text is empty".to_string(),
        ));
    }
    if job.requirements.is_empty() {
        return Err(EngineError::InvalidInput(
            "job description yields no requirements".to_string(),
        ));
    }
    Ok(())
}

/// Lifts `BackendUnavailable` out as a request error; anything else stays a
/// section outcome.
fn fatal_if_unavailable<T>(
    result: Result<T, EngineError>,
) -> Result<Result<T, EngineError>, EngineError> {
    match result {
        Err(EngineError::BackendUnavailable(tried)) => {
            Err(EngineError::BackendUnavailable(tried))
        }
        other => Ok(other),
    }
}

fn section<T>(
    task: TaskKind,
    result: Result<TaskRecord<Vec<T>>, EngineError>,
) -> SectionOutcome<T> {
    match result {
        Ok(record) => SectionOutcome::Completed(record),
        Err(e) => {
            warn!("{task} section failed: {e}");
            SectionOutcome::Failed(SectionFailure {
                error_kind: e.kind().to_string(),
                message: e.to_string(),
            })
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Derived fields
// ────────────────────────────────────────────────────────────────────────────

/// Share of requirements covered by at least one match.
fn alignment_score(matches: &[SemanticMatch], job: &JobDescription) -> f32 {
    if job.requirements.is_empty() {
        return 0.0;
    }
    let covered: HashSet<RequirementId> = matches.iter().map(|m| m.requirement_id).collect();
    (covered.len() as f32 / job.requirements.len() as f32).min(1.0)
}

fn strengths(matches: &[SemanticMatch], resume: &ResumeRecord, job: &JobDescription) -> Vec<String> {
    let mut ranked: Vec<&SemanticMatch> = matches.iter().collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

    ranked
        .into_iter()
        .take(TOP_STRENGTHS)
        .map(|m| {
            let requirement = job
                .requirement(m.requirement_id)
                .map(|r| r.text.as_str())
                .unwrap_or_default();
            format!(
                "{} aligns with {} (score: {:.2})",
                fact_texts(m, resume),
                requirement,
                m.score
            )
        })
        .collect()
}

fn recommendations(
    matches: &[SemanticMatch],
    gaps: &[KeywordGap],
    alignment: Option<f32>,
    semantic_section: &SectionOutcome<SemanticMatch>,
    gap_section: &SectionOutcome<KeywordGap>,
    resume: &ResumeRecord,
) -> Vec<String> {
    let mut out = Vec::new();

    let high: Vec<&str> = gaps
        .iter()
        .filter(|g| g.priority == Priority::High)
        .map(|g| g.keyword.as_str())
        .collect();
    if !high.is_empty() {
        let noun = if high.len() == 1 { "keyword" } else { "keywords" };
        out.push(format!(
            "Add {} high-priority {noun}: {}",
            high.len(),
            high.iter().take(3).copied().collect::<Vec<_>>().join(", ")
        ));
    }

    match alignment {
        Some(score) if score < LOW_ALIGNMENT => out.push(
            "Consider tailoring your experience descriptions to better match job responsibilities"
                .to_string(),
        ),
        Some(score) if score >= STRONG_ALIGNMENT => out.push(
            "Strong alignment with job requirements, focus on highlighting relevant projects"
                .to_string(),
        ),
        _ => {}
    }

    let transferable: Vec<String> = matches
        .iter()
        .filter(|m| m.match_type == MatchType::Transferable)
        .take(2)
        .map(|m| fact_texts(m, resume))
        .collect();
    if !transferable.is_empty() {
        out.push(format!(
            "Emphasize transferable skills: {}",
            transferable.join(", ")
        ));
    }

    if semantic_section.is_failed() {
        out.push("Semantic matching did not complete; re-run the analysis for a full report".to_string());
    }
    if gap_section.is_failed() {
        out.push("Keyword gap analysis did not complete; re-run the analysis for a full report".to_string());
    }

    out
}

fn fact_texts(m: &SemanticMatch, resume: &ResumeRecord) -> String {
    m.fact_ids
        .iter()
        .filter_map(|id| resume.fact(*id))
        .map(|f| f.text.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}
