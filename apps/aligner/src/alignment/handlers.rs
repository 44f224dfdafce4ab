//! Axum route handlers for the Alignment API.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::cache::CacheStats;
use crate::errors::AppError;
use crate::grounding::{GroundingReport, GroundingStatus};
use crate::models::{JobDescription, JobRequirement, ResumeRecord};
use crate::schema::{AnalysisResult, GroundedCoverLetter, TailoredBullet, TaskRecord};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

/// Body shared by every endpoint that works on a resume/job pair.
#[derive(Debug, Deserialize)]
pub struct AlignmentRequest {
    pub resume: ResumeRecord,
    pub job_text: String,
    /// Pre-parsed requirements. Derived from `job_text` when absent.
    #[serde(default)]
    pub requirements: Option<Vec<JobRequirement>>,
}

impl AlignmentRequest {
    fn into_parts(self) -> Result<(ResumeRecord, JobDescription), AppError> {
        if self.job_text.trim().is_empty() {
            return Err(AppError::Validation("job_text cannot be empty".to_string()));
        }
        let job = JobDescription::new(self.job_text, self.requirements);
        Ok((self.resume, job))
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub resume: ResumeRecord,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub status: GroundingStatus,
    pub report: GroundingReport,
}

#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    pub removed: usize,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/analysis
///
/// Semantic matches, keyword gaps and the derived summary. A failed task shows
/// up as a `failed` section; an unreachable backend fails the request.
pub async fn handle_analysis(
    State(state): State<AppState>,
    Json(request): Json<AlignmentRequest>,
) -> Result<Json<AnalysisResult>, AppError> {
    let (resume, job) = request.into_parts()?;
    let result = state.orchestrator.analyze(&resume, &job).await?;
    Ok(Json(result))
}

/// POST /api/v1/cover-letter
pub async fn handle_cover_letter(
    State(state): State<AppState>,
    Json(request): Json<AlignmentRequest>,
) -> Result<Json<GroundedCoverLetter>, AppError> {
    let (resume, job) = request.into_parts()?;
    let letter = state.orchestrator.cover_letter(&resume, &job).await?;
    Ok(Json(letter))
}

/// POST /api/v1/tailored-bullets
///
/// Bullets come back with their grounding reports. Flagged bullets are kept.
pub async fn handle_tailored_bullets(
    State(state): State<AppState>,
    Json(request): Json<AlignmentRequest>,
) -> Result<Json<TaskRecord<Vec<TailoredBullet>>>, AppError> {
    let (resume, job) = request.into_parts()?;
    let bullets = state.orchestrator.tailor_bullets(&resume, &job).await?;
    Ok(Json(bullets))
}

/// POST /api/v1/grounding/verify
///
/// Checks arbitrary text against the resume facts. No model call.
pub async fn handle_verify(
    State(state): State<AppState>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, AppError> {
    if request.text.trim().is_empty() {
        return Err(AppError::Validation("text cannot be empty".to_string()));
    }
    request
        .resume
        .check()
        .map_err(AppError::Validation)?;

    let report = state.orchestrator.verify(&request.text, &request.resume);
    Ok(Json(VerifyResponse {
        status: report.status(),
        report,
    }))
}

/// POST /api/v1/cache/invalidate
pub async fn handle_invalidate(
    State(state): State<AppState>,
    Json(request): Json<AlignmentRequest>,
) -> Result<Json<InvalidateResponse>, AppError> {
    let (resume, job) = request.into_parts()?;
    let removed = state.orchestrator.invalidate(&resume, &job).await?;
    Ok(Json(InvalidateResponse { removed }))
}

/// GET /api/v1/cache/stats
pub async fn handle_cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.orchestrator.cache().stats().await)
}
