//! Command-line surface: run the HTTP API, or analyse one resume/job pair and
//! persist the results as JSON artifacts.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::alignment::AnalysisOrchestrator;
use crate::cache::write_json_atomic;
use crate::config::Config;
use crate::grounding;
use crate::models::{JobDescription, ResumeRecord};
use crate::schema::{self, AnalysisResult, SectionOutcome};

#[derive(Parser)]
#[command(
    name = "aligner",
    about = "Aligns structured resume facts with a job description",
    version,
    long_about = None
)]
pub struct Cli {
    /// Sets the log level (error, warn, info, debug, trace). Overrides RUST_LOG
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Port to listen on (defaults to PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Analyse a resume against a job description and write JSON artifacts
    Analyze {
        /// Resume record as JSON (candidate_name, facts)
        #[arg(short, long)]
        resume: PathBuf,

        /// Job description as plain text
        #[arg(short, long)]
        job: PathBuf,

        /// Also generate a grounded cover letter
        #[arg(long)]
        cover_letter: bool,

        /// Also generate tailored resume bullets
        #[arg(long)]
        tailor: bool,

        /// Artifact directory (defaults to OUTPUT_DIR)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Check text against resume facts without calling a model
    Verify {
        #[arg(short, long)]
        resume: PathBuf,

        /// File holding the text to verify
        #[arg(short, long)]
        text: PathBuf,
    },

    /// Print a saved analysis artifact as a readable summary
    Report {
        #[arg(short, long)]
        artifact: PathBuf,
    },
}

// ────────────────────────────────────────────────────────────────────────────
// Commands
// ────────────────────────────────────────────────────────────────────────────

pub async fn run_analyze(
    config: &Config,
    resume: &Path,
    job: &Path,
    cover_letter: bool,
    tailor: bool,
    output_dir: Option<PathBuf>,
) -> Result<()> {
    let resume = load_json::<ResumeRecord>(resume).await?;
    let job = load_job(job).await?;
    let out = output_dir.unwrap_or_else(|| config.output_dir.clone());

    let orchestrator = AnalysisOrchestrator::from_config(config)?;
    let analysis = orchestrator.analyze(&resume, &job).await?;
    let short = &analysis.fingerprint[..16];

    let path = save_artifact(&out, &format!("analysis_{short}.json"), &analysis).await?;
    info!("Analysis written to {}", path.display());
    println!("{}", render_report(&analysis));

    if cover_letter {
        let letter = orchestrator.cover_letter(&resume, &job).await?;
        let path = save_artifact(&out, &format!("cover_letter_{short}.json"), &letter).await?;
        info!("Cover letter written to {}", path.display());
        println!("\n{}", letter.letter.full_text());
        for span in &letter.grounding.flagged_spans {
            println!("  ! unsupported: \"{}\" ({})", span.text, span.unsupported_terms.join(", "));
        }
    }

    if tailor {
        let bullets = orchestrator.tailor_bullets(&resume, &job).await?;
        let path = save_artifact(&out, &format!("tailored_bullets_{short}.json"), &bullets).await?;
        info!("Tailored bullets written to {}", path.display());
        println!("\nTailored bullets:");
        for bullet in &bullets.items {
            let marker = match bullet.status {
                grounding::GroundingStatus::Grounded => "-",
                grounding::GroundingStatus::Flagged => "!",
            };
            println!("  {marker} {}", bullet.text);
        }
    }

    Ok(())
}

pub async fn run_verify(resume: &Path, text: &Path) -> Result<()> {
    let resume = load_json::<ResumeRecord>(resume).await?;
    resume.check().map_err(anyhow::Error::msg)?;
    let text = tokio::fs::read_to_string(text)
        .await
        .with_context(|| format!("Failed to read {}", text.display()))?;

    let report = grounding::verify(&text, &resume.facts);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub async fn run_report(artifact: &Path) -> Result<()> {
    let analysis = load_analysis(artifact).await?;
    println!("{}", render_report(&analysis));
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON for this command", path.display()))
}

/// Saved analyses are untyped input again, so they go back through the schema.
async fn load_analysis(path: &Path) -> Result<AnalysisResult> {
    let value = load_json::<Value>(path).await?;
    schema::validate::<AnalysisResult>(&value)
        .with_context(|| format!("{} is not a valid analysis artifact", path.display()))
}

async fn load_job(path: &Path) -> Result<JobDescription> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(JobDescription::from_text(text))
}

async fn save_artifact<T: Serialize>(dir: &Path, file_name: &str, value: &T) -> Result<PathBuf> {
    let json = serde_json::to_value(value)?;
    let path = write_json_atomic(dir.to_path_buf(), file_name.to_string(), json).await?;
    Ok(path)
}

/// Plain-text summary of an analysis, as printed by `analyze` and `report`.
pub fn render_report(result: &AnalysisResult) -> String {
    let mut lines = Vec::new();

    match result.alignment_score {
        Some(score) => lines.push(format!("Alignment score: {:.1}%", score * 100.0)),
        None => lines.push("Alignment score: unavailable".to_string()),
    }

    let b = &result.breakdown;
    lines.push(format!(
        "Semantic matches: {} (exact {}, semantic {}, transferable {})",
        result.matches().len(),
        b.exact.count,
        b.semantic.count,
        b.transferable.count
    ));
    lines.push(format!(
        "Keyword gaps: {} (high {}, medium {}, low {})",
        result.gaps().len(),
        b.high_priority_gaps,
        b.medium_priority_gaps,
        b.low_priority_gaps
    ));

    if !result.strengths.is_empty() {
        lines.push(String::new());
        lines.push("Strengths:".to_string());
        lines.extend(result.strengths.iter().map(|s| format!("  - {s}")));
    }

    if !result.gaps().is_empty() {
        let mut gaps: Vec<_> = result.gaps().iter().collect();
        gaps.sort_by_key(|g| std::cmp::Reverse(g.priority.rank()));
        lines.push(String::new());
        lines.push("Missing keywords:".to_string());
        lines.extend(gaps.iter().map(|g| {
            format!(
                "  - [{}] {} -> {}: {}",
                g.priority.as_str(),
                g.keyword,
                g.suggested_section.as_str(),
                g.integration_suggestion
            )
        }));
    }

    if !result.recommendations.is_empty() {
        lines.push(String::new());
        lines.push("Recommendations:".to_string());
        lines.extend(result.recommendations.iter().map(|r| format!("  - {r}")));
    }

    for (name, failure) in [
        ("semantic matches", failed(&result.semantic_matches)),
        ("keyword gaps", failed(&result.keyword_gaps)),
    ] {
        if let Some((kind, message)) = failure {
            lines.push(format!("\nSection failed: {name} ({kind}): {message}"));
        }
    }

    lines.join("\n")
}

fn failed<T>(section: &SectionOutcome<T>) -> Option<(&str, &str)> {
    match section {
        SectionOutcome::Failed(f) => Some((f.error_kind.as_str(), f.message.as_str())),
        SectionOutcome::Completed(_) => None,
    }
}
