//! Contracts for generative outputs: cover letters and tailored bullets.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::grounding::{GroundingReport, GroundingStatus};
use crate::models::FactId;
use crate::schema::{Provenance, Record, Schema, SchemaValidationError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverLetter {
    pub greeting: String,
    pub opening_paragraph: String,
    pub body_paragraphs: Vec<String>,
    pub closing_paragraph: String,
    pub sign_off: String,
}

impl CoverLetter {
    /// The letter as one block of text, paragraphs separated by blank lines.
    pub fn full_text(&self) -> String {
        let mut parts = vec![self.greeting.as_str(), self.opening_paragraph.as_str()];
        parts.extend(self.body_paragraphs.iter().map(String::as_str));
        parts.push(self.closing_paragraph.as_str());
        parts.push(self.sign_off.as_str());
        parts.join("\n\n")
    }
}

impl Schema for CoverLetter {
    fn from_record(value: &Value, at: &str) -> Result<Self, SchemaValidationError> {
        let record = Record::open(value, at)?;
        Ok(CoverLetter {
            greeting: record.text("greeting")?,
            opening_paragraph: record.text("opening_paragraph")?,
            body_paragraphs: record.text_list("body_paragraphs")?,
            closing_paragraph: record.text("closing_paragraph")?,
            sign_off: record.text("sign_off")?,
        })
    }
}

/// A rewritten bullet as the model returns it, before grounding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TailoredBulletDraft {
    pub text: String,
    pub source_fact_ids: Vec<FactId>,
}

impl Schema for TailoredBulletDraft {
    fn from_record(value: &Value, at: &str) -> Result<Self, SchemaValidationError> {
        let record = Record::open(value, at)?;
        Ok(TailoredBulletDraft {
            text: record.text("text")?,
            source_fact_ids: record.id_list("source_fact_ids")?,
        })
    }
}

/// Response envelope for the tailoring task: `{"bullets": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TailoredBulletSet {
    pub bullets: Vec<TailoredBulletDraft>,
}

impl Schema for TailoredBulletSet {
    fn from_record(value: &Value, at: &str) -> Result<Self, SchemaValidationError> {
        let record = Record::open(value, at)?;
        Ok(TailoredBulletSet {
            bullets: record.records("bullets")?,
        })
    }
}

/// A tailored bullet after the grounding pass. Flagged bullets are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TailoredBullet {
    pub text: String,
    pub source_fact_ids: Vec<FactId>,
    pub grounding: GroundingReport,
    pub status: GroundingStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundedCoverLetter {
    pub letter: CoverLetter,
    pub grounding: GroundingReport,
    pub status: GroundingStatus,
    pub provenance: Provenance,
}
