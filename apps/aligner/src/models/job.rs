use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequirementId(pub u32);

impl fmt::Display for RequirementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An atomic requirement or keyword parsed from the job description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequirement {
    pub id: RequirementId,
    pub text: String,
}

/// Raw job-description text plus the requirements derived from it.
///
/// The raw text is kept verbatim: keyword gaps are checked against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescription {
    pub text: String,
    pub requirements: Vec<JobRequirement>,
}

/// Lines longer than this are split into sentences before becoming requirements.
const SPLIT_LINE_CHARS: usize = 160;
const MIN_REQUIREMENT_CHARS: usize = 2;

impl JobDescription {
    /// Builds a job description, deriving requirements from the text when the
    /// caller did not supply any.
    pub fn new(text: impl Into<String>, requirements: Option<Vec<JobRequirement>>) -> Self {
        let text = text.into();
        let requirements = match requirements {
            Some(reqs) if !reqs.is_empty() => reqs,
            _ => parse_requirements(&text),
        };
        Self { text, requirements }
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(text, None)
    }

    pub fn requirement(&self, id: RequirementId) -> Option<&JobRequirement> {
        self.requirements.iter().find(|r| r.id == id)
    }

    pub fn requirement_ids(&self) -> HashSet<RequirementId> {
        self.requirements.iter().map(|r| r.id).collect()
    }

    /// Zero-hallucination check for gap keywords: case-insensitive substring.
    pub fn contains_term(&self, term: &str) -> bool {
        let needle = term.trim().to_lowercase();
        !needle.is_empty() && self.text.to_lowercase().contains(&needle)
    }
}

/// Deterministic requirement extraction: one requirement per bullet or line,
/// long prose lines split into sentences, headings skipped, duplicates dropped.
pub fn parse_requirements(text: &str) -> Vec<JobRequirement> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for raw_line in text.lines() {
        let line = strip_bullet(raw_line.trim());
        if line.is_empty() || line.ends_with(':') {
            continue;
        }

        let pieces: Vec<&str> = if line.chars().count() > SPLIT_LINE_CHARS {
            split_sentences(line)
        } else {
            vec![line]
        };

        for piece in pieces {
            let piece = piece.trim().trim_end_matches(['.', ';']).trim();
            if piece.chars().count() < MIN_REQUIREMENT_CHARS {
                continue;
            }
            if !seen.insert(piece.to_lowercase()) {
                continue;
            }
            out.push(JobRequirement {
                id: RequirementId(out.len() as u32 + 1),
                text: piece.to_string(),
            });
        }
    }

    out
}

fn strip_bullet(line: &str) -> &str {
    let trimmed = line.trim_start_matches(['-', '*', '•', '·', '–']).trim_start();
    if trimmed.len() != line.len() {
        return trimmed;
    }
    // "1." / "2)" style numbering
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(stripped) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return stripped.trim_start();
        }
    }
    line
}

/// Splits on `.`, `!` or `?` followed by whitespace, so "Node.js" stays intact.
fn split_sentences(line: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let bytes = line.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if matches!(b, b'.' | b'!' | b'?') && bytes.get(i + 1).is_some_and(|n| n.is_ascii_whitespace()) {
            pieces.push(&line[start..=i]);
            start = i + 1;
        }
    }
    if start < line.len() {
        pieces.push(&line[start..]);
    }
    pieces
}
