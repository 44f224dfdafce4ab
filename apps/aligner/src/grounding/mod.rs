//! Grounding Verifier: post-hoc traceability check for generated text.
//!
//! Generated text is cut into sentence spans. A span makes a factual
//! assertion when it carries salient terms (numbers, metrics, proper-noun-like
//! tokens) and every such term must occur in the resume facts. Spans with no
//! salient terms but a claim word ("led", "built", "experience") must share at
//! least half of their content words with a single fact.
//!
//! This is a heuristic. A clean report means no obvious unsupported claim was
//! found, not that the text is true. Flagged spans are reported, never removed.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::{FactId, ResumeFact};

pub const DEFAULT_OVERLAP_THRESHOLD: f32 = 0.5;

/// Capitalised words that carry no claim in letter boilerplate.
const CAPITALISED_ALLOWLIST: &[&str] = &[
    "i", "i'm", "i've", "i'd", "i'll", "dear", "hiring", "manager", "team", "sincerely",
    "regards", "best", "kind", "warm", "thank", "thanks", "yours", "respectfully", "cordially",
    "mr", "ms", "mrs", "dr", "hello", "hi", "to", "whom", "it", "may", "concern",
];

const CLAIM_WORDS: &[&str] = &[
    "led", "lead", "managed", "built", "developed", "designed", "implemented", "delivered",
    "created", "launched", "architected", "deployed", "improved", "reduced", "increased",
    "optimized", "optimised", "shipped", "mentored", "owned", "drove", "scaled", "migrated",
    "automated", "worked", "achieved", "won", "earned", "certified", "graduated", "founded",
    "maintained", "wrote", "taught", "ran", "oversaw", "spearheaded", "collaborated",
    "contributed", "negotiated", "grew", "saved", "have", "has", "had", "experience",
    "experienced", "expertise", "background", "proficient", "skilled", "years",
];

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "into", "over", "across", "through", "about", "than",
    "then", "also", "very", "more", "most", "such", "their", "his", "her", "your", "you", "our",
    "this", "that", "these", "those", "its", "was", "were", "are", "been", "being", "have",
    "has", "had", "who", "which", "while", "where", "when", "will", "would", "can", "could",
    "all", "any", "each", "other", "both", "not", "but", "out", "per",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroundingStatus {
    Grounded,
    Flagged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagReason {
    /// Salient terms that appear in no resume fact.
    UnsupportedTerms,
    /// A claim whose wording matches no single fact closely enough.
    LowOverlap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedSpan {
    /// Byte offsets into the verified text.
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub supporting_fact_ids: Vec<FactId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedSpan {
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub reason: FlagReason,
    pub unsupported_terms: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundingReport {
    pub accepted_spans: Vec<AcceptedSpan>,
    pub flagged_spans: Vec<FlaggedSpan>,
}

impl GroundingReport {
    pub fn status(&self) -> GroundingStatus {
        if self.flagged_spans.is_empty() {
            GroundingStatus::Grounded
        } else {
            GroundingStatus::Flagged
        }
    }
}

/// Verifies `text` against `facts` with the default settings.
pub fn verify(text: &str, facts: &[ResumeFact]) -> GroundingReport {
    GroundingVerifier::default().verify(text, facts)
}

#[derive(Debug, Clone)]
pub struct GroundingVerifier {
    overlap_threshold: f32,
    /// Terms allowed in spans that make no claim, e.g. the company and role
    /// named in the job description or the candidate's own name.
    reference_terms: HashSet<String>,
}

impl Default for GroundingVerifier {
    fn default() -> Self {
        Self {
            overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
            reference_terms: HashSet::new(),
        }
    }
}

impl GroundingVerifier {
    pub fn with_reference_text(mut self, text: &str) -> Self {
        self.reference_terms
            .extend(text.split_whitespace().map(normalize).filter(|t| !t.is_empty()));
        self
    }

    pub fn verify(&self, text: &str, facts: &[ResumeFact]) -> GroundingReport {
        let vocab = FactVocabulary::build(facts);
        let mut report = GroundingReport::default();

        for (start, end) in sentence_spans(text) {
            let span = &text[start..end];
            let tokens: Vec<&str> = span
                .split_whitespace()
                .filter(|t| !normalize(t).is_empty())
                .collect();
            let makes_claim = tokens
                .iter()
                .any(|t| CLAIM_WORDS.contains(&normalize(t).as_str()));
            let salient = salient_terms(&tokens);

            let unsupported: Vec<String> = salient
                .iter()
                .filter(|(_, norm)| !vocab.supports(norm))
                .filter(|(_, norm)| makes_claim || !self.reference_terms.contains(norm))
                .map(|(raw, _)| raw.clone())
                .collect();

            if !unsupported.is_empty() {
                report.flagged_spans.push(FlaggedSpan {
                    start,
                    end,
                    text: span.to_string(),
                    reason: FlagReason::UnsupportedTerms,
                    unsupported_terms: dedup(unsupported),
                });
                continue;
            }

            if !salient.is_empty() || !makes_claim {
                let supporting = vocab.facts_for(salient.iter().map(|(_, norm)| norm.as_str()));
                report.accepted_spans.push(AcceptedSpan {
                    start,
                    end,
                    text: span.to_string(),
                    supporting_fact_ids: supporting,
                });
                continue;
            }

            let words = content_words(span);
            match vocab.best_overlap(&words) {
                Some((fact_id, ratio)) if ratio >= self.overlap_threshold => {
                    report.accepted_spans.push(AcceptedSpan {
                        start,
                        end,
                        text: span.to_string(),
                        supporting_fact_ids: vec![fact_id],
                    });
                }
                _ => {
                    let missing = words
                        .iter()
                        .filter(|w| !vocab.has_stem(w))
                        .cloned()
                        .collect();
                    report.flagged_spans.push(FlaggedSpan {
                        start,
                        end,
                        text: span.to_string(),
                        reason: FlagReason::LowOverlap,
                        unsupported_terms: missing,
                    });
                }
            }
        }

        report
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Fact vocabulary
// ────────────────────────────────────────────────────────────────────────────

struct FactVocabulary {
    terms: HashMap<String, BTreeSet<FactId>>,
    lowered: Vec<(FactId, String)>,
    stems: Vec<(FactId, HashSet<String>)>,
}

impl FactVocabulary {
    fn build(facts: &[ResumeFact]) -> Self {
        let mut terms: HashMap<String, BTreeSet<FactId>> = HashMap::new();
        for fact in facts {
            for token in fact.text.split_whitespace() {
                let norm = normalize(token);
                if !norm.is_empty() {
                    terms.entry(norm).or_default().insert(fact.id);
                }
            }
        }
        Self {
            terms,
            lowered: facts.iter().map(|f| (f.id, f.text.to_lowercase())).collect(),
            stems: facts
                .iter()
                .map(|f| (f.id, content_words(&f.text).into_iter().collect()))
                .collect(),
        }
    }

    /// Exact token match, or a substring match for words of three or more
    /// letters ("Kubernetes" inside "Kubernetes-based"). Numbers must match exactly.
    fn supports(&self, term: &str) -> bool {
        if self.terms.contains_key(term) {
            return true;
        }
        let numeric = term.chars().any(|c| c.is_ascii_digit());
        !numeric
            && term.chars().count() >= 3
            && self.lowered.iter().any(|(_, text)| text.contains(term))
    }

    fn facts_for<'a>(&self, terms: impl Iterator<Item = &'a str>) -> Vec<FactId> {
        let mut ids = BTreeSet::new();
        for term in terms {
            if let Some(found) = self.terms.get(term) {
                ids.extend(found.iter().copied());
            } else {
                ids.extend(
                    self.lowered
                        .iter()
                        .filter(|(_, text)| text.contains(term))
                        .map(|(id, _)| *id),
                );
            }
        }
        ids.into_iter().collect()
    }

    fn has_stem(&self, stem: &str) -> bool {
        self.stems.iter().any(|(_, words)| words.contains(stem))
    }

    /// The fact sharing the largest share of `words`, with that share.
    fn best_overlap(&self, words: &[String]) -> Option<(FactId, f32)> {
        if words.is_empty() {
            return None;
        }
        self.stems
            .iter()
            .map(|(id, fact_words)| {
                let shared = words.iter().filter(|w| fact_words.contains(*w)).count();
                (*id, shared as f32 / words.len() as f32)
            })
            .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Text helpers
// ────────────────────────────────────────────────────────────────────────────

/// Sentence spans as trimmed byte ranges. Breaks on newlines and on `.`, `!`
/// or `?` followed by whitespace.
fn sentence_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let boundary = match c {
            '\n' => Some(i),
            '.' | '!' | '?' => match chars.peek() {
                None => Some(i + c.len_utf8()),
                Some((_, next)) if next.is_whitespace() => Some(i + c.len_utf8()),
                _ => None,
            },
            _ => None,
        };
        if let Some(end) = boundary {
            push_trimmed(text, start, end, &mut spans);
            start = end;
        }
    }
    push_trimmed(text, start, text.len(), &mut spans);
    spans
}

fn push_trimmed(text: &str, start: usize, end: usize, spans: &mut Vec<(usize, usize)>) {
    let slice = &text[start..end];
    let leading = slice.len() - slice.trim_start().len();
    let trimmed = slice.trim();
    if trimmed.chars().any(char::is_alphanumeric) {
        let s = start + leading;
        spans.push((s, s + trimmed.len()));
    }
}

/// Lowercased token with surrounding punctuation removed. Keeps `C++` and
/// `C#`; reduces `40%` and `5+` to their digits.
pub(crate) fn normalize(token: &str) -> String {
    let t = token
        .trim_matches(|c: char| !(c.is_alphanumeric() || c == '+' || c == '#'))
        .trim_start_matches(['+', '#']);
    if t.chars().any(|c| c.is_ascii_digit()) {
        t.chars()
            .filter(|c| c.is_alphanumeric() || *c == '.')
            .collect::<String>()
            .trim_matches('.')
            .to_lowercase()
    } else {
        t.to_lowercase()
    }
}

/// (original, normalized) pairs for numbers and proper-noun-like tokens.
fn salient_terms(tokens: &[&str]) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        let norm = normalize(token);
        if norm.is_empty() || CAPITALISED_ALLOWLIST.contains(&norm.as_str()) {
            continue;
        }
        let raw = token.trim_matches(|c: char| !(c.is_alphanumeric() || c == '+' || c == '#' || c == '%'));
        let is_number = norm.chars().any(|c| c.is_ascii_digit());
        let first_upper = raw.chars().next().is_some_and(char::is_uppercase);
        let acronym = raw.chars().filter(|c| c.is_uppercase()).count() >= 2;
        if is_number || acronym || (first_upper && i > 0) {
            out.push((raw.to_string(), norm));
        }
    }
    out
}

/// Stemmed content words used for overlap scoring.
fn content_words(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split_whitespace()
        .map(normalize)
        .filter(|w| w.chars().count() >= 3 && !STOPWORDS.contains(&w.as_str()))
        .map(|w| stem(&w))
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

fn stem(word: &str) -> String {
    let n = word.chars().count();
    if n > 5 && word.ends_with("ing") {
        word[..word.len() - 3].to_string()
    } else if n > 4 && word.ends_with("ed") {
        word[..word.len() - 2].to_string()
    } else if n > 3 && word.ends_with('s') && !word.ends_with("ss") {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

fn dedup(terms: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    terms
        .into_iter()
        .filter(|t| seen.insert(t.to_lowercase()))
        .collect()
}
