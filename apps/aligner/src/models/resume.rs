use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::grounding::normalize;

/// Stable identifier assigned to a fact by the extraction subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactId(pub u32);

impl fmt::Display for FactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resume section a fact was extracted from. Also used as the suggested
/// insertion point for keyword gaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Skills,
    #[serde(alias = "work_history")]
    Experience,
    Projects,
    Education,
    Certifications,
    Other,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Skills => "skills",
            Section::Experience => "experience",
            Section::Projects => "projects",
            Section::Education => "education",
            Section::Certifications => "certifications",
            Section::Other => "other",
        }
    }
}

/// An atomic claim from the resume: one bullet, one skill, one credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeFact {
    pub id: FactId,
    pub section: Section,
    pub text: String,
}

/// Ordered facts handed over by the extraction subsystem. Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeRecord {
    #[serde(default)]
    pub candidate_name: Option<String>,
    pub facts: Vec<ResumeFact>,
}

impl ResumeRecord {
    /// Rejects records the engine cannot reference safely: no facts, blank
    /// fact text, or duplicated ids.
    pub fn check(&self) -> Result<(), String> {
        if self.facts.is_empty() {
            return Err("resume record contains no facts".to_string());
        }
        let mut seen = HashSet::new();
        for fact in &self.facts {
            if fact.text.trim().is_empty() {
                return Err(format!("fact {} has empty text", fact.id));
            }
            if !seen.insert(fact.id) {
                return Err(format!("fact id {} appears more than once", fact.id));
            }
        }
        Ok(())
    }

    pub fn fact(&self, id: FactId) -> Option<&ResumeFact> {
        self.facts.iter().find(|f| f.id == id)
    }

    pub fn fact_ids(&self) -> HashSet<FactId> {
        self.facts.iter().map(|f| f.id).collect()
    }

    pub fn facts_in(&self, sections: &[Section]) -> Vec<&ResumeFact> {
        self.facts
            .iter()
            .filter(|f| sections.contains(&f.section))
            .collect()
    }

    /// Whole-term check across every fact's text: "Java" is not mentioned by
    /// "JavaScript", "machine learning" needs both words adjacent.
    pub fn mentions(&self, term: &str) -> bool {
        let needle = terms(term);
        if needle.is_empty() {
            return false;
        }
        self.facts.iter().any(|f| {
            terms(&f.text)
                .windows(needle.len())
                .any(|window| window == needle.as_slice())
        })
    }

    /// Canonical text form used for fingerprinting. One line per fact, in order.
    pub fn canonical_text(&self) -> String {
        let mut out = String::new();
        if let Some(name) = &self.candidate_name {
            out.push_str("name\t");
            out.push_str(name);
            out.push('\n');
        }
        for fact in &self.facts {
            out.push_str(&format!(
                "{}\t{}\t{}\n",
                fact.id,
                fact.section.as_str(),
                fact.text
            ));
        }
        out
    }
}

fn terms(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(normalize)
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact(id: u32, section: Section, text: &str) -> ResumeFact {
        ResumeFact {
            id: FactId(id),
            section,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_resume_record_deserializes_with_work_history_alias() {
        let json = r#"{
            "facts": [
                {"id": 1, "section": "work_history", "text": "Led a team of 5 engineers"},
                {"id": 2, "section": "skills", "text": "Rust"}
            ]
        }"#;
        let record: ResumeRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.facts[0].section, Section::Experience);
        assert_eq!(record.facts[1].id, FactId(2));
        assert!(record.candidate_name.is_none());
    }

    #[test]
    fn test_check_rejects_duplicate_ids() {
        let record = ResumeRecord {
            candidate_name: None,
            facts: vec![
                fact(1, Section::Skills, "Rust"),
                fact(1, Section::Skills, "Go"),
            ],
        };
        let err = record.check().unwrap_err();
        assert!(err.contains("more than once"));
    }

    #[test]
    fn test_check_rejects_empty_record() {
        let record = ResumeRecord {
            candidate_name: None,
            facts: vec![],
        };
        assert!(record.check().is_err());
    }

    #[test]
    fn test_mentions_is_case_insensitive() {
        let record = ResumeRecord {
            candidate_name: None,
            facts: vec![fact(1, Section::Skills, "Docker, Kubernetes")],
        };
        assert!(record.mentions("kubernetes"));
        assert!(!record.mentions("Terraform"));
        assert!(!record.mentions("   "));
    }

    #[test]
    fn test_mentions_matches_whole_terms_only() {
        let record = ResumeRecord {
            candidate_name: None,
            facts: vec![
                fact(1, Section::Skills, "JavaScript, TypeScript"),
                fact(2, Section::Experience, "Worked at Google on search ranking"),
            ],
        };
        assert!(!record.mentions("Java"));
        assert!(!record.mentions("Go"));
        assert!(record.mentions("typescript"));
        assert!(record.mentions("Search Ranking"));
        assert!(!record.mentions("ranking search"));
    }

    #[test]
    fn test_canonical_text_changes_with_content() {
        let a = ResumeRecord {
            candidate_name: None,
            facts: vec![fact(1, Section::Skills, "Rust")],
        };
        let mut b = a.clone();
        b.facts[0].text = "Go".to_string();
        assert_ne!(a.canonical_text(), b.canonical_text());
        assert_eq!(a.canonical_text(), "1\tskills\tRust\n");
    }
}
