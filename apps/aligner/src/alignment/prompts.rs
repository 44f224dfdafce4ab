// All prompt templates for the alignment tasks.
// Reuses cross-cutting fragments from llm_client::prompts.

/// Semantic matching prompt.
/// Replace: {id_instruction}, {facts_json}, {requirements_json}
pub const SEMANTIC_MATCH_TEMPLATE: &str = r#"SEMANTIC MATCH TASK

You are an expert recruiter analyzing semantic connections between a candidate's
resume facts and the requirements of a job description.

{id_instruction}

RESUME FACTS (JSON, verbatim):
{facts_json}

JOB REQUIREMENTS (JSON, verbatim):
{requirements_json}

Identify connections between the facts and the requirements. Look for:
1. EXACT matches (same terminology)
2. SEMANTIC matches (different words, same concept: "Team Captain" -> "Leadership")
3. TRANSFERABLE skills (related skills: "JavaScript" -> "Frontend development")

Return a JSON object with this EXACT schema (no extra fields):
{
  "matches": [
    {
      "fact_ids": [1],
      "requirement_id": 3,
      "score": 0.8,
      "match_type": "semantic",
      "reasoning": "Leading a team of engineers demonstrates people management"
    }
  ]
}

RULES:
1. Only report genuine connections. Do not fabricate skills.
2. score reflects confidence: 1.0 = exact, 0.7-0.9 = semantic, 0.5-0.7 = transferable.
3. match_type is one of "exact", "semantic", "transferable".
4. reasoning is one sentence explaining the connection.
5. If nothing matches, return {"matches": []}."#;

/// Keyword gap prompt.
/// Replace: {facts_json}, {job_text}, {matched_json}
pub const KEYWORD_GAP_TEMPLATE: &str = r#"KEYWORD GAP TASK

You are an ATS (Applicant Tracking System) expert analyzing keyword gaps between a
resume and a job description.

RESUME FACTS (JSON, verbatim):
{facts_json}

JOB DESCRIPTION (verbatim):
"""
{job_text}
"""

ALREADY MATCHED REQUIREMENTS (do not suggest these):
{matched_json}

Identify important keywords, skills, or concepts from the job description that are
MISSING from the resume facts.

Return a JSON object with this EXACT schema (no extra fields):
{
  "gaps": [
    {
      "keyword": "Docker",
      "priority": "high",
      "suggested_section": "skills",
      "context_in_job": "Required: Experience with Docker containerization",
      "integration_suggestion": "Add Docker to the skills list if you have containerization experience"
    }
  ]
}

CRITICAL RULES:
1. Every keyword MUST appear verbatim in the job description above.
2. Do NOT suggest keywords that already appear in any resume fact.
3. Do NOT suggest keywords covered by the already matched requirements.
4. priority: "high" for required skills, "medium" for nice-to-have, "low" for minor mentions.
5. suggested_section is one of "skills", "experience", "projects", "education", "certifications", "other".
6. If nothing is missing, return {"gaps": []}."#;

/// Cover letter prompt.
/// Replace: {grounding_instruction}, {facts_json}, {job_text}, {strengths_json}, {candidate_name}
pub const COVER_LETTER_TEMPLATE: &str = r#"COVER LETTER TASK

You are an expert career writer drafting a concise, professional cover letter.

{grounding_instruction}

CANDIDATE NAME: {candidate_name}

RESUME FACTS (JSON, verbatim):
{facts_json}

STRONGEST ALIGNMENTS (JSON):
{strengths_json}

JOB DESCRIPTION (verbatim):
"""
{job_text}
"""

Return a JSON object with this EXACT schema (no extra fields):
{
  "greeting": "Dear Hiring Manager,",
  "opening_paragraph": "...",
  "body_paragraphs": ["...", "..."],
  "closing_paragraph": "...",
  "sign_off": "Sincerely,"
}

RULES:
1. Two or three body paragraphs, each tied to specific resume facts.
2. Use only numbers, employers, technologies and titles present in the resume facts.
3. No placeholders in brackets. No invented metrics."#;

/// Tailored bullet prompt.
/// Replace: {grounding_instruction}, {id_instruction}, {facts_json}, {requirements_json}
pub const TAILORED_BULLETS_TEMPLATE: &str = r#"TAILORED BULLETS TASK

You are an elite resume coach rewriting resume bullets toward a target job.

{grounding_instruction}

{id_instruction}

RESUME FACTS TO REWRITE (JSON, verbatim):
{facts_json}

TARGET JOB REQUIREMENTS (JSON, verbatim):
{requirements_json}

Return a JSON object with this EXACT schema (no extra fields):
{
  "bullets": [
    {
      "text": "Led a team of 5 engineers delivering the payments platform",
      "source_fact_ids": [1]
    }
  ]
}

RULES:
1. Every bullet cites the fact ids it was rewritten from in source_fact_ids.
2. Start each bullet with a strong action verb. No soft-skill filler.
3. Weave in job keywords only where the cited facts support them.
4. Keep every number exactly as it appears in the cited facts. Never add a metric.
5. Skip facts that are irrelevant to the job."#;

/// Appended to the original task prompt when a response fails validation.
/// Replace: {error}, {previous}
pub const REPAIR_TEMPLATE: &str = r#"

YOUR PREVIOUS RESPONSE WAS REJECTED.

Validation error: {error}

Previous response:
"""
{previous}
"""

Return a corrected JSON object that satisfies the schema above. Fix the reported
field and keep everything else that was valid."#;
