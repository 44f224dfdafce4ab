// Shared prompt fragments. Task prompts live in alignment::prompts and
// reuse these.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Appended to every prompt that produces new text about the candidate.
pub const GROUNDING_INSTRUCTION: &str = "\
    CRITICAL: Every claim you generate must be traceable to a specific resume fact \
    id provided in the input. Do NOT infer, interpolate, or invent employers, \
    numbers, technologies, titles or credentials. If the facts do not support a \
    claim, omit it entirely.";

/// Reminds the model that ids are opaque references, not text to rewrite.
pub const ID_INSTRUCTION: &str = "\
    Refer to facts and requirements ONLY by the integer `id` values given. \
    Never invent an id and never quote an id that is not in the input.";
