//! Alignment API: prompt/parse engine, analysis orchestration and the HTTP
//! handlers that expose them.

pub mod engine;
pub mod handlers;
pub mod orchestrator;
pub mod prompts;

pub use engine::PromptEngine;
pub use orchestrator::AnalysisOrchestrator;
