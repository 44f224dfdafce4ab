pub mod job;
pub mod resume;

pub use job::{JobDescription, JobRequirement, RequirementId};
pub use resume::{FactId, ResumeFact, ResumeRecord, Section};
