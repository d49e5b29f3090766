//! Generation on top of retrieved context: grounded answers and the
//! skill-gap feedback flow.
pub mod answer;
pub mod feedback;
pub mod generation;
pub mod openai;
pub mod skills;
pub mod structured;

pub use answer::{Answer, AnswerRequest, Assistant, ImageAttachment};
pub use feedback::{skill_gap, ExampleRetriever, FeedbackAdvisor, SkillGapReport, StructuredFeedback};
pub use generation::{ChatMessage, GenerationRequest, Generator, ResponseFormat, Role};
pub use openai::OpenAiChatClient;
pub use skills::{
    match_skills, suggest_rewrites, FallbackSkillExtractor, KeywordSkillExtractor, LlmSkillExtractor, SkillExtractor,
    Suggestion,
};
pub use structured::{parse_structured, Structured, StructuredErrorKind};
