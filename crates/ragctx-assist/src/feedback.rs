//! Resume versus job description feedback.
//!
//! Two layers on top of the retrieval core: a structured JSON-mode review
//! ([`FeedbackAdvisor::analyze`]) and an extractor-driven skill gap report
//! ([`FeedbackAdvisor::skill_gap`]). Both enrich missing skills with example
//! bullets retrieved from a seeded collection.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use ragctx_core::Result;
use ragctx_retrieve::Retriever;

use crate::generation::{ChatMessage, GenerationRequest, Generator};
use crate::skills::{match_skills, suggest_rewrites, SkillExtractor, Suggestion};
use crate::structured::parse_structured;

const RESUME_CHAR_LIMIT: usize = 3500;
const JD_CHAR_LIMIT: usize = 2000;

const FEEDBACK_SYSTEM_PROMPT: &str = "You are an expert AI career advisor for all domains. Analyze the following resume and job description. \
Respond in this exact JSON structure: \
{\"skill_gap_analysis\": {\"required_skills\": [], \"present_skills\": [], \"missing_skills\": []}, \
\"improvement_suggestions\": [{\"skill\": \"\", \"suggestion\": \"\"}], \
\"formatting_feedback\": \"\", \"overall_score\": 0, \"summary\": \"\", \"personalized_roadmap\": []}";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillGapAnalysis {
    pub required_skills: Vec<String>,
    pub present_skills: Vec<String>,
    pub missing_skills: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImprovementSuggestion {
    #[serde(default)]
    pub skill: String,
    #[serde(default)]
    pub suggestion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_example: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuredFeedback {
    pub skill_gap_analysis: SkillGapAnalysis,
    pub improvement_suggestions: Vec<ImprovementSuggestion>,
    pub formatting_feedback: String,
    pub overall_score: f64,
    pub summary: String,
    /// Steps are usually strings but some models return objects.
    pub personalized_roadmap: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillGapReport {
    pub required_skills: Vec<String>,
    pub present_skills: Vec<String>,
    pub missing_skills: Vec<String>,
    pub suggestions: Vec<Suggestion>,
}

/// Looks up one example bullet per skill in a seeded collection.
pub struct ExampleRetriever {
    retriever: Arc<Retriever>,
}

impl ExampleRetriever {
    pub fn new(retriever: Arc<Retriever>) -> Self {
        Self { retriever }
    }

    /// Best example text per skill. Skills whose lookup fails or finds
    /// nothing are left out.
    pub async fn examples_for(&self, skills: &[String]) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for skill in skills {
            match self.retriever.retrieve_top(skill, None, 1).await {
                Ok(found) => {
                    if let Some(hit) = found.chunks.hits().first() {
                        out.insert(skill.clone(), hit.chunk.text.clone());
                    }
                }
                Err(e) => warn!(skill = %skill, error = %e, "no example found"),
            }
        }
        debug!(requested = skills.len(), found = out.len(), "example lookup");
        out
    }
}

pub struct FeedbackAdvisor {
    generator: Arc<dyn Generator>,
    examples: Option<ExampleRetriever>,
    temperature: f32,
}

impl FeedbackAdvisor {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator, examples: None, temperature: 0.2 }
    }

    pub fn with_examples(mut self, examples: ExampleRetriever) -> Self {
        self.examples = Some(examples);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Structured review of a resume against a job description.
    ///
    /// Unparseable model output is an [`Error::Parse`](ragctx_core::Error::Parse)
    /// carrying the raw text.
    pub async fn analyze(&self, resume_text: &str, jd_text: &str) -> Result<StructuredFeedback> {
        let resume: String = resume_text.chars().take(RESUME_CHAR_LIMIT).collect();
        let jd: String = jd_text.trim().chars().take(JD_CHAR_LIMIT).collect();
        let request = GenerationRequest::new(vec![
            ChatMessage::system(FEEDBACK_SYSTEM_PROMPT),
            ChatMessage::user(format!("Resume:\n{resume}\n\nJob Description:\n{jd}")),
        ])
        .json()
        .with_temperature(self.temperature);

        let raw = self.generator.generate(&request).await?;
        let mut feedback: StructuredFeedback = parse_structured(&raw).into_result()?;

        if let Some(examples) = &self.examples {
            let found = examples.examples_for(&feedback.skill_gap_analysis.missing_skills).await;
            for suggestion in &mut feedback.improvement_suggestions {
                if let Some(example) = found.get(&suggestion.skill) {
                    suggestion.rag_example = Some(example.clone());
                }
            }
        }
        info!(
            score = feedback.overall_score,
            missing = feedback.skill_gap_analysis.missing_skills.len(),
            "feedback generated"
        );
        Ok(feedback)
    }

    /// Gap report built from an extractor instead of a single structured call.
    pub async fn skill_gap(&self, extractor: &dyn SkillExtractor, resume_text: &str, jd_text: &str) -> Result<SkillGapReport> {
        skill_gap(extractor, self.examples.as_ref(), resume_text, jd_text).await
    }
}

/// Skill gap without a generator; usable offline with a keyword extractor.
pub async fn skill_gap(
    extractor: &dyn SkillExtractor,
    examples: Option<&ExampleRetriever>,
    resume_text: &str,
    jd_text: &str,
) -> Result<SkillGapReport> {
    let required = extractor.extract(jd_text).await?;
    let present = extractor.extract(resume_text).await?;
    let missing = match_skills(&required, &present);
    let examples = match examples {
        Some(ex) => ex.examples_for(&missing).await,
        None => BTreeMap::new(),
    };
    let suggestions = suggest_rewrites(&missing, &examples);
    Ok(SkillGapReport { required_skills: required, present_skills: present, missing_skills: missing, suggestions })
}
