//! Skill extraction and gap matching.
//!
//! Two extractors share one interface: a keyword matcher over a built-in list
//! and a JSON-mode generation call. [`FallbackSkillExtractor`] chains them.
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::warn;

use ragctx_core::{Error, Result};

use crate::generation::{ChatMessage, GenerationRequest, Generator};
use crate::structured::parse_structured;

/// Built-in vocabulary for keyword extraction, grouped loosely by domain.
pub const SKILL_DB: &[&str] = &[
    // IT/Tech
    "python", "machine learning", "data analysis", "sql", "excel", "communication",
    "leadership", "project management", "aws", "azure", "docker", "linux", "javascript",
    "react", "vue.js", "node.js", "devops", "security", "ux design", "wordpress", "graphql",
    // Healthcare
    "surgical assistance", "emergency care", "ehr", "scheduling",
    // Textile, leather, petroleum
    "machine optimization", "sustainable dyeing", "fabric development", "chrome-free tanning",
    "drilling operations", "reservoir simulation",
    // Sales, design, education
    "branding", "crm", "figma", "curriculum design", "digital learning",
    "customer service", "inventory management", "route optimization", "accounting", "budgeting",
    "guest services", "contract drafting", "irrigation", "veterinary care", "community outreach",
];

/// Characters of input passed to the generation-based extractor.
const LLM_TEXT_LIMIT: usize = 2500;

#[async_trait]
pub trait SkillExtractor: Send + Sync {
    /// Lowercased skills mentioned in `text`, without duplicates.
    async fn extract(&self, text: &str) -> Result<Vec<String>>;
}

pub struct KeywordSkillExtractor {
    patterns: Vec<(String, Regex)>,
}

impl KeywordSkillExtractor {
    pub fn new() -> Result<Self> {
        Self::with_skills(SKILL_DB.iter().copied())
    }

    pub fn with_skills<'a>(skills: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let patterns = skills
            .into_iter()
            .map(|skill| {
                let skill = skill.to_lowercase();
                Regex::new(&format!(r"\b{}\b", regex::escape(&skill)))
                    .map(|re| (skill, re))
                    .map_err(|e| Error::InvalidConfig(format!("bad skill pattern: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Matches in vocabulary order.
    pub fn find(&self, text: &str) -> Vec<String> {
        let text = text.to_lowercase();
        self.patterns.iter().filter(|(_, re)| re.is_match(&text)).map(|(s, _)| s.clone()).collect()
    }
}

#[async_trait]
impl SkillExtractor for KeywordSkillExtractor {
    async fn extract(&self, text: &str) -> Result<Vec<String>> {
        Ok(self.find(text))
    }
}

/// JSON mode only guarantees an object, but a bare array is accepted too.
#[derive(Deserialize)]
#[serde(untagged)]
enum SkillList {
    Object { skills: Vec<serde_json::Value> },
    Array(Vec<serde_json::Value>),
}

pub struct LlmSkillExtractor {
    generator: Arc<dyn Generator>,
}

impl LlmSkillExtractor {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl SkillExtractor for LlmSkillExtractor {
    async fn extract(&self, text: &str) -> Result<Vec<String>> {
        let excerpt: String = text.chars().take(LLM_TEXT_LIMIT).collect();
        let prompt = format!(
            "Extract all relevant skills, technologies, and competencies from the text below. \
             Focus on domain-specific, technical, and soft skills. \
             Respond ONLY with a JSON object of the form {{\"skills\": [\"...\"]}}.\n\nText: {excerpt}"
        );
        let request = GenerationRequest::new(vec![ChatMessage::user(prompt)]).json().with_temperature(0.0);
        let raw = self.generator.generate(&request).await?;
        let values = match parse_structured::<SkillList>(&raw).into_result()? {
            SkillList::Object { skills } | SkillList::Array(skills) => skills,
        };
        let mut seen = HashSet::new();
        Ok(values
            .into_iter()
            .filter_map(|v| v.as_str().map(|s| s.trim().to_lowercase()))
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect())
    }
}

/// Tries `primary`, then `fallback` on any failure.
pub struct FallbackSkillExtractor {
    primary: Box<dyn SkillExtractor>,
    fallback: Box<dyn SkillExtractor>,
}

impl FallbackSkillExtractor {
    pub fn new(primary: Box<dyn SkillExtractor>, fallback: Box<dyn SkillExtractor>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl SkillExtractor for FallbackSkillExtractor {
    async fn extract(&self, text: &str) -> Result<Vec<String>> {
        match self.primary.extract(text).await {
            Ok(skills) => Ok(skills),
            Err(e) => {
                warn!(error = %e, "skill extraction failed, falling back to keyword matching");
                self.fallback.extract(text).await
            }
        }
    }
}

/// Skills in `required` that are absent from `present`, in `required` order.
pub fn match_skills(required: &[String], present: &[String]) -> Vec<String> {
    let present: HashSet<&str> = present.iter().map(String::as_str).collect();
    required.iter().filter(|s| !present.contains(s.as_str())).cloned().collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub skill: String,
    pub suggestion: String,
}

/// One suggestion per missing skill: the retrieved example when there is one,
/// generic advice otherwise.
pub fn suggest_rewrites(missing: &[String], examples: &BTreeMap<String, String>) -> Vec<Suggestion> {
    missing
        .iter()
        .map(|skill| Suggestion {
            skill: skill.clone(),
            suggestion: examples
                .get(skill)
                .filter(|e| !e.trim().is_empty())
                .cloned()
                .unwrap_or_else(|| format!("Add achievements or experience related to {skill}.")),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_matching_respects_word_boundaries() {
        let ex = KeywordSkillExtractor::new().unwrap();
        let found = ex.find("Led DevOps work with Docker and SQL; some JavaScript. Wrote node.js services.");
        assert_eq!(found, vec!["sql", "docker", "javascript", "node.js", "devops"]);
        assert!(ex.find("pythonic reactor").is_empty());
    }

    #[test]
    fn missing_skills_keep_required_order() {
        let required = vec!["sql".to_string(), "aws".to_string(), "python".to_string()];
        let present = vec!["python".to_string()];
        assert_eq!(match_skills(&required, &present), vec!["sql", "aws"]);
    }

    #[test]
    fn rewrites_prefer_examples() {
        let mut examples = BTreeMap::new();
        examples.insert("aws".to_string(), "Migrated 40 services to AWS ECS.".to_string());
        let out = suggest_rewrites(&["aws".to_string(), "sql".to_string()], &examples);
        assert_eq!(out[0].suggestion, "Migrated 40 services to AWS ECS.");
        assert_eq!(out[1].suggestion, "Add achievements or experience related to sql.");
    }
}
