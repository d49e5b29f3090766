use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use ragctx_core::types::{ChunkId, ChunkKind, QueryResult};
use ragctx_core::Result;
use ragctx_retrieve::{format_context, ContextTemplate, Retriever};

use crate::generation::{ChatMessage, GenerationRequest, Generator};

const SYSTEM_PROMPT: &str = "You are a product support assistant. Answer using the provided manual excerpts. \
If the excerpts do not cover the question, say so and answer from general knowledge, marking it as such. \
Keep answers short and practical.";

#[derive(Debug, Clone, Default)]
pub struct AnswerRequest {
    pub question: String,
    /// Restricts retrieval to one source document (e.g. a product manual).
    pub scope: Option<String>,
    /// Earlier turns, oldest first.
    pub history: Vec<ChatMessage>,
    pub language: Option<String>,
}

impl AnswerRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self { question: question.into(), ..Default::default() }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageAttachment {
    pub source: String,
    pub mime: String,
    pub data_base64: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    /// False when retrieval found nothing and the answer is ungrounded.
    pub grounded: bool,
    pub chunk_ids: Vec<ChunkId>,
    pub images: Vec<ImageAttachment>,
}

pub struct Assistant {
    retriever: Arc<Retriever>,
    generator: Arc<dyn Generator>,
    template: ContextTemplate,
    temperature: f32,
}

impl Assistant {
    pub fn new(retriever: Arc<Retriever>, generator: Arc<dyn Generator>) -> Self {
        Self { retriever, generator, template: ContextTemplate::default(), temperature: 0.2 }
    }

    pub fn with_template(mut self, template: ContextTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub async fn answer(&self, request: &AnswerRequest) -> Result<Answer> {
        let retrieval = self.retriever.retrieve(&request.question, request.scope.as_deref()).await?;
        let formatted = format_context(&retrieval.chunks, &self.template);
        if !formatted.omitted.is_empty() {
            info!(omitted = formatted.omitted.len(), "context budget dropped lowest-ranked chunks");
        }
        let grounded = !formatted.is_empty();

        let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
        messages.extend(request.history.iter().cloned());
        messages.push(ChatMessage::user(user_prompt(request, grounded.then_some(formatted.text.as_str()))));
        let req = GenerationRequest::new(messages).with_temperature(self.temperature);
        let text = self.generator.generate(&req).await?;

        let images = attach_images(&retrieval.chunks);
        info!(grounded, chunks = retrieval.chunks.len(), images = images.len(), "answer generated");
        Ok(Answer { text, grounded, chunk_ids: retrieval.chunks.ids(), images })
    }
}

fn user_prompt(request: &AnswerRequest, context: Option<&str>) -> String {
    let mut prompt = String::new();
    match context {
        Some(ctx) => {
            prompt.push_str("Manual excerpts:\n");
            prompt.push_str(ctx);
        }
        None => prompt.push_str("No manual excerpts were found for this question."),
    }
    prompt.push_str("\n\nQuestion: ");
    prompt.push_str(&request.question);
    if let Some(lang) = request.language.as_deref().filter(|l| !l.trim().is_empty()) {
        prompt.push_str("\n\nRespond in ");
        prompt.push_str(lang);
        prompt.push('.');
    }
    prompt
}

/// Image chunks whose files can be read, base64-encoded. Unreadable files are skipped.
fn attach_images(result: &QueryResult) -> Vec<ImageAttachment> {
    result
        .chunks()
        .filter(|c| c.kind == ChunkKind::Image)
        .filter_map(|chunk| {
            let path = chunk.image_filename()?;
            match std::fs::read(path) {
                Ok(bytes) => Some(ImageAttachment {
                    source: chunk.source.clone(),
                    mime: mime_for(Path::new(path)).to_string(),
                    data_base64: STANDARD.encode(bytes),
                }),
                Err(e) => {
                    warn!(chunk = %chunk.id, path, error = %e, "image file unavailable, skipping");
                    None
                }
            }
        })
        .collect()
}

fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_follows_extension() {
        assert_eq!(mime_for(Path::new("a/b.JPG")), "image/jpeg");
        assert_eq!(mime_for(Path::new("a/b.webp")), "image/webp");
        assert_eq!(mime_for(Path::new("a/b.png")), "image/png");
    }

    #[test]
    fn prompt_mentions_missing_context_and_language() {
        let req = AnswerRequest::new("how to descale?").with_language("German");
        let p = user_prompt(&req, None);
        assert!(p.starts_with("No manual excerpts"));
        assert!(p.ends_with("Respond in German."));
        let p = user_prompt(&req, Some("[1] (m, text) use vinegar"));
        assert!(p.contains("use vinegar"));
    }
}
