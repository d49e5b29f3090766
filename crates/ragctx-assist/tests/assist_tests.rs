use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use ragctx_assist::{
    AnswerRequest, Assistant, ExampleRetriever, FallbackSkillExtractor, FeedbackAdvisor, GenerationRequest, Generator,
    KeywordSkillExtractor, LlmSkillExtractor, ResponseFormat, Role, SkillExtractor,
};
use ragctx_core::config::{DuplicatePolicy, RetrievalSettings};
use ragctx_core::traits::Embedder;
use ragctx_core::types::Chunk;
use ragctx_core::{Error, Result};
use ragctx_embed::HashEmbedder;
use ragctx_retrieve::Retriever;
use ragctx_vector::{IndexBuilder, VectorIndex};

/// Replays canned replies and records every request.
struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String>>>,
    seen: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    fn new(replies: Vec<Result<String>>) -> Arc<Self> {
        Arc::new(Self { replies: Mutex::new(replies.into()), seen: Mutex::new(Vec::new()) })
    }

    fn requests(&self) -> Vec<GenerationRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.seen.lock().unwrap().push(request.clone());
        self.replies.lock().unwrap().pop_front().unwrap_or_else(|| Err(Error::backend("no scripted reply")))
    }
}

async fn retriever(tmp: &TempDir, collection: &str, chunks: &[Chunk]) -> Arc<Retriever> {
    let embedder = HashEmbedder::new(128);
    let index = VectorIndex::open(&tmp.path().to_string_lossy(), 128, DuplicatePolicy::Overwrite).await.unwrap();
    if chunks.is_empty() {
        index.create_or_open_collection(collection).await.unwrap();
    } else {
        IndexBuilder::new(&index, &embedder, 8).with_progress(false).build(collection, chunks).await.unwrap();
    }
    let embedder: Arc<dyn Embedder> = Arc::new(embedder);
    Arc::new(Retriever::new(embedder, Arc::new(index), collection, RetrievalSettings { top_n: 2, ..Default::default() }))
}

#[tokio::test]
async fn grounded_answer_carries_context_and_images() {
    let tmp = TempDir::new().unwrap();
    let img = tmp.path().join("panel.png");
    std::fs::write(&img, [0x89u8, b'P', b'N', b'G']).unwrap();
    let chunks = vec![
        Chunk::text("kettle:0", "descale the kettle with citric acid", "kettle"),
        Chunk::text("kettle:1", "the kettle base must stay dry", "kettle"),
        Chunk::image("kettle:image:panel.png", "kettle control panel", "kettle", img.to_string_lossy()),
        Chunk::image("kettle:image:gone.png", "missing figure", "kettle", "/nonexistent/gone.png"),
    ];
    let retriever = retriever(&tmp, "manual_docs", &chunks).await;
    let generator = ScriptedGenerator::new(vec![Ok("Use citric acid.".into())]);
    let assistant = Assistant::new(retriever, generator.clone());

    let answer = assistant
        .answer(&AnswerRequest::new("how do I descale the kettle").with_scope("kettle").with_language("English"))
        .await
        .unwrap();
    assert_eq!(answer.text, "Use citric acid.");
    assert!(answer.grounded);
    assert_eq!(answer.chunk_ids[0], "kettle:0");
    assert_eq!(answer.images.len(), 1, "unreadable image is skipped");
    assert_eq!(answer.images[0].mime, "image/png");
    assert_eq!(answer.images[0].data_base64, "iVBORw==");

    let req = &generator.requests()[0];
    assert_eq!(req.messages[0].role, Role::System);
    let user = &req.messages.last().unwrap().content;
    assert!(user.contains("descale the kettle with citric acid"));
    assert!(user.ends_with("Respond in English."));
}

#[tokio::test]
async fn empty_retrieval_still_answers_ungrounded() {
    let tmp = TempDir::new().unwrap();
    let retriever = retriever(&tmp, "manual_docs", &[]).await;
    let generator = ScriptedGenerator::new(vec![Ok("General advice.".into())]);
    let answer = Assistant::new(retriever, generator.clone()).answer(&AnswerRequest::new("anything?")).await.unwrap();
    assert!(!answer.grounded);
    assert!(answer.chunk_ids.is_empty());
    assert!(generator.requests()[0].messages.last().unwrap().content.starts_with("No manual excerpts"));
}

#[tokio::test]
async fn generation_failure_surfaces_as_backend_error() {
    let tmp = TempDir::new().unwrap();
    let retriever = retriever(&tmp, "manual_docs", &[]).await;
    let generator = ScriptedGenerator::new(vec![Err(Error::backend("503"))]);
    let err = Assistant::new(retriever, generator).answer(&AnswerRequest::new("q")).await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn llm_extractor_accepts_object_or_array_and_normalizes() {
    let generator = ScriptedGenerator::new(vec![
        Ok(r#"{"skills": ["Python", "SQL", 3, "python"]}"#.into()),
        Ok(r#"["Docker"]"#.into()),
    ]);
    let extractor = LlmSkillExtractor::new(generator.clone());
    assert_eq!(extractor.extract("resume").await.unwrap(), vec!["python", "sql"]);
    assert_eq!(extractor.extract("resume").await.unwrap(), vec!["docker"]);
    let req = &generator.requests()[0];
    assert_eq!(req.format, ResponseFormat::JsonObject);
    assert_eq!(req.temperature, Some(0.0));
}

#[tokio::test]
async fn fallback_extractor_uses_keywords_when_generation_fails() {
    let generator = ScriptedGenerator::new(vec![Ok("not json".into())]);
    let extractor = FallbackSkillExtractor::new(
        Box::new(LlmSkillExtractor::new(generator)),
        Box::new(KeywordSkillExtractor::new().unwrap()),
    );
    let skills = extractor.extract("Experienced in Linux and AWS").await.unwrap();
    assert_eq!(skills, vec!["aws", "linux"]);
}

#[tokio::test]
async fn structured_feedback_is_enriched_with_examples() {
    let tmp = TempDir::new().unwrap();
    let bullets = vec![
        Chunk::text("b:0", "aws migrated forty services to aws with zero downtime", "bullets"),
        Chunk::text("b:1", "sql cut report runtime by tuning sql queries", "bullets"),
    ];
    let examples = ExampleRetriever::new(retriever(&tmp, "resume_bullets", &bullets).await);
    let reply = r#"{
        "skill_gap_analysis": {"required_skills": ["aws", "python"], "present_skills": ["python"], "missing_skills": ["aws"]},
        "improvement_suggestions": [{"skill": "aws", "suggestion": "Show cloud work."}, {"skill": "tone", "suggestion": "Be concise."}],
        "formatting_feedback": "Use bullet points.",
        "overall_score": 72,
        "summary": "Solid.",
        "personalized_roadmap": ["Get AWS certified"]
    }"#;
    let generator = ScriptedGenerator::new(vec![Ok(reply.into())]);
    let advisor = FeedbackAdvisor::new(generator.clone()).with_examples(examples);

    let long_resume = "r".repeat(5000);
    let feedback = advisor.analyze(&long_resume, "needs aws").await.unwrap();
    assert_eq!(feedback.overall_score, 72.0);
    assert_eq!(feedback.skill_gap_analysis.missing_skills, vec!["aws"]);
    assert_eq!(
        feedback.improvement_suggestions[0].rag_example.as_deref(),
        Some("aws migrated forty services to aws with zero downtime")
    );
    assert_eq!(feedback.improvement_suggestions[1].rag_example, None);

    let user = &generator.requests()[0].messages[1].content;
    assert_eq!(user.matches('r').count(), 3500 + "Resume:".matches('r').count() + "Job Description:".matches('r').count());
}

#[tokio::test]
async fn unparseable_feedback_keeps_raw_output() {
    let generator = ScriptedGenerator::new(vec![Ok("I cannot do that".into())]);
    let err = FeedbackAdvisor::new(generator).analyze("resume", "jd").await.unwrap_err();
    assert_eq!(err.raw_output(), Some("I cannot do that"));
}

#[tokio::test]
async fn keyword_skill_gap_report() {
    let generator = ScriptedGenerator::new(vec![]);
    let advisor = FeedbackAdvisor::new(generator);
    let extractor = KeywordSkillExtractor::new().unwrap();
    let report = advisor
        .skill_gap(&extractor, "Python developer, some Excel", "We need Python, SQL and Docker")
        .await
        .unwrap();
    assert_eq!(report.required_skills, vec!["python", "sql", "docker"]);
    assert_eq!(report.missing_skills, vec!["sql", "docker"]);
    assert_eq!(report.suggestions[0].suggestion, "Add achievements or experience related to sql.");
}
