use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use ragctx_assist::{
    skill_gap, AnswerRequest, Assistant, ExampleRetriever, FeedbackAdvisor, KeywordSkillExtractor, OpenAiChatClient,
};
use ragctx_core::chunker::Chunker;
use ragctx_core::config::{expand_path, Settings};
use ragctx_core::data_processor::DataProcessor;
use ragctx_core::extract::PlainTextExtractor;
use ragctx_core::images::JsonDescriptions;
use ragctx_core::traits::{Embedder, TextExtractor};
use ragctx_core::types::Chunk;
use ragctx_embed::get_default_embedder;
use ragctx_retrieve::{format_context, ContextTemplate, Retriever};
use ragctx_vector::{IndexBuilder, VectorIndex};

async fn open_index(settings: &Settings) -> Result<Arc<VectorIndex>> {
    Ok(Arc::new(VectorIndex::from_settings(&settings.index).await?))
}

fn embedder(settings: &Settings) -> Result<Arc<dyn Embedder>> {
    Ok(Arc::from(get_default_embedder(&settings.embedding, settings.index.dim)?))
}

fn retriever(settings: &Settings, embedder: Arc<dyn Embedder>, index: Arc<VectorIndex>, collection: &str) -> Arc<Retriever> {
    Arc::new(Retriever::new(embedder, index, collection, settings.retrieval.clone()))
}

pub async fn build(settings: &Settings, text_dir: Option<PathBuf>, images_dir: Option<PathBuf>, collection: Option<String>) -> Result<()> {
    let text_dir = text_dir.unwrap_or_else(|| expand_path(&settings.corpus.text_dir));
    let images_dir = images_dir.unwrap_or_else(|| expand_path(&settings.corpus.images_dir));
    let collection = collection.unwrap_or_else(|| settings.index.collection.clone());

    let mut processor = DataProcessor::new().with_chunker(Chunker::new(settings.corpus.delimiter.clone()));
    if images_dir.is_dir() {
        let descriptions_path = expand_path(&settings.corpus.descriptions);
        let descriptions = if descriptions_path.exists() {
            JsonDescriptions::from_file(&descriptions_path)?
        } else {
            warn!("No image descriptions at {}; images will be skipped", descriptions_path.display());
            JsonDescriptions::default()
        };
        processor = processor.with_images(images_dir, Box::new(descriptions));
    }
    let corpus = processor.process_directory(&text_dir)?;
    for warning in &corpus.warnings {
        warn!("{warning}");
    }
    if corpus.chunks.is_empty() {
        bail!("no chunks found under {}", text_dir.display());
    }

    let embedder = embedder(settings)?;
    let index = open_index(settings).await?;
    let report = IndexBuilder::new(&index, embedder.as_ref(), settings.embedding.batch_size)
        .build(&collection, &corpus.chunks)
        .await?;
    println!(
        "Indexed {} chunks ({} text, {} image) from {} documents into '{}'",
        report.chunks, report.text_chunks, report.image_chunks, corpus.documents, report.collection
    );
    if !corpus.warnings.is_empty() {
        println!("{} warnings (see log)", corpus.warnings.len());
    }
    Ok(())
}

pub async fn query(settings: &Settings, text: &str, scope: Option<&str>, top_n: Option<usize>) -> Result<()> {
    let retriever = retriever(settings, embedder(settings)?, open_index(settings).await?, &settings.index.collection);
    let retrieval = retriever.retrieve_top(text, scope, top_n.unwrap_or(settings.retrieval.top_n)).await?;
    if retrieval.scope_fallback {
        println!("(scope matched nothing; showing unfiltered results)");
    }
    println!("Found {} chunks for: \"{}\"", retrieval.chunks.len(), text);
    for hit in retrieval.chunks.iter() {
        println!("  {}. score={:.4}  id={}  source={}  kind={}", hit.rank, hit.score, hit.chunk.id, hit.chunk.source, hit.chunk.kind);
    }
    let formatted = format_context(&retrieval.chunks, &ContextTemplate::from_settings(&settings.context));
    println!("\n{}", formatted.text);
    if !formatted.omitted.is_empty() {
        println!("\n(omitted over budget: {})", formatted.omitted.join(", "));
    }
    Ok(())
}

pub async fn ask(settings: &Settings, question: String, scope: Option<String>, language: Option<String>) -> Result<()> {
    let retriever = retriever(settings, embedder(settings)?, open_index(settings).await?, &settings.index.collection);
    let generator = Arc::new(OpenAiChatClient::from_settings(&settings.generation)?);
    let assistant = Assistant::new(retriever, generator)
        .with_template(ContextTemplate::from_settings(&settings.context))
        .with_temperature(settings.generation.temperature);
    let request = AnswerRequest { question, scope, history: Vec::new(), language };
    let answer = assistant.answer(&request).await?;
    println!("{}", answer.text);
    if !answer.grounded {
        println!("\n(no matching manual content; answer is ungrounded)");
    }
    for image in &answer.images {
        println!("[image from {} ({}, {} bytes base64)]", image.source, image.mime, image.data_base64.len());
    }
    Ok(())
}

/// Seed records: a JSON array of objects with `text` and optional `id` and
/// `source`. Remaining string fields become chunk metadata.
pub fn parse_seed_records(json: &str, collection: &str) -> Result<Vec<Chunk>> {
    let records: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_str(json).context("seed file must be a JSON array of objects")?;
    records
        .into_iter()
        .enumerate()
        .map(|(i, mut record)| {
            let take = |record: &mut serde_json::Map<String, serde_json::Value>, key: &str| {
                record.remove(key).and_then(|v| v.as_str().map(str::to_string))
            };
            let text = take(&mut record, "text").with_context(|| format!("record {i} has no string 'text'"))?;
            let id = take(&mut record, "id").unwrap_or_else(|| format!("{collection}:{i}"));
            let source = take(&mut record, "source").unwrap_or_else(|| collection.to_string());
            let mut chunk = Chunk::text(id, text, source);
            for (key, value) in record {
                if let Some(s) = value.as_str() {
                    chunk = chunk.with_extra(key, s);
                }
            }
            Ok(chunk)
        })
        .collect()
}

pub async fn seed(settings: &Settings, records: &Path, collection: &str) -> Result<()> {
    let json = std::fs::read_to_string(records).with_context(|| format!("reading {}", records.display()))?;
    let chunks = parse_seed_records(&json, collection)?;
    let embedder = embedder(settings)?;
    let index = open_index(settings).await?;
    let report = IndexBuilder::new(&index, embedder.as_ref(), settings.embedding.batch_size)
        .append(collection, &chunks)
        .await?;
    println!("Seeded {} records into '{}'", report.chunks, report.collection);
    Ok(())
}

pub async fn drop(settings: &Settings, collection: &str) -> Result<()> {
    open_index(settings).await?.drop_collection(collection).await?;
    println!("Dropped '{collection}'");
    Ok(())
}

pub async fn analyze(settings: &Settings, resume: &Path, jd: &Path, offline: bool, examples_collection: &str) -> Result<()> {
    let read = |p: &Path| -> Result<String> {
        let bytes = std::fs::read(p).with_context(|| format!("reading {}", p.display()))?;
        Ok(PlainTextExtractor.extract(&bytes)?)
    };
    let (resume_text, jd_text) = (read(resume)?, read(jd)?);

    if offline {
        // Example lookup needs the embedding model, so offline reports stay generic.
        let report = skill_gap(&KeywordSkillExtractor::new()?, None, &resume_text, &jd_text).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let examples = example_retriever(settings, examples_collection).await?;
    let generator = Arc::new(OpenAiChatClient::from_settings(&settings.generation)?);
    let mut advisor = FeedbackAdvisor::new(generator).with_temperature(settings.generation.temperature);
    if let Some(ex) = examples {
        advisor = advisor.with_examples(ex);
    }
    let feedback = advisor.analyze(&resume_text, &jd_text).await?;
    println!("{}", serde_json::to_string_pretty(&feedback)?);
    Ok(())
}

/// Retriever over the seeded examples, or `None` when the collection is missing.
async fn example_retriever(settings: &Settings, collection: &str) -> Result<Option<ExampleRetriever>> {
    let index = open_index(settings).await?;
    let lookup = index.collection(collection).await;
    match lookup {
        Ok(_) => Ok(Some(ExampleRetriever::new(retriever(settings, embedder(settings)?, index, collection)))),
        Err(e) => {
            info!("example collection unavailable ({e}); suggestions will be generic");
            Ok(None)
        }
    }
}
