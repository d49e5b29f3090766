use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ragctx_core::config::Config;

mod commands;

#[derive(Parser)]
#[command(name = "ragctx", version, about = "Build and query retrieval-augmented context over manuals")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk, embed and index the corpus, replacing the collection.
    Build {
        #[arg(long)]
        text_dir: Option<PathBuf>,
        #[arg(long)]
        images_dir: Option<PathBuf>,
        #[arg(long)]
        collection: Option<String>,
    },
    /// Retrieve context for a query and print it.
    Query {
        text: String,
        #[arg(long)]
        scope: Option<String>,
        #[arg(long)]
        top_n: Option<usize>,
    },
    /// Answer a question grounded in the indexed manuals.
    Ask {
        question: String,
        #[arg(long)]
        scope: Option<String>,
        #[arg(long)]
        language: Option<String>,
    },
    /// Add records from a JSON array to a collection.
    Seed {
        records: PathBuf,
        #[arg(long, default_value = "resume_bullets")]
        collection: String,
    },
    /// Delete every entry of a collection.
    Drop { collection: String },
    /// Compare a resume with a job description.
    Analyze {
        #[arg(long)]
        resume: PathBuf,
        #[arg(long)]
        jd: PathBuf,
        /// Keyword skill matching only; no generation calls.
        #[arg(long)]
        offline: bool,
        #[arg(long, default_value = "resume_bullets")]
        examples: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Config::load()?.settings()?;

    match cli.command {
        Command::Build { text_dir, images_dir, collection } => {
            commands::build(&settings, text_dir, images_dir, collection).await
        }
        Command::Query { text, scope, top_n } => commands::query(&settings, &text, scope.as_deref(), top_n).await,
        Command::Ask { question, scope, language } => commands::ask(&settings, question, scope, language).await,
        Command::Seed { records, collection } => commands::seed(&settings, &records, &collection).await,
        Command::Drop { collection } => commands::drop(&settings, &collection).await,
        Command::Analyze { resume, jd, offline, examples } => {
            commands::analyze(&settings, &resume, &jd, offline, &examples).await
        }
    }
}
