use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use resume_rag_core::{
    collect_documents, CharacterNgramEmbedder, ChatCompletionsBackend, EmbeddingClient,
    EngineBackends, FileTypeLoader, HttpEmbeddingClient, InMemoryVectorIndex, IngestionOptions,
    QdrantStore, ResumeEngine, VectorIndex, DEFAULT_EMBEDDING_DIMENSIONS,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    Memory,
    Qdrant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum EmbedderKind {
    Ngram,
    Http,
}

#[derive(Parser)]
#[command(name = "resume-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Vector index backend
    #[arg(long, value_enum, default_value = "memory")]
    store: StoreKind,

    /// Qdrant base URL
    #[arg(long, env = "RESUME_RAG_QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Qdrant collection
    #[arg(long, default_value = "resume_segments")]
    qdrant_collection: String,

    /// Embedding backend
    #[arg(long, value_enum, default_value = "ngram")]
    embedder: EmbedderKind,

    /// OpenAI-compatible embeddings base URL
    #[arg(long, env = "RESUME_RAG_EMBEDDING_URL", default_value = "http://localhost:11434/v1")]
    embedding_url: String,

    /// Embedding model name
    #[arg(long, default_value = "nomic-embed-text")]
    embedding_model: String,

    /// Vector dimension of the http embedder
    #[arg(long, default_value = "768")]
    embedding_dimensions: usize,

    /// OpenAI-compatible chat completions base URL
    #[arg(long, env = "RESUME_RAG_LLM_URL", default_value = "http://localhost:11434/v1")]
    llm_url: String,

    /// Generative model name
    #[arg(long, env = "RESUME_RAG_LLM_MODEL", default_value = "llama3.1")]
    llm_model: String,

    /// Bearer token for the model endpoints
    #[arg(long, env = "RESUME_RAG_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Supporting segments retrieved per question
    #[arg(long, default_value = "4")]
    top_k: usize,

    #[arg(long, default_value = "1000")]
    chunk_size: usize,

    #[arg(long, default_value = "200")]
    chunk_overlap: usize,

    /// Per-call timeout for external services, in seconds
    #[arg(long, default_value = "60")]
    timeout_secs: u64,

    #[arg(long, default_value = "3")]
    max_attempts: usize,

    /// Largest number of documents accepted by one ingest run
    #[arg(long, default_value = "100")]
    max_batch: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest resume files or folders, then optionally ask questions.
    Ingest {
        /// File or folder; folders are searched recursively for pdf/txt/md.
        #[arg(long = "path", required = true)]
        paths: Vec<PathBuf>,
        /// Maximum documents processed at once.
        #[arg(long)]
        concurrency: Option<usize>,
        /// Question to answer after ingestion; repeatable.
        #[arg(long = "question")]
        questions: Vec<String>,
    },
    /// Answer a question against an existing index.
    Query {
        #[arg(long)]
        question: String,
    },
}

impl Cli {
    fn options(&self) -> IngestionOptions {
        IngestionOptions {
            chunk_max_chars: self.chunk_size,
            chunk_overlap_chars: self.chunk_overlap,
            top_k: self.top_k,
            max_attempts: self.max_attempts,
            max_batch_documents: self.max_batch,
            call_timeout: Duration::from_secs(self.timeout_secs),
            ..IngestionOptions::default()
        }
    }

    fn embedder(&self) -> anyhow::Result<Arc<dyn EmbeddingClient>> {
        let embedder: Arc<dyn EmbeddingClient> = match self.embedder {
            EmbedderKind::Ngram => Arc::new(CharacterNgramEmbedder {
                dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            }),
            EmbedderKind::Http => Arc::new(HttpEmbeddingClient::new(
                &self.embedding_url,
                &self.embedding_model,
                self.api_key.clone(),
                self.embedding_dimensions,
                Duration::from_secs(self.timeout_secs),
            )?),
        };
        Ok(embedder)
    }

    async fn index(&self, dimensions: usize) -> anyhow::Result<Arc<dyn VectorIndex>> {
        let index: Arc<dyn VectorIndex> = match self.store {
            StoreKind::Memory => Arc::new(InMemoryVectorIndex::new(dimensions)),
            StoreKind::Qdrant => {
                let store = QdrantStore::new(
                    &self.qdrant_url,
                    &self.qdrant_collection,
                    dimensions,
                    Duration::from_secs(self.timeout_secs),
                )?;
                store.ensure_collection().await?;
                Arc::new(store)
            }
        };
        Ok(index)
    }

    async fn engine(&self) -> anyhow::Result<ResumeEngine> {
        let embedder = self.embedder()?;
        let index = self.index(embedder.dimensions()).await?;
        let generator = ChatCompletionsBackend::new(
            &self.llm_url,
            &self.llm_model,
            self.api_key.clone(),
            Duration::from_secs(self.timeout_secs),
        )?;

        let engine = ResumeEngine::new(
            self.options(),
            EngineBackends {
                loader: Arc::new(FileTypeLoader),
                embedder,
                index,
                generator: Arc::new(generator),
            },
        )?;
        Ok(engine)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let engine = cli.engine().await?;
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        store = ?cli.store,
        embedder = ?cli.embedder,
        "resume-rag boot"
    );

    match cli.command {
        Command::Ingest {
            paths,
            concurrency,
            questions,
        } => {
            let documents = collect_documents(&paths).await?;
            info!(documents = documents.len(), "documents collected");
            engine.admit_batch(&documents)?;

            let batch = engine.ingest_batch(documents, concurrency).await;
            for failed in batch.failed() {
                if let Some(failure) = failed.failure() {
                    warn!(
                        filename = %failed.filename,
                        stage = ?failure.stage,
                        kind = ?failure.kind,
                        "document failed: {}",
                        failure.message
                    );
                }
            }

            let mut answers = Vec::with_capacity(questions.len());
            for question in &questions {
                answers.push(engine.query(question).await?);
            }

            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "ingested_at": Utc::now().to_rfc3339(),
                    "batch": batch,
                    "answers": answers,
                }))?
            );
        }
        Command::Query { question } => {
            if cli.store == StoreKind::Memory {
                warn!("memory store starts empty; use --store qdrant to query a persisted index");
            }
            let answer = engine.query(&question).await?;
            println!("{}", serde_json::to_string_pretty(&answer)?);
        }
    }

    Ok(())
}
