use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use course_tutor_core::{
    ingest_path, select_embedder, AnswerRecord, ChatCompletionsClient, Cl100kTokenizer,
    EmbeddingSettings, LlmConfig, LocalIndexStore, NoEnrichment, QdrantStore, QuizStore,
    SqliteQuizStore, StoredQuiz, TutorEngine, TutorSettings, VectorIndex, VideoSearch,
    YouTubeSearcher,
};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "course-tutor", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Optional TOML file with pipeline settings.
    #[arg(long, env = "TUTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Collection that holds this course's chunks.
    #[arg(long, env = "TUTOR_COLLECTION", default_value = "academic_lectures")]
    collection: String,

    /// Vector index backend.
    #[arg(long, value_enum, default_value_t = IndexBackend::Local)]
    index: IndexBackend,

    /// Directory of the local index.
    #[arg(long, env = "TUTOR_PERSIST_DIR", default_value = "./storage/index")]
    persist_dir: PathBuf,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// SQLite file for generated quizzes.
    #[arg(long, env = "TUTOR_QUIZ_DB", default_value = "./storage/quizzes.db")]
    quiz_db: PathBuf,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_EMBEDDING_MODEL")]
    openai_embedding_model: Option<String>,

    /// Vector length of the OpenAI embedding model, when it is not a known model.
    #[arg(long, env = "OPENAI_EMBEDDING_DIMENSIONS")]
    openai_embedding_dimensions: Option<usize>,

    /// Ollama server used when no OpenAI key is set.
    #[arg(long, env = "OLLAMA_URL")]
    ollama_url: Option<String>,

    #[arg(long, env = "OLLAMA_EMBED_MODEL")]
    ollama_model: Option<String>,

    #[arg(long, env = "OLLAMA_EMBED_DIMENSIONS")]
    ollama_dimensions: Option<usize>,

    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    llm_api_key: Option<String>,

    /// OpenAI-compatible chat completions URL.
    #[arg(long, env = "LLM_URL")]
    llm_url: Option<String>,

    #[arg(long, env = "LLM_MODEL")]
    llm_model: Option<String>,

    #[arg(long, env = "YOUTUBE_API_KEY", hide_env_values = true)]
    youtube_api_key: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum IndexBackend {
    Local,
    Qdrant,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a file or folder of course material (pdf, pptx, md, txt).
    Ingest {
        input: PathBuf,
        #[arg(long)]
        course_id: String,
        #[arg(long)]
        lecture_id: Option<String>,
        /// Token budget per chunk.
        #[arg(long)]
        max_tokens: Option<usize>,
        /// Tokens repeated between consecutive chunks.
        #[arg(long)]
        overlap: Option<usize>,
    },
    /// Ask a question about the ingested material.
    Ask {
        question: String,
        /// Attach video suggestions even when retrieval is confident.
        #[arg(long, default_value_t = false)]
        always_enrich: bool,
    },
    /// Generate and store a multiple-choice quiz.
    Quiz {
        topic: String,
        /// Use this text instead of retrieving context for the topic.
        #[arg(long)]
        context: Option<String>,
        #[arg(long)]
        num_questions: Option<usize>,
    },
    /// List stored quizzes, newest first.
    Quizzes {
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

impl Cli {
    fn embedding_settings(&self, settings: &TutorSettings) -> EmbeddingSettings {
        EmbeddingSettings {
            openai_api_key: self.openai_api_key.clone(),
            openai_model: self.openai_embedding_model.clone(),
            openai_dimensions: self.openai_embedding_dimensions,
            ollama_url: self.ollama_url.clone(),
            ollama_model: self.ollama_model.clone(),
            ollama_dimensions: self.ollama_dimensions,
            batch_size: Some(settings.embedding_batch_size),
            ..EmbeddingSettings::default()
        }
    }

    fn llm_config(&self, settings: &TutorSettings) -> LlmConfig {
        let defaults = LlmConfig::default();
        LlmConfig {
            endpoint: self.llm_url.clone().unwrap_or(defaults.endpoint),
            api_key: self.llm_api_key.clone().unwrap_or_default(),
            model: self.llm_model.clone().unwrap_or(defaults.model),
            timeout_secs: settings.llm_timeout_secs,
            ..defaults
        }
    }

    async fn open_index(&self) -> anyhow::Result<Box<dyn VectorIndex>> {
        let index: Box<dyn VectorIndex> = match self.index {
            IndexBackend::Local => Box::new(
                LocalIndexStore::open(&self.persist_dir)
                    .await
                    .with_context(|| format!("opening index at {}", self.persist_dir.display()))?,
            ),
            IndexBackend::Qdrant => Box::new(QdrantStore::new(&self.qdrant_url)),
        };
        Ok(index)
    }

    fn video_search(&self) -> anyhow::Result<Box<dyn VideoSearch>> {
        match self.youtube_api_key.as_deref().filter(|key| !key.trim().is_empty()) {
            Some(key) => Ok(Box::new(YouTubeSearcher::new(key)?)),
            None => {
                warn!("YOUTUBE_API_KEY not set, answers will not include videos");
                Ok(Box::new(NoEnrichment))
            }
        }
    }
}

type Engine =
    TutorEngine<Box<dyn VectorIndex>, ChatCompletionsClient, Box<dyn VideoSearch>, SqliteQuizStore>;

async fn build_engine(cli: &Cli, settings: &TutorSettings) -> anyhow::Result<Engine> {
    let embedder = select_embedder(&cli.embedding_settings(settings))?;
    let llm = ChatCompletionsClient::new(cli.llm_config(settings))?;
    let quizzes = SqliteQuizStore::open(&cli.quiz_db).await?;

    Ok(TutorEngine::new(
        embedder,
        cli.open_index().await?,
        llm,
        cli.video_search()?,
        quizzes,
        settings.engine_settings(&cli.collection),
    ))
}

fn print_answer(record: &AnswerRecord) {
    println!("{}", record.answer);
    println!();
    println!(
        "confidence={:?} rewritten_query={:?}",
        record.confidence, record.rewritten_query
    );
    for result in &record.retrieval {
        let locator = result
            .metadata
            .page_or_slide
            .map(|value| format!(" page/slide={value}"))
            .unwrap_or_default();
        println!(
            "[{:.4}] {}{} chunk={}",
            result.score, result.metadata.source, locator, result.metadata.chunk_index
        );
    }
    for video in &record.videos {
        println!("video: {} ({}) {}", video.title, video.channel, video.url);
    }
}

fn print_quiz(stored: &StoredQuiz) {
    println!(
        "#{} {} (topic={}, created_at={})",
        stored.id,
        stored.quiz.title,
        stored.topic,
        stored.created_at.to_rfc3339()
    );
    for (number, question) in stored.quiz.questions.iter().enumerate() {
        println!("{}. {}", number + 1, question.question);
        for (option_index, option) in question.options.iter().enumerate() {
            let marker = if option_index == question.correct_answer { "*" } else { " " };
            println!("   {marker} {}) {option}", option_index + 1);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let settings = TutorSettings::load(cli.config.as_deref())?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        collection = %cli.collection,
        "course-tutor boot"
    );

    match &cli.command {
        Command::Ingest {
            input,
            course_id,
            lecture_id,
            max_tokens,
            overlap,
        } => {
            let mut options = settings.ingestion_options(&cli.collection, course_id);
            options.lecture_id = lecture_id.clone();
            options.max_tokens = max_tokens.unwrap_or(options.max_tokens);
            options.overlap = overlap.unwrap_or(options.overlap);

            let embedder = select_embedder(&cli.embedding_settings(&settings))?;
            let tokenizer = Cl100kTokenizer::new()?;
            let index = cli.open_index().await?;

            let report =
                ingest_path(input, &options, &tokenizer, embedder.as_ref(), index.as_ref()).await?;

            for skipped in &report.skipped {
                warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped file");
            }
            for file in &report.files {
                println!("{} chunks from {}", file.chunks, file.path.display());
            }
            println!(
                "{} chunks indexed into {} at {}",
                report.chunks_indexed,
                cli.collection,
                Utc::now().to_rfc3339()
            );
        }
        Command::Ask {
            question,
            always_enrich,
        } => {
            let engine = build_engine(&cli, &settings).await?;
            let record = engine.answer(question, *always_enrich).await?;
            print_answer(&record);
        }
        Command::Quiz {
            topic,
            context,
            num_questions,
        } => {
            let engine = build_engine(&cli, &settings).await?;
            let stored = engine
                .generate_quiz(
                    topic,
                    context.as_deref(),
                    num_questions.unwrap_or(settings.quiz_questions),
                )
                .await?;
            print_quiz(&stored);
        }
        Command::Quizzes { limit } => {
            let store = SqliteQuizStore::open(&cli.quiz_db).await?;
            let quizzes = store.list(*limit).await?;
            if quizzes.is_empty() {
                println!("no quizzes stored yet");
            }
            for stored in &quizzes {
                print_quiz(stored);
                println!();
            }
        }
    }

    Ok(())
}
