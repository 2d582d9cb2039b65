use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use pdf_query_core::{
    collect_documents, ChatHistoryEntry, ChunkingConfig, ExtractionFailure, GeminiClient,
    PipelineConfig, PipelineError, QuerySession, DEFAULT_API_BASE, DEFAULT_CHAT_MODEL,
    DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_EMBEDDING_MODEL, DEFAULT_INDEX_DIR,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_TEMPERATURE, DEFAULT_TOP_K,
};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

type Session = QuerySession<GeminiClient, GeminiClient>;

#[derive(Parser)]
#[command(name = "pdf-query", version, about = "Ask questions about your PDFs using Google Gemini")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Google Gemini API key
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Directory holding the persisted index
    #[arg(long, default_value = DEFAULT_INDEX_DIR)]
    index_dir: PathBuf,

    /// Maximum characters per chunk
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Characters shared by neighbouring chunks
    #[arg(long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    chunk_overlap: usize,

    /// Number of chunks handed to the model as context
    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    top_k: usize,

    /// Sampling temperature for answers
    #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
    temperature: f32,

    /// Embedding model name
    #[arg(long, default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Chat model name
    #[arg(long, default_value = DEFAULT_CHAT_MODEL)]
    chat_model: String,

    /// Generative Language API base URL
    #[arg(long, env = "GEMINI_API_BASE", default_value = DEFAULT_API_BASE)]
    api_base: String,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    request_timeout_secs: u64,
}

#[derive(Args)]
struct Upload {
    /// PDF file to process; repeat for several files.
    #[arg(long = "pdf")]
    pdfs: Vec<PathBuf>,

    /// Folder searched recursively for PDFs.
    #[arg(long)]
    folder: Option<PathBuf>,
}

impl Upload {
    fn is_empty(&self) -> bool {
        self.pdfs.is_empty() && self.folder.is_none()
    }
}

#[derive(Subcommand)]
enum Command {
    /// Extract, chunk and embed PDFs, replacing the stored index.
    Process {
        #[command(flatten)]
        upload: Upload,
    },
    /// Ask one question against the stored index.
    Ask {
        /// The question
        #[arg(long)]
        question: String,
        /// Load the index left by an earlier run. Only use an index you built.
        #[arg(long, default_value_t = false)]
        trust_index: bool,
    },
    /// Optionally process PDFs, then answer questions read from stdin.
    Chat {
        #[command(flatten)]
        upload: Upload,
        /// Load the index left by an earlier run. Only use an index you built.
        #[arg(long, default_value_t = false)]
        trust_index: bool,
    },
}

impl Cli {
    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            chunking: ChunkingConfig::new(self.chunk_size, self.chunk_overlap),
            top_k: self.top_k,
            temperature: self.temperature,
            index_dir: self.index_dir.clone(),
            embedding_model: self.embedding_model.clone(),
            chat_model: self.chat_model.clone(),
            api_base: self.api_base.clone(),
            request_timeout_secs: self.request_timeout_secs,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "pdf-query boot"
    );

    let api_key = cli
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string);
    let Some(api_key) = api_key else {
        let action = match cli.command {
            Command::Process { .. } => "processing",
            Command::Ask { .. } | Command::Chat { .. } => "asking questions",
        };
        eprintln!("Please set your API key before {action} (--api-key or GOOGLE_API_KEY).");
        return Ok(ExitCode::FAILURE);
    };

    let mut session = open_session(cli.pipeline_config(), api_key)?;

    let succeeded = match cli.command {
        Command::Process { upload } => process(&mut session, &upload).await,
        Command::Ask {
            question,
            trust_index,
        } => {
            if trust_index && !trust(&mut session) {
                return Ok(ExitCode::FAILURE);
            }
            match session.ask(&question).await {
                Ok(answer) => {
                    println!("{answer}");
                    true
                }
                Err(error) => {
                    println!("Error processing query: {error}");
                    false
                }
            }
        }
        Command::Chat {
            upload,
            trust_index,
        } => {
            if !upload.is_empty() && !process(&mut session, &upload).await {
                return Ok(ExitCode::FAILURE);
            }
            if trust_index && upload.is_empty() && !trust(&mut session) {
                return Ok(ExitCode::FAILURE);
            }
            chat(&mut session).await?;
            true
        }
    };

    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn open_session(config: PipelineConfig, api_key: String) -> anyhow::Result<Session> {
    let client = GeminiClient::new(api_key, &config)?;
    Ok(QuerySession::new(config, client.clone(), client)?)
}

async fn process(session: &mut Session, upload: &Upload) -> bool {
    let documents = match collect_documents(&upload.pdfs, upload.folder.as_deref()) {
        Ok(documents) => documents,
        Err(error) => {
            eprintln!("Error: {error}");
            return false;
        }
    };

    info!(documents = documents.len(), "processing");
    match session.process(&documents).await {
        Ok(report) => {
            print_failures(&report.failures);
            println!(
                "Processing complete! Ready for questions. ({} chunks from {} file(s), index {})",
                report.chunk_count,
                report.documents - report.failures.len(),
                report.index_id
            );
            true
        }
        Err(PipelineError::EmptyInput { failures }) => {
            print_failures(&failures);
            eprintln!("No text extracted from the uploaded PDFs.");
            false
        }
        Err(error) => {
            eprintln!("Error creating vector store: {error}");
            false
        }
    }
}

fn trust(session: &mut Session) -> bool {
    match session.trust_existing_index() {
        Ok(index_id) => {
            info!(%index_id, "using stored index");
            true
        }
        Err(error) => {
            eprintln!("Error loading stored index: {error}");
            false
        }
    }
}

fn print_failures(failures: &[ExtractionFailure]) {
    for failure in failures {
        warn!(document = %failure.document, reason = %failure.reason, "skipped pdf");
        eprintln!("Error reading {}: {}", failure.document, failure.reason);
    }
}

fn print_entry(number: usize, entry: &ChatHistoryEntry) {
    println!("Q{number}: {}", entry.question);
    println!("A{number}: {}", entry.answer);
}

async fn chat(session: &mut Session) -> anyhow::Result<()> {
    println!("Ask any question from the PDF files. `history` shows the chat history, `exit` quits.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match line.trim() {
            "" => continue,
            "exit" | "quit" => break,
            "history" => {
                println!("Chat History");
                for (index, entry) in session.history().iter().enumerate() {
                    print_entry(index + 1, entry);
                }
            }
            question => {
                if let Some(entry) = session.ask_and_record(question).await.cloned() {
                    print_entry(session.history().len(), &entry);
                }
            }
        }
    }

    Ok(())
}
