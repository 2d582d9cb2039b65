pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod index;
pub mod ingest;
pub mod models;
pub mod providers;
pub mod session;

pub use chunking::{merge_chunks, split_text, ChunkingConfig};
pub use embeddings::{CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{IndexError, IngestError, PipelineError, ServiceError};
pub use extractor::{extract_text, LopdfExtractor, PageText, PdfExtractor};
pub use generation::{
    build_context, render_prompt, AnswerGenerator, ChatModel, FALLBACK_ANSWER, PROMPT_TEMPLATE,
};
pub use index::{cosine_similarity, FlatIndex, IndexEntry, IndexManifest, IndexStore};
pub use ingest::{collect_documents, discover_pdf_files, load_documents};
pub use models::{
    ChatHistoryEntry, ExtractionFailure, ExtractionReport, PdfDocument, PipelineConfig,
    ProcessReport, RetrievedChunk, DEFAULT_API_BASE, DEFAULT_CHAT_MODEL, DEFAULT_CHUNK_OVERLAP,
    DEFAULT_CHUNK_SIZE, DEFAULT_EMBEDDING_MODEL, DEFAULT_INDEX_DIR, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_TEMPERATURE, DEFAULT_TOP_K,
};
pub use providers::GeminiClient;
pub use session::{IndexState, QuerySession};
