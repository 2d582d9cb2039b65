use chrono::{DateTime, Utc};
use std::path::PathBuf;
use uuid::Uuid;

use crate::chunking::ChunkingConfig;
use crate::error::IngestError;

pub const DEFAULT_CHUNK_SIZE: usize = 10_000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 1_000;
pub const DEFAULT_TOP_K: usize = 4;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_INDEX_DIR: &str = "pdf_index";
pub const DEFAULT_EMBEDDING_MODEL: &str = "models/embedding-001";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-pro";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// An uploaded PDF. Lives only for the processing request that reads it.
#[derive(Debug, Clone)]
pub struct PdfDocument {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl PdfDocument {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionFailure {
    pub document: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    pub text: String,
    pub failures: Vec<ExtractionFailure>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub position: usize,
    pub text: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatHistoryEntry {
    pub question: String,
    pub answer: String,
    pub asked_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ProcessReport {
    pub documents: usize,
    pub failures: Vec<ExtractionFailure>,
    pub chunk_count: usize,
    pub index_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chunking: ChunkingConfig,
    pub top_k: usize,
    pub temperature: f32,
    pub index_dir: PathBuf,
    pub embedding_model: String,
    pub chat_model: String,
    pub api_base: String,
    pub request_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            top_k: DEFAULT_TOP_K,
            temperature: DEFAULT_TEMPERATURE,
            index_dir: PathBuf::from(DEFAULT_INDEX_DIR),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        self.chunking.validate()?;

        if self.top_k == 0 {
            return Err(IngestError::InvalidArgument(
                "top_k must be at least 1".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(IngestError::InvalidArgument(format!(
                "temperature {} is outside 0.0..=2.0",
                self.temperature
            )));
        }

        Ok(())
    }
}
