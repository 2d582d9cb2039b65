use crate::chunking::split_text;
use crate::embeddings::Embedder;
use crate::error::{IndexError, PipelineError};
use crate::extractor::{extract_text, LopdfExtractor, PdfExtractor};
use crate::generation::{AnswerGenerator, ChatModel};
use crate::index::{FlatIndex, IndexStore};
use crate::models::{ChatHistoryEntry, PdfDocument, PipelineConfig, ProcessReport};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    NoIndex,
    Ready { index_id: Uuid },
}

/// Application state for one interactive session: configuration, the hosted
/// model clients, the index location and the question history.
///
/// Every user action is a method call that runs to completion; the session
/// holds no global state.
pub struct QuerySession<E, C> {
    config: PipelineConfig,
    extractor: Box<dyn PdfExtractor + Send + Sync>,
    embedder: E,
    generator: AnswerGenerator<C>,
    store: IndexStore,
    state: IndexState,
    history: Vec<ChatHistoryEntry>,
}

impl<E, C> QuerySession<E, C>
where
    E: Embedder,
    C: ChatModel,
{
    pub fn new(config: PipelineConfig, embedder: E, chat_model: C) -> Result<Self, PipelineError> {
        config.validate()?;

        Ok(Self {
            store: IndexStore::new(config.index_dir.clone()),
            generator: AnswerGenerator::with_temperature(chat_model, config.temperature),
            extractor: Box::new(LopdfExtractor),
            embedder,
            config,
            state: IndexState::NoIndex,
            history: Vec::new(),
        })
    }

    pub fn with_extractor(mut self, extractor: impl PdfExtractor + Send + Sync + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> IndexState {
        self.state
    }

    pub fn history(&self) -> &[ChatHistoryEntry] {
        &self.history
    }

    /// Extracts, chunks and embeds `documents`, then replaces the persisted
    /// index with the result. On failure the previous index stays in place.
    pub async fn process(
        &mut self,
        documents: &[PdfDocument],
    ) -> Result<ProcessReport, PipelineError> {
        let extraction = extract_text(self.extractor.as_ref(), documents);
        if extraction.text.trim().is_empty() {
            return Err(PipelineError::EmptyInput {
                failures: extraction.failures,
            });
        }

        let chunks = split_text(&extraction.text, &self.config.chunking)?;
        info!(
            documents = documents.len(),
            failed = extraction.failures.len(),
            chars = extraction.text.len(),
            chunks = chunks.len(),
            "chunked extracted text"
        );

        let vectors = self.embedder.embed_batch(&chunks).await?;
        let chunk_count = chunks.len();
        let index = FlatIndex::build(chunks, vectors, self.embedder.model())?;
        let manifest = self.store.save(&index)?;

        self.state = IndexState::Ready {
            index_id: manifest.index_id,
        };

        Ok(ProcessReport {
            documents: documents.len(),
            failures: extraction.failures,
            chunk_count,
            index_id: manifest.index_id,
        })
    }

    /// Accepts an index persisted by an earlier run as safe to load.
    ///
    /// Without this call a session only loads an index it built itself.
    pub fn trust_existing_index(&mut self) -> Result<Uuid, PipelineError> {
        let index = self.store.load_trusted(self.embedder.model())?;
        warn!(
            path = %self.store.dir().display(),
            index_id = %index.id(),
            built_at = %index.built_at().to_rfc3339(),
            "trusting index from an earlier run"
        );

        self.state = IndexState::Ready {
            index_id: index.id(),
        };
        Ok(index.id())
    }

    pub async fn ask(&self, question: &str) -> Result<String, PipelineError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(PipelineError::EmptyQuestion);
        }

        let index = self.open_index()?;
        let query_vector = self.embedder.embed(question).await?;
        let hits = index.search(&query_vector, self.config.top_k)?;

        info!(
            index_id = %index.id(),
            hits = hits.len(),
            best_score = hits.first().map(|hit| hit.score).unwrap_or_default(),
            "retrieved context"
        );

        Ok(self.generator.answer(&hits, question).await?)
    }

    /// Runs [`ask`](Self::ask) and appends the outcome to the history. Errors
    /// become the recorded answer text. Blank questions are ignored.
    pub async fn ask_and_record(&mut self, question: &str) -> Option<&ChatHistoryEntry> {
        if question.trim().is_empty() {
            return None;
        }

        let answer = match self.ask(question).await {
            Ok(answer) => answer,
            Err(error) => {
                warn!(%error, "question failed");
                format!("Error processing query: {error}")
            }
        };

        self.history.push(ChatHistoryEntry {
            question: question.trim().to_string(),
            answer,
            asked_at: Utc::now(),
        });
        self.history.last()
    }

    fn open_index(&self) -> Result<FlatIndex, IndexError> {
        match self.state {
            IndexState::Ready { .. } => self.store.load_trusted(self.embedder.model()),
            IndexState::NoIndex if self.store.exists() => Err(IndexError::Untrusted(
                self.store.dir().display().to_string(),
            )),
            IndexState::NoIndex => Err(IndexError::NotFound(
                self.store.dir().display().to_string(),
            )),
        }
    }
}
