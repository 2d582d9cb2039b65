use crate::error::ServiceError;
use crate::models::{RetrievedChunk, DEFAULT_TEMPERATURE};
use async_trait::async_trait;
use tracing::debug;

/// Answer returned by the model when the retrieved context does not cover
/// the question. The prompt asks for it verbatim; nothing enforces it.
pub const FALLBACK_ANSWER: &str = "I couldn't find an answer to your question in the provided context. You might want to refine your question or upload more relevant documents.";

pub const PROMPT_TEMPLATE: &str = r#"Answer the question as detailed as possible from the provided context.
If the answer is not in the context, respond with:
"{fallback}"

Context:
{context}
Question:
{question}
Answer:
"#;

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String, ServiceError>;

    fn model(&self) -> &str;
}

/// Retrieved chunks joined with blank lines, best match first.
pub fn build_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn render_prompt(context: &str, question: &str) -> String {
    fill_template(
        PROMPT_TEMPLATE,
        &[
            ("fallback", FALLBACK_ANSWER),
            ("context", context),
            ("question", question),
        ],
    )
}

/// Single pass over `template`, so placeholder-looking text inside the
/// substituted values is never expanded again.
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            values
                .iter()
                .find(|(name, _)| *name == &after[..close])
                .map(|(_, value)| (*value, close))
        });

        match value {
            Some((value, close)) => {
                rendered.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                rendered.push('{');
                rest = after;
            }
        }
    }

    rendered.push_str(rest);
    rendered
}

pub struct AnswerGenerator<C> {
    model: C,
    temperature: f32,
}

impl<C: ChatModel> AnswerGenerator<C> {
    pub fn new(model: C) -> Self {
        Self::with_temperature(model, DEFAULT_TEMPERATURE)
    }

    pub fn with_temperature(model: C, temperature: f32) -> Self {
        Self { model, temperature }
    }

    pub fn model(&self) -> &C {
        &self.model
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// The model's reply, untouched.
    pub async fn answer(
        &self,
        chunks: &[RetrievedChunk],
        question: &str,
    ) -> Result<String, ServiceError> {
        let prompt = render_prompt(&build_context(chunks), question);
        debug!(
            model = self.model.model(),
            context_chunks = chunks.len(),
            prompt_chars = prompt.len(),
            "requesting answer"
        );
        self.model.generate(&prompt, self.temperature).await
    }
}
