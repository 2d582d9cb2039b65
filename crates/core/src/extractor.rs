use crate::error::IngestError;
use crate::models::{ExtractionFailure, ExtractionReport, PdfDocument};
use lopdf::Document;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor {
    fn extract_pages(&self, document: &PdfDocument) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, document: &PdfDocument) -> Result<Vec<PageText>, IngestError> {
        let parsed = Document::load_mem(&document.bytes)
            .map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let page_ids = parsed.get_pages();
        if page_ids.is_empty() {
            return Err(IngestError::PdfParse(format!(
                "pdf has no pages: {}",
                document.name
            )));
        }

        let mut pages = Vec::with_capacity(page_ids.len());
        for (page_no, _page_id) in page_ids {
            let text = parsed
                .extract_text(&[page_no])
                .map_err(|error| IngestError::PdfParse(format!("page {page_no}: {error}")))?;

            pages.push(PageText {
                number: page_no,
                text,
            });
        }

        Ok(pages)
    }
}

/// Concatenates the text of every page of every document, in input order.
///
/// A document that cannot be parsed is recorded in the report's failures and
/// skipped; it never aborts the batch.
pub fn extract_text<X: PdfExtractor + ?Sized>(
    extractor: &X,
    documents: &[PdfDocument],
) -> ExtractionReport {
    let mut report = ExtractionReport::default();

    for document in documents {
        match extractor.extract_pages(document) {
            Ok(pages) => {
                let before = report.text.len();
                for page in &pages {
                    report.text.push_str(&page.text);
                }

                if report.text.len() == before {
                    warn!(document = %document.name, "pdf had no readable page text");
                } else {
                    debug!(
                        document = %document.name,
                        pages = pages.len(),
                        bytes = report.text.len() - before,
                        "extracted pdf text"
                    );
                }
            }
            Err(error) => {
                warn!(document = %document.name, reason = %error, "skipping unreadable pdf");
                report.failures.push(ExtractionFailure {
                    document: document.name.clone(),
                    reason: error.to_string(),
                });
            }
        }
    }

    report
}
