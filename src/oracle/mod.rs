//! Black-box request/response services the pipeline depends on.
//!
//! * [`RecognitionOracle`]: classify one page and recover its text/tables.
//! * [`ExtractionOracle`]: answer a natural-language instruction about a
//!   passage.
//!
//! Parsers never see prompts or models; they ask a [`Question`] and get
//! either an answer or `None` when the oracle replied with the question's
//! "no answer" sentinel.

mod llm;
mod vision;

pub use llm::{resolve_provider, LlmExtractionOracle};
pub use vision::VisionRecognitionOracle;

use crate::error::PipelineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Sentinel for "the passage does not contain an answer".
pub const NOT_FOUND: &str = "Not Found";

/// Sentinel for "no records" on questions that expect a JSON array.
pub const EMPTY_LIST: &str = "[]";

/// Heading placed before each CSV table appended to page text.
pub const TABLE_HEADING: &str = "Comma-Separated Values Table\n===\n";

// ── Extraction ───────────────────────────────────────────────────────────

/// Answers an instruction about a passage.
#[async_trait]
pub trait ExtractionOracle: Send + Sync {
    async fn answer(&self, instruction: &str, passage: &str) -> Result<String, PipelineError>;
}

/// An instruction plus the exact answer that means "nothing found".
#[derive(Debug, Clone)]
pub struct Question {
    pub instruction: String,
    pub sentinel: &'static str,
}

impl Question {
    pub fn new(instruction: impl Into<String>, sentinel: &'static str) -> Self {
        Self {
            instruction: instruction.into(),
            sentinel,
        }
    }

    /// Trimmed answer, or `None` for the sentinel or an empty reply.
    pub fn interpret(&self, answer: &str) -> Option<String> {
        let answer = answer.trim();
        if answer.is_empty() || answer == self.sentinel {
            None
        } else {
            Some(answer.to_string())
        }
    }
}

/// Ask `question` about `passage`.
pub async fn ask(
    oracle: &dyn ExtractionOracle,
    question: &Question,
    passage: &str,
) -> Result<Option<String>, PipelineError> {
    let raw = oracle.answer(&question.instruction, passage).await?;
    Ok(question.interpret(&raw))
}

// ── Recognition ──────────────────────────────────────────────────────────

/// One candidate page class with its confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub confidence: f32,
}

/// Label with the highest confidence, if any.
pub fn best_label(classes: &[Classification]) -> Option<&str> {
    classes
        .iter()
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        .map(|c| c.label.as_str())
}

/// Which recognizer a page goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionMode {
    /// Full-page OCR.
    Text,
    /// Structure-aware recognition that also returns tables.
    Form,
}

impl RecognitionMode {
    /// Route a classification label; `None` means no recognition needed.
    pub fn for_label(label: Option<&str>) -> Option<Self> {
        match label? {
            "dense-ocr" | "other" | "certificate" => Some(RecognitionMode::Text),
            "form-parser" => Some(RecognitionMode::Form),
            _ => None,
        }
    }
}

/// A table as rows of cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub rows: Vec<Vec<String>>,
}

/// Text and tables recovered from one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    pub text: String,
    #[serde(default)]
    pub tables: Vec<Table>,
}

impl Recognition {
    /// Page text with every table appended as a CSV block.
    pub fn into_page_text(self) -> String {
        let mut out = self.text;
        for table in &self.tables {
            match table_to_csv(table) {
                Ok(csv) => {
                    if !out.is_empty() && !out.ends_with('\n') {
                        out.push('\n');
                    }
                    out.push_str(TABLE_HEADING);
                    out.push_str(&csv);
                }
                Err(e) => warn!("Dropping table that failed CSV encoding: {}", e),
            }
        }
        out
    }
}

fn table_to_csv(table: &Table) -> Result<String, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_writer(Vec::new());
    for row in &table.rows {
        writer.write_record(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Classifies pages and recovers their content.
#[async_trait]
pub trait RecognitionOracle: Send + Sync {
    /// Candidate classes for a single-page PDF.
    async fn classify(&self, page_pdf: &[u8]) -> Result<Vec<Classification>, PipelineError>;

    /// Recover text (and, in [`RecognitionMode::Form`], tables).
    async fn recognize(
        &self,
        page_pdf: &[u8],
        mode: RecognitionMode,
    ) -> Result<Recognition, PipelineError>;
}
