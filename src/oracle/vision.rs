//! Vision-LLM recognition: rasterise the page, then classify or transcribe.
//!
//! Stands in for a dedicated document-AI service. Every call renders the
//! single-page PDF with pdfium, encodes it as PNG and sends it with one of
//! the recognition prompts in [`crate::prompts`].

use super::{Classification, Recognition, RecognitionMode, RecognitionOracle};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::pipeline::{encode, postprocess, render};
use crate::prompts;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use tracing::{debug, warn};

/// [`RecognitionOracle`] backed by a vision-capable LLM provider.
pub struct VisionRecognitionOracle {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    max_pixels: u32,
}

impl VisionRecognitionOracle {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        let mut options = super::llm::build_options(config);
        // Transcriptions of dense pages are much longer than extraction answers.
        options.max_tokens = Some(config.max_tokens.max(4096));
        options.temperature = Some(0.0);
        Self {
            provider,
            options,
            max_pixels: config.max_rendered_pixels,
        }
    }

    async fn ask_about_page(&self, page_pdf: &[u8], prompt: &str) -> Result<String, PipelineError> {
        let image = render::rasterise_page("page", page_pdf.to_vec(), self.max_pixels).await?;
        let image_data = encode::encode_page(&image).map_err(|e| PipelineError::Recognition {
            key: "page".into(),
            page: 0,
            detail: format!("image encoding failed: {e}"),
        })?;

        let messages = vec![
            ChatMessage::system(prompt),
            ChatMessage::user_with_images("", vec![image_data]),
        ];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| PipelineError::Recognition {
                key: "page".into(),
                page: 0,
                detail: format!("{e}"),
            })?;
        debug!(
            "Recognition: {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

#[async_trait]
impl RecognitionOracle for VisionRecognitionOracle {
    async fn classify(&self, page_pdf: &[u8]) -> Result<Vec<Classification>, PipelineError> {
        let answer = self.ask_about_page(page_pdf, prompts::CLASSIFY_PAGE).await?;
        Ok(parse_classes(&answer))
    }

    async fn recognize(
        &self,
        page_pdf: &[u8],
        mode: RecognitionMode,
    ) -> Result<Recognition, PipelineError> {
        match mode {
            RecognitionMode::Text => {
                let text = self.ask_about_page(page_pdf, prompts::TRANSCRIBE_PAGE).await?;
                Ok(Recognition {
                    text,
                    tables: Vec::new(),
                })
            }
            RecognitionMode::Form => {
                let answer = self.ask_about_page(page_pdf, prompts::TRANSCRIBE_FORM).await?;
                Ok(parse_form(&answer))
            }
        }
    }
}

/// Parse a classification answer; a bare label counts as full confidence.
fn parse_classes(answer: &str) -> Vec<Classification> {
    let cleaned = postprocess::strip_code_fences(answer);
    match serde_json::from_str::<Vec<Classification>>(&cleaned) {
        Ok(classes) => classes,
        Err(_) => {
            let label = cleaned.trim_matches(|c: char| c == '"' || c.is_whitespace());
            if label.is_empty() {
                Vec::new()
            } else {
                vec![Classification {
                    label: label.to_lowercase(),
                    confidence: 1.0,
                }]
            }
        }
    }
}

/// Parse a form transcription; unparseable JSON keeps the raw text.
fn parse_form(answer: &str) -> Recognition {
    let cleaned = postprocess::strip_code_fences(answer);
    serde_json::from_str::<Recognition>(&cleaned).unwrap_or_else(|e| {
        warn!("Form answer is not JSON ({}); keeping it as plain text", e);
        Recognition {
            text: cleaned,
            tables: Vec::new(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_from_json_array() {
        let classes = parse_classes(
            "```json\n[{\"label\": \"form-parser\", \"confidence\": 0.9}, {\"label\": \"other\", \"confidence\": 0.1}]\n```",
        );
        assert_eq!(classes.len(), 2);
        assert_eq!(super::super::best_label(&classes), Some("form-parser"));
    }

    #[test]
    fn classes_from_bare_label() {
        let classes = parse_classes(" \"Dense-OCR\"\n");
        assert_eq!(classes[0].label, "dense-ocr");
        assert!(parse_classes("   ").is_empty());
    }

    #[test]
    fn form_answer_with_tables() {
        let rec = parse_form(r#"{"text": "Register", "tables": [{"rows": [["a", "b"]]}]}"#);
        assert_eq!(rec.text, "Register");
        assert_eq!(rec.tables[0].rows[0], vec!["a", "b"]);
    }

    #[test]
    fn form_answer_falls_back_to_text() {
        let rec = parse_form("Register of Directors\nJohn Smith");
        assert!(rec.tables.is_empty());
        assert!(rec.text.contains("John Smith"));
    }
}
