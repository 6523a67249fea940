//! Quorum rules for meetings of directors and of shareholders.
//!
//! Quorum clauses often run across a page break, so the window budget is
//! larger than the director register's.

use super::{fragment, Page, SectionOutput, SectionParser, SectionWindow};
use crate::error::PipelineError;
use crate::oracle::{self, ExtractionOracle, Question};
use crate::prompts;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

pub const SECTION: &str = "quorum_rules";

pub struct QuorumParser {
    budget: usize,
    questions: [(&'static str, Question); 2],
}

impl QuorumParser {
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            questions: [
                (
                    "directors_quorum",
                    Question::new(prompts::DIRECTORS_QUORUM, oracle::NOT_FOUND),
                ),
                (
                    "shareholders_quorum",
                    Question::new(prompts::SHAREHOLDERS_QUORUM, oracle::NOT_FOUND),
                ),
            ],
        }
    }
}

#[async_trait]
impl SectionParser for QuorumParser {
    fn name(&self) -> &'static str {
        SECTION
    }

    async fn parse(
        &self,
        pages: &[Page],
        oracle: &dyn ExtractionOracle,
    ) -> Result<SectionOutput, PipelineError> {
        let mut rules: Vec<Value> = Vec::new();
        let mut window = SectionWindow::new(self.budget);

        for page in pages {
            if page.lower().contains("quorum") {
                window.open();
            }
            let Some(flush) = window.visit(page) else {
                continue;
            };
            debug!(
                "Quorum window closed at page {} ({} pages)",
                page.index,
                flush.provenance.len()
            );

            for (field, question) in &self.questions {
                if let Some(answer) = oracle::ask(oracle, question, &flush.passage).await? {
                    rules.push(fragment(field, Value::String(answer), json!(flush.provenance)));
                }
            }
        }

        Ok(SectionOutput::single(SECTION, Value::Array(rules)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sections::testing::{pages, ScriptedOracle};

    const DIRECTORS: &str = "meetings of directors when only one";
    const SHAREHOLDERS: &str = "quorum for meetings of shareholders according";

    #[tokio::test]
    async fn window_spans_trigger_to_last_page() {
        let oracle = ScriptedOracle::new()
            .rule(DIRECTORS, "Quorum", "A majority of directors.")
            .rule(SHAREHOLDERS, "Quorum", "Two shareholders present in person.");
        let ps = pages(&[
            "Articles of incorporation",
            "Share structure",
            "Quorum. A majority of the directors",
            "shall constitute a quorum; two shareholders",
            "present in person are a quorum.",
        ]);

        let output = QuorumParser::new(3072).parse(&ps, &oracle).await.unwrap();
        let urls = json!(["u3", "u4", "u5"]);
        assert_eq!(
            output.body[SECTION],
            json!([
                {"directors_quorum": "A majority of directors.", "provenance": urls},
                {"shareholders_quorum": "Two shareholders present in person.", "provenance": urls},
            ])
        );
        // One passage, both questions.
        let passages = oracle.calls_for(DIRECTORS);
        assert_eq!(passages.len(), 1);
        assert!(passages[0].starts_with("Quorum. A majority"));
        assert!(passages[0].ends_with("present in person are a quorum."));
    }

    #[tokio::test]
    async fn disjoint_windows_give_separate_fragments() {
        let oracle = ScriptedOracle::new()
            .rule(DIRECTORS, "first", "Rule one.")
            .rule(DIRECTORS, "second", "Rule two.");
        let long = format!("quorum first {}", "x".repeat(40));
        let ps = pages(&[&long, "filler", "quorum second"]);

        // Budget smaller than the first page: it flushes on its own.
        let output = QuorumParser::new(5).parse(&ps, &oracle).await.unwrap();
        assert_eq!(
            output.body[SECTION],
            json!([
                {"directors_quorum": "Rule one.", "provenance": ["u1"]},
                {"directors_quorum": "Rule two.", "provenance": ["u3"]},
            ])
        );
    }

    #[tokio::test]
    async fn no_trigger_is_empty_not_error() {
        let oracle = ScriptedOracle::new();
        let ps = pages(&["Minutes", "Resolutions"]);
        let output = QuorumParser::new(3072).parse(&ps, &oracle).await.unwrap();
        assert_eq!(output.body[SECTION], json!([]));
        assert!(oracle.calls.lock().unwrap().is_empty());
    }
}
