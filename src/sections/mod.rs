//! Section parsers: independent single-pass scans over a document's
//! ordered pages, each producing one [`SectionOutput`].
//!
//! Two shapes of scan share this module:
//!
//! * **Windowed** ([`SectionWindow`]): a trigger opens a window that
//!   accumulates pages until the token budget or the last page, then the
//!   passage is sent to the oracle once. Used for the director register
//!   and quorum rules, which span pages.
//! * **Probed** ([`Probe`]): a per-page predicate asks one question about
//!   that page alone. Used for board size limits and restrictions.
//!
//! Parsers read an immutable page snapshot and own their results until the
//! engine writes them.

mod directors;
mod quorum;
mod restrictions;
mod window;

pub use directors::{Director, DirectorsParser, Provenance};
pub use quorum::QuorumParser;
pub use restrictions::RestrictionsParser;
pub use window::{Flush, SectionWindow};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::oracle::{self, ExtractionOracle, Question};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

/// One recognized page as the parsers see it.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// 1-based position in the document.
    pub index: u32,
    pub text_key: String,
    /// Public link to the page PDF.
    pub url: String,
    pub text: String,
    pub is_last: bool,
    lower: String,
}

impl Page {
    pub fn new(
        index: u32,
        text_key: impl Into<String>,
        url: impl Into<String>,
        text: impl Into<String>,
        is_last: bool,
    ) -> Self {
        let text = text.into();
        Self {
            index,
            text_key: text_key.into(),
            url: url.into(),
            lower: text.to_lowercase(),
            text,
            is_last,
        }
    }

    /// Lower-cased text, for trigger predicates.
    pub fn lower(&self) -> &str {
        &self.lower
    }

    /// Whether the lower-cased text contains every needle.
    pub fn mentions_all(&self, needles: &[&str]) -> bool {
        needles.iter().all(|n| self.lower.contains(n))
    }

    /// Whether the lower-cased text contains any needle.
    pub fn mentions_any(&self, needles: &[&str]) -> bool {
        needles.iter().any(|n| self.lower.contains(n))
    }
}

/// A named bag of fields produced by one parser for one document.
///
/// Serialised as a JSON object whose keys are the body's keys, so each
/// section keeps its own envelope in the final output.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionOutput {
    pub section: &'static str,
    pub body: Map<String, Value>,
}

impl SectionOutput {
    /// `{ "<section>": value }`.
    pub fn single(section: &'static str, value: Value) -> Self {
        let mut body = Map::new();
        body.insert(section.to_string(), value);
        Self { section, body }
    }

    pub fn to_pretty_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(&self.body)
    }
}

/// One independently extracted section of a minute book.
#[async_trait]
pub trait SectionParser: Send + Sync {
    /// Stable section name; also the suffix of the section's temp key.
    fn name(&self) -> &'static str;

    /// Scan `pages` (sorted by index) and build this section.
    ///
    /// Unparseable oracle answers are dropped per window; oracle transport
    /// failures are returned and fail the whole section.
    async fn parse(
        &self,
        pages: &[Page],
        oracle: &dyn ExtractionOracle,
    ) -> Result<SectionOutput, PipelineError>;
}

/// The parsers run for every document.
pub fn default_parsers(config: &PipelineConfig) -> Vec<Arc<dyn SectionParser>> {
    vec![
        Arc::new(DirectorsParser::new(config.director_token_budget)),
        Arc::new(QuorumParser::new(config.quorum_token_budget)),
        Arc::new(RestrictionsParser::new()),
    ]
}

/// `{ "<field>": value, "provenance": provenance }`.
pub(crate) fn fragment(field: &str, value: Value, provenance: Value) -> Value {
    let mut object = Map::new();
    object.insert(field.to_string(), value);
    object.insert("provenance".to_string(), provenance);
    Value::Object(object)
}

// ── Per-page probes ──────────────────────────────────────────────────────

/// A per-page question gated by a content predicate.
pub(crate) struct Probe {
    /// Output field name (`min_directors`, `transfer_restrictions`, ...).
    pub field: &'static str,
    pub trigger: fn(&Page) -> bool,
    pub question: Question,
}

impl Probe {
    pub fn new(field: &'static str, trigger: fn(&Page) -> bool, instruction: &str) -> Self {
        Self {
            field,
            trigger,
            question: Question::new(instruction, oracle::NOT_FOUND),
        }
    }

    /// Ask about `page` if the trigger matches. Yields
    /// `{ "<field>": answer, "provenance": url }`.
    pub async fn run(
        &self,
        page: &Page,
        oracle: &dyn ExtractionOracle,
    ) -> Result<Option<Value>, PipelineError> {
        if !(self.trigger)(page) {
            return Ok(None);
        }
        let answer = oracle::ask(oracle, &self.question, &page.text).await?;
        debug!("Page {}: {} → {:?}", page.index, self.field, answer);
        Ok(answer.map(|a| fragment(self.field, Value::String(a), json!(page.url))))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted oracle and page builders shared by the parser tests.

    use super::*;
    use std::sync::Mutex;

    /// Answers by the first rule whose instruction and passage needles both
    /// match; otherwise "Not Found". Records every call.
    #[derive(Default)]
    pub struct ScriptedOracle {
        rules: Vec<(String, String, String)>,
        pub calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedOracle {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn rule(mut self, instruction: &str, passage: &str, answer: &str) -> Self {
            self.rules
                .push((instruction.to_string(), passage.to_string(), answer.to_string()));
            self
        }

        pub fn calls_for(&self, instruction: &str) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(i, _)| i.contains(instruction))
                .map(|(_, p)| p.clone())
                .collect()
        }
    }

    #[async_trait]
    impl ExtractionOracle for ScriptedOracle {
        async fn answer(&self, instruction: &str, passage: &str) -> Result<String, PipelineError> {
            self.calls
                .lock()
                .unwrap()
                .push((instruction.to_string(), passage.to_string()));
            Ok(self
                .rules
                .iter()
                .find(|(i, p, _)| instruction.contains(i.as_str()) && passage.contains(p.as_str()))
                .map(|(_, _, a)| a.clone())
                .unwrap_or_else(|| oracle::NOT_FOUND.to_string()))
        }
    }

    /// Pages with URLs `u1..uN`.
    pub fn pages(texts: &[&str]) -> Vec<Page> {
        let n = texts.len() as u32;
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let index = i as u32 + 1;
                Page::new(
                    index,
                    format!("output/txt/doc_page_{index}.txt"),
                    format!("u{index}"),
                    *t,
                    index == n,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn page_predicates_are_case_insensitive() {
        let page = Page::new(1, "k", "u", "Minimum NUMBER of Directors", true);
        assert!(page.mentions_all(&["minimum", "number", "directors"]));
        assert!(page.mentions_any(&["maximum", "minimum"]));
        assert!(!page.mentions_all(&["quorum"]));
    }

    #[test]
    fn section_output_envelope() {
        let out = SectionOutput::single("quorum_rules", json!([]));
        let value: Value = serde_json::from_slice(&out.to_pretty_json().unwrap()).unwrap();
        assert_eq!(value, json!({"quorum_rules": []}));
    }

    #[tokio::test]
    async fn probe_skips_untriggered_pages_and_sentinels() {
        let probe = Probe::new("other_provisions", |p| p.mentions_all(&["other provisions"]), "PROVISIONS");
        let oracle = ScriptedOracle::new().rule("PROVISIONS", "borrowing", "May borrow money.");
        let ps = pages(&["nothing here", "Other provisions: none", "Other Provisions: borrowing"]);

        assert_eq!(probe.run(&ps[0], &oracle).await.unwrap(), None);
        assert_eq!(probe.run(&ps[1], &oracle).await.unwrap(), None);
        assert_eq!(
            probe.run(&ps[2], &oracle).await.unwrap(),
            Some(json!({"other_provisions": "May borrow money.", "provenance": "u3"}))
        );
        assert_eq!(oracle.calls_for("PROVISIONS").len(), 2);
    }
}
