//! Directors: the election register plus board size limits.
//!
//! The register is a windowed scan whose answers are JSON arrays of
//! director records. Records are merged by title-cased name, so a person
//! elected in one window and retired in another ends up as one record.
//! Board size limits are per-page probes.

use super::{Page, Probe, SectionOutput, SectionParser, SectionWindow};
use crate::error::PipelineError;
use crate::oracle::{self, ExtractionOracle, Question};
use crate::pipeline::postprocess::{normalise_address, reversed_name, strip_code_fences, title_case};
use crate::prompts;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

pub const SECTION: &str = "directors";

static POSTAL_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z]\d[A-Za-z] \d[A-Za-z]\d").expect("valid regex"));
static ZIP_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{5}").expect("valid regex"));

/// One page URL or the URLs of a whole window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Provenance {
    One(String),
    Many(Vec<String>),
}

/// A merged director record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Director {
    pub director_name: String,
    pub date_elected: Option<String>,
    pub date_retired: Option<String>,
    pub address: Option<String>,
    pub provenance: Provenance,
}

/// A record as the oracle returns it; every field may be missing.
#[derive(Debug, Default, Deserialize)]
struct ElectedRecord {
    #[serde(default)]
    director_name: Option<String>,
    #[serde(default)]
    date_elected: Option<String>,
    #[serde(default)]
    date_retired: Option<String>,
    #[serde(default)]
    address: Option<Value>,
    #[serde(default)]
    provenance: Option<Provenance>,
}

impl ElectedRecord {
    fn name(&self) -> Option<String> {
        self.director_name
            .as_deref()
            .map(title_case)
            .filter(|n| !n.is_empty())
    }

    fn address(&self) -> Option<String> {
        self.address
            .as_ref()
            .and_then(Value::as_str)
            .map(normalise_address)
            .filter(|a| !a.is_empty())
    }
}

impl Director {
    /// Fold a later sighting of the same person into this record.
    fn update(&mut self, item: ElectedRecord) {
        if let Some(address) = item.address() {
            self.address = Some(address);
        }
        if item.date_elected.is_some() {
            self.date_elected = item.date_elected;
        }
        if item.date_retired.is_some() {
            self.date_retired = item.date_retired;
        }
        if let Some(provenance) = item.provenance {
            self.provenance = provenance;
        }
    }
}

/// Parse an election answer into records; `Err` when it is not a JSON array.
fn parse_election(answer: &str) -> Result<Vec<ElectedRecord>, PipelineError> {
    let parse_error = |detail: String| PipelineError::ExtractionParse {
        section: SECTION.to_string(),
        detail,
    };
    let items: Vec<Value> =
        serde_json::from_str(&strip_code_fences(answer)).map_err(|e| parse_error(e.to_string()))?;
    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!("Skipping malformed director record: {}", e);
                None
            }
        })
        .collect())
}

fn has_address_signal(lower: &str) -> bool {
    lower.contains("address") || POSTAL_CODE_RE.is_match(lower) || ZIP_CODE_RE.is_match(lower)
}

pub struct DirectorsParser {
    budget: usize,
    election: Question,
    limits: [Probe; 2],
}

impl DirectorsParser {
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            election: Question::new(prompts::ELECTION_OF_DIRECTORS, oracle::EMPTY_LIST),
            limits: [
                Probe::new(
                    "min_directors",
                    |p| {
                        p.mentions_any(&["minimum", "less than"])
                            && p.mentions_all(&["directors", "number"])
                    },
                    prompts::MINIMUM_DIRECTORS,
                ),
                Probe::new(
                    "max_directors",
                    |p| {
                        p.mentions_any(&["maximum", "more than"])
                            && p.mentions_all(&["directors", "number"])
                    },
                    prompts::MAXIMUM_DIRECTORS,
                ),
            ],
        }
    }

    fn opens_register(page: &Page) -> bool {
        page.mentions_all(&["elected", "director", "register"])
    }

    /// Merge one window's answer into `register`.
    async fn absorb(
        &self,
        register: &mut Vec<Director>,
        items: Vec<ElectedRecord>,
        window_provenance: &[String],
        pages: &[Page],
        oracle: &dyn ExtractionOracle,
    ) -> Result<(), PipelineError> {
        let mut found: Vec<Director> = Vec::new();

        for item in items {
            let Some(name) = item.name() else {
                continue;
            };

            if let Some(existing) = register.iter_mut().find(|d| d.director_name == name) {
                debug!("Director {}: updating existing record", name);
                existing.update(item);
                continue;
            }
            if found.iter().any(|d| d.director_name == name) {
                continue;
            }

            let address = match lookup_address(&name, pages, oracle).await? {
                Some(address) => Some(address),
                None => item.address(),
            };
            debug!("Director {}: new record, address {:?}", name, address);
            found.push(Director {
                director_name: name,
                date_elected: item.date_elected,
                date_retired: item.date_retired,
                address,
                provenance: Provenance::Many(window_provenance.to_vec()),
            });
        }

        register.extend(found);
        Ok(())
    }
}

/// Scan every page for a mailing address next to `name`.
///
/// A page qualifies when it mentions the person (or the "Last, First"
/// form) and carries an address signal. The first answer that is not
/// "Not Found" wins.
async fn lookup_address(
    name: &str,
    pages: &[Page],
    oracle: &dyn ExtractionOracle,
) -> Result<Option<String>, PipelineError> {
    let alias = reversed_name(name);
    let needle = name.to_lowercase();
    let alias_needle = alias.as_deref().map(str::to_lowercase);
    let question = Question::new(prompts::address_of(name, alias.as_deref()), oracle::NOT_FOUND);

    for page in pages {
        let lower = page.lower();
        let named = lower.contains(&needle)
            || alias_needle.as_deref().is_some_and(|a| lower.contains(a));
        if !named || !has_address_signal(lower) {
            continue;
        }
        if let Some(address) = oracle::ask(oracle, &question, &page.text).await? {
            let address = normalise_address(&address);
            if !address.is_empty() {
                debug!("Address for {} found on page {}", name, page.index);
                return Ok(Some(address));
            }
        }
    }
    Ok(None)
}

#[async_trait]
impl SectionParser for DirectorsParser {
    fn name(&self) -> &'static str {
        SECTION
    }

    async fn parse(
        &self,
        pages: &[Page],
        oracle: &dyn ExtractionOracle,
    ) -> Result<SectionOutput, PipelineError> {
        let mut register: Vec<Director> = Vec::new();
        let mut limits: [Vec<Value>; 2] = [Vec::new(), Vec::new()];
        let mut window = SectionWindow::new(self.budget);

        for page in pages {
            for (probe, out) in self.limits.iter().zip(limits.iter_mut()) {
                if let Some(fragment) = probe.run(page, oracle).await? {
                    out.push(fragment);
                }
            }

            if Self::opens_register(page) {
                window.open();
            }
            let Some(flush) = window.visit(page) else {
                continue;
            };

            let Some(answer) = oracle::ask(oracle, &self.election, &flush.passage).await? else {
                continue;
            };
            match parse_election(&answer) {
                Ok(items) => {
                    self.absorb(&mut register, items, &flush.provenance, pages, oracle)
                        .await?
                }
                Err(e) => warn!("Page {}: dropping election window: {}", page.index, e),
            }
        }

        let [minimum, maximum] = limits;
        let register = serde_json::to_value(&register).map_err(|e| PipelineError::Internal(e.to_string()))?;
        let mut body = Map::new();
        body.insert(SECTION.to_string(), register);
        body.insert("minimum_directors".to_string(), Value::Array(minimum));
        body.insert("maximum_directors".to_string(), Value::Array(maximum));
        Ok(SectionOutput {
            section: SECTION,
            body,
        })
    }
}
