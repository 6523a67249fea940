//! Share transfer restrictions, other restrictions and other provisions.
//!
//! Each is a one-page probe. Pages mentioning a certificate are skipped for
//! restrictions: share certificates repeat the legend on every copy.

use super::{Page, Probe, SectionOutput, SectionParser};
use crate::error::PipelineError;
use crate::oracle::ExtractionOracle;
use crate::prompts;
use async_trait::async_trait;
use serde_json::Value;

pub const SECTION: &str = "restrictions_provisions";

pub struct RestrictionsParser {
    probes: [Probe; 3],
}

impl RestrictionsParser {
    pub fn new() -> Self {
        Self {
            probes: [
                Probe::new(
                    "transfer_restrictions",
                    |p| p.mentions_all(&["transfer", "restrictions"]) && !p.mentions_any(&["certificate"]),
                    prompts::TRANSFER_RESTRICTIONS,
                ),
                Probe::new(
                    "other_restrictions",
                    |p| p.mentions_all(&["other", "restrictions"]) && !p.mentions_any(&["certificate"]),
                    prompts::OTHER_RESTRICTIONS,
                ),
                Probe::new(
                    "other_provisions",
                    |p| p.mentions_all(&["other provisions"]),
                    prompts::OTHER_PROVISIONS,
                ),
            ],
        }
    }
}

impl Default for RestrictionsParser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SectionParser for RestrictionsParser {
    fn name(&self) -> &'static str {
        SECTION
    }

    async fn parse(
        &self,
        pages: &[Page],
        oracle: &dyn ExtractionOracle,
    ) -> Result<SectionOutput, PipelineError> {
        let mut found = Vec::new();
        for page in pages {
            for probe in &self.probes {
                if let Some(fragment) = probe.run(page, oracle).await? {
                    found.push(fragment);
                }
            }
        }
        Ok(SectionOutput::single(SECTION, Value::Array(found)))
    }
}
