//! Aggregator: fan-in of section outputs into one final artifact.
//!
//! The final object is the newline-delimited concatenation of each
//! section's own JSON object, in key order; sections are not merged into a
//! single JSON document. Temp objects are deleted once the final object is
//! written. Writing the same final key twice is an overwrite, so a
//! duplicate document-ready event is harmless.

use crate::config::{AggregationPolicy, PipelineConfig};
use crate::engine::SectionRun;
use crate::error::{PipelineError, SectionFailure};
use crate::keys;
use crate::progress::ProgressCallback;
use crate::store::{self, PageStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of aggregating one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationReport {
    pub name: String,
    /// `None` when nothing was written (empty snapshot).
    pub final_key: Option<String>,
    /// Sections included in the final output, in output order.
    pub sections: Vec<String>,
    /// Sections that failed and are missing from the output.
    pub failures: Vec<SectionFailure>,
    pub bytes: usize,
}

impl AggregationReport {
    pub fn is_complete(&self) -> bool {
        self.final_key.is_some() && self.failures.is_empty()
    }
}

pub struct Aggregator {
    store: Arc<dyn PageStore>,
    policy: AggregationPolicy,
    progress: Option<ProgressCallback>,
}

impl Aggregator {
    pub fn new(store: Arc<dyn PageStore>, config: &PipelineConfig) -> Self {
        Self {
            store,
            policy: config.aggregation,
            progress: config.progress_callback.clone(),
        }
    }

    /// Temp keys of `run`'s document that belong to one of its sections.
    async fn temp_keys(&self, run: &SectionRun) -> Result<Vec<(String, String)>, PipelineError> {
        let listing = keys::temp_listing(&run.name);
        let listed = self.store.list(&listing).await?;
        Ok(listed
            .into_iter()
            .filter_map(|key| {
                let section = key.strip_prefix(&listing)?.strip_suffix(".json")?.to_string();
                run.sections
                    .iter()
                    .any(|s| *s == section)
                    .then_some((key, section))
            })
            .collect())
    }

    async fn discard(&self, temp: &[(String, String)]) {
        for (key, _) in temp {
            if let Err(e) = self.store.delete(key).await {
                warn!("Could not delete {}: {}", key, e);
            }
        }
    }

    /// Concatenate the written sections of `run` into
    /// `output/final/<name>.json` and delete the temp objects.
    pub async fn finish(&self, run: &SectionRun) -> Result<AggregationReport, PipelineError> {
        let mut report = AggregationReport {
            name: run.name.clone(),
            failures: run.failures.clone(),
            ..Default::default()
        };
        if run.pages == 0 {
            debug!("{}: nothing to aggregate", run.name);
            return Ok(report);
        }

        let temp = self.temp_keys(run).await?;

        if self.policy == AggregationPolicy::Strict && !run.failures.is_empty() {
            self.discard(&temp).await;
            return Err(PipelineError::PartialSectionFailure {
                prefix: keys::text_prefix(&run.name),
                failed: run.failures.iter().map(|f| f.section.clone()).collect(),
                total: run.sections.len(),
            });
        }

        let mut output = Vec::new();
        for (key, section) in &temp {
            let bytes = store::get_required(self.store.as_ref(), key).await?;
            output.extend_from_slice(&bytes);
            output.push(b'\n');
            report.sections.push(section.clone());
        }

        let final_key = keys::final_key(&run.name);
        report.bytes = output.len();
        self.store.put(&final_key, output).await?;
        info!(
            "{}: wrote {} ({} sections, {} bytes)",
            run.name,
            final_key,
            report.sections.len(),
            report.bytes
        );
        report.final_key = Some(final_key);

        self.discard(&temp).await;

        if let Some(ref cb) = self.progress {
            cb.on_document_complete(&run.name, report.sections.len(), run.sections.len());
        }
        Ok(report)
    }
}
