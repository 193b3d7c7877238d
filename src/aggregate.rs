use crate::models::{ProductPriceRecord, SourceId};
use crate::scheduler::Completion;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

/// Per-source tallies for a finished run, mirrored in the closing log
/// lines. `price_found` counts results with a price (with or without a
/// URL), `url_only` counts results that located a page but no price.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SourceTally {
    pub price_found: usize,
    pub url_only: usize,
    pub unresolved: usize,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct RunSummary {
    pub total_identifiers: usize,
    pub by_source: BTreeMap<SourceId, SourceTally>,
}

impl RunSummary {
    fn tally(records: &[ProductPriceRecord]) -> Self {
        let mut summary = Self {
            total_identifiers: records.len(),
            by_source: BTreeMap::new(),
        };
        for record in records {
            for (source, result) in &record.by_source {
                let tally = summary.by_source.entry(*source).or_default();
                if result.price.is_some() {
                    tally.price_found += 1;
                } else if result.url.is_some() {
                    tally.url_only += 1;
                } else {
                    tally.unresolved += 1;
                }
            }
        }
        summary
    }

    pub fn log(&self) {
        for (source, tally) in &self.by_source {
            info!(
                target = "pricescan.aggregate",
                source = %source,
                total = self.total_identifiers,
                price_found = tally.price_found,
                url_only = tally.url_only,
                unresolved = tally.unresolved,
                "source totals"
            );
        }
    }
}

/// Restores input order over the scheduler's completions and tallies the
/// run. Completions arrive in within-batch settle order, so the sort is
/// what gives callers output row N for input row N.
pub struct ResultAggregator;

impl ResultAggregator {
    pub fn finalize(mut completions: Vec<Completion>) -> (Vec<ProductPriceRecord>, RunSummary) {
        completions.sort_by_key(|(index, _)| *index);
        let records: Vec<ProductPriceRecord> = completions
            .into_iter()
            .map(|(_, record)| record)
            .collect();
        let summary = RunSummary::tally(&records);
        (records, summary)
    }
}
