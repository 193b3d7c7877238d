use crate::config::RunConfig;
use crate::http::jitter_pause;
use crate::metrics;
use crate::models::{ProductIdentifier, ProductPriceRecord, SourceId};
use crate::resolve::SourceResolver;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// A record paired with the input position of its identifier; the
/// aggregator restores input order from these.
pub type Completion = (usize, ProductPriceRecord);

/// Drives a run: consecutive batches of `batch_size` identifiers, at most
/// `max_concurrent_per_batch` identifier tasks in flight at once, every
/// configured source queried concurrently within a task. Batch N+1 does
/// not start until batch N has fully settled, and a pacing sleep
/// separates batches.
pub struct ResolutionScheduler {
    config: Arc<RunConfig>,
    resolvers: Vec<Arc<dyn SourceResolver>>,
}

impl ResolutionScheduler {
    pub fn new(config: RunConfig, resolvers: Vec<Arc<dyn SourceResolver>>) -> Self {
        Self {
            config: Arc::new(config),
            resolvers,
        }
    }

    pub fn sources(&self) -> Vec<SourceId> {
        self.resolvers.iter().map(|resolver| resolver.source()).collect()
    }

    /// Resolves every identifier; one completion per input, faults
    /// included. Never aborts the run for a bad identifier.
    pub async fn run(&self, identifiers: &[ProductIdentifier]) -> Vec<Completion> {
        let sources = self.sources();
        let total_batches = identifiers.len().div_ceil(self.config.batch_size);
        let mut completions: Vec<Completion> = Vec::with_capacity(identifiers.len());

        for (batch_no, batch) in identifiers.chunks(self.config.batch_size).enumerate() {
            let batch_started = Instant::now();
            info!(
                target = "pricescan.scheduler",
                batch = batch_no + 1,
                of = total_batches,
                size = batch.len(),
                "batch started"
            );

            let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_per_batch));
            let mut handles = Vec::with_capacity(batch.len());
            for (offset, identifier) in batch.iter().cloned().enumerate() {
                let index = batch_no * self.config.batch_size + offset;
                let semaphore = semaphore.clone();
                let resolvers = self.resolvers.clone();
                let handle = tokio::spawn(async move {
                    // The semaphore is never closed while handles are
                    // pending, so acquisition cannot fail.
                    let _permit = semaphore.acquire_owned().await.ok();
                    let results =
                        join_all(resolvers.iter().map(|resolver| resolver.resolve(&identifier)))
                            .await;
                    ProductPriceRecord::new(identifier, results)
                });
                handles.push((index, handle));
            }

            // Wait for every task in the batch, failed ones included,
            // before pacing into the next one.
            for (index, handle) in handles {
                match handle.await {
                    Ok(record) => completions.push((index, record)),
                    Err(err) => {
                        let identifier = identifiers[index].clone();
                        warn!(
                            target = "pricescan.scheduler",
                            identifier = %identifier,
                            panicked = err.is_panic(),
                            "identifier task faulted"
                        );
                        completions.push((index, ProductPriceRecord::faulted(identifier, &sources)));
                    }
                }
            }

            metrics::batch_completed(
                batch_no + 1,
                total_batches,
                batch_started.elapsed().as_millis(),
            );
            if batch_no + 1 < total_batches {
                jitter_pause(self.config.inter_batch_delay).await;
            }
        }

        completions
    }
}
