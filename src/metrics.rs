use tracing::trace;

// Trace-based counters; a metrics backend can subscribe to these targets
// without the binary carrying an exporter.

pub fn source_resolved(source: &'static str, tier: &'static str, elapsed_ms: u128) {
    trace!(
        target = "pricescan.metrics",
        source = source,
        tier = tier,
        elapsed_ms = elapsed_ms as u64,
        "source_resolved"
    );
}

pub fn tier_escalated(source: &'static str, tier: &'static str, reason: &'static str) {
    trace!(
        target = "pricescan.metrics",
        source = source,
        tier = tier,
        reason = reason,
        "tier_escalated"
    );
}

pub fn batch_completed(batch: usize, of: usize, elapsed_ms: u128) {
    trace!(
        target = "pricescan.metrics",
        batch = batch,
        of = of,
        elapsed_ms = elapsed_ms as u64,
        "batch_completed"
    );
}
