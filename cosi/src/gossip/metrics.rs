use commonware_runtime::Metrics as RuntimeMetrics;
use prometheus_client::metrics::{counter::Counter, gauge::Gauge};

/// Metrics for the [`Engine`](super::Engine)
#[derive(Default)]
pub struct Metrics {
    /// Number of rumors sent
    pub rumors_sent: Counter,
    /// Number of rumors received
    pub rumors_received: Counter,
    /// Number of shutdown proofs sent
    pub shutdowns_sent: Counter,
    /// Number of shutdown proofs received
    pub shutdowns_received: Counter,
    /// Number of shutdown proofs that failed verification
    pub spoofed_shutdowns: Counter,
    /// Number of responses that failed verification
    pub invalid_responses: Counter,
    /// Number of distinct signers known
    pub signers: Gauge,
}

impl Metrics {
    /// Create and return a new set of metrics, registered with the given context.
    pub fn init<E: RuntimeMetrics>(context: E) -> Self {
        let metrics = Metrics::default();
        context.register(
            "rumors_sent",
            "Number of rumors sent",
            metrics.rumors_sent.clone(),
        );
        context.register(
            "rumors_received",
            "Number of rumors received",
            metrics.rumors_received.clone(),
        );
        context.register(
            "shutdowns_sent",
            "Number of shutdown proofs sent",
            metrics.shutdowns_sent.clone(),
        );
        context.register(
            "shutdowns_received",
            "Number of shutdown proofs received",
            metrics.shutdowns_received.clone(),
        );
        context.register(
            "spoofed_shutdowns",
            "Number of shutdown proofs that failed verification",
            metrics.spoofed_shutdowns.clone(),
        );
        context.register(
            "invalid_responses",
            "Number of responses that failed verification",
            metrics.invalid_responses.clone(),
        );
        context.register(
            "signers",
            "Number of distinct signers known",
            metrics.signers.clone(),
        );
        metrics
    }
}
