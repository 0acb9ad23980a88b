//! Observability hook (§6): an optional latency-trace/token-usage sink,
//! resolved once at construction and never re-probed mid-call. Absence
//! must not change functional behavior — every caller treats this as a
//! best-effort side channel, identical in spirit to how [`crate::notify`]
//! sinks are allowed to silently fail.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::Value;

/// One latency-trace record, emitted around an `index_document` or
/// `retrieve` call (or an internal stage of either).
#[derive(Debug, Clone, Serialize)]
pub struct LatencyTrace {
    pub trace_id: String,
    pub operation_type: String,
    pub operation_name: String,
    pub start_ns: u128,
    pub end_ns: u128,
    pub metadata: Value,
}

/// Approximate token-usage record, emitted alongside a [`LatencyTrace`]
/// for operations that call the LLM daemon.
#[derive(Debug, Clone, Serialize)]
pub struct TokenUsage {
    pub trace_id: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// Contract for an external metrics sink. Implementations must not let a
/// failure to record propagate as an error — observability is always
/// best-effort.
#[async_trait::async_trait]
pub trait MetricsSink: Send + Sync {
    async fn record_latency(&self, trace: LatencyTrace);
    async fn record_token_usage(&self, usage: TokenUsage);
}

/// Resolves an optional metrics capability once, typically at application
/// startup, so hot-path code never has to re-probe availability.
#[derive(Clone)]
pub struct Observability {
    sink: Option<std::sync::Arc<dyn MetricsSink>>,
}

impl Observability {
    /// No metrics sink configured; every call below becomes a no-op.
    #[must_use]
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    #[must_use]
    pub fn with_sink(sink: std::sync::Arc<dyn MetricsSink>) -> Self {
        Self { sink: Some(sink) }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Starts a trace, returning a handle that records elapsed time when
    /// [`TraceHandle::finish`] is called. A no-op when disabled.
    #[must_use]
    pub fn start_trace(&self, operation_type: &str, operation_name: &str) -> TraceHandle {
        TraceHandle {
            trace_id: new_trace_id(),
            operation_type: operation_type.to_string(),
            operation_name: operation_name.to_string(),
            start_ns: now_ns(),
        }
    }

    async fn record_latency(&self, trace: LatencyTrace) {
        if let Some(sink) = &self.sink {
            sink.record_latency(trace).await;
        }
    }

    async fn record_token_usage(&self, usage: TokenUsage) {
        if let Some(sink) = &self.sink {
            sink.record_token_usage(usage).await;
        }
    }
}

/// A started trace, carrying just enough state to emit its completion
/// record. Dropping it without calling [`TraceHandle::finish`] simply
/// discards the trace — there is no mandatory-completion contract.
pub struct TraceHandle {
    trace_id: String,
    operation_type: String,
    operation_name: String,
    start_ns: u128,
}

impl TraceHandle {
    #[must_use]
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Finishes the trace, recording elapsed time and arbitrary metadata
    /// to `observability`. A no-op if `observability` is disabled.
    pub async fn finish(self, observability: &Observability, metadata: Value) {
        observability
            .record_latency(LatencyTrace {
                trace_id: self.trace_id,
                operation_type: self.operation_type,
                operation_name: self.operation_name,
                start_ns: self.start_ns,
                end_ns: now_ns(),
                metadata,
            })
            .await;
    }

    /// Records an approximate token-usage figure alongside this trace.
    pub async fn record_tokens(&self, observability: &Observability, prompt_tokens: usize, completion_tokens: usize) {
        observability
            .record_token_usage(TokenUsage {
                trace_id: self.trace_id.clone(),
                prompt_tokens,
                completion_tokens,
            })
            .await;
    }
}

fn now_ns() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or(0)
}

fn new_trace_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSink {
        latency_calls: AtomicUsize,
        token_calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl MetricsSink for CountingSink {
        async fn record_latency(&self, _trace: LatencyTrace) {
            self.latency_calls.fetch_add(1, Ordering::SeqCst);
        }
        async fn record_token_usage(&self, _usage: TokenUsage) {
            self.token_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn disabled_observability_is_a_silent_no_op() {
        let observability = Observability::disabled();
        assert!(!observability.is_enabled());
        let trace = observability.start_trace("index", "index_document");
        trace.finish(&observability, serde_json::json!({})).await;
    }

    #[tokio::test]
    async fn enabled_observability_records_latency_and_tokens() {
        let sink = Arc::new(CountingSink {
            latency_calls: AtomicUsize::new(0),
            token_calls: AtomicUsize::new(0),
        });
        let observability = Observability::with_sink(Arc::clone(&sink) as Arc<dyn MetricsSink>);
        let trace = observability.start_trace("retrieve", "retrieve");
        trace.record_tokens(&observability, 100, 20).await;
        trace.finish(&observability, serde_json::json!({"top_k": 5})).await;

        assert_eq!(sink.latency_calls.load(Ordering::SeqCst), 1);
        assert_eq!(sink.token_calls.load(Ordering::SeqCst), 1);
    }
}
