#[cfg(feature = "metrics")]
use once_cell::sync::Lazy;
#[cfg(feature = "metrics")]
use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
};
#[cfg(feature = "metrics")]
use opentelemetry_prometheus::PrometheusExporter;

#[cfg(feature = "metrics")]
pub static METRICS: Lazy<QueryMetrics> = Lazy::new(QueryMetrics::init);

#[cfg(feature = "metrics")]
pub struct QueryMetrics {
    pub exporter: Option<PrometheusExporter>,
    pub queries_total: Counter<u64>,
    pub query_errors_total: Counter<u64>,
    pub query_duration: Histogram<f64>,
}

#[cfg(feature = "metrics")]
impl QueryMetrics {
    pub fn init() -> Self {
        let exporter = match opentelemetry_prometheus::exporter().build() {
            Ok(exporter) => Some(exporter),
            Err(err) => {
                log::warn!("prometheus exporter unavailable: {err}");
                None
            }
        };
        let meter = global::meter("lifequery");

        let queries_total = meter
            .u64_counter("lifequery_queries_total")
            .with_description("Total statements executed")
            .build();

        let query_errors_total = meter
            .u64_counter("lifequery_query_errors_total")
            .with_description("Statements that failed in the data source")
            .build();

        let query_duration = meter
            .f64_histogram("lifequery_query_duration_seconds")
            .with_description("Duration of statements")
            .build();

        Self {
            exporter,
            queries_total,
            query_errors_total,
            query_duration,
        }
    }

    pub fn record_query(&self, elapsed: std::time::Duration) {
        self.queries_total.add(1, &[]);
        self.query_duration.record(elapsed.as_secs_f64(), &[]);
    }

    pub fn record_query_error(&self) {
        self.query_errors_total.add(1, &[]);
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::Span;

    /// Span around one statement execution
    pub fn execute_query_span(sql: &str) -> Span {
        tracing::debug_span!("lifequery.execute", db.system = "postgresql", db.statement = sql)
    }

    /// Span around a unit-of-work flush
    pub fn flush_span(pending: usize) -> Span {
        tracing::debug_span!("lifequery.flush", pending)
    }

    pub fn commit_transaction_span() -> Span {
        tracing::debug_span!("lifequery.commit")
    }

    pub fn rollback_transaction_span() -> Span {
        tracing::debug_span!("lifequery.rollback")
    }
}
