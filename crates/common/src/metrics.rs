use std::sync::{Arc, OnceLock};

use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};

#[derive(Clone, Debug)]
pub struct MetricsRegistry {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    registry: Registry,
    merge_items_drained: CounterVec,
    merge_items_yielded: CounterVec,
    merge_buffer_items: GaugeVec,
    merge_drain_seconds: HistogramVec,
    source_pages: CounterVec,
    source_items: CounterVec,
    source_node_failures: CounterVec,
    source_cancellations: CounterVec,
    source_first_page_wait_seconds: HistogramVec,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::new()),
        }
    }

    /// Record one completed drain pass of the merge engine.
    pub fn record_merge_drain(&self, query_id: &str, drained: u64, buffered: u64, secs: f64) {
        let labels = [query_id];
        self.inner
            .merge_items_drained
            .with_label_values(&labels)
            .inc_by(drained as f64);
        self.inner
            .merge_buffer_items
            .with_label_values(&labels)
            .set(buffered as f64);
        self.inner
            .merge_drain_seconds
            .with_label_values(&labels)
            .observe(secs.max(0.0));
    }

    pub fn inc_merge_items_yielded(&self, query_id: &str) {
        self.inner
            .merge_items_yielded
            .with_label_values(&[query_id])
            .inc();
    }

    pub fn set_merge_buffer_items(&self, query_id: &str, buffered: u64) {
        self.inner
            .merge_buffer_items
            .with_label_values(&[query_id])
            .set(buffered as f64);
    }

    /// Record one page delivered by one node.
    pub fn record_source_page(&self, query_id: &str, node_id: &str, items: u64) {
        let labels = [query_id, node_id];
        self.inner.source_pages.with_label_values(&labels).inc();
        self.inner
            .source_items
            .with_label_values(&labels)
            .inc_by(items as f64);
    }

    pub fn inc_source_node_failure(&self, query_id: &str, node_id: &str) {
        self.inner
            .source_node_failures
            .with_label_values(&[query_id, node_id])
            .inc();
    }

    pub fn inc_source_cancellation(&self, query_id: &str) {
        self.inner
            .source_cancellations
            .with_label_values(&[query_id])
            .inc();
    }

    pub fn observe_first_page_wait(&self, query_id: &str, secs: f64) {
        self.inner
            .source_first_page_wait_seconds
            .with_label_values(&[query_id])
            .observe(secs.max(0.0));
    }

    pub fn render_prometheus(&self) -> String {
        let metric_families = self.inner.registry.gather();
        let mut out = Vec::new();
        let enc = TextEncoder::new();
        if enc.encode(&metric_families, &mut out).is_err() {
            return String::new();
        }
        String::from_utf8_lossy(&out).to_string()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsInner {
    fn new() -> Self {
        let registry = Registry::new();

        let merge_items_drained = counter_vec(
            &registry,
            "rfq_merge_items_drained_total",
            "Items pulled from the underlying stream into the merge buffer",
            &["query_id"],
        );
        let merge_items_yielded = counter_vec(
            &registry,
            "rfq_merge_items_yielded_total",
            "Rank-ordered items yielded to the caller",
            &["query_id"],
        );
        let merge_buffer_items = gauge_vec(
            &registry,
            "rfq_merge_buffer_items",
            "Items currently held in the merge buffer",
            &["query_id"],
        );
        let merge_drain_seconds = histogram_vec(
            &registry,
            "rfq_merge_drain_seconds",
            "Time spent draining the underlying stream",
            &["query_id"],
        );

        let source_pages = counter_vec(
            &registry,
            "rfq_source_pages_total",
            "Result pages delivered per node",
            &["query_id", "node_id"],
        );
        let source_items = counter_vec(
            &registry,
            "rfq_source_items_total",
            "Result items delivered per node",
            &["query_id", "node_id"],
        );
        let source_node_failures = counter_vec(
            &registry,
            "rfq_source_node_failures_total",
            "Per-node stream failures",
            &["query_id", "node_id"],
        );
        let source_cancellations = counter_vec(
            &registry,
            "rfq_source_cancellations_total",
            "Result streams cancelled before completion",
            &["query_id"],
        );
        let source_first_page_wait_seconds = histogram_vec(
            &registry,
            "rfq_source_first_page_wait_seconds",
            "Time until every node delivered its first page",
            &["query_id"],
        );

        Self {
            registry,
            merge_items_drained,
            merge_items_yielded,
            merge_buffer_items,
            merge_drain_seconds,
            source_pages,
            source_items,
            source_node_failures,
            source_cancellations,
            source_first_page_wait_seconds,
        }
    }
}

fn counter_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let c = CounterVec::new(Opts::new(name, help), labels).expect("counter vec");
    registry
        .register(Box::new(c.clone()))
        .expect("register counter");
    c
}

fn gauge_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> GaugeVec {
    let g = GaugeVec::new(Opts::new(name, help), labels).expect("gauge vec");
    registry
        .register(Box::new(g.clone()))
        .expect("register gauge");
    g
}

fn histogram_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> HistogramVec {
    let h = HistogramVec::new(HistogramOpts::new(name, help), labels).expect("histogram vec");
    registry
        .register(Box::new(h.clone()))
        .expect("register histogram");
    h
}

static GLOBAL_METRICS: OnceLock<MetricsRegistry> = OnceLock::new();

pub fn global_metrics() -> &'static MetricsRegistry {
    GLOBAL_METRICS.get_or_init(MetricsRegistry::new)
}
