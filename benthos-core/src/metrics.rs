use prometheus::{
    HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Registry,
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_vec_with_registry,
    register_int_gauge_with_registry,
};

/// Service metrics, registered against one [`Registry`] owned by the service
/// root and shared by handle.
///
/// Exposing the registry to a sink is the deployment's concern; this type
/// only records.
#[derive(Clone)]
pub struct Metrics {
    /// Per-endpoint request entries.
    pub request_calls: IntCounterVec,
    /// Per-endpoint completions by status code.
    pub request_results: IntCounterVec,
    /// Per-endpoint handler duration in seconds.
    pub request_duration: HistogramVec,
    /// Images handled per discovery phase.
    pub images_processed: IntCounterVec,
    /// Newly registered image rows.
    pub images_added: IntCounter,
    /// Row counts returned by the batched catalog selections.
    pub query_result_length: HistogramVec,
    /// Jobs reclaimed by the reaper, by job type.
    pub jobs_reaped: IntCounterVec,
    /// Canonical dives inserted by the most recent consolidation.
    pub new_canonical_dives: IntGauge,
    /// Catalog table sizes, refreshed by the summary worker.
    pub catalog_rows: IntGaugeVec,
    /// Jobs by status, refreshed by the summary worker.
    pub jobs_by_status: IntGaugeVec,
    /// Unix time of the last successful annotation-project sync.
    pub last_label_sync: IntGaugeVec,
    /// Bytes currently staged by the file cache.
    pub cache_occupancy_bytes: IntGauge,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            request_calls: register_int_counter_vec_with_registry!(
                "benthos_request_call",
                "Number of requests received per endpoint",
                &["endpoint"],
                registry
            )
            .expect("register request_call"),
            request_results: register_int_counter_vec_with_registry!(
                "benthos_request_result",
                "Number of responses per endpoint and status code",
                &["endpoint", "code"],
                registry
            )
            .expect("register request_result"),
            request_duration: register_histogram_vec_with_registry!(
                "benthos_request_duration_seconds",
                "Handler duration per endpoint",
                &["endpoint"],
                registry
            )
            .expect("register request_duration"),
            images_processed: register_int_counter_vec_with_registry!(
                "benthos_images_processed",
                "Images handled per discovery phase",
                &["phase"],
                registry
            )
            .expect("register images_processed"),
            images_added: register_int_counter_with_registry!(
                "benthos_images_added",
                "Newly registered image rows",
                registry
            )
            .expect("register images_added"),
            query_result_length: register_histogram_vec_with_registry!(
                "benthos_query_result_length",
                "Row counts returned by batched catalog selections",
                &["query"],
                registry
            )
            .expect("register query_result_length"),
            jobs_reaped: register_int_counter_vec_with_registry!(
                "benthos_jobs_reaped",
                "Jobs returned to the pending pool by the reaper",
                &["job_type"],
                registry
            )
            .expect("register jobs_reaped"),
            new_canonical_dives: register_int_gauge_with_registry!(
                "benthos_new_canonical_dives",
                "Canonical dives inserted by the most recent consolidation",
                registry
            )
            .expect("register new_canonical_dives"),
            catalog_rows: register_int_gauge_vec_with_registry!(
                "benthos_catalog_rows",
                "Catalog table sizes",
                &["table"],
                registry
            )
            .expect("register catalog_rows"),
            jobs_by_status: register_int_gauge_vec_with_registry!(
                "benthos_jobs_by_status",
                "Jobs by status",
                &["status"],
                registry
            )
            .expect("register jobs_by_status"),
            last_label_sync: register_int_gauge_vec_with_registry!(
                "benthos_last_label_studio_sync",
                "Unix time of the last successful annotation-project sync",
                &["project"],
                registry
            )
            .expect("register last_label_sync"),
            cache_occupancy_bytes: register_int_gauge_with_registry!(
                "benthos_cache_occupancy_bytes",
                "Bytes currently staged by the file cache",
                registry
            )
            .expect("register cache_occupancy_bytes"),
        }
    }

    /// A metrics bundle on a private registry, for tests.
    pub fn unregistered() -> Self {
        Self::new(&Registry::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_once_per_registry() {
        let registry = Registry::new();
        let metrics = Metrics::new(&registry);
        metrics.request_calls.with_label_values(&["/version"]).inc();
        metrics
            .request_results
            .with_label_values(&["/version", "200"])
            .inc();
        let gathered = registry.gather();
        assert!(
            gathered
                .iter()
                .any(|family| family.get_name() == "benthos_request_call")
        );
    }
}
