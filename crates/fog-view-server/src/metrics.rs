//! Prometheus metrics
//!
//! Naming: `view_` prefix, `_total` / `_seconds` suffix. Search outcomes are
//! labelled by code, except that Found and NotFound share the `resolved`
//! label: a per-code split would publish, in aggregate, exactly the bit the
//! fixed-size response hides.

use std::time::Duration;

use fog_view_core::{TxOutSearchResult, TxOutSearchResultCode};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const QUERIES_TOTAL: &str = "view_queries_total";
pub const QUERY_ERRORS_TOTAL: &str = "view_query_errors_total";
pub const SEARCH_OUTCOMES_TOTAL: &str = "view_search_outcomes_total";
pub const QUERY_DURATION_SECONDS: &str = "view_query_duration_seconds";

/// Install the global Prometheus recorder.
///
/// Returns `None` if a recorder is already installed (tests, or a second
/// server in the same process).
pub fn init_prometheus_recorder() -> Option<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder().ok()?;
    describe_metrics();
    Some(handle)
}

fn describe_metrics() {
    describe_counter!(QUERIES_TOTAL, "Queries resolved successfully");
    describe_counter!(
        QUERY_ERRORS_TOTAL,
        "Queries that failed as a whole, by error code"
    );
    describe_counter!(
        SEARCH_OUTCOMES_TOTAL,
        "Search outcomes by code; found and not-found are counted together"
    );
    describe_histogram!(
        QUERY_DURATION_SECONDS,
        "Wall time to resolve one query, including all collaborator calls"
    );
}

/// Label for an outcome code; never distinguishes Found from NotFound
pub fn outcome_label(code: TxOutSearchResultCode) -> &'static str {
    match code {
        TxOutSearchResultCode::Found | TxOutSearchResultCode::NotFound => "resolved",
        other => other.as_str(),
    }
}

pub fn record_query(duration: Duration) {
    counter!(QUERIES_TOTAL).increment(1);
    histogram!(QUERY_DURATION_SECONDS).record(duration.as_secs_f64());
}

pub fn record_query_error(code: &'static str) {
    counter!(QUERY_ERRORS_TOTAL, "code" => code).increment(1);
}

pub fn record_search_outcomes(results: &[TxOutSearchResult]) {
    for result in results {
        counter!(SEARCH_OUTCOMES_TOTAL, "code" => outcome_label(result.result_code)).increment(1);
    }
}
