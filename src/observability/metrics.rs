//! Metrics for the merge pipeline
//!
//! Stages record through the `metrics` facade using names from
//! [`MetricName`]. When a Prometheus recorder is installed with [`init`], the
//! rendered text can be written next to the run's outputs with
//! [`write_snapshot`]; without a recorder every call is a no-op, which is
//! what tests rely on.

use std::fmt;
use std::path::Path;
use std::sync::OnceLock;
use tracing::info;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::error::{Result, TaxaError};

/// Enum representing all metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Source loading
    SourcesRowsLoaded,
    SourcesLoadsFailed,

    // Join
    JoinRuns,
    JoinMatchedPairs,
    JoinUnmatchedRows,
    JoinAmplifiedRows,

    // Deduplication
    DedupInputRows,
    DedupCanonicalRows,
    DedupCollapsedGroups,

    // External lookups
    LookupRequestsSuccess,
    LookupRequestsError,
    LookupRequestDuration,
    LookupRowsReturned,

    // Output
    OutputRowsWritten,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::SourcesRowsLoaded => "taxa_sources_rows_loaded_total",
            MetricName::SourcesLoadsFailed => "taxa_sources_loads_failed_total",
            MetricName::JoinRuns => "taxa_join_runs_total",
            MetricName::JoinMatchedPairs => "taxa_join_matched_pairs_total",
            MetricName::JoinUnmatchedRows => "taxa_join_unmatched_rows_total",
            MetricName::JoinAmplifiedRows => "taxa_join_amplified_rows_total",
            MetricName::DedupInputRows => "taxa_dedup_input_rows_total",
            MetricName::DedupCanonicalRows => "taxa_dedup_canonical_rows_total",
            MetricName::DedupCollapsedGroups => "taxa_dedup_collapsed_groups_total",
            MetricName::LookupRequestsSuccess => "taxa_lookup_requests_success_total",
            MetricName::LookupRequestsError => "taxa_lookup_requests_error_total",
            MetricName::LookupRequestDuration => "taxa_lookup_request_duration_seconds",
            MetricName::LookupRowsReturned => "taxa_lookup_rows_returned_total",
            MetricName::OutputRowsWritten => "taxa_output_rows_written_total",
        }
    }

    /// All metric names, for documentation and tests
    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        [
            MetricName::SourcesRowsLoaded,
            MetricName::SourcesLoadsFailed,
            MetricName::JoinRuns,
            MetricName::JoinMatchedPairs,
            MetricName::JoinUnmatchedRows,
            MetricName::JoinAmplifiedRows,
            MetricName::DedupInputRows,
            MetricName::DedupCanonicalRows,
            MetricName::DedupCollapsedGroups,
            MetricName::LookupRequestsSuccess,
            MetricName::LookupRequestsError,
            MetricName::LookupRequestDuration,
            MetricName::LookupRowsReturned,
            MetricName::OutputRowsWritten,
        ]
        .into_iter()
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Safe to call once per process.
pub fn init() -> Result<()> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| TaxaError::Config(format!("Failed to install Prometheus recorder: {}", e)))?;
    METRICS_HANDLE.set(handle).ok();
    info!("Metrics system initialized");
    Ok(())
}

/// Rendered Prometheus text, if a recorder was installed
pub fn render() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

/// Write the current metric values to `path`; no-op without a recorder
pub fn write_snapshot(path: &Path) -> Result<()> {
    if let Some(text) = render() {
        crate::infra::csv_table::write_text(path, &text)?;
    }
    Ok(())
}

// ============================================================================
// Source Metrics
// ============================================================================

pub mod sources {
    use super::MetricName;

    pub fn rows_loaded(source: &str, rows: usize) {
        ::metrics::counter!(MetricName::SourcesRowsLoaded.as_str(), "source" => source.to_string())
            .increment(rows as u64);
    }

    pub fn load_failed(source: &str) {
        ::metrics::counter!(MetricName::SourcesLoadsFailed.as_str(), "source" => source.to_string())
            .increment(1);
    }
}

// ============================================================================
// Join Metrics
// ============================================================================

pub mod join {
    use super::MetricName;
    use crate::pipeline::processing::join::JoinStats;

    pub fn completed(stats: &JoinStats) {
        ::metrics::counter!(MetricName::JoinRuns.as_str()).increment(1);
        ::metrics::counter!(MetricName::JoinMatchedPairs.as_str()).increment(stats.matched_pairs as u64);
        ::metrics::counter!(MetricName::JoinUnmatchedRows.as_str())
            .increment((stats.left_only + stats.right_only) as u64);
        ::metrics::counter!(MetricName::JoinAmplifiedRows.as_str())
            .increment(stats.amplified_rows() as u64);
    }
}

// ============================================================================
// Deduplication Metrics
// ============================================================================

pub mod dedup {
    use super::MetricName;
    use crate::pipeline::processing::dedup::DedupStats;

    pub fn completed(policy: &str, stats: &DedupStats) {
        let policy = policy.to_string();
        ::metrics::counter!(MetricName::DedupInputRows.as_str(), "policy" => policy.clone())
            .increment(stats.input_rows as u64);
        ::metrics::counter!(MetricName::DedupCanonicalRows.as_str(), "policy" => policy.clone())
            .increment(stats.groups as u64);
        ::metrics::counter!(MetricName::DedupCollapsedGroups.as_str(), "policy" => policy)
            .increment(stats.collapsed_groups as u64);
    }
}

// ============================================================================
// External Lookup Metrics
// ============================================================================

pub mod lookup {
    use super::MetricName;

    pub fn request_success(service: &str) {
        ::metrics::counter!(MetricName::LookupRequestsSuccess.as_str(), "service" => service.to_string())
            .increment(1);
    }

    pub fn request_error(service: &str) {
        ::metrics::counter!(MetricName::LookupRequestsError.as_str(), "service" => service.to_string())
            .increment(1);
    }

    pub fn request_duration(service: &str, secs: f64) {
        ::metrics::histogram!(MetricName::LookupRequestDuration.as_str(), "service" => service.to_string())
            .record(secs);
    }

    pub fn rows_returned(service: &str, rows: usize) {
        ::metrics::counter!(MetricName::LookupRowsReturned.as_str(), "service" => service.to_string())
            .increment(rows as u64);
    }
}

// ============================================================================
// Output Metrics
// ============================================================================

pub mod output {
    use super::MetricName;

    pub fn rows_written(rows: usize) {
        ::metrics::counter!(MetricName::OutputRowsWritten.as_str()).increment(rows as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_metric_names_are_unique_and_prefixed() {
        let names: HashSet<_> = MetricName::all_metrics().map(|m| m.as_str()).collect();
        assert_eq!(names.len(), MetricName::all_metrics().count());
        assert!(names.iter().all(|n| n.starts_with("taxa_")));
    }
}
