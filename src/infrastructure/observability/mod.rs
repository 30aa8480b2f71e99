//! Observability infrastructure - Metrics

mod metrics;

pub use metrics::{
    create_metrics_router, init_metrics, record_http_request, record_issue_rejected,
    record_key_issued, record_keys_swept, record_validation, PrometheusMetrics,
};
