//! Subscription guard metrics

use crate::guard::LimitKind;
use crate::metrics::{area_metric, AreaMetrics, MetricDoc, MetricType};

pub struct GuardMetrics;

impl GuardMetrics {
    pub fn record_denied(limit: LimitKind) {
        ::metrics::counter!(area_metric!(counter, "guard", "denied"), "limit" => limit.as_str())
            .increment(1);
    }
}

impl AreaMetrics for GuardMetrics {
    fn register_metrics() {
        let _ = metrics::counter!(area_metric!(counter, "guard", "denied"));
    }

    fn area_name() -> &'static str {
        "guard"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![MetricDoc {
            name: area_metric!(counter, "guard", "denied"),
            metric_type: MetricType::Counter,
            help: "Operations rejected because a plan limit was reached",
            labels: vec!["limit"],
        }]
    }
}
