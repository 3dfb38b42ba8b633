//! Access verification metrics

use crate::access::DenyReason;
use crate::metrics::{area_metric, AreaMetrics, MetricDoc, MetricType};

pub struct AccessMetrics;

impl AccessMetrics {
    pub fn record_granted(started_timer: bool) {
        ::metrics::counter!(area_metric!(counter, "access", "granted")).increment(1);
        if started_timer {
            ::metrics::counter!(area_metric!(counter, "access", "timers_started")).increment(1);
        }
    }

    pub fn record_denied(reason: DenyReason) {
        ::metrics::counter!(area_metric!(counter, "access", "denied"), "reason" => reason.as_str())
            .increment(1);
    }

    pub fn record_content_served(bytes: usize) {
        ::metrics::histogram!(area_metric!(histogram, "access", "content_bytes"))
            .record(bytes as f64);
    }

    pub fn record_sessions_active(count: usize) {
        ::metrics::gauge!(area_metric!(gauge, "access", "sessions_active")).set(count as f64);
    }
}

impl AreaMetrics for AccessMetrics {
    fn register_metrics() {
        use metrics::{counter, gauge, histogram};

        let _ = counter!(area_metric!(counter, "access", "granted"));
        let _ = counter!(area_metric!(counter, "access", "timers_started"));
        let _ = counter!(area_metric!(counter, "access", "denied"));
        let _ = histogram!(area_metric!(histogram, "access", "content_bytes"));
        let _ = gauge!(area_metric!(gauge, "access", "sessions_active"));
    }

    fn area_name() -> &'static str {
        "access"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: area_metric!(counter, "access", "granted"),
                metric_type: MetricType::Counter,
                help: "Successful recipient verifications",
                labels: vec![],
            },
            MetricDoc {
                name: area_metric!(counter, "access", "timers_started"),
                metric_type: MetricType::Counter,
                help: "Per-recipient timers started by a first verification",
                labels: vec![],
            },
            MetricDoc {
                name: area_metric!(counter, "access", "denied"),
                metric_type: MetricType::Counter,
                help: "Rejected verifications",
                labels: vec!["reason"],
            },
            MetricDoc {
                name: area_metric!(histogram, "access", "content_bytes"),
                metric_type: MetricType::Histogram,
                help: "Size of drop content served to recipients",
                labels: vec![],
            },
            MetricDoc {
                name: area_metric!(gauge, "access", "sessions_active"),
                metric_type: MetricType::Gauge,
                help: "Sessions held in the session store after the last sweep",
                labels: vec![],
            },
        ]
    }
}
