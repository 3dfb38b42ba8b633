//! Drop lifecycle metrics

use crate::domain::DropKind;
use crate::metrics::{area_metric, AreaMetrics, MetricDoc, MetricType};

pub struct DropMetrics;

impl DropMetrics {
    pub fn record_created(kind: DropKind, recipients: usize) {
        ::metrics::counter!(area_metric!(counter, "drops", "created"), "kind" => kind.as_str())
            .increment(1);
        ::metrics::histogram!(area_metric!(histogram, "drops", "recipients_per_drop"))
            .record(recipients as f64);
    }

    pub fn record_deleted() {
        ::metrics::counter!(area_metric!(counter, "drops", "deleted")).increment(1);
    }

    pub fn record_upload(bytes: u64) {
        ::metrics::counter!(area_metric!(counter, "drops", "uploads")).increment(1);
        ::metrics::histogram!(area_metric!(histogram, "drops", "upload_bytes")).record(bytes as f64);
    }

    pub fn record_expired(count: usize) {
        ::metrics::counter!(area_metric!(counter, "drops", "expired")).increment(count as u64);
    }

    pub fn record_notification_failed() {
        ::metrics::counter!(area_metric!(counter, "drops", "notifications_failed")).increment(1);
    }
}

impl AreaMetrics for DropMetrics {
    fn register_metrics() {
        use metrics::{counter, histogram};

        let _ = counter!(area_metric!(counter, "drops", "created"));
        let _ = counter!(area_metric!(counter, "drops", "deleted"));
        let _ = counter!(area_metric!(counter, "drops", "uploads"));
        let _ = counter!(area_metric!(counter, "drops", "expired"));
        let _ = counter!(area_metric!(counter, "drops", "notifications_failed"));
        let _ = histogram!(area_metric!(histogram, "drops", "recipients_per_drop"));
        let _ = histogram!(area_metric!(histogram, "drops", "upload_bytes"));
    }

    fn area_name() -> &'static str {
        "drops"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: area_metric!(counter, "drops", "created"),
                metric_type: MetricType::Counter,
                help: "Drops created",
                labels: vec!["kind"],
            },
            MetricDoc {
                name: area_metric!(counter, "drops", "deleted"),
                metric_type: MetricType::Counter,
                help: "Drops deleted by their owner",
                labels: vec![],
            },
            MetricDoc {
                name: area_metric!(counter, "drops", "uploads"),
                metric_type: MetricType::Counter,
                help: "Files uploaded to drops",
                labels: vec![],
            },
            MetricDoc {
                name: area_metric!(counter, "drops", "expired"),
                metric_type: MetricType::Counter,
                help: "Drops deactivated by the expiry sweep",
                labels: vec![],
            },
            MetricDoc {
                name: area_metric!(counter, "drops", "notifications_failed"),
                metric_type: MetricType::Counter,
                help: "Recipient notification emails that could not be sent",
                labels: vec![],
            },
            MetricDoc {
                name: area_metric!(histogram, "drops", "recipients_per_drop"),
                metric_type: MetricType::Histogram,
                help: "Recipients listed on newly created drops",
                labels: vec![],
            },
            MetricDoc {
                name: area_metric!(histogram, "drops", "upload_bytes"),
                metric_type: MetricType::Histogram,
                help: "Size of uploaded files in bytes",
                labels: vec![],
            },
        ]
    }
}
