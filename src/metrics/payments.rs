//! Payment webhook and checkout metrics

use crate::metrics::{area_metric, AreaMetrics, MetricDoc, MetricType};

pub struct PaymentMetrics;

impl PaymentMetrics {
    pub fn record_webhook(event_type: &str, outcome: &'static str) {
        // Unknown event types are folded together to keep label cardinality bounded
        let event_type = match event_type {
            "checkout.session.completed" => "checkout.session.completed",
            "customer.subscription.updated" => "customer.subscription.updated",
            "customer.subscription.deleted" => "customer.subscription.deleted",
            _ => "other",
        };
        ::metrics::counter!(
            area_metric!(counter, "payments", "webhooks"),
            "event_type" => event_type,
            "outcome" => outcome
        )
        .increment(1);
    }

    pub fn record_signature_rejected() {
        ::metrics::counter!(area_metric!(counter, "payments", "signatures_rejected")).increment(1);
    }

    pub fn record_checkout_created() {
        ::metrics::counter!(area_metric!(counter, "payments", "checkouts_created")).increment(1);
    }
}

impl AreaMetrics for PaymentMetrics {
    fn register_metrics() {
        use metrics::counter;

        let _ = counter!(area_metric!(counter, "payments", "webhooks"));
        let _ = counter!(area_metric!(counter, "payments", "signatures_rejected"));
        let _ = counter!(area_metric!(counter, "payments", "checkouts_created"));
    }

    fn area_name() -> &'static str {
        "payments"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: area_metric!(counter, "payments", "webhooks"),
                metric_type: MetricType::Counter,
                help: "Webhook events received from the payment provider",
                labels: vec!["event_type", "outcome"],
            },
            MetricDoc {
                name: area_metric!(counter, "payments", "signatures_rejected"),
                metric_type: MetricType::Counter,
                help: "Webhook deliveries rejected for a bad signature",
                labels: vec![],
            },
            MetricDoc {
                name: area_metric!(counter, "payments", "checkouts_created"),
                metric_type: MetricType::Counter,
                help: "Checkout sessions created with the payment provider",
                labels: vec![],
            },
        ]
    }
}
