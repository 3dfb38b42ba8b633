//! Registers every area's metrics and detects name collisions early.

use crate::metrics::{AreaMetrics, MetricDoc};
use std::collections::HashMap;
use tracing::{info, warn};

pub fn register_all_metrics() {
    let mut all_metrics = HashMap::new();

    register_area_metrics::<super::AccessMetrics>(&mut all_metrics);
    register_area_metrics::<super::DropMetrics>(&mut all_metrics);
    register_area_metrics::<super::GuardMetrics>(&mut all_metrics);
    register_area_metrics::<super::PaymentMetrics>(&mut all_metrics);

    info!("Registered {} total metrics", all_metrics.len());

    if std::env::var("DROPACCESS_METRICS_DEBUG").is_ok() {
        log_metrics_summary(&all_metrics);
    }
}

fn register_area_metrics<T: AreaMetrics>(all_metrics: &mut HashMap<String, MetricDoc>) {
    T::register_metrics();
    let area = T::area_name();

    for doc in T::metrics_documentation() {
        if all_metrics.contains_key(doc.name) {
            warn!(
                "Metric name conflict detected: '{}' registered again by area '{}'",
                doc.name, area
            );
        } else {
            all_metrics.insert(doc.name.to_string(), doc);
        }
    }
}

fn log_metrics_summary(all_metrics: &HashMap<String, MetricDoc>) {
    let mut by_area: HashMap<&str, Vec<&MetricDoc>> = HashMap::new();
    for doc in all_metrics.values() {
        by_area.entry(area_of(doc.name)).or_default().push(doc);
    }

    for (area, docs) in by_area {
        info!("Area '{}': {} metrics", area, docs.len());
        for doc in docs {
            info!(
                "  - {} ({:?}) [{}]: {}",
                doc.name,
                doc.metric_type,
                doc.labels.join(","),
                doc.help
            );
        }
    }
}

/// e.g. "dropaccess_guard_denied_total" -> "guard"
fn area_of(metric_name: &str) -> &str {
    metric_name
        .strip_prefix("dropaccess_")
        .and_then(|rest| rest.split('_').next())
        .unwrap_or("unknown")
}
