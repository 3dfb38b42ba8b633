//! Centralized metrics for the DropAccess service
//!
//! Each functional area defines its own metrics in a dedicated submodule, so
//! names have a single owner. All names follow `dropaccess_{area}_{name}`.

pub mod access;
pub mod drops;
pub mod limits;
pub mod payments;
pub mod registry;

pub use access::AccessMetrics;
pub use drops::DropMetrics;
pub use limits::GuardMetrics;
pub use payments::PaymentMetrics;

use std::net::SocketAddr;
use std::sync::Once;
use tracing::{info, warn};

static INIT: Once = Once::new();

/// Install the Prometheus recorder and exporter.
///
/// Idempotent. When `listen_addr` is `None` the recorder is still installed so
/// metric calls stay cheap, but nothing is served.
pub fn init_metrics(listen_addr: Option<&str>) {
    INIT.call_once(|| {
        let mut builder = metrics_exporter_prometheus::PrometheusBuilder::new();

        if let Some(addr_str) = listen_addr {
            match addr_str.parse::<SocketAddr>() {
                Ok(addr) => {
                    builder = builder.with_http_listener(addr);
                    info!("Prometheus exporter listening on http://{}/metrics", addr);
                }
                Err(e) => warn!("Invalid metrics addr '{}': {}", addr_str, e),
            }
        }

        let installed = if listen_addr.is_some() {
            builder.install().map(|_| ())
        } else {
            builder.install_recorder().map(|_| ())
        };
        match installed {
            Ok(()) => {
                registry::register_all_metrics();
                info!("All service metrics registered");
            }
            Err(e) => warn!("Failed to install Prometheus recorder: {}", e),
        }
    });
}

/// Implemented by each area to pre-register and document its metrics
pub trait AreaMetrics {
    /// Register all metrics for this area so they show up before first use
    fn register_metrics();

    fn area_name() -> &'static str;

    fn metrics_documentation() -> Vec<MetricDoc>;
}

/// Documentation for a single metric
#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
    pub labels: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub enum MetricType {
    Counter,
    Histogram,
    Gauge,
}

/// Builds a metric name following `dropaccess_{area}_{name}[_total]`
macro_rules! area_metric {
    (counter, $area:literal, $name:literal) => {
        concat!("dropaccess_", $area, "_", $name, "_total")
    };
    (histogram, $area:literal, $name:literal) => {
        concat!("dropaccess_", $area, "_", $name)
    };
    (gauge, $area:literal, $name:literal) => {
        concat!("dropaccess_", $area, "_", $name)
    };
}

pub(crate) use area_metric;
