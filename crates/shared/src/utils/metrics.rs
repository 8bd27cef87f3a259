use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, linear_buckets};
use prometheus_client::registry::Registry;

/// Business metrics of the order lifecycle.
#[derive(Clone, Debug)]
pub struct OrderMetrics {
    pub orders_accepted: Counter,
    pub orders_delivered: Counter,
    pub orders_returned: Counter,
    pub orders_returned_to_courier: Counter,
    pub order_processing_time: Histogram,
}

impl Default for OrderMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderMetrics {
    pub fn new() -> Self {
        Self {
            orders_accepted: Counter::default(),
            orders_delivered: Counter::default(),
            orders_returned: Counter::default(),
            orders_returned_to_courier: Counter::default(),
            order_processing_time: Histogram::new(linear_buckets(1.0, 60.0, 10)),
        }
    }

    pub fn register(&self, registry: &mut Registry) {
        registry.register(
            "pvz_orders_accepted",
            "Total number of accepted orders",
            self.orders_accepted.clone(),
        );
        registry.register(
            "pvz_orders_delivered",
            "Total number of orders handed out to customers",
            self.orders_delivered.clone(),
        );
        registry.register(
            "pvz_orders_returned",
            "Total number of orders returned by customers",
            self.orders_returned.clone(),
        );
        registry.register(
            "pvz_orders_returned_to_courier",
            "Total number of orders released back to couriers",
            self.orders_returned_to_courier.clone(),
        );
        registry.register(
            "pvz_order_processing_seconds",
            "Order processing time from acceptance to delivery",
            self.order_processing_time.clone(),
        );
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub method: String,
    pub path: String,
    pub status: u32,
}

/// Request counters and latency histograms for the caller-facing surfaces.
#[derive(Clone, Debug)]
pub struct RequestMetrics {
    pub request_counter: Family<RequestLabels, Counter>,
    pub request_duration: Family<RequestLabels, Histogram>,
}

impl Default for RequestMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestMetrics {
    pub fn new() -> Self {
        Self {
            request_counter: Family::default(),
            request_duration: Family::new_with_constructor(|| {
                Histogram::new(
                    [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0].into_iter(),
                )
            }),
        }
    }

    pub fn register(&self, registry: &mut Registry) {
        registry.register(
            "http_requests",
            "Total number of requests",
            self.request_counter.clone(),
        );
        registry.register(
            "http_request_duration_seconds",
            "Request duration",
            self.request_duration.clone(),
        );
    }

    pub fn record(&self, method: &str, path: &str, status: u32, duration_secs: f64) {
        let labels = RequestLabels {
            method: method.to_string(),
            path: path.to_string(),
            status,
        };
        self.request_counter.get_or_create(&labels).inc();
        self.request_duration
            .get_or_create(&labels)
            .observe(duration_secs);
    }
}
