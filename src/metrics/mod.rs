//! Request metrics
//!
//! In-process counters and duration histograms exposed in Prometheus text
//! format at /metrics. Labels are method, route template, and status code;
//! route templates come from the router so ids never appear as label values.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Mutex;

/// Histogram bucket upper bounds in seconds
const DURATION_BUCKETS: [f64; 9] = [0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Labels {
    method: String,
    route: String,
    status: u16,
}

#[derive(Debug, Default, Clone)]
struct Histogram {
    /// Cumulative counts per bucket in DURATION_BUCKETS order
    buckets: [u64; DURATION_BUCKETS.len()],
    sum: f64,
    count: u64,
}

impl Histogram {
    fn observe(&mut self, value: f64) {
        for (i, bound) in DURATION_BUCKETS.iter().enumerate() {
            if value <= *bound {
                self.buckets[i] += 1;
            }
        }
        self.sum += value;
        self.count += 1;
    }
}

#[derive(Debug, Default)]
struct Registry {
    requests: HashMap<Labels, u64>,
    durations: HashMap<Labels, Histogram>,
}

/// Request metrics registry
#[derive(Debug, Default)]
pub struct Metrics {
    inner: Mutex<Registry>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed request.
    pub fn record(&self, method: &str, route: &str, status: u16, duration_secs: f64) {
        let labels = Labels {
            method: method.to_string(),
            route: route.to_string(),
            status,
        };

        let mut registry = self.inner.lock().expect("metrics mutex poisoned");
        *registry.requests.entry(labels.clone()).or_insert(0) += 1;
        registry
            .durations
            .entry(labels)
            .or_default()
            .observe(duration_secs);
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let registry = self.inner.lock().expect("metrics mutex poisoned");
        let mut out = String::new();

        out.push_str("# HELP cash_platform_http_requests_total Total number of HTTP requests\n");
        out.push_str("# TYPE cash_platform_http_requests_total counter\n");
        let mut requests: Vec<_> = registry.requests.iter().collect();
        requests.sort_by(|a, b| format!("{:?}", a.0).cmp(&format!("{:?}", b.0)));
        for (labels, count) in requests {
            let _ = writeln!(
                out,
                "cash_platform_http_requests_total{{method=\"{}\",route=\"{}\",status_code=\"{}\"}} {}",
                labels.method, labels.route, labels.status, count
            );
        }

        out.push_str(
            "# HELP cash_platform_http_request_duration_seconds Duration of HTTP requests in seconds\n",
        );
        out.push_str("# TYPE cash_platform_http_request_duration_seconds histogram\n");
        let mut durations: Vec<_> = registry.durations.iter().collect();
        durations.sort_by(|a, b| format!("{:?}", a.0).cmp(&format!("{:?}", b.0)));
        for (labels, hist) in durations {
            let series = format!(
                "method=\"{}\",route=\"{}\",status_code=\"{}\"",
                labels.method, labels.route, labels.status
            );
            for (i, bound) in DURATION_BUCKETS.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "cash_platform_http_request_duration_seconds_bucket{{{series},le=\"{bound}\"}} {}",
                    hist.buckets[i]
                );
            }
            let _ = writeln!(
                out,
                "cash_platform_http_request_duration_seconds_bucket{{{series},le=\"+Inf\"}} {}",
                hist.count
            );
            let _ = writeln!(
                out,
                "cash_platform_http_request_duration_seconds_sum{{{series}}} {}",
                hist.sum
            );
            let _ = writeln!(
                out,
                "cash_platform_http_request_duration_seconds_count{{{series}}} {}",
                hist.count
            );
        }

        out
    }
}
