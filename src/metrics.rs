//! Request metrics and periodic summaries for the prediction service.

use crate::types::response::{PredictResponse, Reply, ReplyBody, StatusCategory};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for the request path
pub struct ServiceMetrics {
    /// Total requests handled (any outcome)
    pub requests_handled: AtomicU64,
    /// Total rows predicted across successful requests
    pub rows_predicted: AtomicU64,
    /// Health checks answered
    pub health_checks: AtomicU64,
    /// Failed requests by status category
    errors_by_status: RwLock<HashMap<String, u64>>,
    /// Predicted classes (label, or `class_<index>` without a label table)
    predictions_by_class: RwLock<HashMap<String, u64>>,
    /// Processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl ServiceMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            requests_handled: AtomicU64::new(0),
            rows_predicted: AtomicU64::new(0),
            health_checks: AtomicU64::new(0),
            errors_by_status: RwLock::new(HashMap::new()),
            predictions_by_class: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            start_time: Instant::now(),
        }
    }

    /// Record a prediction reply and how long it took
    pub fn record_reply(&self, reply: &Reply, processing_time: Duration) {
        self.requests_handled.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only last 10000
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }

        match (&reply.status, &reply.body) {
            (StatusCategory::Ok, ReplyBody::Prediction(response)) => self.record_prediction(response),
            (StatusCategory::Ok, _) => {}
            (status, _) => {
                if let Ok(mut by_status) = self.errors_by_status.write() {
                    *by_status.entry(format!("{:?}", status)).or_insert(0) += 1;
                }
            }
        }
    }

    /// Record an answered health check
    pub fn record_health_check(&self) {
        self.health_checks.fetch_add(1, Ordering::Relaxed);
    }

    fn record_prediction(&self, response: &PredictResponse) {
        self.rows_predicted
            .fetch_add(response.len() as u64, Ordering::Relaxed);

        let PredictResponse::Classification {
            predictions,
            labels,
        } = response
        else {
            return;
        };

        if let Ok(mut by_class) = self.predictions_by_class.write() {
            match labels {
                Some(labels) => {
                    for label in labels {
                        *by_class.entry(label.clone()).or_insert(0) += 1;
                    }
                }
                None => {
                    for idx in predictions {
                        *by_class.entry(format!("class_{}", idx)).or_insert(0) += 1;
                    }
                }
            }
        }
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let Ok(times) = self.processing_times.read() else {
            return ProcessingStats::default();
        };
        if times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[((count as f64 * 0.95) as usize).min(count - 1)],
            p99_us: sorted[((count as f64 * 0.99) as usize).min(count - 1)],
            max_us: *sorted.last().unwrap_or(&0),
        }
    }

    /// Get current throughput (requests per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.requests_handled.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get failed requests by status category
    pub fn get_errors_by_status(&self) -> HashMap<String, u64> {
        self.errors_by_status
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Get predicted class counts
    pub fn get_predictions_by_class(&self) -> HashMap<String, u64> {
        self.predictions_by_class
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let requests = self.requests_handled.load(Ordering::Relaxed);
        let rows = self.rows_predicted.load(Ordering::Relaxed);
        let health = self.health_checks.load(Ordering::Relaxed);
        let errors_by_status = self.get_errors_by_status();
        let errors: u64 = errors_by_status.values().sum();
        let error_rate = if requests > 0 {
            (errors as f64 / requests as f64) * 100.0
        } else {
            0.0
        };
        let processing = self.get_processing_stats();
        let throughput = self.get_throughput();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║              PREDICTION SERVICE - METRICS SUMMARY            ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Requests Handled: {:>8}  │  Throughput: {:>6.1} req/s      ║",
            requests, throughput
        );
        info!(
            "║ Rows Predicted:   {:>8}  │  Error Rate: {:>6.1}%          ║",
            rows, error_rate
        );
        info!("║ Health Checks:    {:>8}                                   ║", health);
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Processing Time (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5} ║",
            processing.mean_us, processing.p50_us, processing.p95_us, processing.p99_us
        );
        if !errors_by_status.is_empty() {
            info!("╠══════════════════════════════════════════════════════════════╣");
            info!("║ Errors by Status:                                            ║");
            for (status, count) in &errors_by_status {
                info!("║   {:18}: {:>6}                                  ║", status, count);
            }
        }
        let by_class = self.get_predictions_by_class();
        if !by_class.is_empty() {
            info!("╠══════════════════════════════════════════════════════════════╣");
            info!("║ Predictions by Class:                                        ║");
            let total: u64 = by_class.values().sum();
            let mut classes: Vec<_> = by_class.into_iter().collect();
            classes.sort();
            for (class, count) in classes {
                let pct = if total > 0 { (count as f64 / total as f64) * 100.0 } else { 0.0 };
                let bar: String = "█".repeat(((pct / 5.0) as usize).min(20));
                info!("║   {:12}: {:>6} ({:>5.1}%) {}", class, count, pct, bar);
            }
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Metrics reporter that prints periodic summaries
pub struct MetricsReporter {
    metrics: Arc<ServiceMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ServiceMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServeError;

    #[test]
    fn test_metrics_recording() {
        let metrics = ServiceMetrics::new();

        metrics.record_reply(
            &Reply::prediction(PredictResponse::Classification {
                predictions: vec![0, 2],
                labels: Some(vec!["setosa".to_string(), "virginica".to_string()]),
            }),
            Duration::from_micros(100),
        );
        metrics.record_reply(
            &Reply::error(&ServeError::validation("missing features")),
            Duration::from_micros(20),
        );
        metrics.record_reply(
            &Reply::error(&ServeError::model_not_loaded()),
            Duration::from_micros(10),
        );

        assert_eq!(metrics.requests_handled.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.rows_predicted.load(Ordering::Relaxed), 2);

        let errors = metrics.get_errors_by_status();
        assert_eq!(errors.get("BadRequest"), Some(&1));
        assert_eq!(errors.get("ServiceUnavailable"), Some(&1));

        let by_class = metrics.get_predictions_by_class();
        assert_eq!(by_class.get("setosa"), Some(&1));
        assert_eq!(by_class.get("virginica"), Some(&1));
    }

    #[test]
    fn test_processing_stats() {
        let metrics = ServiceMetrics::new();
        let reply = Reply::error(&ServeError::validation("x"));
        for us in [100, 200, 300, 400] {
            metrics.record_reply(&reply, Duration::from_micros(us));
        }

        let stats = metrics.get_processing_stats();
        assert_eq!(stats.count, 4);
        assert_eq!(stats.mean_us, 250);
        assert_eq!(stats.max_us, 400);
    }

    #[test]
    fn test_unlabelled_classes_counted_by_index() {
        let metrics = ServiceMetrics::new();
        metrics.record_reply(
            &Reply::prediction(PredictResponse::Classification {
                predictions: vec![4, 4],
                labels: None,
            }),
            Duration::from_micros(50),
        );
        assert_eq!(metrics.get_predictions_by_class().get("class_4"), Some(&2));
    }
}
