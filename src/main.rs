//! Prediction Service - Main Entry Point
//!
//! Loads the model, then answers prediction and health requests arriving over
//! NATS request/reply. Requests are handled in parallel up to the configured
//! number of workers.

use anyhow::Result;
use futures::StreamExt;
use prediction_service::{
    config::{AppConfig, LoggingConfig},
    consumer::{IncomingRequest, RequestConsumer, RequestKind},
    metrics::{MetricsReporter, ServiceMetrics},
    models::{ModelHandle, OnnxModelLoader},
    producer::ReplyPublisher,
    service::PredictionService,
    types::response::Reply,
    ServeError,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    init_logging(&config.logging)?;
    info!("Starting Prediction Service");
    info!(
        model_path = %config.model.path,
        model_kind = ?config.model.kind,
        n_features = ?config.model.n_features,
        labels = ?config.model.labels,
        "Configuration loaded successfully"
    );

    let metrics = Arc::new(ServiceMetrics::new());

    // Load the model once; a missing file leaves the service up but unavailable
    let loader = OnnxModelLoader::from_config(&config.model)?;
    let handle = Arc::new(ModelHandle::eager(
        Box::new(loader),
        config.model.load_on_demand,
    ));
    info!(loaded = handle.is_loaded(), "Model handle initialized");

    let service = Arc::new(PredictionService::from_config(handle, &config.model));

    // Connect to NATS
    let client = async_nats::connect(&config.nats.url).await?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = RequestConsumer::new(client.clone(), &config.nats);
    let publisher = ReplyPublisher::new(client.clone());

    let num_workers = config.service.workers;
    info!(
        "Starting request loop with {} parallel workers",
        num_workers
    );
    info!("Predictions on subject: {}", consumer.predict_subject());
    info!("Health checks on subject: {}", consumer.health_subject());

    // Semaphore to limit concurrent requests
    let semaphore = Arc::new(Semaphore::new(num_workers));
    let handled_count = Arc::new(AtomicU64::new(0));

    // Start metrics reporter
    let metrics_clone = metrics.clone();
    let interval = config.service.metrics_interval_secs;
    tokio::spawn(async move {
        let reporter = MetricsReporter::new(metrics_clone, interval);
        reporter.start().await;
    });

    let mut requests = consumer.subscribe().await?;

    loop {
        let request = tokio::select! {
            request = requests.next() => match request {
                Some(request) => request,
                None => {
                    warn!("Request subscription closed");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        };

        // Acquire permit (limits concurrent tasks)
        let permit = semaphore.clone().acquire_owned().await?;

        let service = service.clone();
        let publisher = publisher.clone();
        let metrics = metrics.clone();
        let handled_count = handled_count.clone();

        tokio::spawn(async move {
            handle_request(request, service, publisher, metrics, handled_count).await;
            drop(permit);
        });
    }

    // Wait for in-flight requests
    info!("Service shutting down...");
    let _drained = semaphore.acquire_many(num_workers as u32).await?;
    client.flush().await?;
    metrics.print_summary();

    Ok(())
}

/// Handle one request message and publish its reply
async fn handle_request(
    request: IncomingRequest,
    service: Arc<PredictionService>,
    publisher: ReplyPublisher,
    metrics: Arc<ServiceMetrics>,
    handled_count: Arc<AtomicU64>,
) {
    let start_time = Instant::now();
    let request_id = uuid::Uuid::new_v4().to_string();
    let IncomingRequest { kind, message } = request;

    let Some(reply_to) = message.reply.clone() else {
        warn!(
            request_id = %request_id,
            subject = %message.subject,
            "Request has no reply subject, dropping"
        );
        return;
    };

    let reply = match kind {
        RequestKind::Health => {
            metrics.record_health_check();
            service.handle_health()
        }
        RequestKind::Predict => {
            // Prediction is CPU bound
            let payload = message.payload.clone();
            let worker_service = service.clone();
            let reply = match tokio::task::spawn_blocking(move || {
                worker_service.handle_predict_bytes(&payload)
            })
            .await
            {
                Ok(reply) => reply,
                Err(e) => {
                    error!(request_id = %request_id, error = %e, "Prediction task failed");
                    Reply::error(&ServeError::internal("prediction task failed"))
                }
            };
            metrics.record_reply(&reply, start_time.elapsed());
            reply
        }
    };

    let status = reply.status;
    let processing_time = start_time.elapsed();

    if let Err(e) = publisher.publish(reply_to, reply, &request_id).await {
        error!(
            request_id = %request_id,
            error = %e,
            "Failed to publish reply"
        );
        return;
    }

    if status.is_success() {
        debug!(
            request_id = %request_id,
            kind = kind.as_str(),
            processing_time_us = processing_time.as_micros(),
            "Request handled"
        );
    } else {
        info!(
            request_id = %request_id,
            kind = kind.as_str(),
            status = ?status,
            processing_time_us = processing_time.as_micros(),
            "Request failed"
        );
    }

    let count = handled_count.fetch_add(1, Ordering::Relaxed) + 1;

    // Log progress every 100 requests
    if count % 100 == 0 {
        let stats = metrics.get_processing_stats();
        info!(
            handled = count,
            throughput = format!("{:.1} req/s", metrics.get_throughput()),
            avg_latency_us = stats.mean_us,
            "Processing milestone"
        );
    }
}

/// Initialize tracing; `RUST_LOG` takes precedence over the configured level
fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.level))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
