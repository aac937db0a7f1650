//! Test Prediction Client
//!
//! Sends iris-like prediction requests to the service over NATS and logs the
//! replies. Usage: test-client [nats_url] [subject] [count] [batch_rate] [invalid_rate] [delay_ms]

use rand::Rng;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

/// Per-species feature ranges (sepal length, sepal width, petal length, petal width)
const SPECIES_RANGES: [(&str, [(f64, f64); 4]); 3] = [
    ("setosa", [(4.3, 5.8), (2.3, 4.4), (1.0, 1.9), (0.1, 0.6)]),
    ("versicolor", [(4.9, 7.0), (2.0, 3.4), (3.0, 5.1), (1.0, 1.8)]),
    ("virginica", [(4.9, 7.9), (2.2, 3.8), (4.5, 6.9), (1.4, 2.5)]),
];

/// Request body generator for testing
struct RequestGenerator {
    rng: rand::rngs::ThreadRng,
}

impl RequestGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }

    /// One sample drawn from a random species' ranges
    fn sample(&mut self) -> Vec<f64> {
        let (_, ranges) = SPECIES_RANGES[self.rng.gen_range(0..SPECIES_RANGES.len())];
        ranges
            .iter()
            .map(|&(lo, hi)| (self.rng.gen_range(lo..hi) * 10.0).round() / 10.0)
            .collect()
    }

    /// `{"features": [a, b, c, d]}`
    fn single(&mut self) -> Value {
        json!({ "features": self.sample() })
    }

    /// `{"features": [[...], [...], ...]}`
    fn batch(&mut self) -> Value {
        let size = self.rng.gen_range(2..8);
        let rows: Vec<Vec<f64>> = (0..size).map(|_| self.sample()).collect();
        json!({ "features": rows })
    }

    /// A body the service must reject
    fn invalid(&mut self) -> Value {
        match self.rng.gen_range(0..4) {
            0 => json!({}),
            1 => json!({ "features": "not-a-list" }),
            2 => json!({ "features": [] }),
            _ => json!({ "features": [5.1, "abc", 1.4, 0.2] }),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_client=info".parse()?),
        )
        .init();

    info!("Starting Test Prediction Client");

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("inference.predict");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(100);
    let batch_rate: f64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(0.3);
    let invalid_rate: f64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(0.1);
    let delay_ms: u64 = args.get(6).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        count = count,
        batch_rate = batch_rate,
        invalid_rate = invalid_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    // Connect to NATS
    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(count, batch_rate, invalid_rate, delay_ms).await;
        }
    };

    let mut generator = RequestGenerator::new();
    let mut rng = rand::thread_rng();

    let mut ok_count = 0;
    let mut error_count = 0;

    for i in 0..count {
        let body = pick_body(&mut generator, &mut rng, batch_rate, invalid_rate);
        let payload = serde_json::to_vec(&body)?;

        match client.request(subject.to_string(), payload.into()).await {
            Ok(reply) => match read_reply(&reply.payload) {
                Ok((ok, reply)) => {
                    if ok {
                        ok_count += 1;
                    } else {
                        error_count += 1;
                    }
                    info!(request = %body, reply = %reply["body"], status = %reply["status"], "Reply received");
                }
                Err(e) => {
                    error_count += 1;
                    warn!(error = %e, "Reply is not valid JSON");
                }
            },
            Err(e) => {
                error_count += 1;
                warn!(error = %e, "Request failed");
            }
        }

        if (i + 1) % 10 == 0 {
            info!(
                "Sent {}/{} requests ({} ok, {} errors)",
                i + 1,
                count,
                ok_count,
                error_count
            );
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    info!(
        "Completed! Sent {} requests ({} ok, {} errors)",
        count, ok_count, error_count
    );

    Ok(())
}

/// Decode a reply envelope and report whether it carries an OK status.
fn read_reply(payload: &[u8]) -> serde_json::Result<(bool, Value)> {
    let reply: Value = serde_json::from_slice(payload)?;
    Ok((reply["status"] == "OK", reply))
}

fn pick_body(
    generator: &mut RequestGenerator,
    rng: &mut impl Rng,
    batch_rate: f64,
    invalid_rate: f64,
) -> Value {
    if rng.gen_bool(invalid_rate.clamp(0.0, 1.0)) {
        generator.invalid()
    } else if rng.gen_bool(batch_rate.clamp(0.0, 1.0)) {
        generator.batch()
    } else {
        generator.single()
    }
}

async fn run_dry_mode(
    count: u64,
    batch_rate: f64,
    invalid_rate: f64,
    delay_ms: u64,
) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = RequestGenerator::new();
    let mut rng = rand::thread_rng();

    for i in 0..count {
        let body = pick_body(&mut generator, &mut rng, batch_rate, invalid_rate);

        if (i + 1) % 10 == 0 || i == 0 {
            info!("Sample request {}:\n{}", i + 1, serde_json::to_string_pretty(&body)?);
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_reply_status() {
        let (ok, reply) =
            read_reply(br#"{"status":"OK","code":200,"request_id":"r1","body":{"predictions":[0]}}"#)
                .unwrap();
        assert!(ok);
        assert_eq!(reply["body"]["predictions"][0], 0);

        let (ok, _) = read_reply(
            br#"{"status":"ServiceUnavailable","code":503,"request_id":"r2","body":{"error":"model not loaded"}}"#,
        )
        .unwrap();
        assert!(!ok);
    }

    #[test]
    fn test_non_json_reply_is_an_error_not_a_crash() {
        assert!(read_reply(b"503 Service Unavailable").is_err());
        assert!(read_reply(b"").is_err());
    }
}
