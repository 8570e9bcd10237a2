//! Circuit breaker walkthrough.
//!
//! This demo shows how to:
//! - Guard calls to a flaky dependency
//! - Watch the breaker trip, probe and recover
//! - Fall back while the circuit is open
//! - Share breakers through a registry configured from TOML
//!
//! Run with: cargo run --example breaker_demo
//! Set `RUST_LOG=fusebox=debug` to see every structured event.

use fusebox::prelude::*;
use fusebox::retry::{retry_async_when, RetryConfig};
use fusebox::testing::ScriptedService;
use fusebox::RegistrySettings;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fusebox=info")),
        )
        .init();

    println!("=== Tripping and recovering ===\n");

    let service = ScriptedService::new().then_fail(3);
    let breaker = CircuitBreaker::new(
        "inventory",
        CircuitBreakerConfig::default()
            .with_failure_threshold(3)
            .with_open_duration(Duration::from_millis(500)),
    );
    breaker.on_transition(|event| {
        println!("  -> {} went {} to {}", event.breaker, event.from, event.to);
    });

    for i in 1..=5 {
        match breaker.call(|| service.call()) {
            Ok(n) => println!("Request #{i}: ok (invocation {n})"),
            Err(BreakerError::Open { retry_after, .. }) => {
                println!("Request #{i}: rejected, retry in {retry_after:?}")
            }
            Err(BreakerError::Inner(e)) => println!("Request #{i}: failed: {e}"),
        }
    }

    println!("\nWaiting for the open period to elapse...");
    tokio::time::sleep(Duration::from_millis(600)).await;

    let n = breaker.call(|| service.call())?;
    println!("Trial call succeeded (invocation {n}); state = {}", breaker.state_kind());
    println!("Metrics: {}", serde_json::to_string_pretty(&breaker.metrics())?);

    println!("\n=== Fallback while open ===\n");

    breaker.force_open();
    let stock = breaker.call_or_else(
        || service.call().map(|_| 42),
        |retry_after| {
            println!("Serving cached value; breaker retries in {retry_after:?}");
            Ok::<_, fusebox::testing::ServiceError>(0)
        },
    )?;
    println!("Stock level: {stock}");
    breaker.force_close();

    println!("\n=== Registry with retries ===\n");

    let settings = RegistrySettings::from_toml_str(
        r#"
        [defaults]
        failure_threshold = 5

        [breakers.payments]
        failure_threshold = 2
        open_duration_ms = 1000
        "#,
    )?;
    let registry = Arc::new(BreakerRegistry::from_settings(settings)?);
    let payments = registry.get_or_create("payments");
    let gateway = ScriptedService::failing();

    let retry = RetryConfig::new()
        .with_max_attempts(5)
        .with_initial_delay(Duration::from_millis(50));
    let result = retry_async_when(
        &retry,
        |e: &BreakerError<_>| !e.is_rejected(),
        || payments.call_async(|| gateway.call_async()),
    )
    .await;

    match result {
        Ok(_) => println!("Payment went through"),
        Err(e) => println!("Payment gave up: {e} after {} gateway calls", gateway.calls()),
    }

    for snapshot in registry.snapshot() {
        println!(
            "{:<10} {:<9} failures={} rejected={}",
            snapshot.name, snapshot.state, snapshot.failure_count, snapshot.metrics.rejected_requests
        );
    }

    println!("\n=== Demo Complete ===");
    Ok(())
}
