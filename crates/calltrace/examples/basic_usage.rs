//! Basic calltrace usage example
//!
//! Times a few functions, logs a failing one, and shows where the
//! structured log and the metrics table end up.
//!
//! Run with: cargo run --example basic_usage

use calltrace::{
    args, mask_digits, CalltraceConfig, ErrorCatcher, Table, Timer, TimerConfig,
};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
#[error("division by zero")]
struct DivideByZero;

fn add(a: i32, b: i32) -> i32 {
    a + b
}

fn divide(a: i64, b: i64) -> Result<i64, DivideByZero> {
    if b == 0 {
        Err(DivideByZero)
    } else {
        Ok(a / b)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("Starting calltrace basic usage example");

    // File settings, then CALLTRACE_* environment overrides
    let mut config = CalltraceConfig::load(None).await?;
    config.timer.log_dir = PathBuf::from("./example_logs");
    config.catcher.error_log_file = config.timer.log_dir.join("error.log");

    let timer = Timer::new(config.timer.clone())?;
    let catcher = ErrorCatcher::new(config.catcher.clone())?;

    // Closure-style timing
    let sum = timer.time("add", args![2, 3], || add(2, 3));
    println!("add(2, 3) = {}", sum);

    // Wrapped function with the same signature as the original
    let timed_add = timer.wrap_infallible("add", |(a, b): (i32, i32)| add(a, b));
    for i in 0..3 {
        timed_add((i, i * 10));
    }

    // Tabular arguments are summarized by row count
    let readings: Vec<f64> = (0..10_000).map(f64::from).collect();
    let mean = timer.time("mean", args![Table(&readings); precise = true], || {
        readings.iter().sum::<f64>() / readings.len() as f64
    });
    println!("mean = {:.2}", mean);

    // Failures are logged once and handed back untouched
    let checked_divide = catcher.wrap("divide", |(a, b): (i64, i64)| divide(a, b));
    match checked_divide((10, 0)) {
        Ok(value) => println!("10 / 0 = {}", value),
        Err(e) => println!("divide failed as expected: {}", e),
    }

    // Async units; the future keeps its own output type
    let fetched = timer
        .call_async("fetch", args!["https://example.com"], async {
            tokio::time::sleep(Duration::from_millis(25)).await;
            Ok::<_, std::io::Error>(42)
        })
        .await?;
    println!("fetch returned {}", fetched);

    // Redact digits from everything the wrappers write
    let redacting = Timer::builder(TimerConfig {
        log_file_name: "redacted.log".to_string(),
        results_file_name: "redacted_results.csv".to_string(),
        ..config.timer.clone()
    })
    .sanitizer(mask_digits)
    .build()?;
    redacting.time("charge", args!["4111-1111-1111-1111"; amount = 120], || ());

    println!("Structured log: {}", timer.config().log_file_path().display());
    println!("Metrics table:  {}", timer.config().results_file_path().display());
    println!("Error log:      {}", catcher.config().error_log_file.display());

    Ok(())
}
