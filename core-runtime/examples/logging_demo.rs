//! Logging system demonstration
//!
//! Run with:
//! ```bash
//! # Pretty format (default in debug)
//! cargo run --example logging_demo
//!
//! # JSON format
//! cargo run --example logging_demo -- json
//!
//! # With custom filter
//! cargo run --example logging_demo -- pretty "core_runtime=trace"
//! ```

use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
use std::env;
use tracing::{debug, info, instrument, span, warn, Level};

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();

    let format = match args.get(1).map(String::as_str) {
        Some("json") => LogFormat::Json,
        Some("compact") => LogFormat::Compact,
        Some("pretty") => LogFormat::Pretty,
        _ => LogFormat::default(),
    };

    let mut config = LoggingConfig::default()
        .with_format(format)
        .with_level(LogLevel::Trace)
        .with_spans(true);
    if let Some(filter) = args.get(2) {
        config = config.with_filter(filter.clone());
    }

    init_logging(config).expect("failed to initialize logging");

    info!(format = ?format, "logging initialized");

    demo_sync_span().await;
    demo_instrumentation().await;
}

async fn demo_sync_span() {
    let span = span!(Level::INFO, "sync_run", kind = "normal", libraries = "all");
    let _enter = span.enter();

    info!("starting sync run");
    debug!(library = "custom", changed = 42, "fetched object versions");
    warn!(library = "group(12)", "remote version moved during run");
    info!(error_count = 1, "sync run finished");
}

#[instrument(fields(count = keys.len()))]
async fn download_batch(keys: &[&str]) {
    for key in keys {
        debug!(%key, "storing object");
        tokio::time::sleep(tokio::time::Duration::from_millis(5)).await;
    }
}

async fn demo_instrumentation() {
    info!("instrumented functions create spans automatically");
    download_batch(&["ABCD2345", "BCDE3456", "CDEF4567"]).await;
}
