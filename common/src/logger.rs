//! Tracing setup shared by every binary (broker, controller, tools).
//!
//! Mirrors the teacher's `warn_if_slow` / `init_tracing` pair: JSON output in
//! production, pretty output otherwise, with span-close timing so a schedule
//! pass's phase durations show up without manual instrumentation.

use std::time::Duration;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

pub fn init_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let base = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_span_events(fmt::format::FmtSpan::CLOSE);

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(base.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(base.pretty())
            .init();
    }
}

/// Runs `fut`, logging a `performance` warning if it exceeds `max`.
///
/// Used to wrap every Store/SecretClient/NodeAgentClient call inside a
/// schedule pass so slow external collaborators are visible without
/// instrumenting every call site by hand.
pub async fn warn_if_slow<F, T>(label: &'static str, max: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let start = std::time::Instant::now();
    let out = fut.await;
    let elapsed = start.elapsed();
    if elapsed > max {
        tracing::warn!(
            target: "performance",
            label = label,
            elapsed_ms = elapsed.as_millis() as u64,
            "slow operation detected"
        );
    }
    out
}
