use tracing_subscriber::{fmt, EnvFilter};

/// Initialize logging, honouring `TRAILHEAD_LOG_FORMAT=json` for
/// machine-readable output.
///
/// Uses the `RUST_LOG` environment variable if set, otherwise falls back
/// to `default_level` (e.g. "info", "th_engine=debug,warn").
///
/// Safe to call multiple times (e.g. in tests) -- subsequent calls are no-ops.
pub fn init_logging(service_name: &str, default_level: &str) {
    if std::env::var("TRAILHEAD_LOG_FORMAT").as_deref() == Ok("json") {
        init_logging_json(service_name, default_level);
        return;
    }

    fmt()
        .with_env_filter(env_filter(default_level))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .try_init()
        .ok();

    tracing::info!(service = service_name, "logging initialised (human-readable)");
}

/// JSON-formatted logging (suitable for Vector / Loki / ELK).
pub fn init_logging_json(service_name: &str, default_level: &str) {
    fmt()
        .json()
        .with_env_filter(env_filter(default_level))
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .try_init()
        .ok();

    tracing::info!(service = service_name, "logging initialised (json)");
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}
