use tracing_subscriber::EnvFilter;

/// Initializes a `tracing_subscriber` using `LUX_LOG` first, then `RUST_LOG`, then a default.
///
/// Log field contract for scheduler events:
/// - Always include `rank`.
/// - Include `requester` on any help-request/token event.
/// - Include `start`/`end` item bounds on any grant or return event.
pub fn init_tracing() {
    let filter = env_filter();
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("LUX_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
