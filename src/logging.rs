//! Logging setup for embedders
//!
//! The core only emits `tracing` events; hosts that want output without
//! wiring their own subscriber can call [`init`] once at startup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize a fmt subscriber with an env-filter.
///
/// `RUST_LOG` wins when set; otherwise `easel=<level>,info` applies.
/// Calling this twice is an error in `tracing-subscriber`, so it is the
/// host's job to call it at most once.
pub fn init(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("easel={},info", level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
