//! Tracing subscriber setup
//!
//! `RUST_LOG` overrides the per-environment defaults. Outside dev the output
//! is JSON, one object per event.

use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use crate::config::Environment;

/// Default filter when `RUST_LOG` is unset
pub fn default_directives(env: &Environment) -> &'static str {
    match env {
        Environment::Dev => "bidmarket_backend=debug,tower_http=debug,sqlx=warn,info",
        Environment::Staging => "bidmarket_backend=debug,tower_http=info,sqlx=warn,info",
        Environment::Prod => "bidmarket_backend=info,sqlx=error,warn",
    }
}

pub fn init_logging(env: &Environment) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(env)));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_file(env.is_dev())
        .with_line_number(env.is_dev());

    let registry = tracing_subscriber::registry().with(filter);
    if env.is_dev() {
        // Close events carry the duration of each instrumented lifecycle call
        registry
            .with(fmt_layer.pretty().with_span_events(FmtSpan::CLOSE))
            .init();
    } else {
        registry
            .with(fmt_layer.json().flatten_event(true).with_current_span(true))
            .init();
    }

    tracing::info!(env = ?env, "Logging initialized");
}
