use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::Settings;

/// Falls back to `ACCOUNTABLE_LOG_LEVEL` when `RUST_LOG` is unset. Noisy HTTP client and pool
/// internals are capped at `warn` unless explicitly overridden.
fn env_filter(settings: &Settings) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = settings.telemetry().log_level.as_str();
        EnvFilter::new(format!("{level},hyper=warn,reqwest=warn,sqlx=warn"))
    })
}

pub(crate) fn init_tracing(settings: &Settings) -> anyhow::Result<()> {
    let builder = fmt().with_env_filter(env_filter(settings)).with_target(false);

    let result = if settings.telemetry().json {
        builder.json().with_current_span(false).try_init()
    } else {
        builder.compact().try_init()
    };
    result.map_err(|err| anyhow::anyhow!(err.to_string()))?;

    tracing::debug!(
        environment = settings.runtime().environment.as_str(),
        store_backend = settings.store().backend.as_str(),
        "Tracing initialized"
    );
    Ok(())
}
