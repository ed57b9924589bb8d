//! Development helper for structured logging.

/// Initialize a tracing subscriber when `RUST_LOG` is set.
///
/// Examples and tests can call `evcast::dev_tracing::init_tracing()` to see
/// listener and emitter logs. This is a no-op when `RUST_LOG` is not set or
/// when a global subscriber is already installed.
pub fn init_tracing() {
    use std::env;

    if env::var("RUST_LOG").is_ok() {
        let installed = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init()
            .is_ok();
        if installed {
            tracing::debug!("dev tracing installed");
        }
    }
}
