//! Provider settings and logging setup for tether

pub mod error;
pub mod settings;

pub use error::*;
pub use settings::{DEFAULT_RETRY_TIMEOUT, ProviderSettings, find_settings_file};

/// Install the `tracing` subscriber used by provider processes.
///
/// Honors `RUST_LOG`; falls back to `info`. Calling it twice is harmless.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice() {
        init_tracing();
        init_tracing();
        tracing::debug!("subscriber installed");
    }
}
