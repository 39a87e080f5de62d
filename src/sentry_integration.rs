//! Error reporting to Sentry. Without a configured dsn nothing is reported.

use failure::Error as FailureError;
use sentry::integrations::failure::capture_error;
use sentry::integrations::panic::register_panic_handler;
use sentry::internals::ClientInitGuard;

#[derive(Debug, Deserialize, Clone)]
pub struct SentryConfig {
    pub dsn: String,
}

/// Keep the guard alive for the whole run, events are flushed when it is dropped
pub fn init(sentry_config: Option<&SentryConfig>) -> Option<ClientInitGuard> {
    sentry_config.map(|config| {
        info!("Initializing Sentry");
        let guard = sentry::init(config.dsn.as_str());
        register_panic_handler();
        guard
    })
}

pub fn capture_failure(error: &FailureError) {
    capture_error(error);
}
