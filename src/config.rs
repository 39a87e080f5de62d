//! Config module contains the top-level config for the app.

use std::env;

use config_crate::{Config as RawConfig, ConfigError, Environment, File};

use crate::models::DEFAULT_COMMISSION_RATE_BPS;
use crate::sentry_integration::SentryConfig;

/// Basic settings - HTTP binding, database, external services
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: Server,
    pub client: Client,
    pub auth: Auth,
    pub commission: Commission,
    pub reconciler: Reconciler,
    pub mercado_pago: MercadoPago,
    pub email: Email,
    pub gamification: Gamification,
    pub sentry: Option<SentryConfig>,
}

/// Common server settings
#[derive(Debug, Deserialize, Clone)]
pub struct Server {
    pub host: String,
    pub port: String,
    pub database: String,
    pub thread_count: usize,
    pub cors_origin: Option<String>,
}

/// Http client settings
#[derive(Debug, Deserialize, Clone)]
pub struct Client {
    pub http_client_buffer_size: usize,
    pub dns_worker_thread_count: usize,
    pub http_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Auth {
    pub jwt_secret: String,
    pub token_ttl_sec: i64,
    pub password_iterations: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Commission {
    pub rate_bps: u32,
}

impl Default for Commission {
    fn default() -> Self {
        Commission {
            rate_bps: DEFAULT_COMMISSION_RATE_BPS,
        }
    }
}

/// Periodic repair of paid orders without a commission
#[derive(Debug, Deserialize, Clone)]
pub struct Reconciler {
    pub enabled: bool,
    pub interval_s: u64,
    pub batch_size: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MercadoPago {
    pub enabled: bool,
    pub url: String,
    pub access_token: String,
    pub notification_url: String,
    pub success_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Email {
    pub enabled: bool,
    pub url: String,
    pub api_key: String,
    pub from: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Gamification {
    pub leaderboard_size: i64,
}

/// Creates new app config struct
/// #Examples
/// ```
/// use eduplay_lib::config::*;
///
/// let config = Config::new();
/// ```
impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        let mut s = RawConfig::new();
        s.merge(File::with_name("config/base"))?;

        // Note that this file is _optional_
        let env = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        s.merge(File::with_name(&format!("config/{}", env)).required(false))?;

        // Add in settings from the environment (with a prefix of EDUPLAY)
        s.merge(Environment::with_prefix("EDUPLAY").separator("__"))?;

        if let Ok(database_url) = env::var("DATABASE_URL") {
            s.set("server.database", database_url)?;
        }

        s.try_into()
    }
}
