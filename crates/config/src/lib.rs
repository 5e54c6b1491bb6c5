use anyhow::{Context, Result, ensure};
use config::Environment;
use model::DeliveryRules;
use serde::Deserialize;
use std::time::Duration;

/// Prefix of every environment variable read by [`AppConfig::load`], e.g. `APP_DB_HOST`.
pub const ENV_PREFIX: &str = "APP";

/// `AppConfig` holds all configuration parameters required by the application.
///
/// Values come from `APP_`-prefixed environment variables (optionally via a `.env`
/// file) and fall back to defaults suited to a local run. This struct is
/// deserializable via Serde.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AppConfig {
    // --- Database settings ---
    /// Database hostname or service name (e.g. "postgres" in Docker Compose, "localhost" for local runs).
    pub db_host: String,
    /// Database port (default: 5432).
    pub db_port: u16,
    pub db_user: String,
    pub db_password: String,
    pub db_name: String,
    /// Maximum number of pooled connections.
    pub db_pool_size: usize,
    /// Directory holding the `.sql` migrations applied at start-up.
    pub migrations_dir: String,

    // --- HTTP server ---
    /// The port on which the HTTP server will listen.
    pub http_port: u16,

    // --- Shutdown timeout ---
    /// Graceful shutdown timeout (human-friendly format, e.g. "5s", "1m").
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub shutdown_timeout: Duration,

    // --- Delivery rules ---
    /// Merchants farther than this from the user are neither listed nor deliverable.
    pub service_radius_km: f64,
    /// Courier speed used for delivery time estimates.
    pub courier_speed_kmh: f64,
    /// Page size used when a listing request gives no limit.
    pub default_page_size: usize,
}

/// Custom deserializer for graceful shutdown timeout.
/// Accepts human-readable formats like "5s", "1m", etc.
fn deserialize_duration_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let val = String::deserialize(deserializer)?;
    humantime::parse_duration(&val)
        .map_err(|e| D::Error::custom(format!("Invalid duration '{val}': {e}")))
}

impl AppConfig {
    /// Loads configuration from environment variables (and optionally from `.env` file).
    ///
    /// Fields not set via env will be filled with default values.
    ///
    /// # Errors
    /// Returns an error if a variable cannot be parsed or a delivery rule is out of range.
    pub fn load() -> Result<Self> {
        // Load from .env file (for Docker environment)
        dotenvy::dotenv().ok();
        Self::build(Environment::with_prefix(ENV_PREFIX))
    }

    /// Same as [`AppConfig::load`], but reads the given variables instead of the
    /// process environment.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let source: config::Map<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::build(Environment::with_prefix(ENV_PREFIX).source(Some(source)))
    }

    fn build(env: Environment) -> Result<Self> {
        let settings = config::Config::builder()
            // Database
            .set_default("db_host", "localhost")?
            .set_default("db_port", 5432)?
            .set_default("db_user", "delivery_user")?
            .set_default("db_password", "securepassword")?
            .set_default("db_name", "delivery_db")?
            .set_default("db_pool_size", 16)?
            .set_default("migrations_dir", "migrations")?
            // HTTP
            .set_default("http_port", 8080)?
            // Shutdown
            .set_default("shutdown_timeout", "5s")?
            // Delivery rules
            .set_default("service_radius_km", 3.0)?
            .set_default("courier_speed_kmh", 40.0)?
            .set_default("default_page_size", 5)?
            .add_source(env)
            .build()?;

        let cfg: AppConfig = settings
            .try_deserialize()
            .context("Failed to load configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.db_pool_size > 0, "db_pool_size must be positive");
        ensure!(
            self.service_radius_km.is_finite() && self.service_radius_km > 0.0,
            "service_radius_km must be a positive number, got {}",
            self.service_radius_km
        );
        ensure!(
            self.courier_speed_kmh.is_finite() && self.courier_speed_kmh > 0.0,
            "courier_speed_kmh must be a positive number, got {}",
            self.courier_speed_kmh
        );
        ensure!(self.default_page_size > 0, "default_page_size must be at least 1");
        Ok(())
    }

    /// libpq-style connection string for the configured database.
    pub fn database_dsn(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={} sslmode=disable",
            self.db_host, self.db_port, self.db_user, self.db_password, self.db_name
        )
    }

    /// Business constants handed to the purchase service.
    pub fn delivery_rules(&self) -> DeliveryRules {
        DeliveryRules {
            service_radius_km: self.service_radius_km,
            courier_speed_kmh: self.courier_speed_kmh,
            default_page_size: self.default_page_size,
        }
    }
}
