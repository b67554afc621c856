// Application configuration
// Collects environment-derived settings into a typed struct at startup

use chrono::Duration;

/// Runtime configuration, read once at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Bind address for the HTTP server
    pub host: String,
    pub port: u16,

    /// Postgres connection string; when unset the service runs on the
    /// in-memory stores (useful for local development and tests)
    pub database_url: Option<String>,

    /// How long a Pending booking stays confirmable
    pub hold_duration: Duration,

    /// How often the expiry sweep scans for overdue Pending bookings
    pub sweep_interval: std::time::Duration,
}

impl AppConfig {
    /// Build configuration from environment variables with sensible defaults
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let database_url = std::env::var("DATABASE_URL").ok();

        let hold_minutes: i64 = std::env::var("HOLD_DURATION_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let sweep_seconds: u64 = std::env::var("EXPIRY_SWEEP_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        Self {
            host,
            port,
            database_url,
            hold_duration: Duration::minutes(hold_minutes),
            sweep_interval: std::time::Duration::from_secs(sweep_seconds),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database_url: None,
            hold_duration: Duration::minutes(30),
            sweep_interval: std::time::Duration::from_secs(60),
        }
    }
}
