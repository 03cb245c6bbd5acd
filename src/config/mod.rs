use chrono::FixedOffset;
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub waitlist: WaitlistRuntimeConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let sweep_interval_secs = env::var("WAITLIST_SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or(ConfigError::InvalidSweepInterval)?;

        let clinic_utc_offset_minutes = env::var("WAITLIST_CLINIC_UTC_OFFSET_MINUTES")
            .unwrap_or_else(|_| "0".to_string())
            .parse::<i32>()
            .ok()
            .filter(|minutes| minutes.abs() < 24 * 60)
            .ok_or(ConfigError::InvalidClinicOffset)?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            waitlist: WaitlistRuntimeConfig {
                sweep_interval_secs,
                clinic_utc_offset_minutes,
            },
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Process-level knobs for the waitlist engine. Offer policy lives in the settings store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitlistRuntimeConfig {
    pub sweep_interval_secs: u64,
    pub clinic_utc_offset_minutes: i32,
}

impl WaitlistRuntimeConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn clinic_offset(&self) -> Result<FixedOffset, ConfigError> {
        FixedOffset::east_opt(self.clinic_utc_offset_minutes * 60)
            .ok_or(ConfigError::InvalidClinicOffset)
    }
}

impl Default for WaitlistRuntimeConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
            clinic_utc_offset_minutes: 0,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidSweepInterval,
    InvalidClinicOffset,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidSweepInterval => write!(
                f,
                "WAITLIST_SWEEP_INTERVAL_SECS must be a positive number of seconds"
            ),
            ConfigError::InvalidClinicOffset => write!(
                f,
                "WAITLIST_CLINIC_UTC_OFFSET_MINUTES must be within a day of UTC"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidSweepInterval
            | ConfigError::InvalidClinicOffset => None,
        }
    }
}
