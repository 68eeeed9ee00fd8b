use std::env;
use std::time::Duration;

use crate::engine::selection::DispatchSettings;
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub order_queue_size: usize,
    pub osrm_base_url: String,
    pub osrm_timeout_secs: u64,
    pub max_distance_km: f64,
    pub max_drivers_to_notify: usize,
    pub connection_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            order_queue_size: 1024,
            osrm_base_url: "https://router.project-osrm.org".to_string(),
            osrm_timeout_secs: 10,
            max_distance_km: 50.0,
            max_drivers_to_notify: 5,
            connection_buffer_size: 32,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            order_queue_size: parse_or_default("ORDER_QUEUE_SIZE", defaults.order_queue_size)?,
            osrm_base_url: env::var("OSRM_BASE_URL").unwrap_or(defaults.osrm_base_url),
            osrm_timeout_secs: parse_or_default("OSRM_TIMEOUT_SECS", defaults.osrm_timeout_secs)?,
            max_distance_km: parse_or_default("MAX_DISTANCE_KM", defaults.max_distance_km)?,
            max_drivers_to_notify: parse_or_default(
                "MAX_DRIVERS_TO_NOTIFY",
                defaults.max_drivers_to_notify,
            )?,
            connection_buffer_size: parse_or_default(
                "CONNECTION_BUFFER_SIZE",
                defaults.connection_buffer_size,
            )?,
        })
    }

    pub fn osrm_timeout(&self) -> Duration {
        Duration::from_secs(self.osrm_timeout_secs)
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            max_distance_km: self.max_distance_km,
            max_fan_out: self.max_drivers_to_notify,
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
