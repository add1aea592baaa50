use std::env;

use crate::error::DispatchError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub escalation_queue_size: usize,
    pub search_radius_km: f64,
    pub assignment_ttl_secs: u64,
    pub expiry_sweep_interval_secs: u64,
    pub ws_idle_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, DispatchError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            escalation_queue_size: parse_or_default("ESCALATION_QUEUE_SIZE", 1024)?,
            search_radius_km: parse_or_default("SEARCH_RADIUS_KM", 10.0)?,
            assignment_ttl_secs: parse_or_default("ASSIGNMENT_TTL_SECS", 300)?,
            expiry_sweep_interval_secs: parse_or_default("EXPIRY_SWEEP_INTERVAL_SECS", 30)?,
            ws_idle_timeout_secs: parse_or_default("WS_IDLE_TIMEOUT_SECS", 60)?,
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, DispatchError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| DispatchError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
