use std::{env, str::FromStr};

use rust_decimal::Decimal;

use crate::pricing::DEFAULT_VAT_RATE;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: String,
    pub max_db_connections: u32,
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,
    pub vat_rate: Decimal,
    pub default_currency: String,
    pub invoice_due_days: i64,
    pub notification_scan_minutes: u64,
    pub max_document_bytes: usize,
    pub admin_email: String,
    pub admin_password: Option<String>,
}

impl Config {
    pub fn init() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        Ok(Self {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: parse_var("SERVER_PORT", 8080)?,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://freight_desk.db".to_string()),
            max_db_connections: parse_var("MAX_DB_CONNECTIONS", 5)?,
            jwt_secret: env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?,
            jwt_expiration_hours: parse_var("JWT_EXPIRATION_HOURS", 24)?,
            vat_rate: parse_var("VAT_RATE", DEFAULT_VAT_RATE)?,
            default_currency: env::var("DEFAULT_CURRENCY")
                .map(|c| c.to_uppercase())
                .unwrap_or_else(|_| "USD".to_string()),
            invoice_due_days: parse_var("INVOICE_DUE_DAYS", 30)?,
            notification_scan_minutes: parse_var("NOTIFICATION_SCAN_MINUTES", 60)?,
            max_document_bytes: parse_var("MAX_DOCUMENT_BYTES", 10 * 1024 * 1024)?,
            admin_email: env::var("ADMIN_EMAIL")
                .unwrap_or_else(|_| "admin@freightdesk.local".to_string()),
            admin_password: env::var("ADMIN_PASSWORD").ok().filter(|p| !p.is_empty()),
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{0} has an invalid value")]
    Invalid(&'static str),
}
