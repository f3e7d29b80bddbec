//! Server configuration, read from the environment.

use thiserror::Error;

use crate::domain::services::catalog::PageDefaults;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// PostgreSQL connection URL. Unset runs on the in-memory store.
    pub database_url: Option<String>,
    /// NATS server URL. Unset disables event publishing.
    pub nats_url: Option<String>,
    pub port: u16,
    /// Shop number checkout links point at, in any format.
    pub whatsapp_number: String,
    pub page_defaults: PageDefaults,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} is not a valid value: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("DEFAULT_PAGE_SIZE ({default}) must be between 1 and MAX_PAGE_SIZE ({max})")]
    PageSizes { default: u32, max: u32 },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let page_size = parse(&get, "DEFAULT_PAGE_SIZE", PageDefaults::default().page_size)?;
        let max_page_size = parse(&get, "MAX_PAGE_SIZE", PageDefaults::default().max_page_size)?;
        if page_size == 0 || page_size > max_page_size {
            return Err(ConfigError::PageSizes { default: page_size, max: max_page_size });
        }

        Ok(Self {
            database_url: get("DATABASE_URL"),
            nats_url: get("NATS_URL"),
            port: parse(&get, "PORT", 8083)?,
            whatsapp_number: get("WHATSAPP_NUMBER").unwrap_or_default(),
            page_defaults: PageDefaults { page_size, max_page_size },
        })
    }
}

fn parse<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(name) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}
