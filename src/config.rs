use crate::core::{DbError, Result};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// When pending changes are written before a query runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushMode {
    /// Flush before every query and at commit.
    #[default]
    Auto,
    /// Flush only at commit (or on an explicit `flush`).
    Commit,
}

impl FromStr for FlushMode {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(FlushMode::Auto),
            "commit" => Ok(FlushMode::Commit),
            other => Err(DbError::Mapping(format!("Unknown flush mode '{}'", other))),
        }
    }
}

/// Persistence unit configuration
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// Name used in log and tracing output
    pub unit_name: String,

    pub flush_mode: FlushMode,

    /// Log every issued statement at `info` instead of `debug`
    pub show_sql: bool,

    /// Upper bound on the lifetime of one unit of work
    pub unit_timeout: Option<Duration>,
}

pub const PROPERTY_UNIT_NAME: &str = "memorm.unit_name";
pub const PROPERTY_FLUSH_MODE: &str = "memorm.flush_mode";
pub const PROPERTY_SHOW_SQL: &str = "memorm.show_sql";
pub const PROPERTY_UNIT_TIMEOUT_MS: &str = "memorm.unit_timeout_ms";

impl PersistenceConfig {
    pub fn new(unit_name: &str) -> Self {
        Self {
            unit_name: unit_name.to_string(),
            flush_mode: FlushMode::Auto,
            show_sql: false,
            unit_timeout: None,
        }
    }

    pub fn flush_mode(mut self, mode: FlushMode) -> Self {
        self.flush_mode = mode;
        self
    }

    pub fn show_sql(mut self, enabled: bool) -> Self {
        self.show_sql = enabled;
        self
    }

    pub fn unit_timeout(mut self, timeout: Duration) -> Self {
        self.unit_timeout = Some(timeout);
        self
    }

    /// Build from `memorm.*` key/value pairs. Unknown keys are ignored.
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self> {
        let name = properties
            .get(PROPERTY_UNIT_NAME)
            .map(String::as_str)
            .unwrap_or("default");
        let mut config = Self::new(name);

        if let Some(mode) = properties.get(PROPERTY_FLUSH_MODE) {
            config.flush_mode = mode.parse()?;
        }
        if let Some(show) = properties.get(PROPERTY_SHOW_SQL) {
            config.show_sql = parse_bool(PROPERTY_SHOW_SQL, show)?;
        }
        if let Some(ms) = properties.get(PROPERTY_UNIT_TIMEOUT_MS) {
            let ms: u64 = ms
                .trim()
                .parse()
                .map_err(|_| DbError::Mapping(format!("{} must be a number of milliseconds, got '{}'", PROPERTY_UNIT_TIMEOUT_MS, ms)))?;
            config.unit_timeout = Some(Duration::from_millis(ms));
        }

        Ok(config)
    }

    /// Same keys as [`from_properties`](Self::from_properties), read from the
    /// environment with dots replaced by underscores and upper-cased
    /// (`MEMORM_FLUSH_MODE`).
    pub fn from_env() -> Result<Self> {
        let properties = [
            PROPERTY_UNIT_NAME,
            PROPERTY_FLUSH_MODE,
            PROPERTY_SHOW_SQL,
            PROPERTY_UNIT_TIMEOUT_MS,
        ]
        .into_iter()
        .filter_map(|key| {
            let var = key.replace('.', "_").to_ascii_uppercase();
            std::env::var(var).ok().map(|value| (key.to_string(), value))
        })
        .collect();
        Self::from_properties(&properties)
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self::new("default")
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(DbError::Mapping(format!("{} must be a boolean, got '{}'", key, other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PersistenceConfig::default();
        assert_eq!(config.flush_mode, FlushMode::Auto);
        assert!(!config.show_sql);
        assert!(config.unit_timeout.is_none());
    }

    #[test]
    fn test_from_properties() {
        let properties: HashMap<String, String> = [
            ("memorm.unit_name", "hello"),
            ("memorm.flush_mode", "COMMIT"),
            ("memorm.show_sql", "true"),
            ("memorm.unit_timeout_ms", "250"),
            ("hibernate.format_sql", "true"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = PersistenceConfig::from_properties(&properties).unwrap();
        assert_eq!(config.unit_name, "hello");
        assert_eq!(config.flush_mode, FlushMode::Commit);
        assert!(config.show_sql);
        assert_eq!(config.unit_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_invalid_properties() {
        let properties: HashMap<String, String> =
            [("memorm.show_sql".to_string(), "maybe".to_string())].into_iter().collect();
        assert!(matches!(
            PersistenceConfig::from_properties(&properties),
            Err(DbError::Mapping(_))
        ));
    }
}
