//! Environment-based configuration for the crate's own binaries and
//! integration-test harness — not a general-purpose config-file library;
//! the one concrete loader this crate's tests and example binaries need.
//!
//! Uses the common `dotenvy` idiom for a sqlx/Postgres-backed service's
//! env-based configuration: call `dotenvy::dotenv()` once, then read
//! everything through `std::env::var`.

use std::time::Duration;

use iam_core::{IamError, IamResult};

/// How long a projection may go without applying an event before the
/// projection runtime's health check considers it unhealthy.
const DEFAULT_PROJECTION_STALENESS_BUDGET: Duration = Duration::from_secs(5 * 60);

/// Configuration for the event store and the projection runtime that reads
/// from it.
#[derive(Debug, Clone)]
pub struct EventStoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub statement_timeout: Duration,
    /// A projection that hasn't applied an event in longer than this is
    /// reported unhealthy even if it hasn't errored.
    pub projection_staleness_budget: Duration,
    /// `enableLocking`: whether the projection runtime takes an advisory
    /// lock before a rebuild so only one rebuild of a given projection runs
    /// at a time.
    pub enable_projection_locking: bool,
}

impl EventStoreConfig {
    /// Load from the process environment, first merging in a `.env` file if
    /// one is present (`dotenvy::dotenv().ok()` — missing is not an error:
    /// local dev typically has one, CI/production don't).
    pub fn from_env() -> IamResult<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| IamError::validation("DATABASE_URL must be set"))?;

        let max_connections = env_parsed("MAX_CONNECTIONS", 10u32)?;
        let statement_timeout_secs = env_parsed("STATEMENT_TIMEOUT_SECS", 30u64)?;
        let projection_staleness_budget_secs = env_parsed(
            "PROJECTION_STALENESS_BUDGET_SECS",
            DEFAULT_PROJECTION_STALENESS_BUDGET.as_secs(),
        )?;
        let enable_projection_locking = env_bool("ENABLE_PROJECTION_LOCKING", true)?;

        Ok(Self {
            database_url,
            max_connections,
            statement_timeout: Duration::from_secs(statement_timeout_secs),
            projection_staleness_budget: Duration::from_secs(projection_staleness_budget_secs),
            enable_projection_locking,
        })
    }
}

impl Default for EventStoreConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_connections: 10,
            statement_timeout: Duration::from_secs(30),
            projection_staleness_budget: DEFAULT_PROJECTION_STALENESS_BUDGET,
            enable_projection_locking: true,
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> IamResult<T> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| IamError::validation(format!("{key} is not a valid value"))),
        Err(_) => Ok(default),
    }
}

fn env_bool(key: &str, default: bool) -> IamResult<bool> {
    match std::env::var(key) {
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(IamError::validation(format!("{key} must be a boolean"))),
        },
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_the_sensible_fallbacks() {
        let config = EventStoreConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.projection_staleness_budget, Duration::from_secs(300));
        assert!(config.enable_projection_locking);
    }

    #[test]
    fn env_parsed_falls_back_when_the_variable_is_unset() {
        std::env::remove_var("IAM_INFRA_TEST_UNSET_VAR");
        let value: u32 = env_parsed("IAM_INFRA_TEST_UNSET_VAR", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn env_bool_rejects_a_non_boolean_value() {
        std::env::set_var("IAM_INFRA_TEST_BOOL_VAR", "maybe");
        let err = env_bool("IAM_INFRA_TEST_BOOL_VAR", true).unwrap_err();
        assert!(matches!(err, IamError::Validation { .. }));
        std::env::remove_var("IAM_INFRA_TEST_BOOL_VAR");
    }
}
