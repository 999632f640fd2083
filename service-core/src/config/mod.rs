use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;

/// Settings every service shares, read from `configuration.*` and `APP__*` variables.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

fn default_port() -> u16 {
    8080
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn is_prod(&self) -> bool {
        matches!(self.environment.as_str(), "prod" | "production")
    }
}

/// Reads `key` from the environment.
///
/// Outside production a missing variable falls back to `default`; in production
/// it is a configuration error.
pub fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match std::env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} must be set in production",
                    key
                )))
            } else {
                default.map(|d| d.to_string()).ok_or_else(|| {
                    AppError::ConfigError(anyhow::anyhow!("{} is required", key))
                })
            }
        }
    }
}

/// Like [`get_env`] but parses the value.
pub fn get_env_parsed<T>(key: &str, default: T, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr + ToString,
{
    let raw = get_env(key, Some(&default.to_string()), is_prod)?;
    raw.parse::<T>()
        .map_err(|_| AppError::ConfigError(anyhow::anyhow!("{} has an invalid value: {}", key, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_var_uses_default_outside_prod() {
        let value = get_env("SERVICE_CORE_TEST_UNSET_VAR", Some("fallback"), false).unwrap();
        assert_eq!(value, "fallback");
    }

    #[test]
    fn missing_var_is_error_in_prod() {
        assert!(get_env("SERVICE_CORE_TEST_UNSET_VAR", Some("fallback"), true).is_err());
    }

    #[test]
    fn parsed_default_round_trips() {
        let value: u64 = get_env_parsed("SERVICE_CORE_TEST_UNSET_NUM", 10, false).unwrap();
        assert_eq!(value, 10);
    }
}
