use std::time::Duration;

use stylecanvas_core::style::Orientation;
use stylecanvas_provider::retry::RetryConfig;

/// Engine and collaborator configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local backend.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL of the preview service.
    pub provider_url: String,
    /// Base URL of the entitlement service.
    pub entitlements_url: String,
    /// Project API key sent with every backend call, if required.
    pub api_key: Option<String>,
    /// Telemetry collector; telemetry is only logged when unset.
    pub telemetry_url: Option<String>,
    /// Deadline for a single provider call; `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
    /// Extra attempts for transient failures on the batch path.
    pub batch_retry_attempts: u32,
    /// Styles generated by the batch path.
    pub popular_styles: Vec<String>,
    pub default_orientation: Orientation,
}

/// Invalid configuration value.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got '{value}'")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

impl EngineConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                | Default                               |
    /// |------------------------|---------------------------------------|
    /// | `PREVIEW_PROVIDER_URL` | `http://localhost:54321/functions/v1` |
    /// | `ENTITLEMENTS_URL`     | value of `PREVIEW_PROVIDER_URL`       |
    /// | `BACKEND_API_KEY`      | unset                                 |
    /// | `TELEMETRY_URL`        | unset                                 |
    /// | `PREVIEW_TIMEOUT_SECS` | `120` (`0` disables)                  |
    /// | `BATCH_RETRY_ATTEMPTS` | `2`                                   |
    /// | `POPULAR_STYLES`       | `oil,watercolor,pop-art`              |
    /// | `DEFAULT_ORIENTATION`  | `square`                              |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let provider_url =
            var("PREVIEW_PROVIDER_URL").unwrap_or_else(|| "http://localhost:54321/functions/v1".into());
        let entitlements_url = var("ENTITLEMENTS_URL").unwrap_or_else(|| provider_url.clone());

        let timeout_secs: u64 = parse_or(var("PREVIEW_TIMEOUT_SECS"), 120, "PREVIEW_TIMEOUT_SECS", "a number of seconds")?;
        let request_timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));

        let batch_retry_attempts: u32 =
            parse_or(var("BATCH_RETRY_ATTEMPTS"), 2, "BATCH_RETRY_ATTEMPTS", "a non-negative integer")?;

        let popular_styles: Vec<String> = var("POPULAR_STYLES")
            .unwrap_or_else(|| "oil,watercolor,pop-art".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let default_orientation = match var("DEFAULT_ORIENTATION") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                var: "DEFAULT_ORIENTATION",
                expected: "square, horizontal or vertical",
                value: raw,
            })?,
            None => Orientation::Square,
        };

        Ok(Self {
            provider_url,
            entitlements_url,
            api_key: var("BACKEND_API_KEY"),
            telemetry_url: var("TELEMETRY_URL"),
            request_timeout,
            batch_retry_attempts,
            popular_styles,
            default_orientation,
        })
    }

    /// Backoff policy for the batch path.
    pub fn batch_retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.batch_retry_attempts,
            ..Default::default()
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    raw: Option<String>,
    default: T,
    var: &'static str,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { var, expected, value }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<EngineConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config.provider_url, "http://localhost:54321/functions/v1");
        assert_eq!(config.entitlements_url, config.provider_url);
        assert_eq!(config.request_timeout, Some(Duration::from_secs(120)));
        assert_eq!(config.batch_retry_attempts, 2);
        assert_eq!(config.popular_styles, vec!["oil", "watercolor", "pop-art"]);
        assert_eq!(config.default_orientation, Orientation::Square);
        assert!(config.telemetry_url.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("PREVIEW_PROVIDER_URL", "https://api.example/fn"),
            ("PREVIEW_TIMEOUT_SECS", "0"),
            ("POPULAR_STYLES", " charcoal , ,art-deco"),
            ("DEFAULT_ORIENTATION", "vertical"),
            ("TELEMETRY_URL", "https://collect.example"),
        ])
        .unwrap();
        assert_eq!(config.entitlements_url, "https://api.example/fn");
        assert_eq!(config.request_timeout, None);
        assert_eq!(config.popular_styles, vec!["charcoal", "art-deco"]);
        assert_eq!(config.default_orientation, Orientation::Vertical);
        assert_eq!(config.telemetry_url.as_deref(), Some("https://collect.example"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert_matches!(
            load(&[("PREVIEW_TIMEOUT_SECS", "soon")]),
            Err(ConfigError::Invalid { var: "PREVIEW_TIMEOUT_SECS", .. })
        );
        assert_matches!(
            load(&[("DEFAULT_ORIENTATION", "round")]),
            Err(ConfigError::Invalid { var: "DEFAULT_ORIENTATION", .. })
        );
    }

    #[test]
    fn batch_retry_uses_attempts() {
        let config = load(&[("BATCH_RETRY_ATTEMPTS", "5")]).unwrap();
        assert_eq!(config.batch_retry().max_retries, 5);
    }
}
