use std::env;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub local_state_path: Option<String>,
    pub shuffle_api_url: Option<String>,
    pub shuffle_timeout_secs: u64,
    pub timer_tick_millis: u64,
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from `lookup`, falling back to `Config::default()`
    /// for every unset, blank or unparsable value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let parsed = |key: &str| non_empty(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            host: non_empty("BACKEND_HOST").unwrap_or(defaults.host),
            port: non_empty("BACKEND_PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.port),
            local_state_path: non_empty("LOCAL_STATE_PATH"),
            shuffle_api_url: non_empty("SHUFFLE_API_URL"),
            shuffle_timeout_secs: parsed("SHUFFLE_TIMEOUT_SECS").unwrap_or(defaults.shuffle_timeout_secs),
            timer_tick_millis: parsed("TIMER_TICK_MILLIS")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.timer_tick_millis),
            cors_origins: non_empty("CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.cors_origins),
        }
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.timer_tick_millis)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            local_state_path: None,
            shuffle_api_url: None,
            shuffle_timeout_secs: 30,
            timer_tick_millis: 1000,
            cors_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn unset_environment_matches_default() {
        assert_eq!(Config::from_lookup(|_| None), Config::default());
    }

    #[test]
    fn values_override_defaults() {
        let config = Config::from_lookup(lookup_from(&[
            ("BACKEND_HOST", "127.0.0.1"),
            ("BACKEND_PORT", "9000"),
            ("SHUFFLE_API_URL", "http://shuffle.local/api"),
            ("TIMER_TICK_MILLIS", "250"),
            ("CORS_ORIGINS", "http://a.test, ,http://b.test"),
        ]));
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9000);
        assert_eq!(config.shuffle_api_url.as_deref(), Some("http://shuffle.local/api"));
        assert_eq!(config.tick_period(), Duration::from_millis(250));
        assert_eq!(config.cors_origins, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = Config::from_lookup(lookup_from(&[
            ("BACKEND_PORT", "not-a-port"),
            ("TIMER_TICK_MILLIS", "0"),
            ("LOCAL_STATE_PATH", "  "),
        ]));
        assert_eq!(config, Config::default());
    }
}
