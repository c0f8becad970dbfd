use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

use csvdash_gateway::ReconnectPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub ws_url: String,
    pub timeout: Duration,
    pub state_db: PathBuf,
    pub reconnect: ReconnectPolicy,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let defaults = ReconnectPolicy::default();
        let reconnect = ReconnectPolicy {
            initial_delay: Duration::from_millis(parse(
                &lookup,
                "CSVDASH_WS_INITIAL_DELAY_MS",
                defaults.initial_delay.as_millis() as u64,
            )?),
            max_delay: Duration::from_millis(parse(
                &lookup,
                "CSVDASH_WS_MAX_DELAY_MS",
                defaults.max_delay.as_millis() as u64,
            )?),
            max_retries: parse(&lookup, "CSVDASH_WS_MAX_RETRIES", defaults.max_retries)?,
        };

        Ok(Self {
            api_url: text("CSVDASH_API_URL", "http://localhost:8000"),
            ws_url: text("CSVDASH_WS_URL", "ws://localhost:8000"),
            timeout: Duration::from_secs(parse(&lookup, "CSVDASH_TIMEOUT_SECS", 30)?),
            state_db: PathBuf::from(text("CSVDASH_STATE_DB", "csvdash.db")),
            reconnect,
        })
    }
}

fn parse<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a number, got {:?}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.api_url, "http://localhost:8000");
        assert_eq!(config.ws_url, "ws://localhost:8000");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.state_db, PathBuf::from("csvdash.db"));
        assert_eq!(config.reconnect, ReconnectPolicy::default());
    }

    #[test]
    fn overrides() {
        let config = config(&[
            ("CSVDASH_API_URL", "https://csv.example.com"),
            ("CSVDASH_WS_MAX_RETRIES", "8"),
            ("CSVDASH_WS_INITIAL_DELAY_MS", "250"),
        ])
        .unwrap();
        assert_eq!(config.api_url, "https://csv.example.com");
        assert_eq!(config.reconnect.max_retries, 8);
        assert_eq!(config.reconnect.initial_delay, Duration::from_millis(250));
    }

    #[test]
    fn bad_numbers_are_reported() {
        let err = config(&[("CSVDASH_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("CSVDASH_TIMEOUT_SECS"));
    }
}
