use crate::models::SourceId;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(String),
    #[error("cannot parse config file: {0}")]
    Parse(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Immutable knobs for one resolution run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub batch_size: usize,
    pub max_concurrent_per_batch: usize,
    pub per_request_timeout: Duration,
    /// Random pacing sleep between batches (skipped after the last one).
    pub inter_batch_delay: (Duration, Duration),
    /// Human-like pause before each outbound request.
    pub request_jitter: (Duration, Duration),
    /// Ordered set of marketplaces to query per identifier.
    pub sources: Vec<SourceId>,
    /// WebDriver endpoint enabling the RenderedFetch tier.
    pub webdriver_url: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            batch_size: 3,
            max_concurrent_per_batch: 3,
            per_request_timeout: Duration::from_secs(30),
            inter_batch_delay: (Duration::from_secs(3), Duration::from_secs(5)),
            request_jitter: (Duration::from_secs(1), Duration::from_secs(3)),
            sources: vec![SourceId::Ozon, SourceId::Wildberries],
            webdriver_url: None,
        }
    }
}

/// Optional YAML overlay; every field falls back to the default.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    batch_size: Option<usize>,
    max_concurrent_per_batch: Option<usize>,
    per_request_timeout_secs: Option<u64>,
    inter_batch_delay_secs: Option<(u64, u64)>,
    request_jitter_millis: Option<(u64, u64)>,
    sources: Option<Vec<String>>,
    webdriver_url: Option<String>,
}

impl RunConfig {
    /// Defaults, overlaid by the optional YAML file at `PRICESCAN_CONFIG`,
    /// overlaid by individual env vars.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(path) = std::env::var("PRICESCAN_CONFIG") {
            config.apply_file(Path::new(&path))?;
        }
        config.apply_env_with(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        let raw: RawConfig =
            serde_yaml::from_str(&raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        self.apply_raw(raw)
    }

    fn apply_raw(&mut self, raw: RawConfig) -> Result<(), ConfigError> {
        if let Some(value) = raw.batch_size {
            self.batch_size = value;
        }
        if let Some(value) = raw.max_concurrent_per_batch {
            self.max_concurrent_per_batch = value;
        }
        if let Some(secs) = raw.per_request_timeout_secs {
            self.per_request_timeout = Duration::from_secs(secs);
        }
        if let Some((min, max)) = raw.inter_batch_delay_secs {
            self.inter_batch_delay = (Duration::from_secs(min), Duration::from_secs(max));
        }
        if let Some((min, max)) = raw.request_jitter_millis {
            self.request_jitter = (Duration::from_millis(min), Duration::from_millis(max));
        }
        if let Some(names) = raw.sources {
            self.sources = parse_sources(&names.join(","))?;
        }
        if let Some(url) = raw.webdriver_url {
            self.webdriver_url = Some(url);
        }
        Ok(())
    }

    /// `get` is injected so tests can override without touching process
    /// environment.
    pub fn apply_env_with(
        &mut self,
        get: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = parse_env(&get, "PRICESCAN_BATCH_SIZE")? {
            self.batch_size = value;
        }
        if let Some(value) = parse_env(&get, "PRICESCAN_MAX_CONCURRENT")? {
            self.max_concurrent_per_batch = value;
        }
        if let Some(secs) = parse_env(&get, "PRICESCAN_TIMEOUT_SECS")? {
            self.per_request_timeout = Duration::from_secs(secs);
        }
        if let Some(names) = get("PRICESCAN_SOURCES") {
            self.sources = parse_sources(&names)?;
        }
        if let Some(url) = get("PRICESCAN_WEBDRIVER_URL") {
            let url = url.trim().to_string();
            if !url.is_empty() {
                self.webdriver_url = Some(url);
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be > 0".into()));
        }
        if self.max_concurrent_per_batch == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_per_batch must be > 0".into(),
            ));
        }
        if self.per_request_timeout.is_zero() {
            return Err(ConfigError::Invalid("per_request_timeout must be > 0".into()));
        }
        if self.inter_batch_delay.0 > self.inter_batch_delay.1 {
            return Err(ConfigError::Invalid("inter_batch_delay min > max".into()));
        }
        if self.request_jitter.0 > self.request_jitter.1 {
            return Err(ConfigError::Invalid("request_jitter min > max".into()));
        }
        if self.sources.is_empty() {
            return Err(ConfigError::Invalid("no sources configured".into()));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match get(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(format!("{key}={value} is not valid"))),
        None => Ok(None),
    }
}

fn parse_sources(names: &str) -> Result<Vec<SourceId>, ConfigError> {
    let mut sources = Vec::new();
    for name in names.split(',') {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let source = SourceId::from_str(name)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown source `{name}`")))?;
        if !sources.contains(&source) {
            sources.push(source);
        }
    }
    Ok(sources)
}
