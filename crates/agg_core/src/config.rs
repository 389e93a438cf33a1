use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use crate::node::DEFAULT_NODE_COUNT;
use crate::{Error, Result};

/// Duration written the way people type it: `30s`, `10m`, `1h15m30s`, `1d`.
/// A bare number is read as seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HumanDuration(pub Duration);

fn add_component(total_millis: u64, num: u64, unit_millis: u64) -> std::result::Result<u64, String> {
    num.checked_mul(unit_millis)
        .and_then(|millis| total_millis.checked_add(millis))
        .ok_or_else(|| "duration out of range".to_string())
}

impl FromStr for HumanDuration {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut total_millis = 0u64;
        let mut current_number = String::new();
        let mut has_unit = false;
        let mut chars = s.trim().chars().peekable();

        while let Some(c) = chars.next() {
            if c.is_ascii_digit() {
                current_number.push(c);
            } else if let Ok(num) = current_number.parse::<u64>() {
                let unit_millis = match c {
                    'm' if chars.peek() == Some(&'s') => {
                        chars.next();
                        1
                    }
                    's' => 1_000,
                    'm' => 60_000,
                    'h' => 3_600_000,
                    'd' => 86_400_000,
                    _ => return Err(format!("Invalid duration unit: {}", c)),
                };
                total_millis = add_component(total_millis, num, unit_millis)?;
                current_number.clear();
                has_unit = true;
            } else if !c.is_whitespace() {
                return Err(format!("Invalid character in duration: {}", c));
            }
        }

        if !current_number.is_empty() {
            let num = current_number
                .parse::<u64>()
                .map_err(|_| "Invalid number in duration".to_string())?;
            total_millis = add_component(total_millis, num, 1_000)?;
            has_unit = true;
        }

        if !has_unit {
            return Err("Duration must include a number".to_string());
        }

        Ok(HumanDuration(Duration::from_millis(total_millis)))
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = self.0.as_millis() as u64;
        if millis == 0 {
            return write!(f, "0s");
        }
        if millis % 1_000 != 0 {
            return write!(f, "{}ms", millis);
        }
        let mut secs = millis / 1_000;
        for (unit, size) in [("d", 86_400), ("h", 3_600), ("m", 60), ("s", 1)] {
            if secs >= size {
                write!(f, "{}{}", secs / size, unit)?;
                secs %= size;
            }
        }
        Ok(())
    }
}

mod duration_str {
    use super::HumanDuration;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&HumanDuration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse::<HumanDuration>()
            .map(|h| h.0)
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Inshorts,
    #[serde(rename = "hindustantimes")]
    HindustanTimes,
    /// Synthetic listing, no network
    Mock,
}

impl SourceKind {
    pub fn default_listing_url(&self) -> Option<&'static str> {
        match self {
            SourceKind::Inshorts => Some("https://inshorts.com/en/read"),
            SourceKind::HindustanTimes => Some("https://www.hindustantimes.com/latest-news"),
            SourceKind::Mock => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Inshorts => "inshorts",
            SourceKind::HindustanTimes => "hindustantimes",
            SourceKind::Mock => "mock",
        };
        f.write_str(name)
    }
}

fn default_max_items() -> usize {
    20
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Identifier stored in `Article::source`
    pub id: String,
    pub kind: SourceKind,
    #[serde(default)]
    pub listing_url: Option<String>,
    #[serde(default = "default_max_items")]
    pub max_items: usize,
}

impl SourceConfig {
    pub fn new(id: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            id: id.into(),
            kind,
            listing_url: None,
            max_items: default_max_items(),
        }
    }

    pub fn listing_url(&self) -> Option<&str> {
        self.listing_url
            .as_deref()
            .or_else(|| self.kind.default_listing_url())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub node_count: u32,
    #[serde(with = "duration_str")]
    pub interval: Duration,
    pub fetch_attempts: u32,
    #[serde(with = "duration_str")]
    pub backoff_base: Duration,
    #[serde(with = "duration_str")]
    pub backoff_jitter: Duration,
    pub max_concurrent_sources: usize,
    #[serde(with = "duration_str")]
    pub source_deadline: Duration,
    #[serde(with = "duration_str")]
    pub request_timeout: Duration,
    pub persist_attempts: u32,
    #[serde(with = "duration_str")]
    pub persist_backoff: Duration,
    #[serde(with = "duration_str")]
    pub store_timeout: Duration,
    pub max_title_len: usize,
    pub max_url_len: usize,
    pub run_history: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            node_count: DEFAULT_NODE_COUNT,
            interval: Duration::from_secs(600),
            fetch_attempts: 3,
            backoff_base: Duration::from_secs(1),
            backoff_jitter: Duration::from_secs(1),
            max_concurrent_sources: 4,
            source_deadline: Duration::from_secs(60),
            request_timeout: Duration::from_secs(10),
            persist_attempts: 3,
            persist_backoff: Duration::from_millis(100),
            store_timeout: Duration::from_secs(5),
            max_title_len: 500,
            max_url_len: 2048,
            run_history: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    Memory,
    Sqlite,
}

impl FromStr for StorageBackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(Error::Config(format!("Unknown storage backend: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackendKind,
    pub path: PathBuf,
    pub cache: bool,
    #[serde(with = "duration_str")]
    pub cache_ttl: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendKind::Sqlite,
            path: PathBuf::from("articles.db"),
            cache: true,
            cache_ttl: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    #[serde(with = "duration_str")]
    pub freshness_window: Duration,
    #[serde(with = "duration_str")]
    pub check_timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            freshness_window: Duration::from_secs(24 * 3600),
            check_timeout: Duration::from_secs(5),
        }
    }
}

fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig::new("inshorts", SourceKind::Inshorts),
        SourceConfig::new("hindustantimes", SourceKind::HindustanTimes),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            sources: default_sources(),
            storage: StorageConfig::default(),
            server: ServerConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

impl Config {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        let p = &self.pipeline;
        if p.node_count == 0 {
            return Err(Error::Config("pipeline.node_count must be at least 1".into()));
        }
        if p.fetch_attempts == 0 || p.persist_attempts == 0 {
            return Err(Error::Config("attempt counts must be at least 1".into()));
        }
        if p.max_concurrent_sources == 0 {
            return Err(Error::Config("pipeline.max_concurrent_sources must be at least 1".into()));
        }
        if p.interval.is_zero() {
            return Err(Error::Config("pipeline.interval must be positive".into()));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.id.trim().is_empty() {
                return Err(Error::Config("source id must not be empty".into()));
            }
            if !seen.insert(source.id.as_str()) {
                return Err(Error::Config(format!("duplicate source id: {}", source.id)));
            }
            if source.kind != SourceKind::Mock && source.listing_url().is_none() {
                return Err(Error::Config(format!("source {} has no listing_url", source.id)));
            }
            if let Some(listing) = &source.listing_url {
                url::Url::parse(listing)?;
            }
        }
        Ok(())
    }
}
