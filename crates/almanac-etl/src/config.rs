use anyhow::{Context, Result};
use confyg::{env, Confygery};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use almanac_core::Bucket;

use crate::classify::BackendKind;
use crate::output::OutputFormat;
use crate::resilience::RetryPolicy;

pub const DEFAULT_FEED_BASE_URL: &str = "https://en.wikipedia.org/api/rest_v1/feed/onthisday";
pub const DEFAULT_SPARQL_URL: &str = "https://query.wikidata.org/sparql";
pub const DEFAULT_ENTITY_API_URL: &str = "https://www.wikidata.org/w/api.php";

const DEFAULT_CONTACT: &str = "https://github.com/oxur/almanac";

/// Configuration for almanac.
///
/// Configuration is loaded from multiple sources with the following priority:
/// 1. CLI arguments (highest priority)
/// 2. Environment variables (ALMANAC_* prefix)
/// 3. Config file (~/.config/almanac/config.toml)
/// 4. Built-in defaults (lowest priority)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory that receives `MM-DD.json` files.
    ///
    /// Can be set via:
    /// - CLI: --out-dir data/otd
    /// - ENV: ALMANAC_OUTPUT_DIR
    /// - Config: output_dir = "data/otd"
    pub output_dir: PathBuf,

    /// Output encoding, `json` or `csv`.
    pub format: OutputFormat,

    /// Feed buckets fetched when the CLI names none.
    #[serde(deserialize_with = "de_buckets")]
    pub buckets: Vec<Bucket>,

    /// Classification backend, `sparql` or `entity`.
    pub backend: BackendKind,

    /// Largest number of entity ids sent in one classification request.
    #[serde(deserialize_with = "de_from_str_or_value")]
    pub max_batch_size: usize,

    /// Retries after the first attempt for transient failures.
    #[serde(deserialize_with = "de_from_str_or_value")]
    pub max_retries: usize,

    #[serde(deserialize_with = "de_from_str_or_value")]
    pub retry_min_delay_ms: u64,

    #[serde(deserialize_with = "de_from_str_or_value")]
    pub retry_max_delay_ms: u64,

    /// Minimum spacing between classification requests.
    #[serde(deserialize_with = "de_from_str_or_value")]
    pub min_request_interval_ms: u64,

    #[serde(deserialize_with = "de_from_str_or_value")]
    pub request_timeout_secs: u64,

    /// How far the entity backend walks up `subclass of` chains.
    #[serde(deserialize_with = "de_from_str_or_value")]
    pub max_subclass_depth: usize,

    /// Contact URL or email put in the User-Agent, as Wikimedia asks.
    ///
    /// Can be set via:
    /// - ENV: ALMANAC_USER_AGENT_CONTACT
    /// - Config: user_agent_contact = "mailto:me@example.org"
    pub user_agent_contact: Option<String>,

    pub feed_base_url: String,
    pub sparql_url: String,
    pub entity_api_url: String,

    pub logging: LoggingConfig,
}

/// Logging section: `[logging]` in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of `trace`, `debug`, `info`, `warn`, `error`.
    pub level: String,
    #[serde(deserialize_with = "de_from_str_or_value")]
    pub coloured: bool,
    #[serde(deserialize_with = "de_from_str_or_value")]
    pub report_caller: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            coloured: true,
            report_caller: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data").join("otd"),
            format: OutputFormat::Json,
            buckets: Bucket::DAILY.to_vec(),
            backend: BackendKind::Sparql,
            max_batch_size: 25,
            max_retries: 5,
            retry_min_delay_ms: 1000,
            retry_max_delay_ms: 60_000,
            min_request_interval_ms: 1000,
            request_timeout_secs: 30,
            max_subclass_depth: 6,
            user_agent_contact: None,
            feed_base_url: DEFAULT_FEED_BASE_URL.to_string(),
            sparql_url: DEFAULT_SPARQL_URL.to_string(),
            entity_api_url: DEFAULT_ENTITY_API_URL.to_string(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Searches for config file at: ~/.config/almanac/config.toml
    /// Reads environment variables with ALMANAC_ prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_path = config_file_path();

        let mut builder = Confygery::new().context("Failed to create config builder")?;

        if config_path.exists() {
            let path_str = config_path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Config path contains invalid UTF-8"))?;
            builder
                .add_file(path_str)
                .context("Failed to load config file")?;
        }

        let env_opts = env::Options::with_top_level("almanac");
        builder
            .add_env(env_opts)
            .context("Failed to load environment variables")?;

        let config: Self = builder.build().context("Failed to build configuration")?;
        config.validate()?;

        Ok(config)
    }

    /// Reject settings that would make a run impossible.
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            anyhow::bail!("max_batch_size must be at least 1");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be at least 1");
        }
        if self.retry_min_delay_ms > self.retry_max_delay_ms {
            anyhow::bail!(
                "retry_min_delay_ms ({}) exceeds retry_max_delay_ms ({})",
                self.retry_min_delay_ms,
                self.retry_max_delay_ms
            );
        }
        if self.buckets.is_empty() {
            anyhow::bail!("buckets must name at least one feed bucket");
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            min_delay: Duration::from_millis(self.retry_min_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// User-Agent sent to Wikimedia endpoints.
    pub fn user_agent(&self) -> String {
        format!(
            "almanac/{} (+{})",
            env!("CARGO_PKG_VERSION"),
            self.user_agent_contact.as_deref().unwrap_or(DEFAULT_CONTACT)
        )
    }
}

/// Accept either a native TOML value or a string (environment variables
/// always arrive as strings).
fn de_from_str_or_value<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Deserialize<'de>,
    T::Err: Display,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw<T> {
        Value(T),
        Text(String),
    }

    match Raw::<T>::deserialize(deserializer)? {
        Raw::Value(v) => Ok(v),
        Raw::Text(s) => s.trim().parse().map_err(de::Error::custom),
    }
}

/// Buckets as a TOML array or a comma-separated string.
fn de_buckets<'de, D>(deserializer: D) -> std::result::Result<Vec<Bucket>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Text(String),
    }

    let names = match Raw::deserialize(deserializer)? {
        Raw::List(names) => names,
        Raw::Text(s) => s.split(',').map(str::to_string).collect(),
    };

    names
        .iter()
        .filter(|n| !n.trim().is_empty())
        .map(|n| n.parse::<Bucket>().map_err(de::Error::custom))
        .collect()
}

/// Get the config file path.
///
/// Returns:
/// - Linux: ~/.config/almanac/config.toml
/// - macOS: ~/Library/Application Support/almanac/config.toml
/// - Windows: %APPDATA%\almanac\config.toml
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("almanac")
        .join("config.toml")
}

/// Get the example config file content.
pub fn example_config() -> &'static str {
    r#"# Almanac Configuration File
#
# Configuration is loaded from multiple sources with the following priority:
# 1. CLI arguments (highest priority)
# 2. Environment variables (ALMANAC_* prefix)
# 3. This config file
# 4. Built-in defaults (lowest priority)

# Directory that receives one MM-DD.json (or .csv) file per run
#output_dir = "data/otd"

# Output encoding: "json" or "csv"
#format = "json"

# Feed buckets fetched when none are given on the command line
#buckets = ["events", "births", "deaths", "selected", "holidays"]

# Classification backend: "sparql" (query.wikidata.org) or "entity"
# (wbgetentities plus a local subclass walk)
#backend = "sparql"

# Entity ids per classification request. The query service starts
# rejecting or timing out somewhere above 50.
#max_batch_size = 25

# Retry budget and backoff bounds for 429/5xx/timeouts
#max_retries = 5
#retry_min_delay_ms = 1000
#retry_max_delay_ms = 60000

# Minimum spacing between classification requests
#min_request_interval_ms = 1000

#request_timeout_secs = 30

# How many subclass-of levels the entity backend follows
#max_subclass_depth = 6

# Contact put in the User-Agent header. Wikimedia blocks anonymous bots.
#
# Can also be set via:
# - Environment: ALMANAC_USER_AGENT_CONTACT=mailto:you@example.org
#user_agent_contact = "mailto:you@example.org"

[logging]
#level = "info"
#coloured = true
#report_caller = false
"#
}

/// Create default config file if it doesn't exist.
///
/// Returns true if a new file was created, false if it already existed.
pub fn ensure_config_file() -> Result<bool> {
    let config_path = config_file_path();

    if config_path.exists() {
        return Ok(false);
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    std::fs::write(&config_path, example_config()).context("Failed to write config file")?;

    Ok(true)
}
