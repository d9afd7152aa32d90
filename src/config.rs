use clap::ValueEnum;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::models::StockStatus;
use crate::utils::error::{AppError, Result};
use crate::utils::retry::RetryPolicy;

pub const DEFAULT_BASE_URL: &str = "https://chiikawamarket.jp";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Token accepted by `--collections` and `--status` meaning "no filter".
pub const ALL_TOKEN: &str = "all";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    Excel,
    Both,
}

impl OutputFormat {
    pub fn writes_csv(&self) -> bool {
        matches!(self, OutputFormat::Csv | OutputFormat::Both)
    }

    pub fn writes_excel(&self) -> bool {
        matches!(self, OutputFormat::Excel | OutputFormat::Both)
    }
}

/// Named starting points for the pacing and retry settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Default,
    Fast,
    Detailed,
    Safe,
}

impl Preset {
    pub fn apply(&self, config: &mut ScrapeConfig) {
        match self {
            Preset::Default => {}
            Preset::Fast => {
                config.delay_secs = 0.5;
                config.max_products = Some(100);
                config.fetch_details = false;
                config.max_retries = 1;
            }
            Preset::Detailed => {
                config.delay_secs = 2.0;
                config.fetch_details = true;
                config.max_retries = 3;
            }
            Preset::Safe => {
                config.delay_secs = 3.0;
                config.max_products = Some(50);
                config.fetch_details = false;
                config.max_retries = 5;
                config.retry_base_delay_ms = 5_000;
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScrapeConfig {
    pub base_url: String,
    pub delay_secs: f64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub timeout_secs: u64,
    pub max_products: Option<usize>,
    pub max_pages_per_collection: u32,
    pub collections: BTreeSet<String>,
    pub statuses: BTreeSet<StockStatus>,
    pub fetch_details: bool,
    pub output_format: OutputFormat,
    pub output: Option<PathBuf>,
    pub user_agent: String,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            delay_secs: 1.0,
            max_retries: 3,
            retry_base_delay_ms: 2_000,
            retry_max_delay_ms: 30_000,
            timeout_secs: 30,
            max_products: None,
            max_pages_per_collection: 50,
            collections: BTreeSet::new(),
            statuses: BTreeSet::new(),
            fetch_details: false,
            output_format: OutputFormat::Csv,
            output: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ScrapeConfig {
    /// Defaults, then `config/scraper.*` (or `path`), then `SCRAPER_*`
    /// environment variables. Validation is left to the caller so CLI
    /// overrides can be applied first.
    pub fn load(path: Option<&Path>) -> std::result::Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("config/scraper").required(false),
        };

        let s = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("SCRAPER")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("collections")
                    .with_list_parse_key("statuses"),
            )
            .build()?;

        s.try_deserialize()
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        match Url::parse(&self.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid base URL '{}': expected an absolute http(s) URL",
                    self.base_url
                )));
            }
        }

        if !self.delay_secs.is_finite() || self.delay_secs < 0.0 {
            return Err(ConfigError::Message("Delay must be a non-negative number of seconds".into()));
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::Message("Timeout must be greater than 0".into()));
        }

        if self.max_products == Some(0) {
            return Err(ConfigError::Message("Max products must be at least 1 when set".into()));
        }

        if self.max_pages_per_collection == 0 {
            return Err(ConfigError::Message("Max pages per collection must be greater than 0".into()));
        }

        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(ConfigError::Message("Retry base delay cannot exceed the retry max delay".into()));
        }

        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::Message("User agent must not be empty".into()));
        }

        if let Some(slug) = self.collections.iter().find(|slug| !is_valid_slug(slug)) {
            return Err(ConfigError::Message(format!("Invalid collection identifier '{}'", slug)));
        }

        Ok(())
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs_f64(self.delay_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.retry_max_delay_ms),
        )
    }
}

fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Parse a comma separated collection list. `all` (or an empty list) means
/// every collection.
pub fn parse_collections(list: &str) -> Result<BTreeSet<String>> {
    let mut collections = BTreeSet::new();
    for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if item.eq_ignore_ascii_case(ALL_TOKEN) {
            return Ok(BTreeSet::new());
        }
        if !is_valid_slug(item) {
            return Err(AppError::config(format!("invalid collection identifier '{item}'")));
        }
        collections.insert(item.to_string());
    }
    Ok(collections)
}

/// Parse a comma separated status list, rejecting unknown names. `all` (or
/// an empty list) means no status filter.
pub fn parse_statuses(list: &str) -> Result<BTreeSet<StockStatus>> {
    let mut statuses = BTreeSet::new();
    for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if item.eq_ignore_ascii_case(ALL_TOKEN) {
            return Ok(BTreeSet::new());
        }
        let status = item.parse::<StockStatus>().map_err(AppError::Config)?;
        statuses.insert(status);
    }
    Ok(statuses)
}
