use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::assembler::MarkerMatcher;
use crate::error::AppError;
use crate::parser::ParserConfig;
use crate::policy::{FieldPolicy, PolicyTable};

fn default_pagination() -> String {
    "nav_id".into()
}

fn default_house_marker() -> String {
    "house".into()
}

fn default_item_class() -> String {
    "msga2-o pp6".into()
}

fn default_url_class() -> String {
    "am".into()
}

fn default_concurrency() -> usize {
    4
}

fn default_timeout() -> u64 {
    30
}

fn default_requests_dir() -> String {
    "requests".into()
}

fn default_level() -> String {
    "info".into()
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    #[serde(rename = "logging.level", default = "default_level")]
    pub level: String,
    /// Optional file receiving a copy of the log output.
    #[serde(rename = "logging.file", default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: None,
        }
    }
}

/// Application configuration, read from a flat JSON object with dotted keys.
///
/// ```json
/// {
///   "sites": ["https://www.ss.com/lv/real-estate/flats/riga/centre/sell/"],
///   "sscom.url": "https://www.ss.com",
///   "sscom.class": "msga2-o pp6",
///   "sscom.class.url": "am",
///   "restart": 3600
/// }
/// ```
///
/// Unknown keys are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub sites: Vec<String>,

    /// Joined with listing hrefs and pagination references.
    #[serde(rename = "sscom.url")]
    pub base_url: String,

    #[serde(rename = "sscom.class", default = "default_item_class")]
    pub item_class: String,

    #[serde(rename = "sscom.class.url", default = "default_url_class")]
    pub url_class: String,

    #[serde(rename = "sscom.pagination", default = "default_pagination")]
    pub pagination_marker: String,

    /// `type` given to six-value (house) rows.
    #[serde(rename = "house.marker", default = "default_house_marker")]
    pub house_marker: String,

    /// Seconds between poll cycles. `0` or absent runs a single cycle.
    #[serde(default)]
    pub restart: Option<u64>,

    #[serde(rename = "fetch.concurrency", default = "default_concurrency")]
    pub fetch_concurrency: usize,

    #[serde(rename = "fetch.timeout", default = "default_timeout")]
    pub fetch_timeout: u64,

    /// Where raw requests are recorded. Empty disables recording.
    #[serde(rename = "requests.dir", default = "default_requests_dir")]
    pub requests_dir: String,

    /// Persist fresh listings that match no stored ad.
    #[serde(rename = "insert.new", default)]
    pub insert_new: bool,

    /// Per-field overrides of the default policy table.
    #[serde(default)]
    pub resolvers: BTreeMap<String, FieldPolicy>,

    #[serde(flatten)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Read and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!("Cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| AppError::ConfigError(format!("Invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.sites.is_empty() {
            return Err(AppError::ConfigError("No sites configured".into()));
        }
        for site in &self.sites {
            validate_http_url(site, "site")?;
        }
        validate_http_url(&self.base_url, "sscom.url")?;

        if self.fetch_concurrency == 0 {
            return Err(AppError::ConfigError(
                "fetch.concurrency must be at least 1".into(),
            ));
        }
        if self.fetch_timeout == 0 {
            return Err(AppError::ConfigError(
                "fetch.timeout must be at least 1 second".into(),
            ));
        }
        if self.item_class.is_empty() || self.url_class.is_empty() {
            return Err(AppError::ConfigError(
                "sscom.class and sscom.class.url must not be empty".into(),
            ));
        }

        // surfaces exempt-field overrides
        self.policies()?;
        Ok(())
    }

    /// Delay between cycles, `None` when running once.
    pub fn restart_interval(&self) -> Option<Duration> {
        self.restart
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Base URL without a trailing slash, ready to prefix hrefs.
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn requests_dir(&self) -> Option<&Path> {
        (!self.requests_dir.is_empty()).then(|| Path::new(&self.requests_dir))
    }

    pub fn parser_config(&self) -> ParserConfig {
        ParserConfig::listings()
    }

    pub fn marker_matcher(&self) -> MarkerMatcher {
        MarkerMatcher::new(&self.url_class, &self.item_class)
    }

    /// Default policy table with the configured overrides applied.
    pub fn policies(&self) -> Result<PolicyTable, AppError> {
        let mut table = PolicyTable::default();
        table.apply_overrides(&self.resolvers)?;
        Ok(table)
    }
}

fn validate_http_url(raw: &str, what: &str) -> Result<(), AppError> {
    let parsed = Url::parse(raw)
        .map_err(|e| AppError::ConfigError(format!("Invalid {what} URL '{raw}': {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(AppError::ConfigError(format!(
            "Unsupported scheme '{scheme}' in {what} URL '{raw}'"
        ))),
    }
}
