//! Run configuration
//!
//! Everything a harvest needs is carried in one explicit [`ReapConfig`]
//! value, loaded from TOML and handed to each job. Secrets are not part of
//! the file: [`Credentials`] come from the command line or environment.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::{CollectLimits, DEFAULT_MAX_ATTEMPTS, DEFAULT_ORIGIN, DEFAULT_TARGET_POSTS};

/// Errors from loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Complete configuration for a postreap process
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReapConfig {
    pub site: SiteConfig,
    pub scrape: ScrapeSettings,
    pub output: OutputSettings,
    pub hashtags: HashtagSets,
    pub server: ServerSettings,
}

impl ReapConfig {
    /// Load and validate a TOML config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text; missing keys take their defaults
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ReapConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.site.origin.starts_with("http://") && !self.site.origin.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "site.origin must be an http(s) URL, got {:?}",
                self.site.origin
            )));
        }
        if self.scrape.target_posts == 0 {
            return Err(ConfigError::Invalid("scrape.target_posts must be at least 1".into()));
        }
        if self.scrape.max_scroll_attempts == 0 {
            return Err(ConfigError::Invalid(
                "scrape.max_scroll_attempts must be at least 1".into(),
            ));
        }
        let [low, high] = self.scrape.scroll_delay_ms;
        if low > high {
            return Err(ConfigError::Invalid(format!(
                "scrape.scroll_delay_ms lower bound {} exceeds upper bound {}",
                low, high
            )));
        }
        if !self.hashtags.current.is_empty() && self.hashtags.get(&self.hashtags.current).is_none() {
            return Err(ConfigError::Invalid(format!(
                "hashtags.current names unknown set {:?}",
                self.hashtags.current
            )));
        }
        Ok(())
    }
}

/// Target site
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Origin prefixed to relative links, e.g. `https://www.linkedin.com`
    pub origin: String,
    pub login_path: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            login_path: "/login".to_string(),
        }
    }
}

impl SiteConfig {
    pub fn login_url(&self) -> String {
        format!("{}{}", self.origin.trim_end_matches('/'), self.login_path)
    }
}

/// Recency filter applied to search results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFilter {
    #[serde(rename = "past_24h")]
    Past24h,
    #[default]
    PastWeek,
    PastMonth,
    AnyTime,
}

impl DateFilter {
    /// Label shown on the site's filter option
    pub fn label(&self) -> &'static str {
        match self {
            DateFilter::Past24h => "Past 24 hours",
            DateFilter::PastWeek => "Past week",
            DateFilter::PastMonth => "Past month",
            DateFilter::AnyTime => "Any time",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DateFilter::Past24h => "past_24h",
            DateFilter::PastWeek => "past_week",
            DateFilter::PastMonth => "past_month",
            DateFilter::AnyTime => "any_time",
        }
    }
}

impl fmt::Display for DateFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DateFilter {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "past_24h" | "24h" | "day" => Ok(DateFilter::Past24h),
            "past_week" | "week" => Ok(DateFilter::PastWeek),
            "past_month" | "month" => Ok(DateFilter::PastMonth),
            "any_time" | "any" => Ok(DateFilter::AnyTime),
            other => Err(ConfigError::Invalid(format!("unknown date filter: {}", other))),
        }
    }
}

/// Browser and collection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeSettings {
    pub target_posts: usize,
    /// Consecutive scrolls without new posts before giving up
    pub max_scroll_attempts: u32,
    /// Pause after each scroll, picked uniformly from `[low, high]` milliseconds
    pub scroll_delay_ms: [u64; 2],
    pub headless: bool,
    /// Wait budget for a single page element, in seconds
    pub timeout_secs: u64,
    pub date_filter: DateFilter,
    /// Open every new post in its own tab to read its final URL
    pub resolve_permalinks: bool,
    pub user_agent: String,
    /// Wall-clock ceiling for the collection phase (0 = unlimited)
    pub max_runtime_secs: u64,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            target_posts: DEFAULT_TARGET_POSTS,
            max_scroll_attempts: DEFAULT_MAX_ATTEMPTS,
            scroll_delay_ms: [3000, 5000],
            headless: true,
            timeout_secs: 15,
            date_filter: DateFilter::PastWeek,
            resolve_permalinks: false,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            max_runtime_secs: 0,
        }
    }
}

impl ScrapeSettings {
    /// Collection bounds for a run aiming at `target` posts
    pub fn limits(&self, target: usize) -> CollectLimits {
        let limits = CollectLimits::new(target, self.max_scroll_attempts);
        if self.max_runtime_secs > 0 {
            limits.with_deadline(Duration::from_secs(self.max_runtime_secs))
        } else {
            limits
        }
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Which files a finished run writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveFormat {
    Csv,
    Json,
    #[default]
    Both,
}

impl SaveFormat {
    pub fn writes_csv(&self) -> bool {
        matches!(self, SaveFormat::Csv | SaveFormat::Both)
    }

    pub fn writes_json(&self) -> bool {
        matches!(self, SaveFormat::Json | SaveFormat::Both)
    }
}

impl FromStr for SaveFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(SaveFormat::Csv),
            "json" => Ok(SaveFormat::Json),
            "both" => Ok(SaveFormat::Both),
            other => Err(ConfigError::Invalid(format!("unknown save format: {}", other))),
        }
    }
}

/// Where and how results are written
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub dir: PathBuf,
    pub csv_stem: String,
    pub json_stem: String,
    pub format: SaveFormat,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            csv_stem: "linkedin_posts".to_string(),
            json_stem: "linkedin_posts".to_string(),
            format: SaveFormat::Both,
        }
    }
}

/// Named hashtag sets; `current` picks the one used when none is given
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HashtagSets {
    pub current: String,
    pub sets: BTreeMap<String, Vec<String>>,
}

impl Default for HashtagSets {
    fn default() -> Self {
        let sets = [
            ("ai_ml_hiring", vec!["AIMLhiring"]),
            ("tech_jobs", vec!["techjobs", "softwareengineer", "python"]),
            ("data_science", vec!["datascience", "machinelearning", "analytics"]),
            ("remote_work", vec!["remotework", "workfromhome", "remotejobs"]),
        ]
        .into_iter()
        .map(|(name, tags)| {
            (
                name.to_string(),
                tags.into_iter().map(String::from).collect(),
            )
        })
        .collect();

        Self {
            current: "ai_ml_hiring".to_string(),
            sets,
        }
    }
}

impl HashtagSets {
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.sets.get(name).map(Vec::as_slice)
    }

    pub fn current(&self) -> Option<&[String]> {
        self.get(&self.current)
    }
}

/// HTTP control surface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

/// Login credentials for the site
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            email: email.to_string(),
            password: password.to_string(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ReapConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scrape.target_posts, 50);
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.site.login_url(), "https://www.linkedin.com/login");
        assert_eq!(config.hashtags.current().unwrap(), ["AIMLhiring".to_string()]);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ReapConfig::from_toml_str(
            r#"
            [scrape]
            target_posts = 10
            date_filter = "past_24h"
            scroll_delay_ms = [100, 200]

            [output]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.scrape.target_posts, 10);
        assert_eq!(config.scrape.date_filter, DateFilter::Past24h);
        assert_eq!(config.scrape.max_scroll_attempts, DEFAULT_MAX_ATTEMPTS);
        assert!(!config.output.format.writes_csv());
        assert!(config.output.format.writes_json());
        assert_eq!(config.site.origin, DEFAULT_ORIGIN);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = ReapConfig::from_toml_str("[scrape]\ntarget_posts = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = ReapConfig::from_toml_str("[scrape]\nscroll_delay_ms = [5, 1]\n").unwrap_err();
        assert!(err.to_string().contains("scroll_delay_ms"));

        let err = ReapConfig::from_toml_str("[site]\norigin = \"linkedin.com\"\n").unwrap_err();
        assert!(err.to_string().contains("site.origin"));

        let err = ReapConfig::from_toml_str("[hashtags]\ncurrent = \"nope\"\n").unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let err = ReapConfig::from_toml_str("[scrape\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_limits_from_settings() {
        let mut scrape = ScrapeSettings::default();
        let limits = scrape.limits(7);
        assert_eq!(limits.target_count, 7);
        assert_eq!(limits.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert!(limits.deadline.is_none());

        scrape.max_runtime_secs = 30;
        assert_eq!(scrape.limits(7).deadline, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!("week".parse::<DateFilter>().unwrap(), DateFilter::PastWeek);
        assert_eq!("past-month".parse::<DateFilter>().unwrap(), DateFilter::PastMonth);
        assert!("yesterday".parse::<DateFilter>().is_err());
        assert_eq!("BOTH".parse::<SaveFormat>().unwrap(), SaveFormat::Both);
        assert_eq!(DateFilter::Past24h.label(), "Past 24 hours");
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("a@b.c", "hunter2");
        let shown = format!("{:?}", creds);
        assert!(shown.contains("a@b.c"));
        assert!(!shown.contains("hunter2"));
    }
}
