//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::PortalSelectors;
use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Portal and identity provider endpoints
    #[serde(default)]
    pub portal: PortalConfig,

    /// HTTP and crawling behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Reconciliation and cleanup rules
    #[serde(default)]
    pub sync: SyncConfig,

    /// Task list and course-work API endpoints
    #[serde(default)]
    pub google: GoogleConfig,

    /// Guard against writing a badly shrunken scan
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("portal.base_url", &self.portal.base_url),
            ("portal.sso_url", &self.portal.sso_url),
            ("google.tasks_base_url", &self.google.tasks_base_url),
            ("google.classroom_base_url", &self.google.classroom_base_url),
        ] {
            if !value.starts_with("http://") && !value.starts_with("https://") {
                return Err(AppError::validation(format!(
                    "{name} must be an http(s) URL, got '{value}'"
                )));
            }
        }
        if self.portal.landing_markers.iter().all(|m| m.trim().is_empty()) {
            return Err(AppError::validation("portal.landing_markers is empty"));
        }
        if self.crawler.user_agents.iter().all(|ua| ua.trim().is_empty()) {
            return Err(AppError::validation("crawler.user_agents is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.max_redirects == 0 {
            return Err(AppError::validation("crawler.max_redirects must be > 0"));
        }
        if self.sync.expiry_days < 0 || self.sync.urgent_days < 0 {
            return Err(AppError::validation(
                "sync.expiry_days and sync.urgent_days must be >= 0",
            ));
        }
        if self.sync.default_trigger_hour > 23 {
            return Err(AppError::validation(
                "sync.default_trigger_hour must be within 0-23",
            ));
        }
        if self.circuit_breaker.max_drop_percent > 100 {
            return Err(AppError::validation(
                "circuit_breaker.max_drop_percent must be <= 100",
            ));
        }
        Ok(())
    }
}

/// Portal and single-sign-on endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Portal origin, e.g. `https://portal.example.ac.jp`
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Identity provider JSON authentication endpoint
    #[serde(default = "defaults::sso_url")]
    pub sso_url: String,

    /// Path that starts the SAML login on the portal
    #[serde(default = "defaults::login_path")]
    pub login_path: String,

    /// Assertion consumer path used when the SAML form has no action
    #[serde(default = "defaults::acs_path")]
    pub acs_path: String,

    /// Any of these strings in a 200 body marks the authenticated dashboard
    #[serde(default = "defaults::landing_markers")]
    pub landing_markers: Vec<String>,

    /// Cookie name under which the SSO token is presented
    #[serde(default = "defaults::token_cookie_name")]
    pub token_cookie_name: String,

    /// Share-link path template; `{id}` is replaced by the content ID
    #[serde(default = "defaults::share_link_path")]
    pub share_link_path: String,

    /// Page structure of the dashboard and course pages
    #[serde(default)]
    pub selectors: PortalSelectors,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            sso_url: defaults::sso_url(),
            login_path: defaults::login_path(),
            acs_path: defaults::acs_path(),
            landing_markers: defaults::landing_markers(),
            token_cookie_name: defaults::token_cookie_name(),
            share_link_path: defaults::share_link_path(),
            selectors: PortalSelectors::default(),
        }
    }
}

impl PortalConfig {
    /// Portal origin without a trailing slash.
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Full URL where the SAML redirect chase begins.
    pub fn login_url(&self) -> String {
        format!("{}{}", self.base(), self.login_path)
    }

    /// Fallback assertion consumer URL.
    pub fn acs_url(&self) -> String {
        format!("{}{}", self.base(), self.acs_path)
    }

    /// Stable share link for a content ID.
    pub fn share_link(&self, content_id: &str) -> String {
        format!(
            "{}{}",
            self.base(),
            self.share_link_path.replace("{id}", content_id)
        )
    }
}

/// HTTP client and crawling behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent pool; one is picked at random per request
    #[serde(default = "defaults::user_agents")]
    pub user_agents: Vec<String>,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay between course page requests in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Upper bound on redirects per fetch and on login chase iterations
    #[serde(default = "defaults::max_redirects")]
    pub max_redirects: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agents: defaults::user_agents(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
            max_redirects: defaults::max_redirects(),
        }
    }
}

/// Reconciliation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Deadlines within this many days are marked urgent in the task title
    #[serde(default = "defaults::urgent_days")]
    pub urgent_days: i64,

    /// Unregistered rows due more than this many days ago become EXPIRED
    #[serde(default = "defaults::expiry_days")]
    pub expiry_days: i64,

    /// Maximum new tasks created per run (unbounded if absent)
    #[serde(default)]
    pub max_registrations_per_run: Option<usize>,

    /// Grace period used when the `cleanupDays` setting is absent
    #[serde(default = "defaults::cleanup_days")]
    pub default_cleanup_days: i64,

    /// Task list title used when the `taskListName` setting is absent
    #[serde(default = "defaults::list_name")]
    pub default_list_name: String,

    /// Trigger hour used when the `triggerHour` setting is absent
    #[serde(default = "defaults::trigger_hour")]
    pub default_trigger_hour: u32,

    /// Prefix added to urgent task titles
    #[serde(default = "defaults::urgent_prefix")]
    pub urgent_prefix: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            urgent_days: defaults::urgent_days(),
            expiry_days: defaults::expiry_days(),
            max_registrations_per_run: None,
            default_cleanup_days: defaults::cleanup_days(),
            default_list_name: defaults::list_name(),
            default_trigger_hour: defaults::trigger_hour(),
            urgent_prefix: defaults::urgent_prefix(),
        }
    }
}

/// Remote API endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    #[serde(default = "defaults::tasks_base_url")]
    pub tasks_base_url: String,

    #[serde(default = "defaults::classroom_base_url")]
    pub classroom_base_url: String,

    /// Environment variable consulted when the `accessToken` setting is absent
    #[serde(default = "defaults::access_token_env")]
    pub access_token_env: String,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            tasks_base_url: defaults::tasks_base_url(),
            classroom_base_url: defaults::classroom_base_url(),
            access_token_env: defaults::access_token_env(),
        }
    }
}

/// Snapshot shrink guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    #[serde(default = "defaults::breaker_enabled")]
    pub enabled: bool,

    /// Maximum allowed drop percentage (0-100)
    #[serde(default = "defaults::max_drop_percent")]
    pub max_drop_percent: u8,

    /// Below this many stored rows the check is skipped
    #[serde(default = "defaults::min_baseline")]
    pub min_baseline: usize,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            enabled: defaults::breaker_enabled(),
            max_drop_percent: defaults::max_drop_percent(),
            min_baseline: defaults::min_baseline(),
        }
    }
}

mod defaults {
    // Portal defaults
    pub fn base_url() -> String {
        "https://rpwebcls.meijo-u.ac.jp".into()
    }
    pub fn sso_url() -> String {
        "https://slbsso.meijo-u.ac.jp/opensso/json/authenticate".into()
    }
    pub fn login_path() -> String {
        "/webclass/login.php?auth_mode=SAML".into()
    }
    pub fn acs_path() -> String {
        "/simplesaml/module.php/saml/sp/saml2-acs.php/default-sp".into()
    }
    pub fn landing_markers() -> Vec<String> {
        vec!["コースリスト".into(), "cl-courseList_courseLink".into()]
    }
    pub fn token_cookie_name() -> String {
        "iPlanetDirectoryPro".into()
    }
    pub fn share_link_path() -> String {
        "/webclass/login.php?id={id}&page=1&auth_mode=SAML".into()
    }

    // Crawler defaults
    pub fn user_agents() -> Vec<String> {
        vec![
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36".into(),
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36".into(),
            "Mozilla/5.0 (iPhone; CPU iPhone OS 17_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Mobile/15E148 Safari/604.1".into(),
        ]
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn request_delay() -> u64 {
        500
    }
    pub fn max_redirects() -> usize {
        15
    }

    // Sync defaults
    pub fn urgent_days() -> i64 {
        3
    }
    pub fn expiry_days() -> i64 {
        1
    }
    pub fn cleanup_days() -> i64 {
        30
    }
    pub fn list_name() -> String {
        "大学課題".into()
    }
    pub fn trigger_hour() -> u32 {
        6
    }
    pub fn urgent_prefix() -> String {
        "【至急】".into()
    }

    // Google defaults
    pub fn tasks_base_url() -> String {
        "https://tasks.googleapis.com/tasks/v1".into()
    }
    pub fn classroom_base_url() -> String {
        "https://classroom.googleapis.com/v1".into()
    }
    pub fn access_token_env() -> String {
        "GOOGLE_ACCESS_TOKEN".into()
    }

    // Circuit breaker defaults
    pub fn breaker_enabled() -> bool {
        true
    }
    pub fn max_drop_percent() -> u8 {
        80
    }
    pub fn min_baseline() -> usize {
        10
    }
}
