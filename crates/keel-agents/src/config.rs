//! Runtime configuration.
//!
//! Provider credentials come from the environment only; their presence flips
//! the matching sender or router from simulated/mock mode to live mode.
//! Router and scheduler tuning may also come from a TOML file, with
//! environment variables taking precedence.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use coordination::TierModelTable;
use serde::Deserialize;

const DEFAULT_MAILGUN_BASE_URL: &str = "https://api.mailgun.net/v3";
const DEFAULT_TWILIO_BASE_URL: &str = "https://api.twilio.com/2010-04-01";
const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Mailgun credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailgunSettings {
    pub api_key: String,
    pub domain: String,
    pub from: String,
    pub base_url: String,
}

/// Twilio credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwilioSettings {
    pub account_sid: String,
    pub auth_token: String,
    pub phone_number: String,
    pub base_url: String,
}

/// OpenRouter credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRouterSettings {
    pub api_key: String,
    pub base_url: String,
}

/// Model router tuning.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
    /// Tier → model table.
    pub tier_models: TierModelTable,
    /// Alternates tried after the primary model, in order.
    pub fallback_models: Vec<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            tier_models: TierModelTable::default(),
            fallback_models: vec![
                "anthropic/claude-3-haiku".to_string(),
                "openai/gpt-4o-mini".to_string(),
            ],
            temperature: 0.7,
            max_tokens: 1024,
        }
    }
}

/// Campaign scheduler tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Seconds between ticks.
    pub tick_interval_secs: u64,
    /// Concurrent sends within one tick.
    pub max_concurrent_sends: usize,
    /// Failed attempts at one step before the enrollment is abandoned. 0 = unlimited.
    pub max_step_attempts: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            max_concurrent_sends: 8,
            max_step_attempts: 10,
        }
    }
}

impl SchedulerSettings {
    /// Retry ceiling, or `None` when unlimited.
    pub fn step_attempt_ceiling(&self) -> Option<u32> {
        (self.max_step_attempts > 0).then_some(self.max_step_attempts)
    }
}

/// Shape of the optional TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    router: Option<RouterSettings>,
    scheduler: Option<SchedulerSettings>,
    telemetry_path: Option<PathBuf>,
    http_timeout_secs: Option<u64>,
}

/// Top-level runtime configuration.
#[derive(Debug, Clone)]
pub struct OutreachConfig {
    /// Live email when set; simulated otherwise.
    pub mailgun: Option<MailgunSettings>,
    /// Live SMS when set; simulated otherwise.
    pub twilio: Option<TwilioSettings>,
    /// Live model calls when set; mock responses otherwise.
    pub openrouter: Option<OpenRouterSettings>,
    pub router: RouterSettings,
    pub scheduler: SchedulerSettings,
    /// Append-only JSONL tick log.
    pub telemetry_path: Option<PathBuf>,
    /// Per-request HTTP timeout for every transport.
    pub http_timeout_secs: u64,
}

impl Default for OutreachConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl OutreachConfig {
    /// Built-in defaults, no credentials.
    pub fn base() -> Self {
        Self {
            mailgun: None,
            twilio: None,
            openrouter: None,
            router: RouterSettings::default(),
            scheduler: SchedulerSettings::default(),
            telemetry_path: None,
            http_timeout_secs: 30,
        }
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        let mut config = Self::base();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Defaults, then `path` (if any), then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::base();
        if let Some(path) = path {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            config.apply_toml(&raw)?;
        }
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overlay settings from a TOML document.
    pub fn apply_toml(&mut self, raw: &str) -> Result<()> {
        let file: FileConfig = toml::from_str(raw).context("Failed to parse config TOML")?;
        if let Some(router) = file.router {
            self.router = router;
        }
        if let Some(scheduler) = file.scheduler {
            self.scheduler = scheduler;
        }
        if file.telemetry_path.is_some() {
            self.telemetry_path = file.telemetry_path;
        }
        if let Some(timeout) = file.http_timeout_secs {
            self.http_timeout_secs = timeout;
        }
        Ok(())
    }

    /// Overlay settings from an environment lookup.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let (Some(api_key), Some(domain)) = (get("MAILGUN_API_KEY"), get("MAILGUN_DOMAIN")) {
            self.mailgun = Some(MailgunSettings {
                from: get("MAILGUN_FROM").unwrap_or_else(|| format!("postmaster@{domain}")),
                base_url: get("MAILGUN_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_MAILGUN_BASE_URL.into()),
                api_key,
                domain,
            });
        }

        if let (Some(account_sid), Some(auth_token), Some(phone_number)) = (
            get("TWILIO_ACCOUNT_SID"),
            get("TWILIO_AUTH_TOKEN"),
            get("TWILIO_PHONE_NUMBER"),
        ) {
            self.twilio = Some(TwilioSettings {
                account_sid,
                auth_token,
                phone_number,
                base_url: get("TWILIO_BASE_URL").unwrap_or_else(|| DEFAULT_TWILIO_BASE_URL.into()),
            });
        }

        if let Some(api_key) = get("OPENROUTER_API_KEY") {
            self.openrouter = Some(OpenRouterSettings {
                api_key,
                base_url: get("OPENROUTER_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_OPENROUTER_BASE_URL.into()),
            });
        }

        if let Some(v) = get("KEEL_TICK_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
            self.scheduler.tick_interval_secs = v;
        }
        if let Some(v) = get("KEEL_MAX_CONCURRENT_SENDS").and_then(|v| v.parse().ok()) {
            self.scheduler.max_concurrent_sends = v;
        }
        if let Some(v) = get("KEEL_MAX_STEP_ATTEMPTS").and_then(|v| v.parse().ok()) {
            self.scheduler.max_step_attempts = v;
        }
        if let Some(v) = get("KEEL_TELEMETRY_PATH") {
            self.telemetry_path = Some(PathBuf::from(v));
        }
    }

    /// Validate that the configuration is internally consistent.
    pub fn validate(&self) -> Result<(), String> {
        if self.scheduler.tick_interval_secs == 0 {
            return Err("tick_interval_secs must be > 0".into());
        }
        if self.scheduler.max_concurrent_sends == 0 {
            return Err("max_concurrent_sends must be > 0".into());
        }
        if self.http_timeout_secs == 0 {
            return Err("http_timeout_secs must be > 0".into());
        }
        let table = &self.router.tier_models;
        for (tier, model) in [
            ("basic", &table.basic),
            ("standard", &table.standard),
            ("advanced", &table.advanced),
            ("expert", &table.expert),
        ] {
            if model.trim().is_empty() {
                return Err(format!("tier_models.{tier} must not be empty"));
            }
        }
        if !(0.0..=2.0).contains(&self.router.temperature) {
            return Err(format!(
                "temperature must be in 0.0..=2.0, got {}",
                self.router.temperature
            ));
        }
        if self.router.max_tokens == 0 {
            return Err("max_tokens must be > 0".into());
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.http_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_base_is_unconfigured_and_valid() {
        let config = OutreachConfig::base();
        assert!(config.mailgun.is_none());
        assert!(config.twilio.is_none());
        assert!(config.openrouter.is_none());
        assert_eq!(config.scheduler.step_attempt_ceiling(), Some(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_credentials_from_env() {
        let mut config = OutreachConfig::base();
        config.apply_env(env(&[
            ("MAILGUN_API_KEY", "key-1"),
            ("MAILGUN_DOMAIN", "mg.example.com"),
            ("TWILIO_ACCOUNT_SID", "AC1"),
            ("TWILIO_AUTH_TOKEN", "tok"),
            ("TWILIO_PHONE_NUMBER", "+15550000"),
            ("OPENROUTER_API_KEY", "or-key"),
        ]));
        let mailgun = config.mailgun.unwrap();
        assert_eq!(mailgun.from, "postmaster@mg.example.com");
        assert_eq!(mailgun.base_url, DEFAULT_MAILGUN_BASE_URL);
        assert_eq!(config.twilio.unwrap().phone_number, "+15550000");
        assert_eq!(config.openrouter.unwrap().base_url, DEFAULT_OPENROUTER_BASE_URL);
    }

    #[test]
    fn test_partial_credentials_stay_simulated() {
        let mut config = OutreachConfig::base();
        config.apply_env(env(&[
            ("MAILGUN_API_KEY", "key-1"),
            ("TWILIO_ACCOUNT_SID", "AC1"),
            ("TWILIO_AUTH_TOKEN", "tok"),
            ("OPENROUTER_API_KEY", "  "),
        ]));
        assert!(config.mailgun.is_none());
        assert!(config.twilio.is_none());
        assert!(config.openrouter.is_none());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = OutreachConfig::base();
        config
            .apply_toml(
                r#"
                telemetry_path = "/tmp/ticks.jsonl"

                [scheduler]
                tick_interval_secs = 5
                max_step_attempts = 0

                [router]
                fallback_models = ["openai/gpt-4o-mini"]

                [router.tier_models]
                basic = "a/basic"
                standard = "a/standard"
                advanced = "a/advanced"
                expert = "a/expert"
                "#,
            )
            .unwrap();
        assert_eq!(config.scheduler.tick_interval_secs, 5);
        assert_eq!(config.scheduler.step_attempt_ceiling(), None);
        assert_eq!(config.router.tier_models.expert, "a/expert");
        assert_eq!(config.router.fallback_models, vec!["openai/gpt-4o-mini"]);
        // omitted router fields keep defaults
        assert_eq!(config.router.max_tokens, 1024);

        config.apply_env(env(&[("KEEL_TICK_INTERVAL_SECS", "2")]));
        assert_eq!(config.scheduler.tick_interval_secs, 2);
        assert_eq!(
            config.telemetry_path.as_deref(),
            Some(Path::new("/tmp/ticks.jsonl"))
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keel.toml");
        std::fs::write(&path, "[scheduler]\nmax_concurrent_sends = 3\n").unwrap();
        let config = OutreachConfig::load(Some(path.as_path())).unwrap();
        assert_eq!(config.scheduler.max_concurrent_sends, 3);
        assert!(OutreachConfig::load(Some(dir.path().join("missing.toml").as_path())).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = OutreachConfig::base();
        config.scheduler.max_concurrent_sends = 0;
        assert!(config.validate().is_err());

        let mut config = OutreachConfig::base();
        config.router.tier_models.expert = " ".into();
        assert!(config.validate().unwrap_err().contains("expert"));
    }

    #[test]
    fn test_demo_config_parses() {
        let mut config = OutreachConfig::base();
        config
            .apply_toml(include_str!("../../../demos/keel.toml"))
            .unwrap();
        assert_eq!(config.scheduler.max_step_attempts, 5);
        assert_eq!(config.router.max_tokens, 800);
        assert!(config.validate().is_ok());
    }
}
