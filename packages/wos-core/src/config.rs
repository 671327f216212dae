//! `wos.toml`, loaded once at startup and passed around by reference.
//!
//! Every field has a default, so an empty file (or no file) gives the stock
//! gift code tracker and a local emulator on `127.0.0.1:5555`.

use std::{fs, path::Path, path::PathBuf, time::Duration};

use anyhow::Context;
use log::info;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use wos_cv::MatchTemplateMethod;

use crate::{
    scheduler::{IntervalPolicy, Scheduler},
    task::{DelayRange, Pacing},
    vision::text::TableRule,
};

/// Overrides [`EmailConfig::password`]
pub const SMTP_PASSWORD_ENV: &str = "WOS_SMTP_PASSWORD";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tracker: TrackerConfig,
    pub automation: AutomationConfig,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub url: String,
    /// The game's name, used in the mail
    pub title: String,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    pub history_file: PathBuf,
    pub user_agent: String,
    pub extract: TableRule,
    pub email: Option<EmailConfig>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            url: "https://wosgiftcodes.com/".to_string(),
            title: "Whiteout Survival".to_string(),
            interval_secs: 3600,
            timeout_secs: 15,
            history_file: PathBuf::from("wos_codes.txt"),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string(),
            extract: TableRule::default(),
            email: None,
        }
    }
}

impl TrackerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Failed fetches are retried after the full interval
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(IntervalPolicy::fixed(self.interval_secs as f64))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub from: String,
    pub username: String,
    pub password: String,
    pub recipients: Vec<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            smtp_server: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            from: String::new(),
            username: String::new(),
            password: String::new(),
            recipients: vec![],
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    /// `host:port` serials are `adb connect`ed first
    pub serial: String,
    /// Path of the adb executable
    pub adb: String,
    pub resource_dir: PathBuf,
    pub method: MatchTemplateMethod,
    /// Sleep after an idle tick
    pub interval: IntervalPolicy,
    /// Sleep after a tick that acted
    pub after_action: Option<IntervalPolicy>,
    pub recovery_delay_secs: u64,
    pub tap_settle: DelayRange,
    pub swipe_settle: DelayRange,
    /// Dump every searched area here
    pub debug_crop_dir: Option<PathBuf>,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            serial: "127.0.0.1:5555".to_string(),
            adb: "adb".to_string(),
            resource_dir: PathBuf::from("resources"),
            method: MatchTemplateMethod::CcoeffNormed,
            interval: IntervalPolicy::randomized(35.0, 45.0),
            after_action: Some(IntervalPolicy::fixed(2.0)),
            recovery_delay_secs: 5,
            tap_settle: DelayRange::new(1800, 2200),
            swipe_settle: DelayRange::new(900, 1100),
            debug_crop_dir: None,
        }
    }
}

impl AutomationConfig {
    pub fn pacing(&self) -> Pacing {
        Pacing {
            tap_settle: self.tap_settle,
            swipe_settle: self.swipe_settle,
        }
    }

    pub fn scheduler(&self) -> Scheduler {
        let mut scheduler = Scheduler::new(self.interval)
            .with_recovery_delay(Duration::from_secs(self.recovery_delay_secs));
        scheduler.after_action = self.after_action;
        scheduler
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).with_context(|| format!("failed to read {path:?}"))?;
        let mut config =
            toml::from_str::<Config>(&content).with_context(|| format!("failed to parse {path:?}"))?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// [`Config::load`], or the defaults if `path` does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }
        info!("[Config]: {path:?} not found, using defaults");
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let (Some(email), Some(password)) = (&mut self.tracker.email, var(SMTP_PASSWORD_ENV)) {
            email.password = password;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let tracker = &self.tracker;
        if tracker.interval_secs == 0 {
            anyhow::bail!("tracker.interval_secs must be positive");
        }
        if let Some(email) = tracker.email.as_ref().filter(|email| email.enabled) {
            if email.recipients.is_empty() {
                anyhow::bail!("tracker.email is enabled without recipients");
            }
        }

        let automation = &self.automation;
        automation
            .scheduler()
            .validate()
            .context("invalid automation interval")?;
        automation
            .tap_settle
            .validate()
            .context("invalid automation.tap_settle")?;
        automation
            .swipe_settle
            .validate()
            .context("invalid automation.swipe_settle")?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_empty_is_default() {
        let config = toml::from_str::<Config>("").unwrap();
        assert_eq!(config, Config::default());
        assert!(config.validate().is_ok());
        assert_eq!(config.tracker.interval_secs, 3600);
        assert_eq!(config.tracker.history_file, PathBuf::from("wos_codes.txt"));
        assert_eq!(config.automation.serial, "127.0.0.1:5555");
    }

    #[test]
    fn test_full_config() {
        let config = toml::from_str::<Config>(
            r#"
[tracker]
interval_secs = 600
history_file = "data/codes.txt"

[tracker.extract]
header_contains = "Working Codes"

[tracker.email]
from = "bot@example.com"
username = "bot@example.com"
password = "from-file"
recipients = ["me@example.com"]

[automation]
serial = "emulator-5554"
method = "ccorr_normed"
interval = { min_secs = 30, max_secs = 50 }
after_action = { secs = 1.5 }
tap_settle = { min_ms = 100, max_ms = 200 }
debug_crop_dir = "screenshots"
"#,
        )
        .unwrap();
        assert_eq!(config.tracker.interval_secs, 600);
        assert_eq!(config.tracker.extract.header_contains, "Working Codes");
        assert_eq!(config.tracker.extract.ancestor_levels, 2);

        let email = config.tracker.email.as_ref().unwrap();
        assert!(email.enabled);
        assert_eq!(email.smtp_server, "smtp.gmail.com");
        assert_eq!(email.smtp_port, 587);

        let automation = &config.automation;
        assert_eq!(automation.method, MatchTemplateMethod::CcorrNormed);
        assert_eq!(automation.interval, IntervalPolicy::randomized(30.0, 50.0));
        assert_eq!(automation.after_action, Some(IntervalPolicy::fixed(1.5)));
        assert_eq!(automation.pacing().tap_settle, DelayRange::new(100, 200));
        assert_eq!(automation.swipe_settle, DelayRange::new(900, 1100));
        assert_eq!(automation.debug_crop_dir, Some(PathBuf::from("screenshots")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_password_from_env() {
        let mut config = Config::default();
        config.apply_env(|_| Some("from-env".to_string()));
        assert_eq!(config.tracker.email, None);

        config.tracker.email = Some(EmailConfig {
            password: "from-file".to_string(),
            ..Default::default()
        });
        config.apply_env(|_| None);
        assert_eq!(config.tracker.email.as_ref().unwrap().password, "from-file");

        config.apply_env(|key| (key == SMTP_PASSWORD_ENV).then(|| "from-env".to_string()));
        assert_eq!(config.tracker.email.as_ref().unwrap().password, "from-env");
    }

    #[test]
    fn test_validate() {
        let mut config = Config::default();
        config.automation.interval = IntervalPolicy::randomized(50.0, 30.0);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.automation.tap_settle = DelayRange::new(10, 1);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.tracker.email = Some(EmailConfig::default());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wos.toml");
        fs::write(&path, "[tracker]\ninterval_secs = 60\n").unwrap();
        assert_eq!(Config::load(&path).unwrap().tracker.interval_secs, 60);

        fs::write(&path, "[tracker]\ninterval_secs = \"soon\"\n").unwrap();
        assert!(Config::load(&path).is_err());

        assert!(Config::load(dir.path().join("missing.toml")).is_err());
        assert_eq!(
            Config::load_or_default(dir.path().join("missing.toml"))
                .unwrap()
                .tracker
                .interval_secs,
            3600
        );
    }
}
