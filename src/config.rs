//! Configuration document, credentials and on-disk locations

use log::{info, warn};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Default check interval (seconds)
pub const DEFAULT_CHECK_INTERVAL: u64 = 300;

/// Default storefront watched for countdowns
pub const DEFAULT_COUNTDOWN_URL: &str = "https://store.taylorswift.com";

/// Monitoring configuration, loaded from a JSON file
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AppConfig {
    #[serde(default = "enabled")]
    pub taylor_swift_enabled: bool,
    #[serde(default = "enabled")]
    pub bandsintown_enabled: bool,
    #[serde(default)]
    pub bandsintown_artists: Vec<String>,
    #[serde(default)]
    pub ticketmaster_enabled: bool,
    #[serde(default)]
    pub ticketmaster_artists: Vec<String>,
    /// Seconds between cycles
    #[serde(default = "default_interval")]
    pub check_interval: u64,
    #[serde(default = "default_countdown_url")]
    pub countdown_url: String,
}

fn enabled() -> bool {
    true
}

fn default_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL
}

fn default_countdown_url() -> String {
    DEFAULT_COUNTDOWN_URL.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            taylor_swift_enabled: true,
            bandsintown_enabled: true,
            bandsintown_artists: vec![
                "Taylor Swift".to_string(),
                "The 1975".to_string(),
                "Arctic Monkeys".to_string(),
            ],
            ticketmaster_enabled: false,
            ticketmaster_artists: Vec::new(),
            check_interval: DEFAULT_CHECK_INTERVAL,
            countdown_url: default_countdown_url(),
        }
    }
}

impl AppConfig {
    /// Load configuration, falling back to built-in defaults when the file
    /// is missing or cannot be parsed
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            info!("No config file at {:?}, using defaults", path);
            return Self::default();
        }

        match fs::read_to_string(path).map_err(|e| e.to_string()).and_then(|content| {
            serde_json::from_str::<AppConfig>(&content).map_err(|e| e.to_string())
        }) {
            Ok(config) => {
                info!("Loaded settings from config file: {:?}", path);
                config
            }
            Err(e) => {
                warn!("Ignoring unreadable config file {:?}: {}", path, e);
                Self::default()
            }
        }
    }
}

/// Twilio account used for outbound SMS
#[derive(Debug, Clone, PartialEq)]
pub struct TwilioCredentials {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
    pub to_number: String,
}

/// Secrets read once at startup. A missing secret disables the capability
/// that needs it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Credentials {
    pub twilio: Option<TwilioCredentials>,
    pub ticketmaster_api_key: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build credentials from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let twilio = match (
            get("SECRET_TWILIO_ACCOUNT_SID"),
            get("SECRET_TWILIO_AUTH_TOKEN"),
            get("SECRET_TWILIO_PHONE_NUMBER"),
            get("SECRET_YOUR_PHONE_NUMBER"),
        ) {
            (Some(account_sid), Some(auth_token), Some(from_number), Some(to_number)) => {
                Some(TwilioCredentials {
                    account_sid,
                    auth_token,
                    from_number,
                    to_number,
                })
            }
            _ => None,
        };

        Self {
            twilio,
            ticketmaster_api_key: get("SECRET_TICKETMASTER_API_KEY"),
        }
    }
}

/// Where state documents and log files live
#[derive(Debug, Clone)]
pub struct Paths {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
}
