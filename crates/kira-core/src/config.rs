//! Configuration management
//!
//! Settings are resolved in this order:
//! 1. Environment variables
//! 2. `kira-gateway.toml` in the working directory
//! 3. Defaults
//!
//! `${VAR_NAME}` inside the TOML file is replaced with the environment value.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::Error;

/// Default config file name looked up by [`Config::load`]
pub const CONFIG_FILE: &str = "kira-gateway.toml";

/// Main configuration for kira-gateway
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Control API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// WhatsApp connector configuration
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    /// Verification datastore configuration
    #[serde(default)]
    pub firebase: FirebaseConfig,

    /// Pairing command configuration
    #[serde(default)]
    pub pairing: PairingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Port for the control API
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    /// Credential storage directory
    #[serde(default = "default_auth_dir")]
    pub auth_dir: String,

    /// Base URL of the socket bridge
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,

    /// Where the latest protocol version is published.
    /// `None` skips the lookup and uses the bundled version.
    #[serde(default = "default_version_url")]
    pub version_url: Option<String>,

    /// Browser name announced to the network (platform is always Ubuntu)
    #[serde(default = "default_browser")]
    pub browser: String,

    /// Delay before reconnecting after a non-logout close
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,

    /// Bridge event polling interval
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            auth_dir: default_auth_dir(),
            bridge_url: default_bridge_url(),
            version_url: default_version_url(),
            browser: default_browser(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirebaseConfig {
    /// Realtime Database root URL
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Database secret or ID token, sent as the `auth` query parameter
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl Default for FirebaseConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            auth_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingConfig {
    /// Candidate follow-up delays; one is picked uniformly per request
    #[serde(default = "default_pairing_delays")]
    pub delays_minutes: Vec<u64>,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            delays_minutes: default_pairing_delays(),
        }
    }
}

fn default_api_port() -> u16 {
    3000
}

fn default_auth_dir() -> String {
    "./auth_info".to_string()
}

fn default_bridge_url() -> String {
    "http://127.0.0.1:8090".to_string()
}

fn default_version_url() -> Option<String> {
    Some(
        "https://raw.githubusercontent.com/WhiskeySockets/Baileys/master/src/Defaults/baileys-version.json"
            .to_string(),
    )
}

fn default_browser() -> String {
    "Firefox".to_string()
}

fn default_reconnect_delay_secs() -> u64 {
    3
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_database_url() -> String {
    "https://x-kira-default-rtdb.firebaseio.com".to_string()
}

fn default_pairing_delays() -> Vec<u64> {
    vec![2, 5, 8]
}

impl Config {
    /// Replace `${VAR_NAME}` with the environment value (empty when unset)
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::with_capacity(value.len());
        let mut rest = value;

        while let Some(start) = rest.find("${") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find('}') {
                Some(end) => {
                    let var_name = &after[..end];
                    if let Ok(env_value) = std::env::var(var_name) {
                        result.push_str(&env_value);
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    // unterminated, keep verbatim
                    result.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        result.push_str(rest);

        result
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();

        let toml_content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut cfg = Self::from_toml_str(&toml_content)?;
        cfg.apply_env_overrides();

        Ok(cfg)
    }

    /// Parse a TOML document (with `${VAR}` expansion)
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let expanded = Self::expand_env_vars(content);
        let cfg: Config = toml::from_str(&expanded)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from `kira-gateway.toml` when present, otherwise from the environment
    pub fn load() -> crate::Result<Self> {
        if Path::new(CONFIG_FILE).exists() {
            return Self::from_toml_file(CONFIG_FILE);
        }

        Self::from_env()
    }

    /// Load configuration from environment variables over defaults
    pub fn from_env() -> crate::Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(p) = port.parse() {
                self.api.port = p;
            }
        }

        if let Ok(dir) = std::env::var("AUTH_DIR") {
            if !dir.is_empty() {
                self.whatsapp.auth_dir = dir;
            }
        }
        if let Ok(url) = std::env::var("BRIDGE_URL") {
            if !url.is_empty() {
                self.whatsapp.bridge_url = url;
            }
        }
        if let Ok(url) = std::env::var("WA_VERSION_URL") {
            // empty disables the lookup
            self.whatsapp.version_url = if url.is_empty() { None } else { Some(url) };
        }
        if let Ok(browser) = std::env::var("WA_BROWSER") {
            if !browser.is_empty() {
                self.whatsapp.browser = browser;
            }
        }

        if let Ok(url) = std::env::var("FIREBASE_DATABASE_URL") {
            if !url.is_empty() {
                self.firebase.database_url = url;
            }
        }
        if let Ok(token) = std::env::var("FIREBASE_AUTH_TOKEN") {
            if !token.is_empty() {
                self.firebase.auth_token = Some(token);
            }
        }
    }

    fn validate(&self) -> crate::Result<()> {
        if self.pairing.delays_minutes.is_empty() {
            return Err(Error::Config(
                "pairing.delays_minutes must not be empty".to_string(),
            ));
        }
        if self.whatsapp.poll_interval_ms == 0 {
            return Err(Error::Config(
                "whatsapp.poll_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
