use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

const DEFAULT_API_BASE_URL: &str = "http://localhost:5001/api";
const DEFAULT_TOKEN_PATH: &str = ".telecare/token";
/// Upper bound for every timeout setting.
pub const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_base_url: String,
    pub signaling_url: Option<String>,
    pub token_path: PathBuf,
    pub request_timeout_secs: u64,
    pub media_timeout_secs: u64,
    pub signaling_connect_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            api_base_url: env::var("API_BASE_URL")
                .unwrap_or_else(|_| {
                    warn!("API_BASE_URL not set, using default");
                    DEFAULT_API_BASE_URL.to_string()
                }),
            signaling_url: env::var("SIGNALING_URL").ok().filter(|url| !url.is_empty()),
            token_path: env::var("TOKEN_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    warn!("TOKEN_PATH not set, using default");
                    PathBuf::from(DEFAULT_TOKEN_PATH)
                }),
            request_timeout_secs: seconds_from_env("REQUEST_TIMEOUT_SECS", 30),
            media_timeout_secs: seconds_from_env("MEDIA_TIMEOUT_SECS", 30),
            signaling_connect_timeout_secs: seconds_from_env("SIGNALING_CONNECT_TIMEOUT_SECS", 15),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - API base URL is empty");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.api_base_url.trim().is_empty()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn media_timeout(&self) -> Duration {
        Duration::from_secs(self.media_timeout_secs)
    }

    pub fn signaling_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.signaling_connect_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            signaling_url: None,
            token_path: PathBuf::from(DEFAULT_TOKEN_PATH),
            request_timeout_secs: 30,
            media_timeout_secs: 30,
            signaling_connect_timeout_secs: 15,
        }
    }
}

fn seconds_from_env(key: &str, default: u64) -> u64 {
    parse_seconds(key, env::var(key).ok().as_deref(), default)
}

fn parse_seconds(key: &str, raw: Option<&str>, default: u64) -> u64 {
    let Some(raw) = raw else {
        warn!("{} not set, using default of {}s", key, default);
        return default;
    };
    match raw.trim().parse::<u64>() {
        Ok(seconds) if seconds > MAX_TIMEOUT_SECS => {
            warn!("{} of {}s is too large, capping at {}s", key, seconds, MAX_TIMEOUT_SECS);
            MAX_TIMEOUT_SECS
        }
        Ok(seconds) => seconds,
        Err(_) => {
            warn!("{} is not a whole number of seconds ({}), using {}", key, raw, default);
            default
        }
    }
}
