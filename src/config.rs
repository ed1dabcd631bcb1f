use crate::error::{Error, Result};
use crate::services::automation_service::AutomationSettings;
use crate::services::login_script::InjectionMode;
use crate::services::qr_service::CameraPermission;
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub data_dir: PathBuf,
    pub store_encryption: bool,
    pub webdriver_url: url::Url,
    pub readiness_delay_ms: u64,
    pub submit_ack_delay_ms: u64,
    pub submit_settle_delay_ms: u64,
    pub failure_settle_delay_ms: u64,
    pub completion_close_delay_ms: u64,
    pub field_poll_attempts: u32,
    pub field_poll_interval_ms: u64,
    pub injection_mode: InjectionMode,
    pub blank_page_min_chars: usize,
    pub blank_page_probe: bool,
    pub camera_permission: CameraPermission,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let webdriver_raw = get_env_or("WEBDRIVER_URL", "http://127.0.0.1:4444");
        let webdriver_url = url::Url::parse(&webdriver_raw)
            .map_err(|e| Error::Config(format!("Invalid value for WEBDRIVER_URL: {}", e)))?;

        Ok(Self {
            server_address: get_env_or("SERVER_ADDRESS", "127.0.0.1:8088"),
            data_dir: PathBuf::from(get_env_or("DATA_DIR", "./data")),
            store_encryption: get_env_parse_or("STORE_ENCRYPTION", true)?,
            webdriver_url,
            readiness_delay_ms: get_env_parse_or("READINESS_DELAY_MS", 2000)?,
            submit_ack_delay_ms: get_env_parse_or("SUBMIT_ACK_DELAY_MS", 100)?,
            submit_settle_delay_ms: get_env_parse_or("SUBMIT_SETTLE_DELAY_MS", 3000)?,
            failure_settle_delay_ms: get_env_parse_or("FAILURE_SETTLE_DELAY_MS", 2000)?,
            completion_close_delay_ms: get_env_parse_or("COMPLETION_CLOSE_DELAY_MS", 3000)?,
            field_poll_attempts: get_env_parse_or("FIELD_POLL_ATTEMPTS", 80)?,
            field_poll_interval_ms: get_env_parse_or("FIELD_POLL_INTERVAL_MS", 100)?,
            injection_mode: get_env_parse_or("INJECTION_MODE", InjectionMode::Polling)?,
            blank_page_min_chars: get_env_parse_or("BLANK_PAGE_MIN_CHARS", 20)?,
            blank_page_probe: get_env_parse_or("BLANK_PAGE_PROBE", true)?,
            camera_permission: get_env_parse_or(
                "CAMERA_PERMISSION",
                CameraPermission::Undetermined,
            )?,
            log_format: get_env_parse_or("LOG_FORMAT", LogFormat::Text)?,
        })
    }

    pub fn automation_settings(&self) -> AutomationSettings {
        AutomationSettings {
            readiness_delay: Duration::from_millis(self.readiness_delay_ms),
            submit_ack_delay: Duration::from_millis(self.submit_ack_delay_ms),
            submit_settle_delay: Duration::from_millis(self.submit_settle_delay_ms),
            failure_settle_delay: Duration::from_millis(self.failure_settle_delay_ms),
            completion_close_delay: Duration::from_millis(self.completion_close_delay_ms),
            field_poll_attempts: self.field_poll_attempts.max(1),
            field_poll_interval: Duration::from_millis(self.field_poll_interval_ms),
            injection_mode: self.injection_mode,
            blank_page_min_chars: self.blank_page_min_chars,
            blank_page_probe: self.blank_page_probe,
        }
    }
}

fn get_env_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        _ => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}
