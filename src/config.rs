use std::{env, path::PathBuf, str::FromStr};

use dotenv::dotenv;
use tracing::info;

use crate::error::{AppError, Result};

pub const DEFAULT_GATEWAY_URL: &str = "https://api.razorpay.com/v1";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_addr: String,
    pub database_url: String,
    pub db_pool_size: u32,
    pub gateway: GatewayConfig,
    pub session_ttl_hours: i64,
    pub vision: VisionConfig,
}

#[derive(Clone)]
pub struct GatewayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

// Keeps the key secret out of logs.
impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("key_id", &self.key_id)
            .field("key_secret", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub detector_model: PathBuf,
    pub landmark_model: PathBuf,
    pub landmark_input_size: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| AppError::Config(format!("Missing environment variable '{key}'")))
        };
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let config = Self {
            server_addr: or_default("SERVER_ADDR", "0.0.0.0:8000"),
            database_url: required("DATABASE_URL")?,
            db_pool_size: parse_var("DB_POOL_SIZE", &or_default("DB_POOL_SIZE", "5"))?,
            gateway: GatewayConfig {
                key_id: required("RAZORPAY_API_KEY")?,
                key_secret: required("RAZORPAY_API_SECRET")?,
                base_url: or_default("RAZORPAY_BASE_URL", DEFAULT_GATEWAY_URL)
                    .trim_end_matches('/')
                    .to_string(),
                timeout_secs: parse_var(
                    "PAYMENT_TIMEOUT_SECS",
                    &or_default("PAYMENT_TIMEOUT_SECS", "30"),
                )?,
            },
            session_ttl_hours: parse_var(
                "SESSION_TTL_HOURS",
                &or_default("SESSION_TTL_HOURS", "336"),
            )?,
            vision: VisionConfig {
                detector_model: or_default(
                    "FACE_DETECTOR_MODEL",
                    "models/face_detection_yunet_2023mar.onnx",
                )
                .into(),
                landmark_model: or_default("FACE_LANDMARK_MODEL", "models/face_landmarks_68.onnx")
                    .into(),
                landmark_input_size: parse_var(
                    "LANDMARK_INPUT_SIZE",
                    &or_default("LANDMARK_INPUT_SIZE", "112"),
                )?,
            },
        };

        info!("Application configuration loaded");
        Ok(config)
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| AppError::Config(format!("Invalid {key} value '{raw}': {e}")))
}
