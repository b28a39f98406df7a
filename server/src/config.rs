// Configuration for the server

use std::path::PathBuf;
use std::time::Duration;

use melo_core::SynthConfig;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub rate_limit_per_minute: u32,
    pub request_timeout_secs: u64,
    /// Latents arrive as JSON, so this is well above axum's 2 MB default.
    pub max_body_bytes: usize,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub encoder_model: Option<PathBuf>,
    pub decoder_model: Option<PathBuf>,
    pub style_vector: Option<PathBuf>,
    /// Set when `DEC_LEN` was given explicitly; otherwise the decoder's input shape wins.
    pub dec_len_override: bool,
    pub synth: SynthConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8085,
            rate_limit_per_minute: 60,
            request_timeout_secs: 60,
            max_body_bytes: 32 * 1024 * 1024,
            cors_allowed_origins: None,
            encoder_model: None,
            decoder_model: None,
            style_vector: None,
            dec_len_override: false,
            synth: SynthConfig::default(),
        }
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8085);

        let rate_limit_per_minute = std::env::var("RATE_LIMIT_PER_MINUTE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        let request_timeout_secs = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        let max_body_bytes = std::env::var("MAX_BODY_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(32 * 1024 * 1024);

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            });

        Self {
            port,
            rate_limit_per_minute,
            request_timeout_secs,
            max_body_bytes,
            cors_allowed_origins,
            encoder_model: env_path("ENCODER_MODEL"),
            decoder_model: env_path("DECODER_MODEL"),
            style_vector: env_path("STYLE_VECTOR"),
            dec_len_override: std::env::var("DEC_LEN").is_ok(),
            synth: SynthConfig::from_env(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
