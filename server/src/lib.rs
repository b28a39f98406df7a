pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod routes;
pub mod validation;

use std::sync::atomic::AtomicU64;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use axum::{
    routing::{get, post},
    Router,
};
use melo_core::{load_style_vector, Synthesizer, STYLE_DIM};
use ndarray::Array1;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::metrics::{AppMetrics, MeteredDecoder};
use crate::models::{OnnxDecoder, OnnxEncoder};
use crate::routes::{decode_endpoint, health_check, metrics_endpoint, plan_endpoint, tts_endpoint};

pub static START_TIME: OnceLock<Instant> = OnceLock::new();

#[derive(Clone)]
pub struct AppState {
    pub synth: Option<Arc<Synthesizer>>,
    pub metrics: AppMetrics,
    pub request_count: Arc<AtomicU64>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(config: ServerConfig, synth: Option<Synthesizer>, metrics: AppMetrics) -> Self {
        Self {
            synth: synth.map(Arc::new),
            metrics,
            request_count: Arc::new(AtomicU64::new(0)),
            config,
        }
    }

    /// Window length of the loaded decoder, or the configured one when running without models.
    pub fn dec_len(&self) -> usize {
        self.synth
            .as_ref()
            .map(|synth| synth.config().dec_len)
            .unwrap_or(self.config.synth.dec_len)
    }
}

/// Load the ONNX models named in the config. `Ok(None)` when no decoder is configured.
pub fn load_synthesizer(config: &ServerConfig, metrics: &AppMetrics) -> anyhow::Result<Option<Synthesizer>> {
    let Some(decoder_path) = config.decoder_model.as_ref() else {
        warn!("DECODER_MODEL not set, model routes will answer 503");
        return Ok(None);
    };

    let decoder = OnnxDecoder::load(decoder_path)?;
    let mut synth_config = config.synth.clone();
    match decoder.window_len() {
        Some(n) if !config.dec_len_override => synth_config.dec_len = n,
        Some(n) if n != synth_config.dec_len => warn!(
            "DEC_LEN={} overrides the decoder's window of {}",
            synth_config.dec_len, n
        ),
        _ => {}
    }

    let style = match config.style_vector.as_ref() {
        Some(path) => load_style_vector(path)?,
        None => {
            warn!("STYLE_VECTOR not set, using a zero speaker embedding");
            Array1::zeros(STYLE_DIM)
        }
    };

    let mut synth = Synthesizer::new(
        Box::new(MeteredDecoder::new(decoder, &metrics.synth)),
        style,
        synth_config,
    )?;

    match config.encoder_model.as_ref() {
        Some(path) => synth = synth.with_encoder(Box::new(OnnxEncoder::load(path)?)),
        None => warn!("ENCODER_MODEL not set, /tts will answer 503"),
    }

    info!("Synthesizer ready: {:?}", synth);
    Ok(Some(synth))
}

/// All routes, served at the root and again under `/api`.
pub fn router(state: AppState) -> Router {
    let public_api = Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(health_check))
        .route("/plan", post(plan_endpoint))
        .route("/decode", post(decode_endpoint))
        .route("/tts", post(tts_endpoint));

    // Metrics endpoint - consider adding authentication in production
    let metrics_api = Router::new().route("/metrics", get(metrics_endpoint));

    let api = Router::new().merge(public_api).merge(metrics_api);

    Router::new()
        .merge(api.clone())
        .nest("/api", api)
        .with_state(state)
}
