use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, Json};
use melo_core::{
    duration_ms, encode_wav_base64, plan_sentence, FrontendOutput, PhonemeSequence, SentenceOptions, SliceSpec,
    Synthesizer,
};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::ApiError;
use crate::metrics::{EndpointMetrics, MetricsResponse, SystemMetrics};
use crate::validation::{validate_decode_request, validate_plan_request, validate_tts_request};
use crate::{AppState, START_TIME};

#[derive(Deserialize)]
pub struct PlanRequest {
    pub word_frame_counts: Vec<usize>,
    pub pronoun_lengths: Vec<usize>,
    pub dec_len: Option<usize>,
}

#[derive(Serialize)]
pub struct PlanResponse {
    pub dec_len: usize,
    pub total_frames: usize,
    pub word_pronoun_counts: Vec<usize>,
    pub slices: Vec<SliceSpec>,
}

#[derive(Deserialize)]
pub struct DecodeRequest {
    /// `channels x frames`
    pub latent: Vec<Vec<f32>>,
    pub pronoun_lengths: Vec<usize>,
    pub word_frame_counts: Vec<usize>,
    pub audio_len: Option<usize>,
    pub pad_size: Option<usize>,
}

#[derive(Deserialize)]
pub struct TtsRequest {
    pub phones: Vec<i64>,
    pub tones: Vec<i64>,
    pub languages: Vec<i64>,
    pub word_frame_counts: Vec<usize>,
    pub speed: Option<f32>,
}

#[derive(Serialize)]
pub struct AudioResponse {
    pub audio_base64: String,
    pub duration_ms: u64,
    pub sample_rate: u32,
    pub samples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slices: Option<usize>,
}

fn record<T>(metrics: &EndpointMetrics, start: Instant, result: &Result<T, ApiError>) {
    metrics.record_request(start.elapsed().as_millis() as u64);
    if result.is_err() {
        metrics.record_error();
    }
}

fn require_synth(state: &AppState) -> Result<Arc<Synthesizer>, ApiError> {
    state
        .synth
        .clone()
        .ok_or_else(|| ApiError::ModelUnavailable("no decoder model loaded (set DECODER_MODEL)".to_string()))
}

fn audio_response(samples: &[f32], sample_rate: u32, slices: Option<usize>) -> Result<AudioResponse, ApiError> {
    let audio_base64 = encode_wav_base64(samples, sample_rate)?;
    Ok(AudioResponse {
        audio_base64,
        duration_ms: duration_ms(samples.len(), sample_rate),
        sample_rate,
        samples: samples.len(),
        slices,
    })
}

async fn run_blocking<T, F>(task: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task).await.map_err(|join_err| {
        error!("Task join error: {join_err}");
        ApiError::InternalError(format!("Task join error: {join_err}"))
    })?
}

pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<MetricsResponse> {
    let mut system = sysinfo::System::new();
    system.refresh_memory();

    let uptime = START_TIME.get().map(|start| start.elapsed().as_secs()).unwrap_or(0);

    Json(state.metrics.snapshot(SystemMetrics {
        memory_used_mb: system.used_memory() / 1024 / 1024,
        memory_total_mb: system.total_memory() / 1024 / 1024,
        request_count: state.request_count.load(Ordering::Relaxed),
        uptime_seconds: uptime,
    }))
}

pub async fn plan_endpoint(
    State(state): State<AppState>,
    Json(req): Json<PlanRequest>,
) -> Result<Json<PlanResponse>, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let start = Instant::now();

    let result = (|| -> Result<PlanResponse, ApiError> {
        validate_plan_request(&req.word_frame_counts, &req.pronoun_lengths)?;
        let dec_len = req.dec_len.unwrap_or_else(|| state.dec_len());
        let plan = plan_sentence(&req.word_frame_counts, &req.pronoun_lengths, dec_len)?;
        Ok(PlanResponse {
            dec_len,
            total_frames: plan.total_frames(),
            word_pronoun_counts: plan.word_counts().to_vec(),
            slices: plan.slices().to_vec(),
        })
    })();

    record(&state.metrics.plan, start, &result);
    result.map(Json)
}

pub async fn decode_endpoint(
    State(state): State<AppState>,
    Json(req): Json<DecodeRequest>,
) -> Result<Json<AudioResponse>, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let start = Instant::now();
    let result = decode(&state, req).await;
    record(&state.metrics.decode, start, &result);
    result.map(Json)
}

async fn decode(state: &AppState, req: DecodeRequest) -> Result<AudioResponse, ApiError> {
    let synth = require_synth(state)?;
    let frames = validate_decode_request(&req.latent, &req.word_frame_counts, &req.pronoun_lengths)?;
    let channels = req.latent.len();
    let latent = Array2::from_shape_vec((channels, frames), req.latent.concat())
        .map_err(|e| ApiError::InvalidInput(format!("latent: {e}")))?;

    let plan = synth.plan(&req.word_frame_counts, &req.pronoun_lengths)?;
    let opts = SentenceOptions {
        expected_samples: req.audio_len,
        pad_size: req.pad_size.unwrap_or(synth.config().pad_size),
        parallel: synth.config().parallel_decode,
    };
    let sample_rate = synth.config().sample_rate;

    info!(channels, frames, slices = plan.len(), "decode request");
    let synth_metrics = state.metrics.synth.clone();
    run_blocking(move || {
        let samples =
            synth.decode_sentence_with(latent.view(), &req.pronoun_lengths, &req.word_frame_counts, &opts)?;
        synth_metrics.record_sentence(samples.len());
        audio_response(&samples, sample_rate, Some(plan.len()))
    })
    .await
}

pub async fn tts_endpoint(
    State(state): State<AppState>,
    Json(req): Json<TtsRequest>,
) -> Result<Json<AudioResponse>, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let start = Instant::now();
    let result = tts(&state, req).await;
    record(&state.metrics.tts, start, &result);
    result.map(Json)
}

async fn tts(state: &AppState, req: TtsRequest) -> Result<AudioResponse, ApiError> {
    validate_tts_request(&req.phones, &req.tones, &req.languages, &req.word_frame_counts, req.speed)?;
    let synth = require_synth(state)?;
    if !synth.has_encoder() {
        return Err(ApiError::ModelUnavailable(
            "no encoder model loaded (set ENCODER_MODEL)".to_string(),
        ));
    }

    let sentence = FrontendOutput {
        phonemes: PhonemeSequence::new(req.phones, req.tones, req.languages)?,
        word_frame_counts: req.word_frame_counts,
    };
    let speed = req.speed.unwrap_or(synth.config().speed);
    let sample_rate = synth.config().sample_rate;

    info!(phonemes = sentence.phonemes.len(), words = sentence.word_frame_counts.len(), speed, "tts request");
    let synth_metrics = state.metrics.synth.clone();
    run_blocking(move || {
        let samples = synth.synthesize(std::slice::from_ref(&sentence), speed)?;
        synth_metrics.record_sentence(samples.len());
        audio_response(&samples, sample_rate, None)
    })
    .await
}
