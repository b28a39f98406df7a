//! Common utilities for integration tests

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use melo_core::{
    DecoderModel, EncoderModel, EncoderOutput, PhonemeSequence, SynthConfig, SynthesisParams, Synthesizer,
    SAMPLES_PER_FRAME, STYLE_DIM,
};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use server::config::ServerConfig;
use server::metrics::{AppMetrics, MeteredDecoder};
use server::{router, AppState};
use tower::ServiceExt;

pub const TEST_DEC_LEN: usize = 8;

/// Every phoneme lasts two output frames; channel 0 counts frames.
pub struct FakeEncoder;

impl EncoderModel for FakeEncoder {
    fn encode(
        &self,
        phonemes: &PhonemeSequence,
        _style: ArrayView1<'_, f32>,
        _params: &SynthesisParams,
    ) -> anyhow::Result<EncoderOutput> {
        let pronoun_lengths = vec![2; phonemes.len()];
        let frames = 2 * phonemes.len();
        Ok(EncoderOutput {
            latent: Array2::from_shape_fn((2, frames), |(c, t)| if c == 0 { t as f32 } else { 0.0 }),
            pronoun_lengths,
            audio_len: frames * SAMPLES_PER_FRAME,
        })
    }
}

/// Repeats channel 0 across each frame's samples, scaled into [-1, 1].
pub struct EchoDecoder;

impl DecoderModel for EchoDecoder {
    fn decode(&self, window: ArrayView2<'_, f32>, _style: ArrayView1<'_, f32>) -> anyhow::Result<Vec<f32>> {
        Ok(window
            .row(0)
            .iter()
            .flat_map(|&v| std::iter::repeat(v / 1000.0).take(SAMPLES_PER_FRAME))
            .collect())
    }
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        synth: SynthConfig {
            dec_len: TEST_DEC_LEN,
            speed: 1.0,
            ..SynthConfig::default()
        },
        ..ServerConfig::default()
    }
}

/// App backed by fake models; `with_encoder` controls whether `/tts` is available.
pub fn create_test_app(with_encoder: bool) -> (Router, AppMetrics) {
    let config = test_config();
    let metrics = AppMetrics::new();
    let mut synth = Synthesizer::new(
        Box::new(MeteredDecoder::new(EchoDecoder, &metrics.synth)),
        Array1::zeros(STYLE_DIM),
        config.synth.clone(),
    )
    .expect("valid test config");
    if with_encoder {
        synth = synth.with_encoder(Box::new(FakeEncoder));
    }
    let state = AppState::new(config, Some(synth), metrics.clone());
    (router(state), metrics)
}

/// App with no models loaded.
pub fn create_modelless_app() -> Router {
    router(AppState::new(test_config(), None, AppMetrics::new()))
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, value)
}

pub async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}
