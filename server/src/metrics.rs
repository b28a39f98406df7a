// Metrics collection and tracking

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use melo_core::DecoderModel;
use ndarray::{ArrayView1, ArrayView2};
use serde::Serialize;

/// Latency samples kept for percentile estimates.
const MAX_LATENCY_SAMPLES: usize = 1000;

/// Per-endpoint metrics
#[derive(Debug, Clone)]
pub struct EndpointMetrics {
    pub request_count: Arc<AtomicU64>,
    pub error_count: Arc<AtomicU64>,
    pub total_latency_ms: Arc<AtomicU64>,
    pub min_latency_ms: Arc<AtomicU64>,
    pub max_latency_ms: Arc<AtomicU64>,
    latency_samples: Arc<Mutex<VecDeque<u64>>>,
}

impl EndpointMetrics {
    pub fn new() -> Self {
        Self {
            request_count: Arc::new(AtomicU64::new(0)),
            error_count: Arc::new(AtomicU64::new(0)),
            total_latency_ms: Arc::new(AtomicU64::new(0)),
            min_latency_ms: Arc::new(AtomicU64::new(u64::MAX)),
            max_latency_ms: Arc::new(AtomicU64::new(0)),
            latency_samples: Arc::new(Mutex::new(VecDeque::with_capacity(MAX_LATENCY_SAMPLES))),
        }
    }

    pub fn record_request(&self, latency_ms: u64) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.min_latency_ms.fetch_min(latency_ms, Ordering::Relaxed);
        self.max_latency_ms.fetch_max(latency_ms, Ordering::Relaxed);

        if let Ok(mut samples) = self.latency_samples.lock() {
            if samples.len() == MAX_LATENCY_SAMPLES {
                samples.pop_front();
            }
            samples.push_back(latency_ms);
        }
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg_latency_ms(&self) -> f64 {
        let count = self.request_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        self.total_latency_ms.load(Ordering::Relaxed) as f64 / count as f64
    }

    pub fn percentile(&self, p: u8) -> u64 {
        let Ok(samples) = self.latency_samples.lock() else {
            return 0;
        };
        if samples.is_empty() {
            return 0;
        }
        let mut sorted: Vec<u64> = samples.iter().copied().collect();
        sorted.sort_unstable();
        let index = (sorted.len() * p as usize / 100).min(sorted.len() - 1);
        sorted[index]
    }

    pub fn stats(&self) -> EndpointStats {
        let min = self.min_latency_ms.load(Ordering::Relaxed);
        EndpointStats {
            request_count: self.request_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            avg_latency_ms: self.avg_latency_ms(),
            min_latency_ms: if min == u64::MAX { 0 } else { min },
            max_latency_ms: self.max_latency_ms.load(Ordering::Relaxed),
            p50_latency_ms: self.percentile(50),
            p95_latency_ms: self.percentile(95),
            p99_latency_ms: self.percentile(99),
        }
    }
}

impl Default for EndpointMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters for the synthesis pipeline itself.
#[derive(Debug, Clone, Default)]
pub struct SynthMetrics {
    pub sentences: Arc<AtomicU64>,
    pub decoder_calls: Arc<AtomicU64>,
    pub total_samples: Arc<AtomicU64>,
}

impl SynthMetrics {
    pub fn record_sentence(&self, samples: usize) {
        self.sentences.fetch_add(1, Ordering::Relaxed);
        self.total_samples.fetch_add(samples as u64, Ordering::Relaxed);
    }
}

/// Counts decoder invocations on their way to the wrapped model.
pub struct MeteredDecoder<D> {
    inner: D,
    calls: Arc<AtomicU64>,
}

impl<D: DecoderModel> MeteredDecoder<D> {
    pub fn new(inner: D, metrics: &SynthMetrics) -> Self {
        Self {
            inner,
            calls: metrics.decoder_calls.clone(),
        }
    }
}

impl<D: DecoderModel> DecoderModel for MeteredDecoder<D> {
    fn decode(&self, window: ArrayView2<'_, f32>, style: ArrayView1<'_, f32>) -> anyhow::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.inner.decode(window, style)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppMetrics {
    pub plan: EndpointMetrics,
    pub decode: EndpointMetrics,
    pub tts: EndpointMetrics,
    pub synth: SynthMetrics,
}

impl AppMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, system: SystemMetrics) -> MetricsResponse {
        MetricsResponse {
            timestamp: Utc::now(),
            system,
            endpoints: EndpointMetricsResponse {
                plan: self.plan.stats(),
                decode: self.decode.stats(),
                tts: self.tts.stats(),
            },
            synthesis: SynthMetricsResponse {
                sentences: self.synth.sentences.load(Ordering::Relaxed),
                decoder_calls: self.synth.decoder_calls.load(Ordering::Relaxed),
                total_samples: self.synth.total_samples.load(Ordering::Relaxed),
            },
        }
    }
}

#[derive(Serialize)]
pub struct MetricsResponse {
    pub timestamp: DateTime<Utc>,
    pub system: SystemMetrics,
    pub endpoints: EndpointMetricsResponse,
    pub synthesis: SynthMetricsResponse,
}

#[derive(Serialize)]
pub struct SystemMetrics {
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub request_count: u64,
    pub uptime_seconds: u64,
}

#[derive(Serialize)]
pub struct EndpointMetricsResponse {
    pub plan: EndpointStats,
    pub decode: EndpointStats,
    pub tts: EndpointStats,
}

#[derive(Debug, Serialize)]
pub struct EndpointStats {
    pub request_count: u64,
    pub error_count: u64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    pub p50_latency_ms: u64,
    pub p95_latency_ms: u64,
    pub p99_latency_ms: u64,
}

#[derive(Serialize)]
pub struct SynthMetricsResponse {
    pub sentences: u64,
    pub decoder_calls: u64,
    pub total_samples: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_stats() {
        let metrics = EndpointMetrics::new();
        assert_eq!(metrics.stats().min_latency_ms, 0);

        for ms in [10, 30, 20] {
            metrics.record_request(ms);
        }
        metrics.record_error();

        let stats = metrics.stats();
        assert_eq!(stats.request_count, 3);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.min_latency_ms, 10);
        assert_eq!(stats.max_latency_ms, 30);
        assert!((stats.avg_latency_ms - 20.0).abs() < f64::EPSILON);
        assert_eq!(stats.p50_latency_ms, 20);
    }

    #[test]
    fn test_latency_window_is_bounded() {
        let metrics = EndpointMetrics::new();
        for ms in 0..(MAX_LATENCY_SAMPLES as u64 + 10) {
            metrics.record_request(ms);
        }
        assert_eq!(metrics.latency_samples.lock().unwrap().len(), MAX_LATENCY_SAMPLES);
        assert_eq!(metrics.percentile(0), 10);
    }

    #[test]
    fn test_metered_decoder_counts_calls() {
        struct Silence;
        impl DecoderModel for Silence {
            fn decode(&self, window: ArrayView2<'_, f32>, _style: ArrayView1<'_, f32>) -> anyhow::Result<Vec<f32>> {
                Ok(vec![0.0; window.ncols() * melo_core::SAMPLES_PER_FRAME])
            }
        }

        let metrics = SynthMetrics::default();
        let decoder = MeteredDecoder::new(Silence, &metrics);
        let window = ndarray::Array2::<f32>::zeros((2, 4));
        let style = ndarray::Array1::<f32>::zeros(3);
        decoder.decode(window.view(), style.view()).unwrap();
        decoder.decode(window.view(), style.view()).unwrap();
        assert_eq!(metrics.decoder_calls.load(Ordering::Relaxed), 2);
    }
}
