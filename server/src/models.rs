//! ONNX Runtime sessions behind the `melo_core` model traits.
//!
//! Tensor names follow the MeloTTS export: the encoder takes `phone`, `tone`,
//! `language`, `g` and four scalar knobs and returns `(z_p, pronoun_lens,
//! audio_len)`; the decoder takes `z_p` and `g` and returns one waveform.

use std::path::Path;

use anyhow::{anyhow, Context};
use melo_core::{DecoderModel, EncoderModel, EncoderOutput, PhonemeSequence, SynthesisParams};
use ndarray::{Array1, Array3, ArrayView1, ArrayView2, Axis, Ix3};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::{DynValue, ValueType};
use tracing::info;

fn load_session(path: &Path) -> anyhow::Result<Session> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .commit_from_file(path)
        .with_context(|| format!("Failed to load ONNX model {}", path.display()))?;
    Ok(session)
}

/// `[1, dim, 1]`, the layout both models expect for the speaker embedding.
fn style_tensor(style: ArrayView1<'_, f32>) -> anyhow::Result<Array3<f32>> {
    Ok(Array3::from_shape_vec((1, style.len(), 1), style.to_vec())?)
}

fn ids_tensor(ids: &[i64]) -> anyhow::Result<Array1<i32>> {
    ids.iter()
        .map(|&id| i32::try_from(id).map_err(|_| anyhow!("id {id} does not fit the encoder's int32 input")))
        .collect::<anyhow::Result<Vec<i32>>>()
        .map(Array1::from)
}

/// Integer outputs come back as int32 or int64 depending on the export.
fn extract_counts(value: &DynValue) -> anyhow::Result<Vec<usize>> {
    if let Ok(t) = value.try_extract_tensor::<i32>() {
        return Ok(t.iter().map(|&v| v.max(0) as usize).collect());
    }
    if let Ok(t) = value.try_extract_tensor::<i64>() {
        return Ok(t.iter().map(|&v| v.max(0) as usize).collect());
    }
    let t = value.try_extract_tensor::<f32>()?;
    Ok(t.iter().map(|&v| v.max(0.0).round() as usize).collect())
}

pub struct OnnxEncoder {
    session: Session,
}

impl OnnxEncoder {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let session = load_session(path.as_ref())?;
        info!("Loaded encoder {}", path.as_ref().display());
        Ok(Self { session })
    }
}

impl EncoderModel for OnnxEncoder {
    fn encode(
        &self,
        phonemes: &PhonemeSequence,
        style: ArrayView1<'_, f32>,
        params: &SynthesisParams,
    ) -> anyhow::Result<EncoderOutput> {
        let scalar = |v: f32| Array1::from_elem(1, v);

        let phone = ids_tensor(&phonemes.phones)?;
        let g = style_tensor(style)?;
        let tone = ids_tensor(&phonemes.tones)?;
        let language = ids_tensor(&phonemes.languages)?;
        let outputs = self.session.run(ort::inputs![
            "phone" => phone,
            "g" => g,
            "tone" => tone,
            "language" => language,
            "noise_scale" => scalar(params.noise_scale),
            "length_scale" => scalar(params.length_scale),
            "noise_scale_w" => scalar(params.noise_scale_w),
            "sdp_ratio" => scalar(params.sdp_ratio)
        ]?)?;

        let z_p = outputs[0].try_extract_tensor::<f32>()?.into_dimensionality::<Ix3>()?;
        if z_p.len_of(Axis(0)) != 1 {
            return Err(anyhow!("encoder returned a batch of {}", z_p.len_of(Axis(0))));
        }
        let latent = z_p.index_axis(Axis(0), 0).to_owned();
        let pronoun_lengths = extract_counts(&outputs[1])?;
        let audio_len = extract_counts(&outputs[2])?
            .first()
            .copied()
            .ok_or_else(|| anyhow!("encoder returned no audio length"))?;

        Ok(EncoderOutput {
            latent,
            pronoun_lengths,
            audio_len,
        })
    }
}

pub struct OnnxDecoder {
    session: Session,
    window_len: Option<usize>,
}

impl OnnxDecoder {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let session = load_session(path.as_ref())?;

        // z_p is [1, channels, dec_len]; a symbolic last axis reads as -1.
        let window_len = session
            .inputs
            .first()
            .and_then(|input| match &input.input_type {
                ValueType::Tensor { dimensions, .. } => dimensions.last().copied(),
                _ => None,
            })
            .filter(|&d| d > 0)
            .map(|d| d as usize);

        info!("Loaded decoder {} (window {:?})", path.as_ref().display(), window_len);
        Ok(Self { session, window_len })
    }

    /// Fixed window length baked into the model, if the export declares one.
    pub fn window_len(&self) -> Option<usize> {
        self.window_len
    }
}

impl DecoderModel for OnnxDecoder {
    fn decode(&self, window: ArrayView2<'_, f32>, style: ArrayView1<'_, f32>) -> anyhow::Result<Vec<f32>> {
        let z_p = window.to_owned().insert_axis(Axis(0));
        let g = style_tensor(style)?;
        let outputs = self.session.run(ort::inputs![
            "z_p" => z_p,
            "g" => g
        ]?)?;
        let audio = outputs[0].try_extract_tensor::<f32>()?;
        Ok(audio.iter().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_tensor_layout() {
        let style = Array1::from(vec![1.0, 2.0, 3.0]);
        let tensor = style_tensor(style.view()).unwrap();
        assert_eq!(tensor.dim(), (1, 3, 1));
        assert_eq!(tensor[[0, 2, 0]], 3.0);
    }

    #[test]
    fn test_ids_tensor_range() {
        assert_eq!(ids_tensor(&[0, 5, 0]).unwrap().to_vec(), vec![0, 5, 0]);
        assert!(ids_tensor(&[i64::MAX]).is_err());
    }

    #[test]
    fn test_missing_model_file() {
        assert!(OnnxDecoder::load("/nonexistent/decoder.onnx").is_err());
    }
}
