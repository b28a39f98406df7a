//! Sentence-level entry points and the reusable synthesis context.

use std::{fs, path::Path, time::Instant};

use anyhow::Context;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use tracing::{debug, info};

use crate::concat::concat_sentences;
use crate::config::{SynthConfig, SynthesisParams};
use crate::error::{Result, SynthError};
use crate::frontend::{FrontendOutput, PhonemeSequence, TextFrontend};
use crate::invoker::{decode_slices, decode_slices_parallel, DecoderModel};
use crate::mapper::word_pronoun_counts;
use crate::planner::{plan_slices, SlicePlan};
use crate::stitch::merge_sub_audio;
use crate::SAMPLES_PER_FRAME;

/// Width of the speaker embedding shipped next to the models.
pub const STYLE_DIM: usize = 256;

/// What the encoder produces for one sentence.
#[derive(Debug, Clone)]
pub struct EncoderOutput {
    /// `channels x output frames`.
    pub latent: Array2<f32>,
    /// Output frames per phoneme frame.
    pub pronoun_lengths: Vec<usize>,
    /// Sample count the encoder expects the sentence to have.
    pub audio_len: usize,
}

/// Phonemes-to-latent model.
pub trait EncoderModel: Send + Sync {
    fn encode(
        &self,
        phonemes: &PhonemeSequence,
        style: ArrayView1<'_, f32>,
        params: &SynthesisParams,
    ) -> anyhow::Result<EncoderOutput>;
}

/// How one sentence is decoded and stitched.
#[derive(Debug, Clone, Default)]
pub struct SentenceOptions {
    /// Truncate the stitched audio to this many samples. Defaults to 512 per output frame.
    pub expected_samples: Option<usize>,
    pub pad_size: usize,
    pub parallel: bool,
}

/// Decode one sentence through a fixed-window decoder.
pub fn synthesize_sentence<D: DecoderModel + ?Sized>(
    latent: ArrayView2<'_, f32>,
    pronoun_lengths: &[usize],
    word_frame_counts: &[usize],
    dec_len: usize,
    style: ArrayView1<'_, f32>,
    decoder: &D,
) -> Result<Vec<f32>> {
    synthesize_sentence_with(
        latent,
        pronoun_lengths,
        word_frame_counts,
        dec_len,
        style,
        decoder,
        &SentenceOptions::default(),
    )
}

pub fn synthesize_sentence_with<D: DecoderModel + ?Sized>(
    latent: ArrayView2<'_, f32>,
    pronoun_lengths: &[usize],
    word_frame_counts: &[usize],
    dec_len: usize,
    style: ArrayView1<'_, f32>,
    decoder: &D,
    opts: &SentenceOptions,
) -> Result<Vec<f32>> {
    let plan = plan_sentence(word_frame_counts, pronoun_lengths, dec_len)?;
    debug!(slices = plan.len(), frames = plan.total_frames(), dec_len, "planned sentence");

    let segments = if opts.parallel {
        decode_slices_parallel(decoder, latent, style, &plan)?
    } else {
        decode_slices(decoder, latent, style, &plan)?
    };

    let audio_len = opts
        .expected_samples
        .unwrap_or(plan.total_frames() * SAMPLES_PER_FRAME);
    Ok(merge_sub_audio(segments, opts.pad_size, audio_len))
}

/// Word counts to slice plan, without touching any model.
pub fn plan_sentence(word_frame_counts: &[usize], pronoun_lengths: &[usize], dec_len: usize) -> Result<SlicePlan> {
    let word_counts = word_pronoun_counts(word_frame_counts, pronoun_lengths)?;
    plan_slices(&word_counts, dec_len)
}

/// Read a raw little-endian `f32` speaker embedding.
pub fn load_style_vector<P: AsRef<Path>>(path: P) -> anyhow::Result<Array1<f32>> {
    let bytes = fs::read(path.as_ref())
        .with_context(|| format!("Failed to read style vector {}", path.as_ref().display()))?;
    if bytes.len() != STYLE_DIM * 4 {
        return Err(anyhow::anyhow!(
            "style vector {} has {} bytes, expected {}",
            path.as_ref().display(),
            bytes.len(),
            STYLE_DIM * 4
        ));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Models, speaker embedding and settings, loaded once and shared by every call.
pub struct Synthesizer {
    encoder: Option<Box<dyn EncoderModel>>,
    decoder: Box<dyn DecoderModel>,
    style: Array1<f32>,
    config: SynthConfig,
}

impl std::fmt::Debug for Synthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synthesizer")
            .field("encoder", &self.encoder.as_ref().map(|_| "<EncoderModel>"))
            .field("decoder", &"<DecoderModel>")
            .field("style_dim", &self.style.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Synthesizer {
    /// Decoder-only context; add an encoder with [`Synthesizer::with_encoder`].
    pub fn new(decoder: Box<dyn DecoderModel>, style: Array1<f32>, config: SynthConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            encoder: None,
            decoder,
            style,
            config,
        })
    }

    pub fn with_encoder(mut self, encoder: Box<dyn EncoderModel>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    pub fn style(&self) -> ArrayView1<'_, f32> {
        self.style.view()
    }

    pub fn has_encoder(&self) -> bool {
        self.encoder.is_some()
    }

    pub fn plan(&self, word_frame_counts: &[usize], pronoun_lengths: &[usize]) -> Result<SlicePlan> {
        plan_sentence(word_frame_counts, pronoun_lengths, self.config.dec_len)
    }

    /// Decode a sentence whose latent was produced elsewhere.
    pub fn decode_sentence(
        &self,
        latent: ArrayView2<'_, f32>,
        pronoun_lengths: &[usize],
        word_frame_counts: &[usize],
        expected_samples: Option<usize>,
    ) -> Result<Vec<f32>> {
        let opts = SentenceOptions {
            expected_samples,
            pad_size: self.config.pad_size,
            parallel: self.config.parallel_decode,
        };
        self.decode_sentence_with(latent, pronoun_lengths, word_frame_counts, &opts)
    }

    /// Like [`Synthesizer::decode_sentence`] with caller-chosen stitching options.
    pub fn decode_sentence_with(
        &self,
        latent: ArrayView2<'_, f32>,
        pronoun_lengths: &[usize],
        word_frame_counts: &[usize],
        opts: &SentenceOptions,
    ) -> Result<Vec<f32>> {
        synthesize_sentence_with(
            latent,
            pronoun_lengths,
            word_frame_counts,
            self.config.dec_len,
            self.style.view(),
            &self.decoder,
            opts,
        )
    }

    /// Run the encoder on one sentence and check what comes back.
    pub fn encode(&self, sentence: &FrontendOutput, params: &SynthesisParams) -> Result<EncoderOutput> {
        let encoder = self
            .encoder
            .as_ref()
            .ok_or_else(|| SynthError::invalid_config("no encoder model loaded"))?;

        let start = Instant::now();
        let out = encoder.encode(&sentence.phonemes, self.style.view(), params)?;
        info!(
            phonemes = sentence.phonemes.len(),
            frames = out.latent.ncols(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "encoder finished"
        );

        if out.pronoun_lengths.len() != sentence.phonemes.len() {
            return Err(SynthError::shape(format!(
                "encoder returned {} pronunciation lengths for {} phonemes",
                out.pronoun_lengths.len(),
                sentence.phonemes.len()
            )));
        }
        Ok(out)
    }

    /// Encode and decode one sentence.
    pub fn synthesize_sentence(&self, sentence: &FrontendOutput, speed: f32) -> Result<Vec<f32>> {
        let config = SynthConfig {
            speed,
            ..self.config.clone()
        };
        config.validate()?;

        let encoded = self.encode(sentence, &config.params())?;
        let start = Instant::now();
        let audio = self.decode_sentence(
            encoded.latent.view(),
            &encoded.pronoun_lengths,
            &sentence.word_frame_counts,
            Some(encoded.audio_len),
        )?;
        info!(
            samples = audio.len(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "decoder finished"
        );
        Ok(audio)
    }

    /// Synthesize several sentences and join them with silence.
    pub fn synthesize(&self, sentences: &[FrontendOutput], speed: f32) -> Result<Vec<f32>> {
        if sentences.is_empty() {
            return Err(SynthError::EmptyInput("no sentences to synthesize".to_string()));
        }
        let mut audio = Vec::with_capacity(sentences.len());
        for (n, sentence) in sentences.iter().enumerate() {
            debug!(sentence = n, words = sentence.word_frame_counts.len(), "synthesizing sentence");
            audio.push(self.synthesize_sentence(sentence, speed)?);
        }
        concat_sentences(&audio, self.config.sample_rate, speed)
    }

    /// Full text-to-waveform run at the configured speed.
    pub fn synthesize_text(&self, frontend: &dyn TextFrontend, text: &str) -> Result<Vec<f32>> {
        let sentences = frontend.split_sentences(text);
        info!(sentences = sentences.len(), "text split into sentences");

        let phonemized = sentences
            .iter()
            .filter(|s| !s.trim().is_empty())
            .map(|s| frontend.phonemize(s).map_err(SynthError::Model))
            .collect::<Result<Vec<_>>>()?;
        self.synthesize(&phonemized, self.config.speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::tests::{frames_of, ramp_latent, EchoDecoder};

    #[test]
    fn test_sentence_length_matches_frames() {
        let latent = ramp_latent(23);
        let style = Array1::<f32>::zeros(STYLE_DIM);
        let audio = synthesize_sentence(
            latent.view(),
            &[2, 2, 2, 1, 1, 3, 3, 3, 3, 3],
            &[3, 2, 5],
            20,
            style.view(),
            &EchoDecoder::new(),
        )
        .unwrap();
        assert_eq!(audio.len(), 23 * SAMPLES_PER_FRAME);
        assert_eq!(frames_of(&audio), (1..=23).map(|v| v as f32).collect::<Vec<_>>());
    }

    #[test]
    fn test_expected_samples_truncates() {
        let latent = ramp_latent(6);
        let style = Array1::<f32>::zeros(STYLE_DIM);
        let opts = SentenceOptions {
            expected_samples: Some(1000),
            ..SentenceOptions::default()
        };
        let audio = synthesize_sentence_with(
            latent.view(),
            &[3, 3],
            &[1, 1],
            4,
            style.view(),
            &EchoDecoder::new(),
            &opts,
        )
        .unwrap();
        assert_eq!(audio.len(), 1000);
    }

    #[test]
    fn test_shape_mismatch_aborts_sentence() {
        let latent = ramp_latent(6);
        let style = Array1::<f32>::zeros(STYLE_DIM);
        let err = synthesize_sentence(latent.view(), &[3, 3], &[1, 2], 4, style.view(), &EchoDecoder::new())
            .unwrap_err();
        assert!(matches!(err, SynthError::ShapeMismatch(_)));
    }

    #[test]
    fn test_encode_without_encoder() {
        let synth = Synthesizer::new(
            Box::new(EchoDecoder::new()),
            Array1::zeros(STYLE_DIM),
            SynthConfig::default(),
        )
        .unwrap();
        let raw = PhonemeSequence::new(vec![1], vec![0], vec![3]).unwrap();
        let sentence = FrontendOutput::from_raw(raw, &[1]).unwrap();
        let err = synth.synthesize_sentence(&sentence, 1.0).unwrap_err();
        assert!(matches!(err, SynthError::InvalidConfig(_)));
    }

    #[test]
    fn test_load_style_vector() {
        let path = std::env::temp_dir().join(format!("melo_style_{}.bin", std::process::id()));
        let bytes: Vec<u8> = (0..STYLE_DIM).flat_map(|i| (i as f32).to_le_bytes()).collect();
        fs::write(&path, bytes).unwrap();

        let style = load_style_vector(&path).unwrap();
        assert_eq!(style.len(), STYLE_DIM);
        assert_eq!(style[10], 10.0);

        fs::write(&path, [0u8; 7]).unwrap();
        assert!(load_style_vector(&path).is_err());
        let _ = fs::remove_file(&path);
    }
}
