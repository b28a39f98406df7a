//! Windowed decoding for a two-stage neural TTS model.
//!
//! The encoder turns phonemes into a latent sequence of any length, but the
//! decoder only takes a fixed number of frames. This crate plans word-aligned
//! decoder windows with a little left context, runs the decoder on each, trims
//! what neighbouring windows repeat and stitches the pieces back together.
//!
//! ```no_run
//! use melo_core::{synthesize_sentence, concat_sentences, DecoderModel};
//! # fn run(decoder: &dyn DecoderModel, latent: ndarray::Array2<f32>, style: ndarray::Array1<f32>) -> melo_core::Result<()> {
//! let sentence = synthesize_sentence(
//!     latent.view(),
//!     &[2, 2, 2, 1, 1, 3, 3, 3, 3, 3],
//!     &[3, 2, 5],
//!     128,
//!     style.view(),
//!     decoder,
//! )?;
//! let audio = concat_sentences(&[sentence], 44_100, 1.0)?;
//! # Ok(()) }
//! ```

pub mod concat;
pub mod config;
pub mod error;
pub mod frontend;
pub mod invoker;
pub mod mapper;
pub mod planner;
pub mod stitch;
pub mod synth;
pub mod wav;

/// Waveform samples the decoder emits per output frame.
pub const SAMPLES_PER_FRAME: usize = 512;

pub use concat::{concat_sentences, silence_gap};
pub use config::{SynthConfig, SynthesisParams};
pub use error::{Result, SynthError};
pub use frontend::{expand_word_frames, intersperse, FrontendOutput, PhonemeSequence, TextFrontend, BLANK_ID};
pub use invoker::{decode_slice, decode_slices, decode_slices_parallel, DecoderModel};
pub use mapper::word_pronoun_counts;
pub use planner::{plan_slices, SlicePlan, SliceSpec};
pub use stitch::merge_sub_audio;
pub use synth::{
    load_style_vector, plan_sentence, synthesize_sentence, synthesize_sentence_with, EncoderModel,
    EncoderOutput, SentenceOptions, Synthesizer, STYLE_DIM,
};
pub use wav::{duration_ms, encode_wav_base64, encode_wav_bytes};
