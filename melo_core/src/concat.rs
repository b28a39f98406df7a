use crate::error::{Result, SynthError};

/// Pause after each sentence, in seconds at normal speed.
const SENTENCE_GAP_SECS: f64 = 0.05;

/// Silence samples appended after every sentence.
pub fn silence_gap(sample_rate: u32, speed: f32) -> Result<usize> {
    if !(speed.is_finite() && speed > 0.0) {
        return Err(SynthError::invalid_config(format!(
            "speed must be a positive number, got {speed}"
        )));
    }
    Ok((sample_rate as f64 * SENTENCE_GAP_SECS / speed as f64).round() as usize)
}

/// Join sentence waveforms, each followed by a short silence.
pub fn concat_sentences(sentences: &[Vec<f32>], sample_rate: u32, speed: f32) -> Result<Vec<f32>> {
    let gap = silence_gap(sample_rate, speed)?;
    let total: usize = sentences.iter().map(|s| s.len() + gap).sum();

    let mut out = Vec::with_capacity(total);
    for sentence in sentences {
        out.extend_from_slice(sentence);
        out.resize(out.len() + gap, 0.0);
    }
    Ok(out)
}
