//! Phoneme-side inputs of the pipeline.
//!
//! Lexicon lookup and text normalization live outside this crate behind
//! [`TextFrontend`]. What stays here is the bookkeeping the encoder expects on
//! top of the raw ids: a blank token between every phoneme and word frame
//! counts stretched to match.

use crate::error::{Result, SynthError};

/// Id inserted between phonemes before they reach the encoder.
pub const BLANK_ID: i64 = 0;

/// Phoneme, tone and language ids for one sentence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PhonemeSequence {
    pub phones: Vec<i64>,
    pub tones: Vec<i64>,
    pub languages: Vec<i64>,
}

impl PhonemeSequence {
    pub fn new(phones: Vec<i64>, tones: Vec<i64>, languages: Vec<i64>) -> Result<Self> {
        if phones.len() != tones.len() || phones.len() != languages.len() {
            return Err(SynthError::shape(format!(
                "phone/tone/language lengths differ: {}/{}/{}",
                phones.len(),
                tones.len(),
                languages.len()
            )));
        }
        Ok(Self {
            phones,
            tones,
            languages,
        })
    }

    pub fn len(&self) -> usize {
        self.phones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phones.is_empty()
    }

    /// Surround every id with [`BLANK_ID`]: `n` ids become `2n + 1`.
    pub fn interspersed(&self) -> Self {
        Self {
            phones: intersperse(&self.phones, BLANK_ID),
            tones: intersperse(&self.tones, BLANK_ID),
            languages: intersperse(&self.languages, BLANK_ID),
        }
    }
}

pub fn intersperse<T: Copy>(items: &[T], blank: T) -> Vec<T> {
    let mut out = vec![blank; items.len() * 2 + 1];
    for (i, &item) in items.iter().enumerate() {
        out[2 * i + 1] = item;
    }
    out
}

/// Rescale per-word phoneme counts to the interspersed sequence.
///
/// Every phoneme gains a trailing blank, so each word doubles; the leading blank
/// is credited to the first word.
pub fn expand_word_frames(word_phones: &[usize]) -> Vec<usize> {
    let mut out: Vec<usize> = word_phones.iter().map(|&n| n * 2).collect();
    if let Some(first) = out.first_mut() {
        *first += 1;
    }
    out
}

/// One sentence ready for the encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontendOutput {
    /// Already interspersed.
    pub phonemes: PhonemeSequence,
    pub word_frame_counts: Vec<usize>,
}

impl FrontendOutput {
    /// Build from raw lexicon output, applying blank interspersing to both parts.
    pub fn from_raw(raw: PhonemeSequence, word_phones: &[usize]) -> Result<Self> {
        let covered: usize = word_phones.iter().sum();
        if covered != raw.len() {
            return Err(SynthError::shape(format!(
                "words cover {covered} phonemes but the sentence has {}",
                raw.len()
            )));
        }
        Ok(Self {
            phonemes: raw.interspersed(),
            word_frame_counts: expand_word_frames(word_phones),
        })
    }
}

/// Text normalization, sentence splitting and phonemization.
pub trait TextFrontend: Send + Sync {
    fn split_sentences(&self, text: &str) -> Vec<String>;

    fn phonemize(&self, sentence: &str) -> anyhow::Result<FrontendOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersperse() {
        assert_eq!(intersperse(&[7, 8, 9], 0), vec![0, 7, 0, 8, 0, 9, 0]);
        assert_eq!(intersperse::<i64>(&[], 0), vec![0]);
    }

    #[test]
    fn test_expand_word_frames_matches_interspersed_length() {
        let raw = PhonemeSequence::new(vec![5, 6, 7, 8], vec![1, 1, 2, 2], vec![3; 4]).unwrap();
        let out = FrontendOutput::from_raw(raw, &[1, 3]).unwrap();
        assert_eq!(out.phonemes.len(), 9);
        assert_eq!(out.word_frame_counts, vec![3, 6]);
        assert_eq!(out.word_frame_counts.iter().sum::<usize>(), out.phonemes.len());
        assert_eq!(out.phonemes.languages, vec![0, 3, 0, 3, 0, 3, 0, 3, 0]);
    }

    #[test]
    fn test_from_raw_rejects_uncovered_phonemes() {
        let raw = PhonemeSequence::new(vec![5, 6], vec![0, 0], vec![3, 3]).unwrap();
        assert!(matches!(
            FrontendOutput::from_raw(raw, &[1]),
            Err(SynthError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_unequal_id_vectors() {
        let result = PhonemeSequence::new(vec![1, 2], vec![1], vec![3, 3]);
        assert!(matches!(result, Err(SynthError::ShapeMismatch(_))));
    }
}
