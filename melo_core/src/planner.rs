//! Decode window planning.
//!
//! The decoder only accepts `dec_len` output frames at a time, so a sentence is
//! cut along word boundaries into windows that fit. When there is room, a new
//! window re-decodes the last two words of the previous one so the vocoder sees
//! left context across the seam. The overlapping words are later trimmed from
//! the audio: the previous window drops its last word, the next one drops its
//! first, which leaves every output frame emitted exactly once.

use std::ops::Range;

use serde::Serialize;
use tracing::debug;

use crate::error::{Result, SynthError};
use crate::SAMPLES_PER_FRAME;

/// Words re-decoded as left context when a window is seeded.
const CONTEXT_WORDS: usize = 2;

/// One decoder call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SliceSpec {
    /// Words fed to the decoder, context included.
    pub words: Range<usize>,
    /// Output frames fed to the decoder, context included.
    pub frames: Range<usize>,
    /// Output frames this slice contributes to the sentence once trimmed.
    pub emit: Range<usize>,
}

impl SliceSpec {
    pub fn frame_len(&self) -> usize {
        self.frames.len()
    }

    /// Sample range of the decoded slice audio that survives trimming.
    pub fn sample_range(&self) -> Range<usize> {
        let start = (self.emit.start - self.frames.start) * SAMPLES_PER_FRAME;
        let end = (self.emit.end - self.frames.start) * SAMPLES_PER_FRAME;
        start..end
    }
}

/// Ordered decoder windows for one sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlicePlan {
    dec_len: usize,
    word_counts: Vec<usize>,
    slices: Vec<SliceSpec>,
}

impl SlicePlan {
    pub fn slices(&self) -> &[SliceSpec] {
        &self.slices
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SliceSpec> {
        self.slices.iter()
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    pub fn dec_len(&self) -> usize {
        self.dec_len
    }

    pub fn word_counts(&self) -> &[usize] {
        &self.word_counts
    }

    /// Output frames in the sentence.
    pub fn total_frames(&self) -> usize {
        self.word_counts.iter().sum()
    }

    /// Slices whose frame range is longer than the decoder window.
    pub fn oversized(&self) -> impl Iterator<Item = (usize, &SliceSpec)> {
        self.slices
            .iter()
            .enumerate()
            .filter(move |(_, s)| s.frame_len() > self.dec_len)
    }
}

impl<'a> IntoIterator for &'a SlicePlan {
    type Item = &'a SliceSpec;
    type IntoIter = std::slice::Iter<'a, SliceSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.slices.iter()
    }
}

/// Plan decoder windows over per-word output frame counts.
pub fn plan_slices(word_counts: &[usize], dec_len: usize) -> Result<SlicePlan> {
    if dec_len == 0 {
        return Err(SynthError::invalid_config("dec_len must be at least 1"));
    }
    if word_counts.is_empty() {
        return Err(SynthError::EmptyInput("no words to plan".to_string()));
    }

    let n = word_counts.len();
    let (mut pn_start, mut pn_end) = (0usize, 0usize);
    let (mut zp_start, mut zp_end) = (0usize, 0usize);
    let mut windows: Vec<(Range<usize>, Range<usize>)> = Vec::new();

    while pn_end < n {
        // Seed with the last two words only if the next word still fits after them.
        let mut window_len = if pn_end - pn_start > CONTEXT_WORDS
            && word_counts[pn_end - CONTEXT_WORDS..=pn_end].iter().sum::<usize>() <= dec_len
        {
            let context: usize = word_counts[pn_end - CONTEXT_WORDS..pn_end].iter().sum();
            pn_start = pn_end - CONTEXT_WORDS;
            zp_start = zp_end - context;
            context
        } else {
            pn_start = pn_end;
            zp_start = zp_end;
            0
        };

        let first_new = pn_end;
        while pn_end < n && window_len + word_counts[pn_end] <= dec_len {
            window_len += word_counts[pn_end];
            pn_end += 1;
        }

        // A fresh window whose first word alone overflows the decoder: take it anyway.
        if pn_end == first_new {
            debug!(
                word = pn_end,
                frames = word_counts[pn_end],
                dec_len,
                "oversized word gets its own window"
            );
            window_len += word_counts[pn_end];
            pn_end += 1;
        }

        zp_end = zp_start + window_len;
        windows.push((pn_start..pn_end, zp_start..zp_end));
    }

    let slices = windows
        .iter()
        .enumerate()
        .map(|(i, (words, frames))| {
            let overlaps_prev = i > 0 && windows[i - 1].0.end > words.start;
            let overlaps_next = i + 1 < windows.len() && words.end > windows[i + 1].0.start;

            let mut emit = frames.clone();
            if overlaps_prev {
                emit.start += word_counts[words.start];
            }
            if overlaps_next {
                emit.end -= word_counts[words.end - 1];
            }

            SliceSpec {
                words: words.clone(),
                frames: frames.clone(),
                emit,
            }
        })
        .collect();

    Ok(SlicePlan {
        dec_len,
        word_counts: word_counts.to_vec(),
        slices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn assert_partition(plan: &SlicePlan) {
        let mut cursor = 0;
        for slice in plan {
            assert_eq!(slice.emit.start, cursor, "gap or overlap at {slice:?}");
            assert!(slice.emit.end >= slice.emit.start);
            assert!(slice.frames.start <= slice.emit.start && slice.emit.end <= slice.frames.end);
            cursor = slice.emit.end;
        }
        assert_eq!(cursor, plan.total_frames());
    }

    #[test]
    fn test_reference_plan() {
        let plan = plan_slices(&[6, 2, 15], 20).unwrap();
        let got: Vec<_> = plan.iter().map(|s| (s.words.clone(), s.frames.clone())).collect();
        assert_eq!(got, vec![(0..2, 0..8), (2..3, 8..23)]);
        assert_eq!(plan.slices()[0].emit, 0..8);
        assert_eq!(plan.slices()[1].emit, 8..23);
        assert_eq!(plan.total_frames(), 23);
    }

    #[test]
    fn test_context_seeding() {
        let plan = plan_slices(&[3; 6], 10).unwrap();
        let got: Vec<_> = plan
            .iter()
            .map(|s| (s.words.clone(), s.frames.clone(), s.emit.clone()))
            .collect();
        assert_eq!(
            got,
            vec![
                (0..3, 0..9, 0..6),
                (1..4, 3..12, 6..9),
                (2..5, 6..15, 9..12),
                (3..6, 9..18, 12..18),
            ]
        );
        assert_partition(&plan);
    }

    #[test]
    fn test_no_context_when_next_word_would_not_fit() {
        // Last two words (4 + 4) plus the next (5) overflow 12, so start fresh.
        let plan = plan_slices(&[2, 4, 4, 5], 12).unwrap();
        let words: Vec<_> = plan.iter().map(|s| s.words.clone()).collect();
        assert_eq!(words, vec![0..3, 3..4]);
        assert_eq!(plan.slices()[1].frames, 10..15);
        assert_partition(&plan);
    }

    #[test]
    fn test_single_window() {
        let plan = plan_slices(&[1, 2, 3], 128).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.slices()[0].frames, 0..6);
        assert_eq!(plan.slices()[0].sample_range(), 0..6 * SAMPLES_PER_FRAME);
    }

    #[test]
    fn test_oversized_first_word_makes_progress() {
        let plan = plan_slices(&[30, 4, 4], 10).unwrap();
        let words: Vec<_> = plan.iter().map(|s| s.words.clone()).collect();
        assert_eq!(words, vec![0..1, 1..3]);
        assert_eq!(plan.slices()[0].frames, 0..30);
        assert_eq!(plan.oversized().count(), 1);
        assert_partition(&plan);
    }

    #[test]
    fn test_oversized_word_after_context_window() {
        let plan = plan_slices(&[2, 2, 2, 2, 50, 1], 7).unwrap();
        assert_partition(&plan);
        let big = plan.iter().find(|s| s.words == (4..5)).unwrap();
        assert_eq!(big.frame_len(), 50);
        assert_eq!(big.emit, big.frames);
    }

    #[test]
    fn test_zero_length_words() {
        let plan = plan_slices(&[0, 0, 3, 0, 5, 0], 4).unwrap();
        assert_partition(&plan);
        for slice in plan.iter().filter(|s| s.frame_len() > 4) {
            assert_eq!(slice.words.len(), 1);
        }
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(matches!(plan_slices(&[1], 0), Err(SynthError::InvalidConfig(_))));
        assert!(matches!(plan_slices(&[], 8), Err(SynthError::EmptyInput(_))));
    }

    #[test]
    fn test_random_plans_partition_and_respect_window() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..500 {
            let dec_len = rng.gen_range(1..=64);
            let words = rng.gen_range(1..=40);
            let counts: Vec<usize> = (0..words).map(|_| rng.gen_range(0..=dec_len + 8)).collect();

            let plan = plan_slices(&counts, dec_len).unwrap();
            assert_partition(&plan);

            let mut covered_words = 0;
            for (i, slice) in plan.iter().enumerate() {
                if slice.frame_len() > dec_len {
                    assert_eq!(slice.words.len(), 1, "only single words may overflow");
                    assert!(counts[slice.words.start] > dec_len);
                }
                if i > 0 {
                    let prev = &plan.slices()[i - 1];
                    assert!(prev.words.end - slice.words.start.min(prev.words.end) <= CONTEXT_WORDS);
                }
                assert!(slice.words.end > covered_words, "no progress at {i}");
                covered_words = slice.words.end;
                let frames: usize = counts[slice.words.clone()].iter().sum();
                assert_eq!(frames, slice.frame_len());
            }
            assert_eq!(covered_words, counts.len());
        }
    }

    #[test]
    fn test_plan_serializes() {
        let plan = plan_slices(&[6, 2, 15], 20).unwrap();
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["dec_len"], 20);
        assert_eq!(json["slices"][1]["frames"]["start"], 8);
        assert_eq!(json["slices"][1]["frames"]["end"], 23);
    }
}
