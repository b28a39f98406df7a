use crate::error::{Result, SynthError};

/// Sum per-phoneme output lengths into per-word output lengths.
///
/// `word_frame_counts[i]` phoneme frames belong to word `i`; the counts must
/// cover `pronoun_lengths` exactly.
pub fn word_pronoun_counts(word_frame_counts: &[usize], pronoun_lengths: &[usize]) -> Result<Vec<usize>> {
    if word_frame_counts.is_empty() {
        return Err(SynthError::EmptyInput("sentence has no words".to_string()));
    }

    let covered = word_frame_counts
        .iter()
        .try_fold(0usize, |acc, &n| acc.checked_add(n))
        .ok_or_else(|| SynthError::shape("word frame counts overflow"))?;
    if covered != pronoun_lengths.len() {
        return Err(SynthError::shape(format!(
            "words span {covered} phoneme frames but {} pronunciation lengths were given",
            pronoun_lengths.len()
        )));
    }

    let mut start = 0usize;
    let counts = word_frame_counts
        .iter()
        .map(|&n| {
            let total = pronoun_lengths[start..start + n].iter().sum();
            start += n;
            total
        })
        .collect();
    Ok(counts)
}
