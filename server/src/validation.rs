use crate::error::ApiError;

/// Maximum words per sentence
const MAX_WORDS: usize = 2_000;
/// Maximum phoneme frames per sentence (after interspersing)
const MAX_PHONEMES: usize = 10_000;
/// Maximum output frames per sentence (~2 minutes at 44.1 kHz)
const MAX_FRAMES: usize = 10_000;
/// Maximum latent channels
const MAX_CHANNELS: usize = 1_024;
const MIN_SPEED: f32 = 0.25;
const MAX_SPEED: f32 = 4.0;

/// Validate the word/phoneme bookkeeping shared by every route.
pub fn validate_word_frames(word_frame_counts: &[usize], phoneme_frames: usize) -> Result<(), ApiError> {
    if word_frame_counts.is_empty() {
        return Err(ApiError::InvalidInput("word_frame_counts cannot be empty".to_string()));
    }
    if word_frame_counts.len() > MAX_WORDS {
        return Err(ApiError::InvalidInput(format!(
            "Too many words (max {})",
            MAX_WORDS
        )));
    }
    if word_frame_counts.iter().any(|&n| n > MAX_PHONEMES) {
        return Err(ApiError::InvalidInput(format!(
            "Word spans too many phoneme frames (max {})",
            MAX_PHONEMES
        )));
    }
    if phoneme_frames > MAX_PHONEMES {
        return Err(ApiError::InvalidInput(format!(
            "Too many phoneme frames (max {})",
            MAX_PHONEMES
        )));
    }
    Ok(())
}

/// Validate a planning request
pub fn validate_plan_request(word_frame_counts: &[usize], pronoun_lengths: &[usize]) -> Result<(), ApiError> {
    validate_word_frames(word_frame_counts, pronoun_lengths.len())?;
    // saturating: the mapper reports the exact mismatch later
    let frames = pronoun_lengths.iter().fold(0usize, |acc, &n| acc.saturating_add(n));
    if frames > MAX_FRAMES {
        return Err(ApiError::InvalidInput(format!(
            "Sentence too long ({} output frames, max {})",
            frames, MAX_FRAMES
        )));
    }
    Ok(())
}

/// Validate a latent decode request; returns the number of latent frames
pub fn validate_decode_request(
    latent: &[Vec<f32>],
    word_frame_counts: &[usize],
    pronoun_lengths: &[usize],
) -> Result<usize, ApiError> {
    validate_plan_request(word_frame_counts, pronoun_lengths)?;

    let Some(first) = latent.first() else {
        return Err(ApiError::InvalidInput("latent cannot be empty".to_string()));
    };
    if latent.len() > MAX_CHANNELS {
        return Err(ApiError::InvalidInput(format!(
            "Too many latent channels (max {})",
            MAX_CHANNELS
        )));
    }
    let frames = first.len();
    if latent.iter().any(|row| row.len() != frames) {
        return Err(ApiError::InvalidInput(
            "latent rows must all have the same length".to_string(),
        ));
    }
    if latent.iter().flatten().any(|v| !v.is_finite()) {
        return Err(ApiError::InvalidInput("latent contains non-finite values".to_string()));
    }
    Ok(frames)
}

/// Validate a phoneme-level TTS request
pub fn validate_tts_request(
    phones: &[i64],
    tones: &[i64],
    languages: &[i64],
    word_frame_counts: &[usize],
    speed: Option<f32>,
) -> Result<(), ApiError> {
    if phones.is_empty() {
        return Err(ApiError::InvalidInput("phones cannot be empty".to_string()));
    }
    if tones.len() != phones.len() || languages.len() != phones.len() {
        return Err(ApiError::InvalidInput(format!(
            "phones, tones and languages must have equal length ({}/{}/{})",
            phones.len(),
            tones.len(),
            languages.len()
        )));
    }
    validate_word_frames(word_frame_counts, phones.len())?;

    if let Some(speed) = speed {
        if !(MIN_SPEED..=MAX_SPEED).contains(&speed) {
            return Err(ApiError::InvalidInput(format!(
                "Invalid speed {}. Expected a value between {} and {}",
                speed, MIN_SPEED, MAX_SPEED
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_plan_request_valid() {
        assert!(validate_plan_request(&[3, 2, 5], &[1; 10]).is_ok());
    }

    #[test]
    fn test_validate_plan_request_empty() {
        let result = validate_plan_request(&[], &[]);
        if let Err(ApiError::InvalidInput(msg)) = result {
            assert!(msg.contains("empty"));
        } else {
            panic!("expected InvalidInput");
        }
    }

    #[test]
    fn test_validate_plan_request_too_long() {
        let result = validate_plan_request(&[2], &[usize::MAX, 5]);
        if let Err(ApiError::InvalidInput(msg)) = result {
            assert!(msg.contains("too long"));
        } else {
            panic!("expected InvalidInput");
        }
    }

    #[test]
    fn test_validate_plan_request_huge_word() {
        let result = validate_plan_request(&[usize::MAX, 2], &[1]);
        if let Err(ApiError::InvalidInput(msg)) = result {
            assert!(msg.contains("Word spans"));
        } else {
            panic!("expected InvalidInput");
        }
    }

    #[test]
    fn test_validate_decode_request() {
        let latent = vec![vec![0.0; 4], vec![1.0; 4]];
        assert_eq!(validate_decode_request(&latent, &[2], &[2, 2]).unwrap(), 4);

        let ragged = vec![vec![0.0; 4], vec![1.0; 3]];
        assert!(validate_decode_request(&ragged, &[2], &[2, 2]).is_err());

        let nan = vec![vec![f32::NAN; 4]];
        assert!(validate_decode_request(&nan, &[2], &[2, 2]).is_err());

        assert!(validate_decode_request(&[], &[2], &[2, 2]).is_err());
    }

    #[test]
    fn test_validate_tts_request() {
        assert!(validate_tts_request(&[0, 5, 0], &[0, 1, 0], &[0, 3, 0], &[3], None).is_ok());
        assert!(validate_tts_request(&[0, 5, 0], &[0, 1], &[0, 3, 0], &[3], None).is_err());
        assert!(validate_tts_request(&[], &[], &[], &[1], None).is_err());
        assert!(validate_tts_request(&[0, 5, 0], &[0, 1, 0], &[0, 3, 0], &[3], Some(10.0)).is_err());
        assert!(validate_tts_request(&[0, 5, 0], &[0, 1, 0], &[0, 3, 0], &[3], Some(0.8)).is_ok());
    }
}
