use std::io::Cursor;

use base64::{engine::general_purpose, Engine as _};

use crate::error::Result;

/// Encode mono `f32` samples in [-1.0, 1.0] as a 16-bit PCM WAV file.
pub fn encode_wav_bytes(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    // 44 byte header + 2 bytes per sample
    let mut cursor = Cursor::new(Vec::<u8>::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        const I16_MAX_F32: f32 = i16::MAX as f32;
        for &s in samples {
            writer.write_sample((s.clamp(-1.0, 1.0) * I16_MAX_F32) as i16)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Same as [`encode_wav_bytes`], Base64 encoded for JSON responses.
pub fn encode_wav_base64(samples: &[f32], sample_rate: u32) -> Result<String> {
    Ok(general_purpose::STANDARD.encode(encode_wav_bytes(samples, sample_rate)?))
}

/// Playback length in milliseconds.
pub fn duration_ms(samples: usize, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    (samples as u64 * 1000) / sample_rate as u64
}
