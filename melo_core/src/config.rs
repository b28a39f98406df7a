// Synthesis settings shared by the pipeline and the server

use crate::error::{Result, SynthError};

/// Knobs for one synthesis run. Defaults match the shipped MeloTTS decoder export.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthConfig {
    /// Output frames the decoder accepts per call.
    pub dec_len: usize,
    pub sample_rate: u32,
    pub speed: f32,
    /// Crossfade length used when stitching slices. 0 relies on trimming alone.
    pub pad_size: usize,
    pub noise_scale: f32,
    pub noise_scale_w: f32,
    pub sdp_ratio: f32,
    pub parallel_decode: bool,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            dec_len: 128,
            sample_rate: 44_100,
            speed: 0.8,
            pad_size: 0,
            noise_scale: 0.6,
            noise_scale_w: 0.8,
            sdp_ratio: 0.2,
            parallel_decode: false,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl SynthConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let parallel_decode = std::env::var("PARALLEL_DECODE")
            .ok()
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(defaults.parallel_decode);

        Self {
            dec_len: env_or("DEC_LEN", defaults.dec_len),
            sample_rate: env_or("SAMPLE_RATE", defaults.sample_rate),
            speed: env_or("SPEED", defaults.speed),
            pad_size: env_or("PAD_SIZE", defaults.pad_size),
            noise_scale: env_or("NOISE_SCALE", defaults.noise_scale),
            noise_scale_w: env_or("NOISE_SCALE_W", defaults.noise_scale_w),
            sdp_ratio: env_or("SDP_RATIO", defaults.sdp_ratio),
            parallel_decode,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.dec_len == 0 {
            return Err(SynthError::invalid_config("dec_len must be at least 1"));
        }
        if self.sample_rate == 0 {
            return Err(SynthError::invalid_config("sample_rate must be positive"));
        }
        if !(self.speed.is_finite() && self.speed > 0.0) {
            return Err(SynthError::invalid_config(format!(
                "speed must be a positive number, got {}",
                self.speed
            )));
        }
        Ok(())
    }

    /// Encoder hyperparameters for this configuration.
    pub fn params(&self) -> SynthesisParams {
        SynthesisParams {
            noise_scale: self.noise_scale,
            length_scale: 1.0 / self.speed,
            noise_scale_w: self.noise_scale_w,
            sdp_ratio: self.sdp_ratio,
        }
    }
}

/// Scalar inputs fed to the encoder next to the phoneme ids.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthesisParams {
    pub noise_scale: f32,
    pub length_scale: f32,
    pub noise_scale_w: f32,
    pub sdp_ratio: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(SynthConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_dec_len() {
        let config = SynthConfig {
            dec_len: 0,
            ..SynthConfig::default()
        };
        assert!(matches!(config.validate(), Err(SynthError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_bad_speed() {
        for speed in [0.0, -1.0, f32::NAN] {
            let config = SynthConfig {
                speed,
                ..SynthConfig::default()
            };
            assert!(config.validate().is_err(), "speed {speed} accepted");
        }
    }

    #[test]
    fn test_length_scale_is_inverse_speed() {
        let config = SynthConfig {
            speed: 0.8,
            ..SynthConfig::default()
        };
        let params = config.params();
        assert!((params.length_scale - 1.25).abs() < 1e-6);
        assert_eq!(params.noise_scale, 0.6);
        assert_eq!(params.noise_scale_w, 0.8);
        assert_eq!(params.sdp_ratio, 0.2);
    }
}
