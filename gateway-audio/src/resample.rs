use rubato::{
    Resampler as RubatoResampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
    WindowFunction,
};

use crate::error::AudioUtilError;

/// Chunk size (samples per channel, at the input rate) the transport
/// downsampler is built for: one 20ms frame at 48kHz.
pub const TRANSPORT_CHUNK_FRAMES: usize = 960;

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Polyphase resampler between two fixed sample rates. The ratio is reduced
/// by its greatest common divisor, so resampling 48kHz to 48kHz is the
/// identity transform rather than a 1:1-but-still-filtered pass.
pub struct Resampler {
    inner: SincFixedIn<f32>,
    channels: usize,
    chunk_size: usize,
}

impl Resampler {
    pub fn new(
        from_hz: u32,
        to_hz: u32,
        channels: usize,
        chunk_size: usize,
    ) -> Result<Self, AudioUtilError> {
        let divisor = gcd(from_hz, to_hz).max(1);
        let (up, down) = (to_hz / divisor, from_hz / divisor);
        let ratio = up as f64 / down as f64;

        let params = SincInterpolationParameters {
            sinc_len: 128,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 128,
            window: WindowFunction::BlackmanHarris2,
        };

        let inner = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk_size, channels)
            .map_err(|e| AudioUtilError::ResamplerSetup(e.to_string()))?;

        Ok(Self {
            inner,
            channels,
            chunk_size,
        })
    }

    /// Convenience constructor for the transport's 48kHz -> 16kHz path fed
    /// to the STT sidecar (decimation factor 3).
    pub fn transport_to_stt() -> Result<Self, AudioUtilError> {
        Self::new(48_000, 16_000, 1, TRANSPORT_CHUNK_FRAMES)
    }

    /// Resamples one chunk of `chunk_size` mono samples. Multi-channel
    /// input would be interleaved per-channel by the caller; this crate
    /// only ever resamples mono transport audio.
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>, AudioUtilError> {
        if input.len() != self.chunk_size {
            return Err(AudioUtilError::Resample(format!(
                "expected {} samples, got {}",
                self.chunk_size,
                input.len()
            )));
        }
        let waves_in: Vec<Vec<f32>> = vec![input.to_vec(); self.channels];
        let waves_out = self
            .inner
            .process(&waves_in, None)
            .map_err(|e| AudioUtilError::Resample(e.to_string()))?;
        Ok(waves_out.into_iter().next().unwrap_or_default())
    }
}

/// Converts interleaved little-endian 16-bit PCM bytes to `f32` samples in
/// `[-1.0, 1.0]`.
pub fn pcm16_bytes_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|c| {
            let sample = i16::from_le_bytes([c[0], c[1]]);
            dasp_sample::Sample::to_sample::<f32>(sample)
        })
        .collect()
}

/// Converts `f32` samples in `[-1.0, 1.0]` back to interleaved little-endian
/// 16-bit PCM bytes.
pub fn f32_to_pcm16_bytes(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let sample: i16 = dasp_sample::Sample::to_sample(s);
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_resample_preserves_length_at_48khz() {
        let mut r = Resampler::new(48_000, 48_000, 1, TRANSPORT_CHUNK_FRAMES).unwrap();
        let input: Vec<f32> = (0..TRANSPORT_CHUNK_FRAMES)
            .map(|i| (i as f32 / TRANSPORT_CHUNK_FRAMES as f32).sin())
            .collect();
        let output = r.process(&input).unwrap();
        let diff = (output.len() as i64 - input.len() as i64).abs();
        assert!(diff <= 4, "expected near-identical length, got diff {diff}");
    }

    #[test]
    fn downsample_48k_to_16k_reduces_length_by_roughly_a_third() {
        let mut r = Resampler::transport_to_stt().unwrap();
        let input: Vec<f32> = (0..TRANSPORT_CHUNK_FRAMES)
            .map(|i| (i as f32 / TRANSPORT_CHUNK_FRAMES as f32).sin())
            .collect();
        let output = r.process(&input).unwrap();
        let expected = TRANSPORT_CHUNK_FRAMES / 3;
        let diff = (output.len() as i64 - expected as i64).abs();
        assert!(diff <= 4, "expected ~{expected} samples, got {}", output.len());
    }

    #[test]
    fn rejects_wrong_sized_chunk() {
        let mut r = Resampler::transport_to_stt().unwrap();
        let err = r.process(&vec![0.0; 10]).unwrap_err();
        assert!(matches!(err, AudioUtilError::Resample(_)));
    }

    #[test]
    fn pcm16_round_trip_is_lossless_within_quantization() {
        let samples = vec![0.5f32, -0.5, 0.0, 1.0, -1.0];
        let bytes = f32_to_pcm16_bytes(&samples);
        let back = pcm16_bytes_to_f32(&bytes);
        for (a, b) in samples.iter().zip(back.iter()) {
            assert!((a - b).abs() < 0.001, "{a} vs {b}");
        }
    }
}
