/// Converts interleaved `f32` samples in `[-1.0, 1.0]` to interleaved
/// little-endian 16-bit PCM.
pub fn f32_to_i16_bytes(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let clamped = s.clamp(-1.0, 1.0);
        let scaled = (clamped * i16::MAX as f32) as i16;
        out.extend_from_slice(&scaled.to_le_bytes());
    }
    out
}

/// Converts interleaved little-endian 16-bit PCM to `f32` samples in
/// `[-1.0, 1.0]`.
pub fn i16_bytes_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / i16::MAX as f32)
        .collect()
}

/// Collapses interleaved stereo samples to mono by averaging each pair of
/// channels. Any channel count other than 1 or 2 is treated as already
/// mono (transport-side audio is never more than stereo).
pub fn collapse_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Applies an input gain multiplier. The session controller only calls
/// this while TTS is not actively playing, since boosting the mic while
/// the bot's own speech is live would also boost transport echo.
pub fn apply_input_gain(samples: &mut [f32], gain: f32) {
    if (gain - 1.0).abs() < f32::EPSILON {
        return;
    }
    for s in samples.iter_mut() {
        *s = (*s * gain).clamp(-1.0, 1.0);
    }
}
