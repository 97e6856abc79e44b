use crate::error::AudioUtilError;

/// Parsed fields of a RIFF/WAVE header, plus the byte range of the `data`
/// chunk's payload within the original buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavHeader {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub data_offset: usize,
    pub data_len: usize,
}

fn read_u32le(buf: &[u8], offset: usize) -> Result<u32, AudioUtilError> {
    buf.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| AudioUtilError::InvalidWav("truncated while reading u32".into()))
}

fn read_u16le(buf: &[u8], offset: usize) -> Result<u16, AudioUtilError> {
    buf.get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| AudioUtilError::InvalidWav("truncated while reading u16".into()))
}

/// Parses a RIFF/WAVE header and locates the `data` chunk, walking chunks
/// after `fmt ` until `data` is found (skipping any chunk in between, such
/// as `LIST` metadata some TTS providers attach).
///
/// A defensive fallback path for TTS responses that come back WAV-framed
/// instead of raw PCM: the HTTP contract normally streams raw PCM directly.
pub fn parse_header(buf: &[u8]) -> Result<WavHeader, AudioUtilError> {
    if buf.len() < 12 || &buf[0..4] != b"RIFF" || &buf[8..12] != b"WAVE" {
        return Err(AudioUtilError::InvalidWav("missing RIFF/WAVE magic".into()));
    }

    let mut offset = 12;
    let mut channels = None;
    let mut sample_rate = None;
    let mut bits_per_sample = None;

    while offset + 8 <= buf.len() {
        let chunk_id = &buf[offset..offset + 4];
        let chunk_size = read_u32le(buf, offset + 4)? as usize;
        let body_start = offset + 8;

        if chunk_id == b"fmt " {
            if body_start + 16 > buf.len() {
                return Err(AudioUtilError::InvalidWav("truncated fmt chunk".into()));
            }
            channels = Some(read_u16le(buf, body_start + 2)?);
            sample_rate = Some(read_u32le(buf, body_start + 4)?);
            bits_per_sample = Some(read_u16le(buf, body_start + 14)?);
        } else if chunk_id == b"data" {
            let data_len = chunk_size.min(buf.len().saturating_sub(body_start));
            return Ok(WavHeader {
                channels: channels.ok_or_else(|| {
                    AudioUtilError::InvalidWav("data chunk before fmt chunk".into())
                })?,
                sample_rate: sample_rate.ok_or_else(|| {
                    AudioUtilError::InvalidWav("data chunk before fmt chunk".into())
                })?,
                bits_per_sample: bits_per_sample.ok_or_else(|| {
                    AudioUtilError::InvalidWav("data chunk before fmt chunk".into())
                })?,
                data_offset: body_start,
                data_len,
            });
        }

        // Chunks are word-aligned; odd-sized chunks carry a pad byte.
        offset = body_start + chunk_size + (chunk_size % 2);
    }

    Err(AudioUtilError::InvalidWav("no data chunk found".into()))
}

/// Extracts the raw PCM payload located by [`parse_header`].
pub fn read_pcm_bytes<'a>(buf: &'a [u8], header: &WavHeader) -> &'a [u8] {
    &buf[header.data_offset..header.data_offset + header.data_len]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_wav(sample_rate: u32, channels: u16, bits: u16, pcm: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"RIFF");
        let data_len = pcm.len() as u32;
        buf.extend_from_slice(&(36 + data_len).to_le_bytes());
        buf.extend_from_slice(b"WAVE");

        buf.extend_from_slice(b"fmt ");
        buf.extend_from_slice(&16u32.to_le_bytes());
        buf.extend_from_slice(&1u16.to_le_bytes()); // PCM format tag
        buf.extend_from_slice(&channels.to_le_bytes());
        buf.extend_from_slice(&sample_rate.to_le_bytes());
        let byte_rate = sample_rate * channels as u32 * (bits as u32 / 8);
        buf.extend_from_slice(&byte_rate.to_le_bytes());
        let block_align = channels * (bits / 8);
        buf.extend_from_slice(&block_align.to_le_bytes());
        buf.extend_from_slice(&bits.to_le_bytes());

        buf.extend_from_slice(b"data");
        buf.extend_from_slice(&data_len.to_le_bytes());
        buf.extend_from_slice(pcm);
        buf
    }

    #[test]
    fn parses_minimal_valid_wav() {
        let pcm = vec![1u8, 2, 3, 4, 5, 6];
        let wav = build_wav(48_000, 1, 16, &pcm);
        let header = parse_header(&wav).unwrap();
        assert_eq!(header.sample_rate, 48_000);
        assert_eq!(header.channels, 1);
        assert_eq!(header.bits_per_sample, 16);
        assert_eq!(read_pcm_bytes(&wav, &header), pcm.as_slice());
    }

    #[test]
    fn skips_unknown_chunks_before_data() {
        let mut wav = build_wav(16_000, 1, 16, &[]);
        // Splice a LIST chunk in between fmt and data.
        let data_chunk_start = wav.len() - 8; // "data" + len, empty payload
        let mut list_chunk = Vec::new();
        list_chunk.extend_from_slice(b"LIST");
        list_chunk.extend_from_slice(&4u32.to_le_bytes());
        list_chunk.extend_from_slice(b"INFO");
        wav.splice(data_chunk_start..data_chunk_start, list_chunk);

        let pcm = vec![9u8, 9, 9, 9];
        wav.extend_from_slice(&pcm);
        // Fix up the data chunk size in place (it was written as 0).
        let data_pos = wav.windows(4).position(|w| w == b"data").unwrap();
        wav[data_pos + 4..data_pos + 8].copy_from_slice(&(pcm.len() as u32).to_le_bytes());

        let header = parse_header(&wav).unwrap();
        assert_eq!(read_pcm_bytes(&wav, &header), pcm.as_slice());
    }

    #[test]
    fn rejects_missing_magic() {
        let err = parse_header(&[0u8; 20]).unwrap_err();
        assert!(matches!(err, AudioUtilError::InvalidWav(_)));
    }
}
