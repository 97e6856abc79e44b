/// Bytes per millisecond of mono 16-bit PCM at the STT sample rate (16kHz).
const BYTES_PER_MS: usize = 32;
const MIN_BATCH_MS: u32 = 20;

/// Coalesces 20ms transport frames (already downsampled to 16kHz) into
/// fixed-size chunks suitable for the STT sidecar, which expects audio in
/// batches rather than one 20ms frame at a time.
pub struct FrameBatcher {
    batch_ms: u32,
    buf: Vec<u8>,
}

impl FrameBatcher {
    pub fn new(batch_ms: u32) -> Self {
        Self {
            batch_ms: batch_ms.max(MIN_BATCH_MS),
            buf: Vec::new(),
        }
    }

    fn target_bytes(&self) -> usize {
        self.batch_ms as usize * BYTES_PER_MS
    }

    pub fn set_batch_ms(&mut self, batch_ms: u32) {
        self.batch_ms = batch_ms.max(MIN_BATCH_MS);
    }

    pub fn add(&mut self, pcm16k: &[u8]) {
        self.buf.extend_from_slice(pcm16k);
    }

    /// Returns a batch-sized chunk if enough data has accumulated, leaving
    /// any remainder buffered for the next call.
    pub fn emit_ready(&mut self) -> Option<Vec<u8>> {
        let target = self.target_bytes();
        if self.buf.len() < target {
            return None;
        }
        let rest = self.buf.split_off(target);
        let ready = std::mem::replace(&mut self.buf, rest);
        Some(ready)
    }

    /// Drains and returns whatever is buffered, regardless of size. Used at
    /// utterance end so a short trailing chunk isn't lost.
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        if self.buf.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_nothing_until_target_reached() {
        let mut batcher = FrameBatcher::new(100);
        batcher.add(&[0u8; 1000]);
        assert!(batcher.emit_ready().is_none());
    }

    #[test]
    fn emits_exact_target_size_and_keeps_remainder() {
        let mut batcher = FrameBatcher::new(100);
        batcher.add(&vec![1u8; 3200 + 640]);
        let ready = batcher.emit_ready().unwrap();
        assert_eq!(ready.len(), 3200);
        assert!(batcher.emit_ready().is_none());
        let flushed = batcher.flush().unwrap();
        assert_eq!(flushed.len(), 640);
    }

    #[test]
    fn flush_equals_concatenation_of_all_adds() {
        let mut batcher = FrameBatcher::new(100);
        let chunks: Vec<Vec<u8>> = (0..5).map(|i| vec![i as u8; 200]).collect();
        for c in &chunks {
            batcher.add(c);
        }
        let mut all_ready = Vec::new();
        while let Some(r) = batcher.emit_ready() {
            all_ready.extend(r);
        }
        if let Some(rest) = batcher.flush() {
            all_ready.extend(rest);
        }
        let expected: Vec<u8> = chunks.concat();
        assert_eq!(all_ready, expected);
    }

    #[test]
    fn set_batch_ms_is_clamped_to_minimum() {
        let mut batcher = FrameBatcher::new(100);
        batcher.set_batch_ms(5);
        assert_eq!(batcher.batch_ms, MIN_BATCH_MS);
    }
}
