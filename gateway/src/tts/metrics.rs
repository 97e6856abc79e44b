use serde_json::{json, Value};

/// Computes the `p`-th percentile (0.0..=100.0) of `values` using linear
/// interpolation between closest ranks, matching how the original TTS
/// metrics summary computed p50/p90 of RMS samples.
pub fn percentile(values: &[f32], p: f64) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f32> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let frac = (rank - lower as f64) as f32;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

/// Frame pacing is 20ms per transport frame; used to compute expected
/// elapsed playback time from a frame count.
const FRAME_MS: u64 = 20;

/// Timestamps and counters for one TTS playback attempt, from producer
/// start through playback end. All timestamps are monotonic milliseconds.
#[derive(Debug, Default, Clone)]
pub struct TtsMetrics {
    pub requested_at_ms: Option<u64>,
    pub producer_connected_at_ms: Option<u64>,
    pub first_byte_at_ms: Option<u64>,
    pub first_audio_played_at_ms: Option<u64>,
    pub playback_ended_at_ms: Option<u64>,
    pub producer_ended_at_ms: Option<u64>,
    pub stop_reason: Option<String>,
    pub frames_played: u64,
    pub underrun_count: u64,
    pub rms_samples: Vec<f32>,
    pub producer_total_bytes: usize,
    pub queue_peak: usize,
    queue_len_sum: u64,
    queue_samples: u64,
}

impl TtsMetrics {
    pub fn new(requested_at_ms: u64) -> Self {
        Self {
            requested_at_ms: Some(requested_at_ms),
            ..Default::default()
        }
    }

    pub fn mark_producer_connected(&mut self, now_ms: u64) {
        self.producer_connected_at_ms = Some(now_ms);
    }

    pub fn mark_first_byte(&mut self, now_ms: u64) {
        self.first_byte_at_ms.get_or_insert(now_ms);
    }

    pub fn mark_first_audio_played(&mut self, now_ms: u64) {
        self.first_audio_played_at_ms.get_or_insert(now_ms);
    }

    pub fn mark_playback_ended(&mut self, now_ms: u64, reason: &str) {
        self.playback_ended_at_ms = Some(now_ms);
        self.stop_reason = Some(reason.to_string());
    }

    pub fn mark_producer_ended(&mut self, now_ms: u64, total_bytes: usize) {
        self.producer_ended_at_ms = Some(now_ms);
        self.producer_total_bytes = total_bytes;
    }

    /// Records the consumer's dequeue-buffer depth at one point in the
    /// play loop, feeding the reported queue peak/avg.
    pub fn sample_queue_len(&mut self, len: usize) {
        self.queue_peak = self.queue_peak.max(len);
        self.queue_len_sum += len as u64;
        self.queue_samples += 1;
    }

    pub fn queue_avg(&self) -> f64 {
        if self.queue_samples == 0 {
            0.0
        } else {
            self.queue_len_sum as f64 / self.queue_samples as f64
        }
    }

    pub fn first_audio_ms(&self) -> Option<u64> {
        match (self.requested_at_ms, self.first_audio_played_at_ms) {
            (Some(start), Some(first)) => Some(first.saturating_sub(start)),
            _ => None,
        }
    }

    pub fn producer_duration_ms(&self) -> Option<u64> {
        match (self.producer_connected_at_ms, self.producer_ended_at_ms) {
            (Some(start), Some(end)) => Some(end.saturating_sub(start)),
            _ => None,
        }
    }

    /// Difference between the wall-clock time playback actually took and
    /// the time it would take at exactly 20ms/frame, once `frames_played`
    /// frames have gone out. Positive means playback ran slower than ideal
    /// pacing (a net accumulation of catch-up sleeps).
    pub fn pacing_drift_ms(&self) -> Option<i64> {
        let (first, end) = (self.first_audio_played_at_ms?, self.playback_ended_at_ms?);
        let actual_ms = end.saturating_sub(first) as i64;
        let expected_ms = (self.frames_played * FRAME_MS) as i64;
        Some(actual_ms - expected_ms)
    }

    /// Time between the most recent VAD start and the end of playback, only
    /// meaningful when playback was cut short by a barge-in (`stop_reason ==
    /// "stopped"`) and that VAD start happened after this utterance began.
    pub fn barge_in_ms(&self, last_vad_start_ts_ms: u64) -> Option<u64> {
        if self.stop_reason.as_deref() != Some("stopped") {
            return None;
        }
        let requested_at = self.requested_at_ms?;
        let ended_at = self.playback_ended_at_ms?;
        if last_vad_start_ts_ms < requested_at {
            return None;
        }
        Some(ended_at.saturating_sub(last_vad_start_ts_ms))
    }

    /// Builds the `tts_stopped` telemetry payload: stop reason, timing,
    /// pacing drift, queue and producer stats, and RMS p50/p90 across
    /// everything played.
    pub fn to_stopped_payload(&self) -> Value {
        json!({
            "reason": self.stop_reason,
            "first_audio_ms": self.first_audio_ms(),
            "frames_played": self.frames_played,
            "underrun_count": self.underrun_count,
            "rms_p50": percentile(&self.rms_samples, 50.0),
            "rms_p90": percentile(&self.rms_samples, 90.0),
            "drift_ms": self.pacing_drift_ms(),
            "queue_peak": self.queue_peak,
            "queue_avg": self.queue_avg(),
            "producer_total_bytes": self.producer_total_bytes,
            "producer_duration_ms": self.producer_duration_ms(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_of_empty_is_zero() {
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn percentile_matches_known_values() {
        let values = vec![10.0, 20.0, 30.0, 40.0, 50.0];
        assert_eq!(percentile(&values, 50.0), 30.0);
        assert_eq!(percentile(&values, 0.0), 10.0);
        assert_eq!(percentile(&values, 100.0), 50.0);
    }

    #[test]
    fn first_audio_ms_is_none_until_both_timestamps_are_set() {
        let mut m = TtsMetrics::new(1000);
        assert_eq!(m.first_audio_ms(), None);
        m.mark_first_audio_played(1212);
        assert_eq!(m.first_audio_ms(), Some(212));
    }

    #[test]
    fn mark_first_audio_played_is_idempotent() {
        let mut m = TtsMetrics::new(0);
        m.mark_first_audio_played(100);
        m.mark_first_audio_played(999);
        assert_eq!(m.first_audio_played_at_ms, Some(100));
    }

    #[test]
    fn queue_peak_and_avg_track_sampled_depths() {
        let mut m = TtsMetrics::new(0);
        m.sample_queue_len(5);
        m.sample_queue_len(15);
        m.sample_queue_len(10);
        assert_eq!(m.queue_peak, 15);
        assert_eq!(m.queue_avg(), 10.0);
    }

    #[test]
    fn pacing_drift_is_zero_when_frames_played_at_exactly_20ms() {
        let mut m = TtsMetrics::new(0);
        m.mark_first_audio_played(100);
        m.frames_played = 5;
        m.mark_playback_ended(200, "completed_normally");
        assert_eq!(m.pacing_drift_ms(), Some(0));
    }

    #[test]
    fn barge_in_ms_is_none_unless_stop_reason_is_stopped() {
        let mut m = TtsMetrics::new(1000);
        m.mark_playback_ended(1500, "completed_normally");
        assert_eq!(m.barge_in_ms(1200), None);

        let mut m = TtsMetrics::new(1000);
        m.mark_playback_ended(1500, "stopped");
        assert_eq!(m.barge_in_ms(1200), Some(300));
        assert_eq!(m.barge_in_ms(500), None);
    }
}
