use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Counters tracked for observability of the barge-in gate, named after
/// the suppression reason they record.
#[derive(Default)]
pub struct VadCounters {
    pub starts_total: AtomicU64,
    pub stops_allowed: AtomicU64,
    pub suppressed_guard: AtomicU64,
    pub suppressed_energy: AtomicU64,
    pub suppressed_minframes: AtomicU64,
}

const ROLLING_RMS_CAPACITY: usize = 64;

/// Per-session mutable state shared between the transport's audio callback
/// thread and the async session controller. Fields touched from the audio
/// thread are atomics rather than behind a single coarse lock, so a busy
/// controller never blocks audio delivery.
pub struct SessionState {
    pub session_id: String,

    speaking: AtomicBool,
    speaking_armed: AtomicBool,
    speaking_armed_ts_ms: AtomicU64,
    last_vad_start_ts_ms: AtomicU64,
    last_interim_ts_ms: AtomicU64,
    last_interim_len: AtomicUsize,
    tts_stop_emitted: AtomicBool,
    last_activity_ms: AtomicU64,

    current_utterance_id: Mutex<Option<String>>,
    rolling_rms: Mutex<VecDeque<f32>>,

    pub vad_counters: VadCounters,
}

impl SessionState {
    pub fn new(session_id: String, now_ms: u64) -> Self {
        Self {
            session_id,
            speaking: AtomicBool::new(false),
            speaking_armed: AtomicBool::new(false),
            speaking_armed_ts_ms: AtomicU64::new(0),
            last_vad_start_ts_ms: AtomicU64::new(0),
            last_interim_ts_ms: AtomicU64::new(0),
            last_interim_len: AtomicUsize::new(0),
            tts_stop_emitted: AtomicBool::new(false),
            last_activity_ms: AtomicU64::new(now_ms),
            current_utterance_id: Mutex::new(None),
            rolling_rms: Mutex::new(VecDeque::with_capacity(ROLLING_RMS_CAPACITY)),
            vad_counters: VadCounters::default(),
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::Acquire)
    }

    pub fn set_speaking(&self, speaking: bool, now_ms: u64) {
        self.speaking.store(speaking, Ordering::Release);
        if speaking {
            self.last_vad_start_ts_ms.store(now_ms, Ordering::Release);
        }
    }

    pub fn last_vad_start_ts_ms(&self) -> u64 {
        self.last_vad_start_ts_ms.load(Ordering::Acquire)
    }

    /// Marks the moment TTS playback is confirmed live (first frame played
    /// to the transport), arming the local barge-in guard window.
    pub fn arm_speaking(&self, now_ms: u64) {
        self.speaking_armed.store(true, Ordering::Release);
        self.speaking_armed_ts_ms.store(now_ms, Ordering::Release);
        self.tts_stop_emitted.store(false, Ordering::Release);
    }

    pub fn disarm_speaking(&self) {
        self.speaking_armed.store(false, Ordering::Release);
    }

    pub fn speaking_armed(&self) -> bool {
        self.speaking_armed.load(Ordering::Acquire)
    }

    pub fn speaking_armed_ts_ms(&self) -> u64 {
        self.speaking_armed_ts_ms.load(Ordering::Acquire)
    }

    /// Elapsed time since arming, or `None` if never armed.
    pub fn ms_since_armed(&self, now_ms: u64) -> Option<u64> {
        if !self.speaking_armed() {
            return None;
        }
        let armed_ts = self.speaking_armed_ts_ms.load(Ordering::Acquire);
        Some(now_ms.saturating_sub(armed_ts))
    }

    /// Single-shot latch: returns `true` exactly once per arm/disarm cycle,
    /// on the first call after arming.
    pub fn try_emit_tts_stop_once(&self) -> bool {
        self.tts_stop_emitted
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn record_interim(&self, now_ms: u64, text_len: usize) {
        self.last_interim_ts_ms.store(now_ms, Ordering::Release);
        self.last_interim_len.store(text_len, Ordering::Release);
    }

    /// True if an interim transcript arrived within `window_ms` of `now_ms`
    /// and was at least `min_len` characters long.
    pub fn interim_agrees(&self, now_ms: u64, window_ms: u64, min_len: usize) -> bool {
        let ts = self.last_interim_ts_ms.load(Ordering::Acquire);
        if ts == 0 {
            return false;
        }
        let fresh = now_ms.saturating_sub(ts) <= window_ms;
        let long_enough = self.last_interim_len.load(Ordering::Acquire) >= min_len;
        fresh && long_enough
    }

    pub fn touch_activity(&self, now_ms: u64) {
        self.last_activity_ms.store(now_ms, Ordering::Release);
    }

    pub fn idle_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_activity_ms.load(Ordering::Acquire))
    }

    pub fn new_utterance_id(&self, now_ms: u64) -> String {
        let id = format!("u-{now_ms}-{}", uuid::Uuid::new_v4());
        *self.current_utterance_id.lock().unwrap() = Some(id.clone());
        id
    }

    pub fn current_utterance_id(&self) -> Option<String> {
        self.current_utterance_id.lock().unwrap().clone()
    }

    /// Records an RMS sample, keeping at most the most recent
    /// `ROLLING_RMS_CAPACITY` values for percentile computation.
    pub fn push_rms_sample(&self, rms: f32) {
        let mut samples = self.rolling_rms.lock().unwrap();
        if samples.len() == ROLLING_RMS_CAPACITY {
            samples.pop_front();
        }
        samples.push_back(rms);
    }

    pub fn rms_samples(&self) -> Vec<f32> {
        self.rolling_rms.lock().unwrap().iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tts_stop_emits_exactly_once_per_arm_cycle() {
        let state = SessionState::new("s".into(), 0);
        state.arm_speaking(0);
        assert!(state.try_emit_tts_stop_once());
        assert!(!state.try_emit_tts_stop_once());
        state.disarm_speaking();
        state.arm_speaking(100);
        assert!(state.try_emit_tts_stop_once());
    }

    #[test]
    fn interim_agrees_requires_freshness_and_length() {
        let state = SessionState::new("s".into(), 0);
        assert!(!state.interim_agrees(1000, 600, 10));
        state.record_interim(900, 12);
        assert!(state.interim_agrees(1000, 600, 10));
        assert!(!state.interim_agrees(2000, 600, 10));
        state.record_interim(900, 3);
        assert!(!state.interim_agrees(1000, 600, 10));
    }

    #[test]
    fn rolling_rms_drops_oldest_past_capacity() {
        let state = SessionState::new("s".into(), 0);
        for i in 0..(ROLLING_RMS_CAPACITY + 5) {
            state.push_rms_sample(i as f32);
        }
        let samples = state.rms_samples();
        assert_eq!(samples.len(), ROLLING_RMS_CAPACITY);
        assert_eq!(samples[0], 5.0);
    }

    #[test]
    fn utterance_ids_are_monotonic_in_their_timestamp() {
        let state = SessionState::new("s".into(), 0);
        let a = state.new_utterance_id(1000);
        let b = state.new_utterance_id(2000);
        assert_ne!(a, b);
        assert_eq!(state.current_utterance_id(), Some(b));
    }
}
