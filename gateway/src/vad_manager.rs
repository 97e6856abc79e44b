use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use gateway_protocol::OutboundEvent;
use gateway_vad::{VadConfig, VadEngine, VadEvent, VadError, VoicingClassifier};
use log::debug;

use crate::orchestrator::{EventSink, FeatureCoalescer};
use crate::session::state::SessionState;
use crate::tts::metrics::percentile;

/// Which gate rejected a barge-in attempt, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    Guard,
    Energy,
    Interim,
}

/// What the caller (session controller) should do in response to one frame
/// of VAD processing. Kept IO-free so the gating logic itself is testable
/// without mocking a transport or an STT client.
#[derive(Debug, Clone, PartialEq)]
pub enum VadAction {
    VadStarted,
    VadEnded { forced_by_max_utterance: bool },
    StartSttUtterance,
    EndSttUtterance,
    BargeIn,
    BargeInSuppressed { reason: SuppressReason },
}

/// Tuning knobs for the barge-in gate and STT utterance boundary logic,
/// mirroring the orchestrator's `arm_barge_in` command and the STT
/// suppression-cooldown knob.
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub guard_ms: u32,
    pub min_rms: f32,
    pub require_interim: bool,
    pub interim_window_ms: u32,
    pub min_interim_len: usize,
    pub stt_enabled: bool,
    pub stt_min_rms: f32,
    pub stt_suppression_cooldown_ms: u32,
    pub orch_feature_interval_ms: u64,
}

/// Combines the start/end state machine with the barge-in gate and STT
/// utterance boundary management described for the audio pipeline's
/// control path.
pub struct VadManager {
    engine: std::sync::Mutex<VadEngine>,
    session: Arc<SessionState>,
    events: Arc<dyn EventSink>,
    feature_coalescer: std::sync::Mutex<FeatureCoalescer>,
    gate: std::sync::Mutex<GateConfig>,
    last_stt_start_ms: AtomicU64,
    last_rms_sample_ms: AtomicU64,
}

impl VadManager {
    pub fn new(
        vad_config: VadConfig,
        gate: GateConfig,
        session: Arc<SessionState>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let feature_coalescer = FeatureCoalescer::new(gate.orch_feature_interval_ms);
        Self {
            engine: std::sync::Mutex::new(VadEngine::new(vad_config)),
            session,
            events,
            feature_coalescer: std::sync::Mutex::new(feature_coalescer),
            gate: std::sync::Mutex::new(gate),
            last_stt_start_ms: AtomicU64::new(0),
            last_rms_sample_ms: AtomicU64::new(0),
        }
    }

    /// Applied when the orchestrator sends `arm_barge_in`: a zero value
    /// leaves the corresponding knob unchanged.
    pub fn apply_arm_barge_in(&self, guard_ms: u32, min_rms: f32) {
        let mut gate = self.gate.lock().unwrap();
        if guard_ms != 0 {
            gate.guard_ms = guard_ms;
        }
        if min_rms != 0.0 {
            gate.min_rms = min_rms;
        }
    }

    pub fn set_min_start_frames(&self, frames: u32) {
        self.engine.lock().unwrap().set_min_start_frames(frames);
    }

    /// Processes one frame: classifies voicing (treating a classifier
    /// error as unvoiced), advances the state machine, and returns the
    /// actions the caller must carry out.
    pub fn on_frame(
        &self,
        now_ms: u64,
        rms: f32,
        frame_f32: &[f32],
        classifier: &mut dyn VoicingClassifier,
        tts_active: bool,
    ) -> Vec<VadAction> {
        let mut actions = Vec::new();

        if let Some(v) = self.feature_coalescer.lock().unwrap().offer(now_ms, rms) {
            self.events.emit(OutboundEvent::Feature { rms: v });
        }

        if self.session.is_speaking() {
            let last = self.last_rms_sample_ms.load(Ordering::Acquire);
            if now_ms.saturating_sub(last) >= 1000 {
                self.session.push_rms_sample(rms);
                self.last_rms_sample_ms.store(now_ms, Ordering::Release);
            }
        }

        let voiced = match classifier.is_voiced(frame_f32) {
            Ok(v) => v,
            Err(e) => {
                debug!("voicing classifier error, treating frame as unvoiced: {e}");
                false
            }
        };

        match self.engine.lock().unwrap().process_frame(voiced) {
            Some(VadEvent::Start) => {
                self.session.vad_counters.starts_total.fetch_add(1, Ordering::Relaxed);
                self.session.set_speaking(true, now_ms);
                actions.push(VadAction::VadStarted);
                actions.extend(self.evaluate_start(now_ms, rms, tts_active));
            }
            Some(VadEvent::End {
                forced_by_max_utterance,
            }) => {
                self.session.set_speaking(false, now_ms);
                actions.push(VadAction::VadEnded {
                    forced_by_max_utterance,
                });
                actions.push(VadAction::EndSttUtterance);
            }
            None => {}
        }

        actions
    }

    fn evaluate_start(&self, now_ms: u64, rms: f32, tts_active: bool) -> Vec<VadAction> {
        let mut actions = Vec::new();
        let gate = self.gate.lock().unwrap().clone();

        if tts_active {
            let guard_ok = self
                .session
                .ms_since_armed(now_ms)
                .map(|elapsed| elapsed >= gate.guard_ms as u64)
                .unwrap_or(true);
            let dyn_threshold = gate
                .min_rms
                .max(percentile(&self.session.rms_samples(), 90.0) * 1.5 + 200.0);
            let energy_ok = rms >= dyn_threshold;
            let interim_ok = if gate.require_interim {
                self.session
                    .interim_agrees(now_ms, gate.interim_window_ms as u64, gate.min_interim_len)
            } else {
                true
            };

            if !guard_ok {
                self.session
                    .vad_counters
                    .suppressed_guard
                    .fetch_add(1, Ordering::Relaxed);
                actions.push(VadAction::BargeInSuppressed {
                    reason: SuppressReason::Guard,
                });
            } else if !energy_ok {
                self.session
                    .vad_counters
                    .suppressed_energy
                    .fetch_add(1, Ordering::Relaxed);
                actions.push(VadAction::BargeInSuppressed {
                    reason: SuppressReason::Energy,
                });
            } else if !interim_ok {
                self.session
                    .vad_counters
                    .suppressed_minframes
                    .fetch_add(1, Ordering::Relaxed);
                actions.push(VadAction::BargeInSuppressed {
                    reason: SuppressReason::Interim,
                });
            } else {
                self.session
                    .vad_counters
                    .stops_allowed
                    .fetch_add(1, Ordering::Relaxed);
                actions.push(VadAction::BargeIn);
            }
        }

        if gate.stt_enabled {
            let last_start = self.last_stt_start_ms.load(Ordering::Acquire);
            let cooldown_elapsed =
                now_ms.saturating_sub(last_start) >= gate.stt_suppression_cooldown_ms as u64;
            let bypasses_cooldown = rms >= gate.stt_min_rms * 2.0;
            if cooldown_elapsed || bypasses_cooldown {
                self.last_stt_start_ms.store(now_ms, Ordering::Release);
                actions.push(VadAction::StartSttUtterance);
            }
        }

        actions
    }
}

/// Computes RMS of little-endian 16-bit PCM, as a convenience for callers
/// feeding raw transport frames into [`VadManager::on_frame`].
pub fn rms_of_pcm16(bytes: &[u8]) -> f32 {
    let samples: Vec<i16> = bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect();
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    ((sum_sq / samples.len() as f64).sqrt()) as f32
}
