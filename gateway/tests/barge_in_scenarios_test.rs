//! Reproduces the barge-in gate scenarios from the spec sheet almost
//! literally: exact guard window, RMS threshold, and interim-agreement
//! window, driving [`VadManager`] directly rather than through the full
//! transport/STT stack.

use std::sync::Arc;

use gateway::orchestrator::EventSink;
use gateway::session::SessionState;
use gateway::vad_manager::{GateConfig, SuppressReason, VadAction, VadManager};
use gateway_protocol::OutboundEvent;
use gateway_vad::{VadConfig, VadError, VoicingClassifier};

struct RecordingSink {
    events: std::sync::Mutex<Vec<OutboundEvent>>,
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self {
            events: std::sync::Mutex::new(Vec::new()),
        }
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: OutboundEvent) {
        self.events.lock().unwrap().push(event);
    }
}

struct AlwaysVoiced;
impl VoicingClassifier for AlwaysVoiced {
    fn is_voiced(&mut self, _frame: &[f32]) -> Result<bool, VadError> {
        Ok(true)
    }
}

fn default_gate() -> GateConfig {
    GateConfig {
        guard_ms: 1200,
        min_rms: 1200.0,
        require_interim: true,
        interim_window_ms: 600,
        min_interim_len: 10,
        stt_enabled: true,
        stt_min_rms: 50.0,
        stt_suppression_cooldown_ms: 200,
    }
}

fn setup() -> (VadManager, Arc<SessionState>) {
    let session = Arc::new(SessionState::new("scenario".into(), 0));
    let events: Arc<dyn EventSink> = Arc::new(RecordingSink::default());
    let vad_config = VadConfig {
        frame_ms: 20,
        min_start_frames: 2,
        hangover_ms: 400,
        min_burst_frames: 2,
        max_utterance_ms: 30_000,
    };
    let manager = VadManager::new(vad_config, default_gate(), session.clone(), events);
    (manager, session)
}

/// Scenario 2: barge-in during active TTS playback, well past the guard
/// window, loud enough, with a fresh long-enough interim transcript.
#[test]
fn barge_in_during_tts_playback_is_allowed() {
    let (manager, session) = setup();
    session.arm_speaking(0);
    session.record_interim(1500, 15);

    let mut classifier = AlwaysVoiced;
    let armed_plus_guard = 1200u64;
    manager.on_frame(armed_plus_guard, 2500.0, &[0.5; 320], &mut classifier, true);
    let actions = manager.on_frame(armed_plus_guard + 20, 2500.0, &[0.5; 320], &mut classifier, true);

    assert!(actions.iter().any(|a| matches!(a, VadAction::VadStarted)));
    assert!(actions.iter().any(|a| matches!(a, VadAction::BargeIn)));
}

/// Scenario 3: same tone, but RMS 400 stays under the 1200 threshold.
#[test]
fn barge_in_suppressed_by_energy_when_quiet() {
    let (manager, session) = setup();
    session.arm_speaking(0);
    session.record_interim(1500, 15);

    let mut classifier = AlwaysVoiced;
    manager.on_frame(1200, 400.0, &[0.01; 320], &mut classifier, true);
    let actions = manager.on_frame(1220, 400.0, &[0.01; 320], &mut classifier, true);

    assert!(actions.iter().any(|a| matches!(
        a,
        VadAction::BargeInSuppressed {
            reason: SuppressReason::Energy
        }
    )));
}

/// Scenario 4: VAD start fires only 200ms after arming, well inside the
/// 1200ms guard window, even though the tone is loud enough.
#[test]
fn barge_in_suppressed_by_guard_when_too_soon() {
    let (manager, session) = setup();
    session.arm_speaking(0);
    session.record_interim(200, 15);

    let mut classifier = AlwaysVoiced;
    manager.on_frame(180, 2500.0, &[0.5; 320], &mut classifier, true);
    let actions = manager.on_frame(200, 2500.0, &[0.5; 320], &mut classifier, true);

    assert!(actions.iter().any(|a| matches!(
        a,
        VadAction::BargeInSuppressed {
            reason: SuppressReason::Guard
        }
    )));
}
