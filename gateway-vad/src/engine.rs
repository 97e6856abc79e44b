use crate::types::{VadConfig, VadEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Speaking,
}

/// Start/end-of-speech state machine over a stream of per-frame voicing
/// decisions.
///
/// Starting speech requires `min_start_frames` consecutive voiced frames.
/// Ending speech requires both `hangover_ms` of trailing silence *and*
/// `min_burst_frames` of total speech duration, so a single long unvoiced
/// gap shortly after a very short burst doesn't end the utterance before it
/// has had a chance to continue. `max_utterance_ms` is a safety valve that
/// forces an end regardless of voicing once an utterance has run that long.
pub struct VadEngine {
    config: VadConfig,
    state: State,
    consecutive_voiced: u32,
    consecutive_unvoiced: u32,
    speaking_frames: u32,
    ms_since_start: u64,
}

impl VadEngine {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            state: State::Idle,
            consecutive_voiced: 0,
            consecutive_unvoiced: 0,
            speaking_frames: 0,
            ms_since_start: 0,
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.state == State::Speaking
    }

    /// Overrides `min_start_frames`, used to raise the start threshold
    /// while the bot's own TTS is playing so transport echo doesn't
    /// trigger a false start.
    pub fn set_min_start_frames(&mut self, frames: u32) {
        self.config.min_start_frames = frames;
    }

    fn hangover_frames(&self) -> u32 {
        let frame_ms = self.config.frame_ms.max(1);
        self.config.hangover_ms.div_ceil(frame_ms)
    }

    /// Feeds one frame's voicing decision. A classifier error should be
    /// passed through as `voiced = false`: the caller treats a failed
    /// classification as silence rather than propagating it into the state
    /// machine as a distinct condition.
    pub fn process_frame(&mut self, voiced: bool) -> Option<VadEvent> {
        match self.state {
            State::Idle => {
                if voiced {
                    self.consecutive_voiced += 1;
                } else {
                    self.consecutive_voiced = 0;
                }

                if self.consecutive_voiced >= self.config.min_start_frames.max(1) {
                    self.state = State::Speaking;
                    self.consecutive_voiced = 0;
                    self.consecutive_unvoiced = 0;
                    self.speaking_frames = 1;
                    self.ms_since_start = self.config.frame_ms as u64;
                    Some(VadEvent::Start)
                } else {
                    None
                }
            }
            State::Speaking => {
                self.speaking_frames += 1;
                self.ms_since_start += self.config.frame_ms as u64;

                if voiced {
                    self.consecutive_unvoiced = 0;
                } else {
                    self.consecutive_unvoiced += 1;
                }

                if self.ms_since_start >= self.config.max_utterance_ms as u64 {
                    self.reset_to_idle();
                    return Some(VadEvent::End {
                        forced_by_max_utterance: true,
                    });
                }

                let hangover_elapsed = self.consecutive_unvoiced >= self.hangover_frames();
                let min_burst_elapsed = self.speaking_frames >= self.config.min_burst_frames.max(1);
                if hangover_elapsed && min_burst_elapsed {
                    self.reset_to_idle();
                    return Some(VadEvent::End {
                        forced_by_max_utterance: false,
                    });
                }

                None
            }
        }
    }

    fn reset_to_idle(&mut self) {
        self.state = State::Idle;
        self.consecutive_voiced = 0;
        self.consecutive_unvoiced = 0;
        self.speaking_frames = 0;
        self.ms_since_start = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> VadConfig {
        VadConfig {
            frame_ms: 20,
            min_start_frames: 3,
            hangover_ms: 100,
            min_burst_frames: 4,
            max_utterance_ms: 1000,
        }
    }

    #[test]
    fn start_requires_consecutive_voiced_frames() {
        let mut engine = VadEngine::new(config());
        assert_eq!(engine.process_frame(true), None);
        assert_eq!(engine.process_frame(true), None);
        assert_eq!(engine.process_frame(true), Some(VadEvent::Start));
        assert!(engine.is_speaking());
    }

    #[test]
    fn a_single_unvoiced_frame_resets_the_start_counter() {
        let mut engine = VadEngine::new(config());
        engine.process_frame(true);
        engine.process_frame(true);
        engine.process_frame(false);
        assert_eq!(engine.process_frame(true), None);
        assert_eq!(engine.process_frame(true), None);
        assert_eq!(engine.process_frame(true), Some(VadEvent::Start));
    }

    #[test]
    fn end_requires_both_hangover_and_min_burst() {
        let mut engine = VadEngine::new(config());
        for _ in 0..3 {
            engine.process_frame(true);
        }
        // speaking_frames == 1 after Start; need 4 total for min_burst.
        // hangover needs 5 unvoiced frames (100ms / 20ms).
        assert_eq!(engine.process_frame(false), None); // speaking_frames=2
        assert_eq!(engine.process_frame(false), None); // speaking_frames=3
        assert_eq!(engine.process_frame(false), None); // speaking_frames=4, unvoiced=3
        assert_eq!(engine.process_frame(false), None); // unvoiced=4
        assert_eq!(
            engine.process_frame(false),
            Some(VadEvent::End {
                forced_by_max_utterance: false
            })
        );
        assert!(!engine.is_speaking());
    }

    #[test]
    fn hangover_elapsed_but_burst_too_short_does_not_end() {
        let mut cfg = config();
        cfg.min_burst_frames = 20;
        let mut engine = VadEngine::new(cfg);
        for _ in 0..3 {
            engine.process_frame(true);
        }
        for _ in 0..10 {
            assert_eq!(engine.process_frame(false), None);
        }
        assert!(engine.is_speaking());
    }

    #[test]
    fn max_utterance_forces_end_under_continuous_voicing() {
        let mut cfg = config();
        cfg.max_utterance_ms = 100;
        let mut engine = VadEngine::new(cfg);
        for _ in 0..3 {
            engine.process_frame(true);
        }
        // Start consumed frame_ms=20ms already; 4 more voiced frames reach 100ms.
        assert_eq!(engine.process_frame(true), None);
        assert_eq!(engine.process_frame(true), None);
        assert_eq!(engine.process_frame(true), None);
        assert_eq!(
            engine.process_frame(true),
            Some(VadEvent::End {
                forced_by_max_utterance: true
            })
        );
    }

    #[test]
    fn raising_min_start_frames_delays_the_next_start() {
        let mut engine = VadEngine::new(config());
        engine.set_min_start_frames(5);
        for _ in 0..4 {
            assert_eq!(engine.process_frame(true), None);
        }
        assert_eq!(engine.process_frame(true), Some(VadEvent::Start));
    }
}
