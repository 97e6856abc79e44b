use crate::error::VadError;

/// A black-box per-frame voicing decision. The engine doesn't care whether
/// the implementation is an energy threshold, a neural VAD model, or a
/// fixture in tests — only whether a frame was voiced.
pub trait VoicingClassifier {
    fn is_voiced(&mut self, frame: &[f32]) -> Result<bool, VadError>;
}

/// Tuning knobs for [`crate::engine::VadEngine`].
#[derive(Debug, Clone, Copy)]
pub struct VadConfig {
    pub frame_ms: u32,
    pub min_start_frames: u32,
    pub hangover_ms: u32,
    pub min_burst_frames: u32,
    pub max_utterance_ms: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            frame_ms: 20,
            min_start_frames: 2,
            hangover_ms: 400,
            min_burst_frames: 5,
            max_utterance_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEvent {
    /// Emitted the frame that `min_start_frames` consecutive voiced frames
    /// is reached.
    Start,
    /// Emitted when speech ends, either because enough trailing silence
    /// accumulated (`forced_by_max_utterance: false`) or because the
    /// utterance hit its safety-valve duration while still voiced.
    End { forced_by_max_utterance: bool },
}
