use voice_activity_detector::VoiceActivityDetector;

use crate::error::VadError;
use crate::types::VoicingClassifier;

/// Sample count the underlying Silero model is built for.
const SILERO_CHUNK_SAMPLES: usize = 512;
const DEFAULT_SPEECH_THRESHOLD: f32 = 0.5;

/// A [`VoicingClassifier`] backed by a Silero voice activity model. The
/// engine calls `is_voiced` once per 20ms frame, which at 16kHz is 320
/// samples, short of the 512 the model consumes per inference; frames are
/// accumulated into a rolling buffer and the last inference result is
/// returned between model runs.
pub struct SileroClassifier {
    detector: VoiceActivityDetector,
    threshold: f32,
    carry: Vec<f32>,
    last_decision: bool,
}

impl SileroClassifier {
    pub fn new(sample_rate: u32) -> Result<Self, VadError> {
        Self::with_threshold(sample_rate, DEFAULT_SPEECH_THRESHOLD)
    }

    pub fn with_threshold(sample_rate: u32, threshold: f32) -> Result<Self, VadError> {
        let detector = VoiceActivityDetector::builder()
            .chunk_size(SILERO_CHUNK_SAMPLES)
            .sample_rate(sample_rate as i64)
            .build()
            .map_err(|e| VadError::Classifier(e.to_string()))?;

        Ok(Self {
            detector,
            threshold,
            carry: Vec::with_capacity(SILERO_CHUNK_SAMPLES),
            last_decision: false,
        })
    }
}

impl VoicingClassifier for SileroClassifier {
    fn is_voiced(&mut self, frame: &[f32]) -> Result<bool, VadError> {
        self.carry.extend_from_slice(frame);
        while self.carry.len() >= SILERO_CHUNK_SAMPLES {
            let chunk: Vec<f32> = self.carry.drain(..SILERO_CHUNK_SAMPLES).collect();
            let probability = self.detector.predict(chunk);
            self.last_decision = probability >= self.threshold;
        }
        Ok(self.last_decision)
    }
}
