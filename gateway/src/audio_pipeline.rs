use std::sync::Arc;

use gateway_audio::{
    f32_to_pcm16_bytes, pcm16_bytes_to_f32, Frame, FrameBatcher, Resampler, RingBuffer, FRAME_MS,
};
use gateway_vad::{SileroClassifier, VadConfig, VoicingClassifier};
use log::{debug, warn};

use crate::config::Config;
use crate::error::GatewayError;
use crate::observer::Telemetry;
use crate::orchestrator::EventSink;
use crate::session::state::SessionState;
use crate::stt_client::SttClient;
use crate::vad_manager::{rms_of_pcm16, GateConfig, SuppressReason, VadAction, VadManager};

const STT_SAMPLE_RATE: u32 = 16_000;

/// Bridges raw 48kHz transport frames into the VAD/STT/barge-in control
/// path: resampling to the STT sample rate, retaining pre-speech audio for
/// lookback, classifying voicing, and applying the resulting [`VadAction`]s
/// to the STT sidecar client and the TTS stop flag.
pub struct AudioPipeline {
    resampler: Resampler,
    ring_buffer: RingBuffer,
    batcher: FrameBatcher,
    classifier: Box<dyn VoicingClassifier + Send>,
    vad: VadManager,
    session: Arc<SessionState>,
    stt: Option<Arc<SttClient>>,
    telemetry: Arc<dyn Telemetry>,
    gain: f32,
    stt_enabled: bool,
    seq: u64,
}

impl AudioPipeline {
    pub fn new(
        config: &Config,
        session: Arc<SessionState>,
        events: Arc<dyn EventSink>,
        stt: Option<Arc<SttClient>>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Result<Self, GatewayError> {
        let resampler = Resampler::transport_to_stt()?;
        let ring_buffer =
            RingBuffer::new(config.ring_buffer_ms, config.ring_buffer_hard_cap_ms, FRAME_MS);
        let batcher = FrameBatcher::new(config.stt_batch_ms);
        let classifier = Box::new(SileroClassifier::new(STT_SAMPLE_RATE)?);

        let vad_config = VadConfig {
            frame_ms: FRAME_MS,
            min_start_frames: 2,
            hangover_ms: config.worker_vad_hangover_ms,
            min_burst_frames: 5,
            max_utterance_ms: config.worker_vad_max_utterance_ms,
        };
        let gate = GateConfig {
            guard_ms: config.local_stop_guard_ms,
            min_rms: config.local_stop_min_rms,
            require_interim: config.local_stop_require_interim,
            interim_window_ms: config.local_stop_interim_window_ms,
            min_interim_len: config.local_stop_min_interim_len,
            stt_enabled: config.stt_enabled,
            stt_min_rms: config.stt_min_rms,
            stt_suppression_cooldown_ms: config.stt_suppression_cooldown_ms,
            orch_feature_interval_ms: config.orch_feature_interval().as_millis() as u64,
        };
        let vad = VadManager::new(vad_config, gate, session.clone(), events);

        Ok(Self {
            resampler,
            ring_buffer,
            batcher,
            classifier,
            vad,
            session,
            stt,
            telemetry,
            gain: config.audio_input_gain,
            stt_enabled: config.stt_enabled,
            seq: 0,
        })
    }

    /// Processes one 20ms/48kHz mono PCM16 frame of remote participant
    /// audio. Whether TTS is currently armed (playing) gates both the input
    /// gain (never boosted while the bot's own speech is live, to avoid
    /// amplifying transport echo) and the stricter start-of-speech
    /// threshold the barge-in gate uses.
    pub fn process_remote_frame(
        &mut self,
        pcm48k: &[u8],
        now_ms: u64,
    ) -> Result<Vec<VadAction>, GatewayError> {
        let tts_active = self.session.speaking_armed();
        self.vad
            .set_min_start_frames(if tts_active { 10 } else { 2 });

        let mut samples = pcm16_bytes_to_f32(pcm48k);
        crate::transport::format::apply_input_gain(&mut samples, if tts_active { 1.0 } else { self.gain });
        let gained_bytes = f32_to_pcm16_bytes(&samples);

        self.seq += 1;
        let frame = Frame::new(gained_bytes, now_ms, self.seq)?;
        let evicted = self.ring_buffer.push(frame);
        if evicted > 0 {
            debug!("ring buffer hard cap evicted {evicted} frame(s)");
        }

        let resampled = self.resampler.process(&samples)?;
        let resampled_bytes = f32_to_pcm16_bytes(&resampled);
        let rms = rms_of_pcm16(&resampled_bytes);

        let actions = self
            .vad
            .on_frame(now_ms, rms, &resampled, self.classifier.as_mut(), tts_active);

        for action in &actions {
            self.apply_action(action, now_ms)?;
        }

        if self.stt_enabled && self.session.is_speaking() {
            self.batcher.add(&resampled_bytes);
            while let Some(chunk) = self.batcher.emit_ready() {
                self.send_stt_audio(chunk)?;
            }
        }

        Ok(actions)
    }

    /// Forwards an `arm_barge_in` orchestrator command to the barge-in gate.
    pub fn apply_arm_barge_in(&self, guard_ms: u32, min_rms: f32) {
        self.vad.apply_arm_barge_in(guard_ms, min_rms);
    }

    /// Drains pending messages from the STT sidecar, if one is connected.
    pub fn try_recv_stt(&self) -> Option<gateway_protocol::SttServerMessage> {
        self.stt.as_ref().and_then(|stt| stt.try_recv())
    }

    fn apply_action(&mut self, action: &VadAction, now_ms: u64) -> Result<(), GatewayError> {
        match *action {
            VadAction::VadStarted => {
                self.telemetry.emit("vad_start", None, serde_json::json!({}));
            }
            VadAction::VadEnded {
                forced_by_max_utterance,
            } => {
                self.telemetry.emit(
                    "vad_end",
                    self.session.current_utterance_id(),
                    serde_json::json!({ "forced_by_max_utterance": forced_by_max_utterance }),
                );
                if let Some(chunk) = self.batcher.flush() {
                    self.send_stt_audio(chunk)?;
                }
            }
            VadAction::StartSttUtterance => {
                self.replay_pre_speech(now_ms)?;
                let utterance_id = self.session.new_utterance_id(now_ms);
                if let Some(stt) = &self.stt {
                    stt.start_utterance(&self.session.session_id, &utterance_id)?;
                }
            }
            VadAction::EndSttUtterance => {
                if let Some(stt) = &self.stt {
                    stt.end_utterance()?;
                }
            }
            VadAction::BargeIn => {
                debug!("barge-in gate passed, stopping active TTS playback");
            }
            VadAction::BargeInSuppressed { reason } => {
                let reason_str = match reason {
                    SuppressReason::Guard => "guard",
                    SuppressReason::Energy => "energy",
                    SuppressReason::Interim => "interim",
                };
                debug!("barge-in suppressed by {reason_str} gate");
            }
        }
        Ok(())
    }

    /// Flushes whatever pre-speech audio the ring buffer retained,
    /// resampled and batched, so the STT sidecar sees the lead-in to the
    /// utterance rather than only audio from the moment VAD confirmed it.
    fn replay_pre_speech(&mut self, _now_ms: u64) -> Result<(), GatewayError> {
        let frames = self.ring_buffer.flush_all();
        for frame in frames {
            let samples = pcm16_bytes_to_f32(&frame.data);
            match self.resampler.process(&samples) {
                Ok(resampled) => self.batcher.add(&f32_to_pcm16_bytes(&resampled)),
                Err(e) => warn!("failed to resample pre-speech frame: {e}"),
            }
        }
        while let Some(chunk) = self.batcher.emit_ready() {
            self.send_stt_audio(chunk)?;
        }
        Ok(())
    }

    fn send_stt_audio(&self, chunk: Vec<u8>) -> Result<(), GatewayError> {
        if let Some(stt) = &self.stt {
            let duration_ms = (chunk.len() / 32) as u32;
            stt.send_audio(chunk, duration_ms)?;
        }
        Ok(())
    }
}
