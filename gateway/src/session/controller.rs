use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gateway_protocol::{InboundCommand, OutboundEvent, SttServerMessage};
use log::{info, warn};
use tokio::time::interval;

use crate::audio_pipeline::AudioPipeline;
use crate::config::Config;
use crate::error::GatewayError;
use crate::observer::Telemetry;
use crate::orchestrator::{EventSink, NullEventSink, OrchestratorClient};
use crate::session::state::SessionState;
use crate::stt_client::SttClient;
use crate::time::now_ms;
use crate::transport::{FrameSink, RoomClient};
use crate::tts::TtsPipeline;
use crate::vad_manager::VadAction;

const IDLE_TICK: Duration = Duration::from_secs(1);

/// Accumulates debounced `start_tts` requests: text arriving while an
/// utterance is in flight is appended (space-joined) rather than
/// interrupting it, and flushed as one utterance once the debounce window
/// elapses with no further input.
#[derive(Default)]
pub struct DebounceAccumulator {
    pending: Option<String>,
    last_append_ms: u64,
}

impl DebounceAccumulator {
    pub fn push(&mut self, text: &str, now_ms: u64) {
        match &mut self.pending {
            Some(existing) => {
                existing.push(' ');
                existing.push_str(text);
            }
            None => self.pending = Some(text.to_string()),
        }
        self.last_append_ms = now_ms;
    }

    pub fn is_ready(&self, now_ms: u64, debounce_ms: u64) -> bool {
        self.pending.is_some() && now_ms.saturating_sub(self.last_append_ms) >= debounce_ms
    }

    pub fn take(&mut self) -> Option<String> {
        self.pending.take()
    }
}

/// Owns the lifecycle of one room session: join, optional orchestrator
/// connection, wiring the VAD/STT/TTS collaborators, and the idle loop that
/// exits the process after a period with no participant and no activity.
pub struct SessionController {
    pub session: Arc<SessionState>,
    pub config: Arc<Config>,
    pub room: Arc<dyn RoomClient>,
    pub sink: Arc<dyn FrameSink>,
    pub orchestrator: Option<Arc<OrchestratorClient>>,
    pub tts: TtsPipeline,
    pub tts_stop_flag: Arc<AtomicBool>,
    telemetry: Arc<dyn Telemetry>,
    audio: AudioPipeline,
    debounce: DebounceAccumulator,
}

impl SessionController {
    pub fn new(
        session: Arc<SessionState>,
        config: Arc<Config>,
        room: Arc<dyn RoomClient>,
        sink: Arc<dyn FrameSink>,
        orchestrator: Option<Arc<OrchestratorClient>>,
        stt: Option<Arc<SttClient>>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Result<Self, GatewayError> {
        let tts = TtsPipeline::new(
            config.tts_addr.clone(),
            config.tts_read_timeout(),
            config.tts_total_timeout(),
            config.tts_prebuffer_timeout(),
            config.tts_max_bytes,
            config.tts_prebuffer_frames,
        );
        let events: Arc<dyn EventSink> = match &orchestrator {
            Some(orch) => orch.clone(),
            None => Arc::new(NullEventSink),
        };
        let audio = AudioPipeline::new(&config, session.clone(), events, stt, telemetry.clone())?;
        Ok(Self {
            session,
            config,
            room,
            sink,
            orchestrator,
            tts,
            tts_stop_flag: Arc::new(AtomicBool::new(false)),
            telemetry,
            audio,
            debounce: DebounceAccumulator::default(),
        })
    }

    /// Drains every remote audio frame currently queued by the transport
    /// and runs each through the audio pipeline, applying any barge-in
    /// decision to the TTS stop flag.
    pub fn drive_audio(&mut self, now_ms: u64) {
        while let Some(pcm48k) = self.room.try_recv_remote_frame() {
            match self.audio.process_remote_frame(&pcm48k, now_ms) {
                Ok(actions) => {
                    if actions.iter().any(|a| matches!(a, VadAction::BargeIn)) {
                        self.tts_stop_flag.store(true, Ordering::Release);
                    }
                }
                Err(e) => warn!("audio pipeline error: {e}"),
            }
        }
    }

    /// Drains every pending STT sidecar message, records interim transcripts
    /// against the barge-in agreement window, and forwards transcripts and
    /// errors to the orchestrator.
    pub fn drive_stt(&mut self, now_ms: u64) {
        while let Some(msg) = self.audio.try_recv_stt() {
            match msg {
                SttServerMessage::Interim { utterance_id, text } => {
                    self.session.record_interim(now_ms, text.len());
                    if let Some(orch) = &self.orchestrator {
                        orch.emit(OutboundEvent::TranscriptInterim { utterance_id, text });
                    }
                }
                SttServerMessage::Final { utterance_id, text } => {
                    if let Some(orch) = &self.orchestrator {
                        orch.emit(OutboundEvent::TranscriptFinal { utterance_id, text });
                    }
                }
                SttServerMessage::Error { enum_code, message } => {
                    warn!("stt sidecar reported error {enum_code}: {message}");
                }
            }
        }
    }

    pub fn join(&self, room_url: &str, token: Option<&str>) -> Result<(), GatewayError> {
        url::Url::parse(room_url)
            .map_err(|e| GatewayError::RoomJoinFailed(format!("invalid room URL: {e}")))?;
        self.room.join(room_url, token)?;
        if !self.room.disable_audio_processing() {
            warn!("room transport kept default audio processing enabled");
        }
        if let Some(orch) = &self.orchestrator {
            orch.emit(OutboundEvent::SessionOpen {
                session_id: self.session.session_id.clone(),
                room_url: room_url.to_string(),
            });
        }
        Ok(())
    }

    pub fn wait_for_participant(&self) -> bool {
        self.room
            .wait_for_participant(Duration::from_secs(self.config.bot_participant_timeout_seconds))
    }

    /// Speaks `text` as a greeting or any other orchestrator-triggered
    /// utterance, waiting for playback to finish.
    pub async fn speak(&mut self, text: String) {
        self.session.new_utterance_id(now_ms());
        let events: Arc<dyn EventSink> = match &self.orchestrator {
            Some(orch) => orch.clone(),
            None => return,
        };
        let outcome = self
            .tts
            .speak(
                text,
                self.tts_stop_flag.clone(),
                self.session.clone(),
                self.sink.clone(),
                events,
                self.telemetry.clone(),
            )
            .await;
        info!("tts playback ended: {}", outcome.stop_reason);
    }

    /// Handles an inbound orchestrator command outside of barge-in
    /// gating (barge-in itself is driven by [`crate::vad_manager::VadManager`]).
    pub fn handle_command(&mut self, cmd: InboundCommand, now_ms: u64) {
        match cmd {
            InboundCommand::ArmBargeIn { guard_ms, min_rms } => {
                self.audio.apply_arm_barge_in(guard_ms, min_rms);
            }
            InboundCommand::StartMicToStt | InboundCommand::StopMicToStt => {
                // STT is always fed while the session is speaking; these
                // commands are accepted for protocol compatibility but the
                // audio pipeline's own `stt_enabled` config knob governs it.
            }
            InboundCommand::StartTts { text } => {
                // Always queued through the debounce accumulator, including
                // mid-utterance: it flushes as a new utterance once the
                // current one ends rather than interrupting it.
                self.debounce.push(&text, now_ms);
            }
            InboundCommand::StopTts => {
                self.tts_stop_flag.store(true, Ordering::Release);
            }
        }
    }

    /// One idle-loop tick: refreshes activity while speech is in flight,
    /// flushes a ready debounce buffer, and reports whether the process
    /// should exit (nothing speaking and idle for too long, or a hard
    /// stay-connected cap has also elapsed).
    pub async fn tick(&mut self) -> TickOutcome {
        let now = now_ms();
        if self.session.is_speaking() || self.session.current_utterance_id().is_some() {
            self.session.touch_activity(now);
        }

        if self.debounce.is_ready(now, self.config.tts_llm_accum_debounce_ms as u64) {
            if let Some(text) = self.debounce.take() {
                self.speak(text).await;
            }
        }

        let idle_for_s = self.session.idle_ms(now) / 1000;
        let nothing_speaking = !self.session.is_speaking();
        let idle_exit = nothing_speaking && idle_for_s >= self.config.bot_idle_exit_seconds;
        let stay_connected_cap_hit = self
            .config
            .bot_stay_connected_seconds
            .is_some_and(|cap| idle_for_s >= cap);
        if nothing_speaking && (idle_exit || stay_connected_cap_hit) {
            return TickOutcome::Exit;
        }
        TickOutcome::Continue
    }

    pub fn idle_tick_interval(&self) -> tokio::time::Interval {
        interval(IDLE_TICK)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Exit,
}
