pub mod consumer;
pub mod metrics;
pub mod producer;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gateway_protocol::{OutboundEvent, TtsEventKind};
use log::info;
use tokio::sync::mpsc;

use crate::observer::Telemetry;
use crate::orchestrator::EventSink;
use crate::session::state::SessionState;
use crate::time::now_ms;
use crate::transport::FrameSink;
use consumer::{ConsumerOutcome, TtsConsumer};
use metrics::TtsMetrics;
use producer::TtsProducer;

const PRODUCER_QUEUE_CAPACITY: usize = 64;

/// Drives one TTS utterance end to end: spawns the blocking HTTP producer
/// on its own thread and awaits the async consumer that paces playback to
/// the transport. Holds the adapted prebuffer target across utterances.
pub struct TtsPipeline {
    tts_addr: String,
    read_timeout: Duration,
    total_timeout: Duration,
    prebuffer_timeout: Duration,
    max_bytes: usize,
    prebuffer_target: u32,
}

impl TtsPipeline {
    pub fn new(
        tts_addr: String,
        read_timeout: Duration,
        total_timeout: Duration,
        prebuffer_timeout: Duration,
        max_bytes: usize,
        initial_prebuffer_target: u32,
    ) -> Self {
        Self {
            tts_addr,
            read_timeout,
            total_timeout,
            prebuffer_timeout,
            max_bytes,
            prebuffer_target: initial_prebuffer_target,
        }
    }

    /// Speaks `text`, returning once playback has ended (normally, via
    /// barge-in stop, or on error). `stop_flag` is shared with the caller
    /// so a barge-in can interrupt mid-utterance. Emits `tts_started`
    /// immediately, before anything has been fetched or played, so it
    /// always precedes `tts_first_audio`/`tts_stopped` even if the producer
    /// never delivers a frame.
    pub async fn speak(
        &mut self,
        text: String,
        stop_flag: Arc<AtomicBool>,
        session: Arc<SessionState>,
        sink: Arc<dyn FrameSink>,
        events: Arc<dyn EventSink>,
        telemetry: Arc<dyn Telemetry>,
    ) -> ConsumerOutcome {
        stop_flag.store(false, Ordering::Release);
        let metrics = Arc::new(Mutex::new(TtsMetrics::new(now_ms())));
        let (tx, rx) = mpsc::channel(PRODUCER_QUEUE_CAPACITY);
        let handle = tokio::runtime::Handle::current();

        info!("starting tts playback ({} chars)", text.len());
        events.emit(OutboundEvent::TtsEvent {
            kind: TtsEventKind::Started,
            reason: None,
            first_audio_ms: None,
        });
        telemetry.emit(
            "tts_started",
            session.current_utterance_id(),
            serde_json::json!({ "chars": text.len() }),
        );

        let producer_handle = TtsProducer::spawn(
            self.tts_addr.clone(),
            text,
            stop_flag.clone(),
            tx,
            handle,
            self.read_timeout,
            self.total_timeout,
            self.max_bytes,
            metrics.clone(),
        );

        let outcome = TtsConsumer::run(
            rx,
            stop_flag,
            session,
            sink,
            events,
            telemetry,
            metrics,
            self.prebuffer_timeout,
            self.prebuffer_target,
        )
        .await;

        self.prebuffer_target = outcome.next_prebuffer_target;
        // The producer thread should already be winding down (consumer
        // dropped its receiver); detach rather than block the async task.
        drop(producer_handle);

        outcome
    }
}
