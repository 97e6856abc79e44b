use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use gateway_protocol::{OutboundEvent, TtsEventKind};
use log::{debug, warn};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::observer::Telemetry;
use crate::orchestrator::EventSink;
use crate::session::state::SessionState;
use crate::time::now_ms;
use crate::transport::FrameSink;
use crate::tts::metrics::TtsMetrics;
use crate::tts::producer::ProducedItem;

const FRAME_INTERVAL: Duration = Duration::from_millis(20);
const DEQUEUE_DEADLINE: Duration = Duration::from_millis(500);
const PREBUFFER_MIN: u32 = 10;
const PREBUFFER_MAX: u32 = 25;

fn frame_rms(frame: &[u8]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let samples: Vec<i16> = frame
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect();
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    ((sum_sq / samples.len() as f64).sqrt()) as f32
}

/// Consumes frames produced by [`crate::tts::producer::TtsProducer`],
/// prebuffering before playback starts and pacing delivery to the
/// transport at one frame per 20ms using a monotonic anchor so pacing
/// doesn't accumulate drift across frames.
pub struct TtsConsumer;

pub struct ConsumerOutcome {
    pub stop_reason: &'static str,
    /// Adapted prebuffer target for the next utterance: grows after an
    /// underrun, shrinks by one otherwise, clamped to [10, 25].
    pub next_prebuffer_target: u32,
}

impl TtsConsumer {
    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        mut rx: mpsc::Receiver<ProducedItem>,
        stop_flag: Arc<AtomicBool>,
        session: Arc<SessionState>,
        sink: Arc<dyn FrameSink>,
        events: Arc<dyn EventSink>,
        telemetry: Arc<dyn Telemetry>,
        metrics: Arc<Mutex<TtsMetrics>>,
        prebuffer_timeout: Duration,
        prebuffer_target: u32,
    ) -> ConsumerOutcome {
        let prebuffer_target = prebuffer_target.clamp(PREBUFFER_MIN, PREBUFFER_MAX);
        let mut queue: VecDeque<Vec<u8>> = VecDeque::new();
        let mut producer_ended = false;

        let prebuffer_deadline = Instant::now() + prebuffer_timeout;
        while queue.len() < prebuffer_target as usize && !producer_ended {
            let remaining = prebuffer_deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!("tts prebuffer timed out with {} frames queued", queue.len());
                break;
            }
            match timeout(remaining, rx.recv()).await {
                Ok(Some(ProducedItem::Frame(f))) => queue.push_back(f),
                Ok(Some(ProducedItem::End)) | Ok(None) => producer_ended = true,
                Err(_) => break,
            }
        }

        let mut stop_reason: &'static str = "completed_normally";
        let mut first_frame = true;
        let mut next_frame_time = Instant::now();
        let mut frames_played = 0u64;
        let mut underrun = false;

        'play: loop {
            if stop_flag.load(Ordering::Relaxed) {
                stop_reason = "stopped";
                break;
            }

            metrics.lock().unwrap().sample_queue_len(queue.len());

            let frame = if let Some(f) = queue.pop_front() {
                f
            } else if producer_ended {
                break;
            } else {
                match timeout(DEQUEUE_DEADLINE, rx.recv()).await {
                    Ok(Some(ProducedItem::Frame(f))) => f,
                    Ok(Some(ProducedItem::End)) | Ok(None) => {
                        producer_ended = true;
                        continue 'play;
                    }
                    Err(_) => {
                        warn!("tts playback underrun: no frame within {DEQUEUE_DEADLINE:?}");
                        underrun = true;
                        metrics.lock().unwrap().underrun_count += 1;
                        stop_reason = "buffer_underrun";
                        break;
                    }
                }
            };

            if first_frame {
                first_frame = false;
                let now = now_ms();
                session.arm_speaking(now);
                metrics.lock().unwrap().mark_first_audio_played(now);
                let first_audio_ms = metrics.lock().unwrap().first_audio_ms().map(|v| v as u32);
                events.emit(OutboundEvent::TtsEvent {
                    kind: TtsEventKind::FirstAudio,
                    reason: None,
                    first_audio_ms,
                });
                telemetry.emit(
                    "tts_first_audio",
                    session.current_utterance_id(),
                    serde_json::json!({ "first_audio_ms": first_audio_ms }),
                );
                next_frame_time = Instant::now();
            } else {
                next_frame_time += FRAME_INTERVAL;
                let now = Instant::now();
                if next_frame_time > now {
                    let sleep_for = next_frame_time - now;
                    if wait_with_early_stop(sleep_for, &stop_flag).await {
                        stop_reason = "stopped";
                        break;
                    }
                }
            }

            if stop_flag.load(Ordering::Relaxed) {
                stop_reason = "stopped";
                break;
            }

            if let Err(e) = sink.send_frame(&frame) {
                warn!("tts frame send failed: {e}");
                stop_reason = "transport_error";
                break;
            }
            frames_played += 1;

            let rms = frame_rms(&frame);
            session.push_rms_sample(rms);
            metrics.lock().unwrap().rms_samples.push(rms);
        }

        {
            let mut m = metrics.lock().unwrap();
            m.frames_played = frames_played;
            m.mark_playback_ended(now_ms(), stop_reason);
        }

        if session.try_emit_tts_stop_once() {
            let (payload_reason, first_audio_ms, mut telemetry_payload) = {
                let m = metrics.lock().unwrap();
                (
                    m.stop_reason.clone(),
                    m.first_audio_ms().map(|v| v as u32),
                    m.to_stopped_payload(),
                )
            };
            events.emit(OutboundEvent::TtsEvent {
                kind: TtsEventKind::Stopped,
                reason: payload_reason,
                first_audio_ms,
            });

            let barge_in_ms = metrics
                .lock()
                .unwrap()
                .barge_in_ms(session.last_vad_start_ts_ms());
            if let Value::Object(ref mut map) = telemetry_payload {
                map.insert("speaking_armed_ts_ms".into(), session.speaking_armed_ts_ms().into());
                map.insert("barge_in_ms".into(), barge_in_ms.into());
                map.insert(
                    "vad_counters".into(),
                    serde_json::json!({
                        "starts_total": session.vad_counters.starts_total.load(Ordering::Relaxed),
                        "stops_allowed": session.vad_counters.stops_allowed.load(Ordering::Relaxed),
                        "suppressed_guard": session.vad_counters.suppressed_guard.load(Ordering::Relaxed),
                        "suppressed_energy": session.vad_counters.suppressed_energy.load(Ordering::Relaxed),
                        "suppressed_minframes": session.vad_counters.suppressed_minframes.load(Ordering::Relaxed),
                    }),
                );
            }
            telemetry.emit("tts_stopped", session.current_utterance_id(), telemetry_payload);
        }
        session.disarm_speaking();

        let adjustment: i32 = if underrun { 2 } else { -1 };
        let next_prebuffer_target =
            (prebuffer_target as i32 + adjustment).clamp(PREBUFFER_MIN as i32, PREBUFFER_MAX as i32) as u32;

        ConsumerOutcome {
            stop_reason,
            next_prebuffer_target,
        }
    }
}

/// Sleeps for `duration`, waking early (returning `true`) if the stop flag
/// is raised. Polls in small slices since `AtomicBool` has no async waker.
async fn wait_with_early_stop(duration: Duration, stop_flag: &AtomicBool) -> bool {
    const POLL_INTERVAL: Duration = Duration::from_millis(5);
    let deadline = Instant::now() + duration;
    loop {
        if stop_flag.load(Ordering::Relaxed) {
            return true;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return false;
        }
        tokio::time::sleep(remaining.min(POLL_INTERVAL)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NullTelemetry;
    use crate::transport::MockFrameSink;
    use gateway_audio::frame::FRAME_BYTES;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<OutboundEvent>>,
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: OutboundEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[tokio::test]
    async fn plays_all_frames_then_emits_stopped_once() {
        let (tx, rx) = mpsc::channel(32);
        for _ in 0..5 {
            tx.send(ProducedItem::Frame(vec![0u8; FRAME_BYTES]))
                .await
                .unwrap();
        }
        tx.send(ProducedItem::End).await.unwrap();
        drop(tx);

        let stop_flag = Arc::new(AtomicBool::new(false));
        let session = Arc::new(SessionState::new("s".into(), 0));
        let sink: Arc<dyn FrameSink> = Arc::new(MockFrameSink::default());
        let recording = Arc::new(RecordingSink::default());
        let events: Arc<dyn EventSink> = recording.clone();
        let telemetry: Arc<dyn Telemetry> = Arc::new(NullTelemetry);
        let metrics = Arc::new(Mutex::new(TtsMetrics::new(0)));

        let outcome = TtsConsumer::run(
            rx,
            stop_flag,
            session.clone(),
            sink.clone(),
            events.clone(),
            telemetry,
            metrics,
            Duration::from_millis(50),
            10,
        )
        .await;

        assert_eq!(outcome.stop_reason, "completed_normally");
        assert_eq!(outcome.next_prebuffer_target, 9);
        assert!(!session.speaking_armed());

        let recorded = recording.events.lock().unwrap();
        let kinds: Vec<TtsEventKind> = recorded
            .iter()
            .map(|e| match e {
                OutboundEvent::TtsEvent { kind, .. } => *kind,
                other => panic!("unexpected event: {other:?}"),
            })
            .collect();
        assert_eq!(kinds, vec![TtsEventKind::FirstAudio, TtsEventKind::Stopped]);
    }

    #[tokio::test]
    async fn stall_past_dequeue_deadline_raises_prebuffer_target() {
        let (tx, rx) = mpsc::channel(32);
        tx.send(ProducedItem::Frame(vec![0u8; FRAME_BYTES]))
            .await
            .unwrap();
        // Producer never sends another frame or an End sentinel, so once
        // the lone prebuffered frame plays out the consumer blocks on
        // `rx.recv()` past `DEQUEUE_DEADLINE` and must declare an underrun.
        std::mem::forget(tx);

        let stop_flag = Arc::new(AtomicBool::new(false));
        let session = Arc::new(SessionState::new("s".into(), 0));
        let sink: Arc<dyn FrameSink> = Arc::new(MockFrameSink::default());
        let events: Arc<dyn EventSink> = Arc::new(RecordingSink::default());
        let telemetry: Arc<dyn Telemetry> = Arc::new(NullTelemetry);
        let metrics = Arc::new(Mutex::new(TtsMetrics::new(0)));

        let outcome = TtsConsumer::run(
            rx,
            stop_flag,
            session.clone(),
            sink,
            events,
            telemetry,
            metrics,
            Duration::from_millis(10),
            1,
        )
        .await;

        assert_eq!(outcome.stop_reason, "buffer_underrun");
        assert_eq!(outcome.next_prebuffer_target, 12);
        assert!(!session.speaking_armed());
    }

    #[tokio::test]
    async fn stop_flag_set_before_playback_stops_immediately() {
        let (_tx, rx) = mpsc::channel::<ProducedItem>(4);
        let stop_flag = Arc::new(AtomicBool::new(true));
        let session = Arc::new(SessionState::new("s".into(), 0));
        let sink: Arc<dyn FrameSink> = Arc::new(MockFrameSink::default());
        let events: Arc<dyn EventSink> = Arc::new(RecordingSink::default());
        let telemetry: Arc<dyn Telemetry> = Arc::new(NullTelemetry);
        let metrics = Arc::new(Mutex::new(TtsMetrics::new(0)));

        let outcome = TtsConsumer::run(
            rx,
            stop_flag,
            session,
            sink,
            events,
            telemetry,
            metrics,
            Duration::from_millis(10),
            10,
        )
        .await;

        assert_eq!(outcome.stop_reason, "stopped");
    }
}
