use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use gateway_protocol::{Connection, InboundCommand, OutboundEvent};
use log::{debug, info, warn};

const INITIAL_BACKOFF_MS: u64 = 200;
const MAX_BACKOFF_MS: u64 = 5_000;
const WRITER_POLL_MS: u64 = 1_000;

/// Something that can receive orchestrator events. Lets the TTS pipeline
/// and VAD manager emit events without depending on [`OrchestratorClient`]
/// directly, so tests can substitute a recording sink.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: OutboundEvent);
}

/// Bidirectional client for the orchestrator control stream: a
/// single-writer-loop serializes all outbound events, a receive loop
/// dispatches inbound commands, and a supervisor reconnects with
/// exponential backoff, replaying the last `session_open` on every
/// reconnect.
pub struct OrchestratorClient {
    outbound_tx: Sender<OutboundEvent>,
    inbound_rx: Receiver<InboundCommand>,
    last_session_open: Arc<Mutex<Option<OutboundEvent>>>,
}

impl OrchestratorClient {
    pub fn connect(addr: String, session_id: String, room_url: String) -> Self {
        let (outbound_tx, outbound_rx) = crossbeam_channel::unbounded();
        let (inbound_tx, inbound_rx) = crossbeam_channel::unbounded();
        let last_session_open = Arc::new(Mutex::new(Some(OutboundEvent::SessionOpen {
            session_id,
            room_url,
        })));

        let supervisor_last_open = last_session_open.clone();
        std::thread::spawn(move || {
            reconnect_supervisor(addr, outbound_rx, inbound_tx, supervisor_last_open);
        });

        Self {
            outbound_tx,
            inbound_rx,
            last_session_open,
        }
    }

    /// Drains any inbound commands received since the last call. Intended
    /// to be polled by the session controller's main loop.
    pub fn try_recv_command(&self) -> Option<InboundCommand> {
        self.inbound_rx.try_recv().ok()
    }
}

/// No-op [`EventSink`] used when no orchestrator connection is configured,
/// so the VAD manager and TTS pipeline never need to special-case it.
#[derive(Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: OutboundEvent) {}
}

impl EventSink for OrchestratorClient {
    fn emit(&self, event: OutboundEvent) {
        if matches!(event, OutboundEvent::SessionOpen { .. }) {
            *self.last_session_open.lock().unwrap() = Some(event.clone());
        }
        if self.outbound_tx.send(event).is_err() {
            warn!("orchestrator client outbound queue is gone, event dropped");
        }
    }
}

fn reconnect_supervisor(
    addr: String,
    outbound_rx: Receiver<OutboundEvent>,
    inbound_tx: Sender<InboundCommand>,
    last_session_open: Arc<Mutex<Option<OutboundEvent>>>,
) {
    let mut backoff_ms = INITIAL_BACKOFF_MS;
    loop {
        match TcpStream::connect(&addr) {
            Ok(stream) => {
                info!("connected to orchestrator at {addr}");
                let healthy = run_connection(stream, &outbound_rx, &inbound_tx, &last_session_open);
                backoff_ms = if healthy {
                    INITIAL_BACKOFF_MS
                } else {
                    (backoff_ms * 2).min(MAX_BACKOFF_MS)
                };
            }
            Err(e) => {
                warn!("failed to connect to orchestrator at {addr}: {e}");
                backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
            }
        }
        std::thread::sleep(Duration::from_millis(backoff_ms));
    }
}

/// Runs one connection attempt to completion. Returns whether the
/// connection was healthy for long enough to reset backoff (i.e. it wasn't
/// immediately rejected).
fn run_connection(
    stream: TcpStream,
    outbound_rx: &Receiver<OutboundEvent>,
    inbound_tx: &Sender<InboundCommand>,
    last_session_open: &Arc<Mutex<Option<OutboundEvent>>>,
) -> bool {
    let write_stream = match stream.try_clone() {
        Ok(s) => s,
        Err(e) => {
            warn!("failed to clone orchestrator socket: {e}");
            return false;
        }
    };

    let mut write_conn = Connection::new(write_stream.try_clone().unwrap(), write_stream);
    if let Some(open) = last_session_open.lock().unwrap().clone() {
        if let Err(e) = write_conn.write_message(&open) {
            warn!("failed to replay session_open: {e}");
            return false;
        }
    }

    let stop = Arc::new(AtomicBool::new(false));
    let reader_stop = stop.clone();
    let read_stream = stream;

    let reader = std::thread::spawn(move || {
        let mut read_conn = Connection::new(
            read_stream.try_clone().expect("clone read stream"),
            read_stream,
        );
        loop {
            match read_conn.read_message::<InboundCommand>() {
                Ok(cmd) => {
                    debug!("orchestrator command received: {cmd:?}");
                    if inbound_tx.send(cmd).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("orchestrator stream closed: {e}");
                    break;
                }
            }
        }
        reader_stop.store(true, Ordering::Release);
    });

    let writer_stop = stop.clone();
    let connected_at = std::time::Instant::now();
    loop {
        if writer_stop.load(Ordering::Acquire) {
            break;
        }
        match outbound_rx.recv_timeout(Duration::from_millis(WRITER_POLL_MS)) {
            Ok(event) => {
                if let Err(e) = write_conn.write_message(&event) {
                    warn!("failed writing to orchestrator: {e}");
                    stop.store(true, Ordering::Release);
                    break;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    let _ = reader.join();
    connected_at.elapsed() >= Duration::from_secs(1)
}

/// Coalesces a fast-changing RMS feature stream down to at most one send
/// per `interval_ms` (default 10Hz), and only when the value has moved by
/// at least 1.0 since the last emission, so constant near-silence doesn't
/// spam the orchestrator.
pub struct FeatureCoalescer {
    last_sent: Option<f32>,
    last_sent_ms: Option<u64>,
    interval_ms: u64,
}

impl FeatureCoalescer {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            last_sent: None,
            last_sent_ms: None,
            interval_ms,
        }
    }

    /// Returns `Some(rms)` if this value should be sent now: the tick
    /// interval has elapsed since the last send and the value moved by at
    /// least 1.0.
    pub fn offer(&mut self, now_ms: u64, rms: f32) -> Option<f32> {
        if let Some(last_ms) = self.last_sent_ms {
            if now_ms.saturating_sub(last_ms) < self.interval_ms {
                return None;
            }
        }
        let should_send = match self.last_sent {
            None => true,
            Some(last) => (rms - last).abs() >= 1.0,
        };
        if should_send {
            self.last_sent = Some(rms);
            self.last_sent_ms = Some(now_ms);
            Some(rms)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingSink {
        events: StdMutex<Vec<OutboundEvent>>,
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: OutboundEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[test]
    fn recording_sink_captures_emitted_events() {
        let sink = RecordingSink::default();
        sink.emit(OutboundEvent::Feature { rms: 42.0 });
        assert_eq!(sink.events.lock().unwrap().len(), 1);
    }

    #[test]
    fn feature_coalescer_sends_first_value_then_suppresses_small_changes() {
        let mut c = FeatureCoalescer::new(100);
        assert_eq!(c.offer(0, 100.0), Some(100.0));
        assert_eq!(c.offer(50, 100.5), None);
        assert_eq!(c.offer(150, 101.2), Some(101.2));
    }

    #[test]
    fn feature_coalescer_suppresses_large_changes_within_the_tick_interval() {
        let mut c = FeatureCoalescer::new(100);
        assert_eq!(c.offer(0, 100.0), Some(100.0));
        assert_eq!(c.offer(50, 9000.0), None);
        assert_eq!(c.offer(100, 9000.0), Some(9000.0));
    }
}
