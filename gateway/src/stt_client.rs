use std::os::unix::net::UnixStream;
use std::sync::Mutex;

use crossbeam_channel::Receiver;
use gateway_protocol::stt::{DEFAULT_LANGUAGE, DEFAULT_SAMPLE_RATE, PROTOCOL_VERSION};
use gateway_protocol::{Connection, SttClientMessage, SttServerMessage};
use log::warn;

use crate::error::GatewayError;

/// Client for the STT sidecar stream, connected over a UNIX domain socket
/// by default. Writes are serialized behind a mutex since both the audio
/// pipeline and utterance-boundary logic can write concurrently; reads are
/// dispatched off a background thread into a channel the session
/// controller polls.
pub struct SttClient {
    write_conn: Mutex<Connection<UnixStream>>,
    inbound_rx: Receiver<SttServerMessage>,
}

impl SttClient {
    pub fn connect(path: &str) -> Result<Self, GatewayError> {
        let stream =
            UnixStream::connect(path).map_err(|e| GatewayError::SttStreamError(e.to_string()))?;
        let write_half = stream
            .try_clone()
            .map_err(|e| GatewayError::SttStreamError(e.to_string()))?;
        let write_conn = Connection::new(
            write_half
                .try_clone()
                .map_err(|e| GatewayError::SttStreamError(e.to_string()))?,
            write_half,
        );

        let (tx, rx) = crossbeam_channel::unbounded();
        let read_stream = stream;
        std::thread::spawn(move || {
            let mut read_conn = match read_stream.try_clone() {
                Ok(other_half) => Connection::new(read_stream, other_half),
                Err(e) => {
                    warn!("failed to clone STT sidecar socket: {e}");
                    return;
                }
            };
            loop {
                match read_conn.read_message::<SttServerMessage>() {
                    Ok(msg) => {
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("stt sidecar stream closed: {e}");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            write_conn: Mutex::new(write_conn),
            inbound_rx: rx,
        })
    }

    pub fn start_utterance(&self, session_id: &str, utterance_id: &str) -> Result<(), GatewayError> {
        let msg = SttClientMessage::Start {
            session_id: session_id.to_string(),
            utterance_id: utterance_id.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            protocol_version: PROTOCOL_VERSION.to_string(),
        };
        self.write_conn
            .lock()
            .unwrap()
            .write_message(&msg)
            .map_err(|e| GatewayError::SttStreamError(e.to_string()))
    }

    pub fn send_audio(&self, pcm16k: Vec<u8>, duration_ms: u32) -> Result<(), GatewayError> {
        let msg = SttClientMessage::Audio {
            pcm16k,
            duration_ms,
        };
        self.write_conn
            .lock()
            .unwrap()
            .write_message(&msg)
            .map_err(|e| GatewayError::SttStreamError(e.to_string()))
    }

    pub fn end_utterance(&self) -> Result<(), GatewayError> {
        self.write_conn
            .lock()
            .unwrap()
            .write_message(&SttClientMessage::Drain)
            .map_err(|e| GatewayError::SttStreamError(e.to_string()))
    }

    /// Drains one pending message from the sidecar, if any. Intended to be
    /// polled from the session controller's main loop.
    pub fn try_recv(&self) -> Option<SttServerMessage> {
        self.inbound_rx.try_recv().ok()
    }
}
