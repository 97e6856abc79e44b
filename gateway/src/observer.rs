use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use log::{debug, warn};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::time::now_ms;

/// A small, optional telemetry sink: free-form JSON events with a
/// monotonically increasing sequence number, independent of the typed
/// orchestrator protocol. Exists alongside the orchestrator control stream
/// rather than instead of it; see the authority decision in DESIGN.md.
pub trait Telemetry: Send + Sync {
    fn emit(&self, event_type: &str, utterance_id: Option<String>, payload: Value);
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObserverCommand {
    StopTts,
    Policy(Value),
}

/// Connects to an observer WebSocket and forwards a small command subset
/// back to the caller. Send failures are logged and dropped: telemetry is
/// best-effort and must never block or fail the session it's describing.
pub struct ObserverClient {
    session_id: String,
    seq: AtomicU64,
    outbound_tx: mpsc::UnboundedSender<Value>,
}

impl ObserverClient {
    pub async fn connect(
        url: &str,
        session_id: String,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<ObserverCommand>), tokio_tungstenite::tungstenite::Error>
    {
        let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
        let (mut write, mut read) = ws_stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Value>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<ObserverCommand>();

        tokio::spawn(async move {
            while let Some(event) = outbound_rx.recv().await {
                if let Err(e) = write.send(WsMessage::Text(event.to_string())).await {
                    warn!("observer send failed: {e}");
                    break;
                }
            }
        });

        tokio::spawn(async move {
            while let Some(Ok(msg)) = read.next().await {
                if let WsMessage::Text(text) = msg {
                    match serde_json::from_str::<Value>(&text) {
                        Ok(v) => {
                            if let Some(cmd) = parse_command(&v) {
                                if inbound_tx.send(cmd).is_err() {
                                    break;
                                }
                            }
                        }
                        Err(e) => debug!("ignoring malformed observer message: {e}"),
                    }
                }
            }
        });

        Ok((
            Arc::new(Self {
                session_id,
                seq: AtomicU64::new(0),
                outbound_tx,
            }),
            inbound_rx,
        ))
    }
}

fn parse_command(v: &Value) -> Option<ObserverCommand> {
    match v.get("type").and_then(Value::as_str) {
        Some("stop_tts") => Some(ObserverCommand::StopTts),
        Some("policy") => Some(ObserverCommand::Policy(v.get("payload").cloned().unwrap_or(Value::Null))),
        _ => None,
    }
}

impl Telemetry for ObserverClient {
    fn emit(&self, event_type: &str, utterance_id: Option<String>, payload: Value) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let event = json!({
            "type": event_type,
            "ts_ms": now_ms(),
            "session_id": self.session_id,
            "utterance_id": utterance_id,
            "seq": seq,
            "payload": payload,
        });
        if self.outbound_tx.send(event).is_err() {
            warn!("observer outbound channel closed, dropping {event_type} event");
        }
    }
}

/// No-op telemetry used when no observer endpoint is configured.
#[derive(Default)]
pub struct NullTelemetry;

impl Telemetry for NullTelemetry {
    fn emit(&self, _event_type: &str, _utterance_id: Option<String>, _payload: Value) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_commands() {
        assert_eq!(
            parse_command(&json!({"type": "stop_tts"})),
            Some(ObserverCommand::StopTts)
        );
        assert_eq!(parse_command(&json!({"type": "unknown"})), None);
    }

    #[test]
    fn null_telemetry_does_not_panic() {
        let t = NullTelemetry;
        t.emit("vad_start", None, Value::Null);
    }
}
