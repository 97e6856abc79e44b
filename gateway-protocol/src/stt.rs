//! Message set for the STT sidecar stream: utterance start/audio/drain flow
//! out, interim/final transcripts and errors flow in.

use crate::wire::{
    read_bytes, read_string, read_u32, write_bytes, write_string, write_u32, ProtocolError,
    WireMessage,
};

const TAG_START: u8 = 0x01;
const TAG_AUDIO: u8 = 0x02;
const TAG_DRAIN: u8 = 0x03;

const TAG_INTERIM: u8 = 0x10;
const TAG_FINAL: u8 = 0x11;
const TAG_ERROR: u8 = 0x12;

/// Outbound messages sent by the gateway to the STT sidecar.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Start {
        session_id: String,
        utterance_id: String,
        language: String,
        sample_rate: u32,
        protocol_version: String,
    },
    Audio {
        pcm16k: Vec<u8>,
        duration_ms: u32,
    },
    Drain,
}

impl WireMessage for ClientMessage {
    fn tag(&self) -> u8 {
        match self {
            ClientMessage::Start { .. } => TAG_START,
            ClientMessage::Audio { .. } => TAG_AUDIO,
            ClientMessage::Drain => TAG_DRAIN,
        }
    }

    fn encode_payload(&self, out: &mut Vec<u8>) {
        match self {
            ClientMessage::Start {
                session_id,
                utterance_id,
                language,
                sample_rate,
                protocol_version,
            } => {
                write_string(out, session_id);
                write_string(out, utterance_id);
                write_string(out, language);
                write_u32(out, *sample_rate);
                write_string(out, protocol_version);
            }
            ClientMessage::Audio {
                pcm16k,
                duration_ms,
            } => {
                write_bytes(out, pcm16k);
                write_u32(out, *duration_ms);
            }
            ClientMessage::Drain => {}
        }
    }

    fn decode(tag: u8, payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = payload;
        match tag {
            TAG_START => Ok(ClientMessage::Start {
                session_id: read_string(&mut r)?,
                utterance_id: read_string(&mut r)?,
                language: read_string(&mut r)?,
                sample_rate: read_u32(&mut r)?,
                protocol_version: read_string(&mut r)?,
            }),
            TAG_AUDIO => Ok(ClientMessage::Audio {
                pcm16k: read_bytes(&mut r)?,
                duration_ms: read_u32(&mut r)?,
            }),
            TAG_DRAIN => Ok(ClientMessage::Drain),
            other => Err(ProtocolError::InvalidTag(other)),
        }
    }
}

/// Default language sent with every `start` message.
pub const DEFAULT_LANGUAGE: &str = "en-US";
/// Sample rate the sidecar expects PCM audio at.
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;
/// Wire protocol version negotiated with the sidecar.
pub const PROTOCOL_VERSION: &str = "1";

/// Inbound messages received from the STT sidecar.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Interim { utterance_id: String, text: String },
    Final { utterance_id: String, text: String },
    Error { enum_code: String, message: String },
}

impl WireMessage for ServerMessage {
    fn tag(&self) -> u8 {
        match self {
            ServerMessage::Interim { .. } => TAG_INTERIM,
            ServerMessage::Final { .. } => TAG_FINAL,
            ServerMessage::Error { .. } => TAG_ERROR,
        }
    }

    fn encode_payload(&self, out: &mut Vec<u8>) {
        match self {
            ServerMessage::Interim {
                utterance_id,
                text,
            } => {
                write_string(out, utterance_id);
                write_string(out, text);
            }
            ServerMessage::Final {
                utterance_id,
                text,
            } => {
                write_string(out, utterance_id);
                write_string(out, text);
            }
            ServerMessage::Error {
                enum_code,
                message,
            } => {
                write_string(out, enum_code);
                write_string(out, message);
            }
        }
    }

    fn decode(tag: u8, payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = payload;
        match tag {
            TAG_INTERIM => Ok(ServerMessage::Interim {
                utterance_id: read_string(&mut r)?,
                text: read_string(&mut r)?,
            }),
            TAG_FINAL => Ok(ServerMessage::Final {
                utterance_id: read_string(&mut r)?,
                text: read_string(&mut r)?,
            }),
            TAG_ERROR => Ok(ServerMessage::Error {
                enum_code: read_string(&mut r)?,
                message: read_string(&mut r)?,
            }),
            other => Err(ProtocolError::InvalidTag(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Connection;
    use std::io::Cursor;

    #[test]
    fn start_message_round_trips() {
        let msg = ClientMessage::Start {
            session_id: "sess-1".into(),
            utterance_id: "u-1".into(),
            language: DEFAULT_LANGUAGE.into(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            protocol_version: PROTOCOL_VERSION.into(),
        };
        let mut conn = Connection::new(Cursor::new(Vec::new()), Cursor::new(Vec::new()));
        conn.write_message(&msg).unwrap();
        let bytes = conn.into_write_stream().into_inner();
        let mut read_conn = Connection::new(Cursor::new(bytes), Cursor::new(Vec::new()));
        let decoded: ClientMessage = read_conn.read_message().unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn audio_message_preserves_byte_payload() {
        let pcm: Vec<u8> = (0..3200u32).map(|v| (v % 256) as u8).collect();
        let msg = ClientMessage::Audio {
            pcm16k: pcm.clone(),
            duration_ms: 100,
        };
        let mut conn = Connection::new(Cursor::new(Vec::new()), Cursor::new(Vec::new()));
        conn.write_message(&msg).unwrap();
        let bytes = conn.into_write_stream().into_inner();
        let mut read_conn = Connection::new(Cursor::new(bytes), Cursor::new(Vec::new()));
        let decoded: ClientMessage = read_conn.read_message().unwrap();
        match decoded {
            ClientMessage::Audio {
                pcm16k,
                duration_ms,
            } => {
                assert_eq!(pcm16k, pcm);
                assert_eq!(duration_ms, 100);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn error_message_round_trips() {
        let msg = ServerMessage::Error {
            enum_code: "UPSTREAM_TIMEOUT".into(),
            message: "sidecar timed out".into(),
        };
        let mut conn = Connection::new(Cursor::new(Vec::new()), Cursor::new(Vec::new()));
        conn.write_message(&msg).unwrap();
        let bytes = conn.into_write_stream().into_inner();
        let mut read_conn = Connection::new(Cursor::new(bytes), Cursor::new(Vec::new()));
        let decoded: ServerMessage = read_conn.read_message().unwrap();
        assert_eq!(decoded, msg);
    }
}
