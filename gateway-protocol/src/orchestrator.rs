//! Message set for the orchestrator control stream: session lifecycle,
//! per-session feature reporting, transcript forwarding and TTS lifecycle
//! events flow out; barge-in arming and TTS/mic control commands flow in.

use crate::wire::{
    read_bool, read_f32, read_string, read_u32, read_u8, write_bool, write_f32, write_string,
    write_u32, write_u8, ProtocolError, WireMessage,
};

const TAG_SESSION_OPEN: u8 = 0x01;
const TAG_FEATURE: u8 = 0x02;
const TAG_TRANSCRIPT_INTERIM: u8 = 0x03;
const TAG_TRANSCRIPT_FINAL: u8 = 0x04;
const TAG_TTS_EVENT: u8 = 0x05;

const TAG_ARM_BARGE_IN: u8 = 0x10;
const TAG_START_MIC_TO_STT: u8 = 0x11;
const TAG_STOP_MIC_TO_STT: u8 = 0x12;
const TAG_START_TTS: u8 = 0x13;
const TAG_STOP_TTS: u8 = 0x14;

/// Outbound events sent by the gateway to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    SessionOpen {
        session_id: String,
        room_url: String,
    },
    Feature {
        rms: f32,
    },
    TranscriptInterim {
        utterance_id: String,
        text: String,
    },
    TranscriptFinal {
        utterance_id: String,
        text: String,
    },
    TtsEvent {
        kind: TtsEventKind,
        reason: Option<String>,
        first_audio_ms: Option<u32>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsEventKind {
    Started,
    FirstAudio,
    Stopped,
}

impl TtsEventKind {
    fn to_u8(self) -> u8 {
        match self {
            TtsEventKind::Started => 0,
            TtsEventKind::Stopped => 1,
            TtsEventKind::FirstAudio => 2,
        }
    }

    fn from_u8(v: u8) -> Result<Self, ProtocolError> {
        match v {
            0 => Ok(TtsEventKind::Started),
            1 => Ok(TtsEventKind::Stopped),
            2 => Ok(TtsEventKind::FirstAudio),
            other => Err(ProtocolError::InvalidTag(other)),
        }
    }
}

impl WireMessage for OutboundEvent {
    fn tag(&self) -> u8 {
        match self {
            OutboundEvent::SessionOpen { .. } => TAG_SESSION_OPEN,
            OutboundEvent::Feature { .. } => TAG_FEATURE,
            OutboundEvent::TranscriptInterim { .. } => TAG_TRANSCRIPT_INTERIM,
            OutboundEvent::TranscriptFinal { .. } => TAG_TRANSCRIPT_FINAL,
            OutboundEvent::TtsEvent { .. } => TAG_TTS_EVENT,
        }
    }

    fn encode_payload(&self, out: &mut Vec<u8>) {
        match self {
            OutboundEvent::SessionOpen {
                session_id,
                room_url,
            } => {
                write_string(out, session_id);
                write_string(out, room_url);
            }
            OutboundEvent::Feature { rms } => write_f32(out, *rms),
            OutboundEvent::TranscriptInterim {
                utterance_id,
                text,
            } => {
                write_string(out, utterance_id);
                write_string(out, text);
            }
            OutboundEvent::TranscriptFinal {
                utterance_id,
                text,
            } => {
                write_string(out, utterance_id);
                write_string(out, text);
            }
            OutboundEvent::TtsEvent {
                kind,
                reason,
                first_audio_ms,
            } => {
                write_u8(out, kind.to_u8());
                write_bool(out, reason.is_some());
                if let Some(r) = reason {
                    write_string(out, r);
                }
                write_bool(out, first_audio_ms.is_some());
                if let Some(ms) = first_audio_ms {
                    write_u32(out, *ms);
                }
            }
        }
    }

    fn decode(tag: u8, payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = payload;
        match tag {
            TAG_SESSION_OPEN => Ok(OutboundEvent::SessionOpen {
                session_id: read_string(&mut r)?,
                room_url: read_string(&mut r)?,
            }),
            TAG_FEATURE => Ok(OutboundEvent::Feature {
                rms: read_f32(&mut r)?,
            }),
            TAG_TRANSCRIPT_INTERIM => Ok(OutboundEvent::TranscriptInterim {
                utterance_id: read_string(&mut r)?,
                text: read_string(&mut r)?,
            }),
            TAG_TRANSCRIPT_FINAL => Ok(OutboundEvent::TranscriptFinal {
                utterance_id: read_string(&mut r)?,
                text: read_string(&mut r)?,
            }),
            TAG_TTS_EVENT => {
                let kind = TtsEventKind::from_u8(read_u8(&mut r)?)?;
                let reason = if read_bool(&mut r)? {
                    Some(read_string(&mut r)?)
                } else {
                    None
                };
                let first_audio_ms = if read_bool(&mut r)? {
                    Some(read_u32(&mut r)?)
                } else {
                    None
                };
                Ok(OutboundEvent::TtsEvent {
                    kind,
                    reason,
                    first_audio_ms,
                })
            }
            other => Err(ProtocolError::InvalidTag(other)),
        }
    }
}

/// Inbound commands received from the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundCommand {
    ArmBargeIn { guard_ms: u32, min_rms: f32 },
    StartMicToStt,
    StopMicToStt,
    StartTts { text: String },
    StopTts,
}

impl WireMessage for InboundCommand {
    fn tag(&self) -> u8 {
        match self {
            InboundCommand::ArmBargeIn { .. } => TAG_ARM_BARGE_IN,
            InboundCommand::StartMicToStt => TAG_START_MIC_TO_STT,
            InboundCommand::StopMicToStt => TAG_STOP_MIC_TO_STT,
            InboundCommand::StartTts { .. } => TAG_START_TTS,
            InboundCommand::StopTts => TAG_STOP_TTS,
        }
    }

    fn encode_payload(&self, out: &mut Vec<u8>) {
        match self {
            InboundCommand::ArmBargeIn { guard_ms, min_rms } => {
                write_u32(out, *guard_ms);
                write_f32(out, *min_rms);
            }
            InboundCommand::StartTts { text } => write_string(out, text),
            InboundCommand::StartMicToStt
            | InboundCommand::StopMicToStt
            | InboundCommand::StopTts => {}
        }
    }

    fn decode(tag: u8, payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = payload;
        match tag {
            TAG_ARM_BARGE_IN => Ok(InboundCommand::ArmBargeIn {
                guard_ms: read_u32(&mut r)?,
                min_rms: read_f32(&mut r)?,
            }),
            TAG_START_MIC_TO_STT => Ok(InboundCommand::StartMicToStt),
            TAG_STOP_MIC_TO_STT => Ok(InboundCommand::StopMicToStt),
            TAG_START_TTS => Ok(InboundCommand::StartTts {
                text: read_string(&mut r)?,
            }),
            TAG_STOP_TTS => Ok(InboundCommand::StopTts),
            other => Err(ProtocolError::InvalidTag(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Connection;
    use std::io::Cursor;

    fn round_trip_outbound(event: OutboundEvent) -> OutboundEvent {
        let mut conn = Connection::new(Cursor::new(Vec::new()), Cursor::new(Vec::new()));
        conn.write_message(&event).unwrap();
        let bytes = conn.into_write_stream().into_inner();
        let mut read_conn = Connection::new(Cursor::new(bytes), Cursor::new(Vec::new()));
        read_conn.read_message().unwrap()
    }

    #[test]
    fn session_open_round_trips() {
        let event = OutboundEvent::SessionOpen {
            session_id: "s-1".into(),
            room_url: "https://example.test/room".into(),
        };
        assert_eq!(round_trip_outbound(event.clone()), event);
    }

    #[test]
    fn tts_event_with_no_optional_fields_round_trips() {
        let event = OutboundEvent::TtsEvent {
            kind: TtsEventKind::Started,
            reason: None,
            first_audio_ms: None,
        };
        assert_eq!(round_trip_outbound(event.clone()), event);
    }

    #[test]
    fn tts_event_with_all_optional_fields_round_trips() {
        let event = OutboundEvent::TtsEvent {
            kind: TtsEventKind::Stopped,
            reason: Some("barge_in".into()),
            first_audio_ms: Some(212),
        };
        assert_eq!(round_trip_outbound(event.clone()), event);
    }

    #[test]
    fn tts_event_first_audio_round_trips() {
        let event = OutboundEvent::TtsEvent {
            kind: TtsEventKind::FirstAudio,
            reason: None,
            first_audio_ms: Some(180),
        };
        assert_eq!(round_trip_outbound(event.clone()), event);
    }

    #[test]
    fn arm_barge_in_round_trips() {
        let mut conn = Connection::new(Cursor::new(Vec::new()), Cursor::new(Vec::new()));
        let cmd = InboundCommand::ArmBargeIn {
            guard_ms: 1200,
            min_rms: 1200.0,
        };
        conn.write_message(&cmd).unwrap();
        let bytes = conn.into_write_stream().into_inner();
        let mut read_conn = Connection::new(Cursor::new(bytes), Cursor::new(Vec::new()));
        let decoded: InboundCommand = read_conn.read_message().unwrap();
        assert_eq!(decoded, cmd);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = OutboundEvent::decode(0xEE, &[]).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidTag(0xEE)));
    }
}
