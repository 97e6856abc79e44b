//! Wire framing and message sets shared by the orchestrator control stream
//! and the STT sidecar stream.
//!
//! Both streams use the same `[tag:u8][len:u32 LE][payload]` framing; only
//! the message sets differ, so the framing lives in [`wire`] and each
//! protocol gets its own module.

pub mod orchestrator;
pub mod stt;
pub mod wire;

pub use orchestrator::{InboundCommand, OutboundEvent, TtsEventKind};
pub use stt::{ClientMessage as SttClientMessage, ServerMessage as SttServerMessage};
pub use wire::{Connection, ProtocolError, WireMessage};
