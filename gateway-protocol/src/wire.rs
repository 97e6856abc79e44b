use std::io::{BufReader, BufWriter, Read, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid message tag: {0}")]
    InvalidTag(u8),

    #[error("invalid payload size: {0}")]
    InvalidPayloadSize(u32),

    #[error("invalid string encoding")]
    InvalidString,

    #[error("truncated message")]
    Truncated,
}

/// A message that can be framed as `[tag:u8][len:u32 LE][payload]`.
///
/// Mirrors the binary framing used by the audio-server protocol this crate
/// is descended from, generalized so both the orchestrator stream and the
/// STT sidecar stream can share one reader/writer.
pub trait WireMessage: Sized {
    fn tag(&self) -> u8;
    fn encode_payload(&self, out: &mut Vec<u8>);
    fn decode(tag: u8, payload: &[u8]) -> Result<Self, ProtocolError>;
}

/// Maximum payload size accepted on read; guards against a corrupt length
/// prefix allocating unbounded memory.
pub const MAX_PAYLOAD_BYTES: u32 = 16 * 1024 * 1024;

pub struct Connection<S: Read + Write> {
    reader: BufReader<S>,
    writer: BufWriter<S>,
}

impl<S: Read + Write> Connection<S> {
    pub fn new(read_stream: S, write_stream: S) -> Self {
        Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(write_stream),
        }
    }

    pub fn read_message<M: WireMessage>(&mut self) -> Result<M, ProtocolError> {
        let mut header = [0u8; 5];
        self.reader.read_exact(&mut header)?;
        let tag = header[0];
        let len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]);
        if len > MAX_PAYLOAD_BYTES {
            return Err(ProtocolError::InvalidPayloadSize(len));
        }
        let mut payload = vec![0u8; len as usize];
        if len > 0 {
            self.reader.read_exact(&mut payload)?;
        }
        M::decode(tag, &payload)
    }

    pub fn write_message<M: WireMessage>(&mut self, msg: &M) -> Result<(), ProtocolError> {
        let mut payload = Vec::new();
        msg.encode_payload(&mut payload);
        self.writer.write_all(&[msg.tag()])?;
        self.writer
            .write_all(&(payload.len() as u32).to_le_bytes())?;
        self.writer.write_all(&payload)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Unwraps the write half, flushing first. Mainly useful in tests that
    /// write into an in-memory buffer and then read the bytes back.
    pub fn into_write_stream(self) -> S {
        match self.writer.into_inner() {
            Ok(s) => s,
            Err(_) => panic!("writer was just flushed above"),
        }
    }
}

pub fn write_string(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

pub fn read_string(reader: &mut &[u8]) -> Result<String, ProtocolError> {
    let len = read_u32(reader)? as usize;
    if reader.len() < len {
        return Err(ProtocolError::Truncated);
    }
    let s = String::from_utf8(reader[..len].to_vec()).map_err(|_| ProtocolError::InvalidString)?;
    *reader = &reader[len..];
    Ok(s)
}

pub fn write_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
    buf.extend_from_slice(data);
}

pub fn read_bytes(reader: &mut &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let len = read_u32(reader)? as usize;
    if reader.len() < len {
        return Err(ProtocolError::Truncated);
    }
    let data = reader[..len].to_vec();
    *reader = &reader[len..];
    Ok(data)
}

pub fn write_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

pub fn read_u32(reader: &mut &[u8]) -> Result<u32, ProtocolError> {
    if reader.len() < 4 {
        return Err(ProtocolError::Truncated);
    }
    let v = u32::from_le_bytes([reader[0], reader[1], reader[2], reader[3]]);
    *reader = &reader[4..];
    Ok(v)
}

pub fn write_u8(buf: &mut Vec<u8>, v: u8) {
    buf.push(v);
}

pub fn read_u8(reader: &mut &[u8]) -> Result<u8, ProtocolError> {
    if reader.is_empty() {
        return Err(ProtocolError::Truncated);
    }
    let v = reader[0];
    *reader = &reader[1..];
    Ok(v)
}

pub fn write_bool(buf: &mut Vec<u8>, v: bool) {
    buf.push(if v { 1 } else { 0 });
}

pub fn read_bool(reader: &mut &[u8]) -> Result<bool, ProtocolError> {
    Ok(read_u8(reader)? != 0)
}

pub fn write_f32(buf: &mut Vec<u8>, v: f32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

pub fn read_f32(reader: &mut &[u8]) -> Result<f32, ProtocolError> {
    if reader.len() < 4 {
        return Err(ProtocolError::Truncated);
    }
    let v = f32::from_le_bytes([reader[0], reader[1], reader[2], reader[3]]);
    *reader = &reader[4..];
    Ok(v)
}
