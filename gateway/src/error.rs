use thiserror::Error;

/// Error taxonomy for the gateway. Each variant is the kind of failure a
/// caller actually needs to branch on (retry, drop the utterance, exit the
/// process); anything finer-grained stays inside the message string.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("missing required configuration: {0}")]
    ConfigMissing(String),

    #[error("failed to join room: {0}")]
    RoomJoinFailed(String),

    #[error("failed to send audio to transport: {0}")]
    TransportSendFailed(String),

    #[error("VAD classifier error: {0}")]
    VadClassifierError(#[from] gateway_vad::VadError),

    #[error("TTS producer HTTP request failed: {0}")]
    TtsProducerHttpError(String),

    #[error("TTS producer read timed out after {0:?}")]
    TtsReadTimeout(std::time::Duration),

    #[error("TTS audio truncated at byte limit ({0} bytes)")]
    TtsTruncated(usize),

    #[error("failed to send TTS audio to transport: {0}")]
    TtsTransportSendError(String),

    #[error("orchestrator write failed: {0}")]
    OrchestratorWriteError(#[from] gateway_protocol::ProtocolError),

    #[error("STT sidecar stream error: {0}")]
    SttStreamError(String),

    #[error("audio utility error: {0}")]
    Audio(#[from] gateway_audio::AudioUtilError),

    #[error("fatal error: {0}")]
    Fatal(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
