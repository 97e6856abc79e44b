pub mod format;

use crate::error::GatewayError;

/// Narrow interface the TTS pipeline and the raw-audio greeting path need
/// from the room transport: push one 48kHz/20ms frame out to the room.
/// The real WebRTC room SDK binding is out of scope here; this trait is the
/// seam a concrete binding plugs into.
pub trait FrameSink: Send + Sync {
    fn send_frame(&self, frame: &[u8]) -> Result<(), GatewayError>;
}

/// Capabilities a room client needs to expose for the session controller to
/// drive the join/subscribe lifecycle.
pub trait RoomClient: Send + Sync {
    /// Joins the room, returning once the join handshake completes.
    fn join(&self, room_url: &str, token: Option<&str>) -> Result<(), GatewayError>;

    /// Waits up to `timeout` for a non-local participant to appear.
    /// Returns `true` if one joined in time.
    fn wait_for_participant(&self, timeout: std::time::Duration) -> bool;

    /// Requests the transport disable its own echo cancellation, noise
    /// suppression and automatic gain control, since the gateway does its
    /// own VAD/gating on raw audio. Falls back silently to transport
    /// defaults if the underlying SDK refuses the custom constraints,
    /// mirroring how a browser-based room client degrades when a
    /// constraint isn't honored.
    fn disable_audio_processing(&self) -> bool;

    /// Pops one buffered 20ms/48kHz mono PCM16 frame of remote participant
    /// audio, if any is queued. The audio pipeline polls this rather than
    /// being pushed to, so it can run on its own cadence independent of
    /// whatever thread the transport SDK delivers frames on.
    fn try_recv_remote_frame(&self) -> Option<Vec<u8>>;
}

/// In-memory [`RoomClient`] used by tests and as a placeholder until a real
/// room SDK is wired in.
#[derive(Default)]
pub struct MockRoomClient {
    pub joined: std::sync::atomic::AtomicBool,
    pub participant_present: std::sync::atomic::AtomicBool,
    pub processing_disabled: std::sync::atomic::AtomicBool,
    pub constraint_refused: std::sync::atomic::AtomicBool,
    pub inbound_frames: std::sync::Mutex<std::collections::VecDeque<Vec<u8>>>,
}

impl RoomClient for MockRoomClient {
    fn join(&self, _room_url: &str, _token: Option<&str>) -> Result<(), GatewayError> {
        self.joined.store(true, std::sync::atomic::Ordering::Release);
        Ok(())
    }

    fn wait_for_participant(&self, _timeout: std::time::Duration) -> bool {
        self.participant_present
            .load(std::sync::atomic::Ordering::Acquire)
    }

    fn disable_audio_processing(&self) -> bool {
        if self
            .constraint_refused
            .load(std::sync::atomic::Ordering::Acquire)
        {
            // Fall back to defaults, matching the try/except-and-retry
            // shape of a real transport client.
            log::warn!("transport refused custom audio constraints, falling back to defaults");
            self.processing_disabled
                .store(false, std::sync::atomic::Ordering::Release);
            false
        } else {
            self.processing_disabled
                .store(true, std::sync::atomic::Ordering::Release);
            true
        }
    }

    fn try_recv_remote_frame(&self) -> Option<Vec<u8>> {
        self.inbound_frames.lock().unwrap().pop_front()
    }
}

/// Collects sent frames instead of delivering them anywhere; used by tests.
#[derive(Default)]
pub struct MockFrameSink {
    pub frames: std::sync::Mutex<Vec<Vec<u8>>>,
}

impl FrameSink for MockFrameSink {
    fn send_frame(&self, frame: &[u8]) -> Result<(), GatewayError> {
        self.frames.lock().unwrap().push(frame.to_vec());
        Ok(())
    }
}
