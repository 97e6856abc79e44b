pub mod batcher;
pub mod error;
pub mod frame;
pub mod resample;
pub mod ring_buffer;
pub mod wav;

pub use batcher::FrameBatcher;
pub use error::AudioUtilError;
pub use frame::{Frame, FRAME_BYTES, FRAME_MS, TRANSPORT_SAMPLE_RATE};
pub use resample::{f32_to_pcm16_bytes, pcm16_bytes_to_f32, Resampler};
pub use ring_buffer::RingBuffer;
