use thiserror::Error;

#[derive(Error, Debug)]
pub enum AudioUtilError {
    #[error("frame has {actual} bytes, expected {expected}")]
    WrongFrameSize { expected: usize, actual: usize },

    #[error("resampler construction failed: {0}")]
    ResamplerSetup(String),

    #[error("resampling failed: {0}")]
    Resample(String),

    #[error("invalid WAV header: {0}")]
    InvalidWav(String),
}
