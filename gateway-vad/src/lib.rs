pub mod classifier;
pub mod engine;
pub mod error;
pub mod types;

pub use classifier::SileroClassifier;
pub use engine::VadEngine;
pub use error::VadError;
pub use types::{VadConfig, VadEvent, VoicingClassifier};
