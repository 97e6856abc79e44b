use thiserror::Error;

#[derive(Error, Debug)]
pub enum VadError {
    #[error("voicing classifier failed: {0}")]
    Classifier(String),
}
