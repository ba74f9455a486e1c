use degrid_types::MaskError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InpaintError {
    #[error(transparent)]
    Size(#[from] MaskError),
    #[error("unknown inpainting backend '{0}'")]
    UnknownBackend(String),
    #[error("{backend} engine is unavailable: {reason}")]
    Unavailable {
        backend: &'static str,
        reason: String,
    },
}
