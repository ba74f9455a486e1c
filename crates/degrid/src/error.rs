use std::io;
use std::path::PathBuf;

use degrid_aligner::AlignError;
use degrid_inpaint::InpaintError;
use thiserror::Error;

use crate::registry::RegistryError;
use crate::settings::ConfigError;

/// Reasons a single frame is skipped. None of these stop the run.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("input {} is missing", path.display())]
    MissingInput { path: PathBuf },
    #[error("no recognized text for the frame")]
    NoRecognizedText,
    #[error("sidecar {} is not readable OCR output: {source}", path.display())]
    MalformedSidecar {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("no template for subpoint {0}")]
    NoTemplate(String),
    #[error("image {} could not be decoded: {source}", path.display())]
    CorruptImage {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("alignment timed out after {evaluated} of {total} candidate angles")]
    TimedOut { evaluated: usize, total: usize },
    #[error("alignment failed: {0}")]
    Align(AlignError),
    #[error("inpainting failed: {0}")]
    Inpaint(#[from] InpaintError),
    #[error("failed to write {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("i/o error on {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("worker stopped before finishing the frame")]
    Interrupted,
}

impl From<AlignError> for FrameError {
    fn from(err: AlignError) -> Self {
        match err {
            AlignError::DeadlineExceeded { evaluated, total } => {
                FrameError::TimedOut { evaluated, total }
            }
            other => FrameError::Align(other),
        }
    }
}

/// Conditions that abort a run before any frame is processed.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("invalid alignment settings: {0}")]
    Align(#[from] AlignError),
    #[error("invalid inpainting settings: {0}")]
    Inpaint(#[from] InpaintError),
    #[error("failed to scan input directory {}: {source}", path.display())]
    Discovery { path: PathBuf, source: io::Error },
    #[error("failed to open output sequence in {}: {source}", path.display())]
    Sink { path: PathBuf, source: io::Error },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_maps_to_timeout() {
        let err: FrameError = AlignError::DeadlineExceeded {
            evaluated: 3,
            total: 45,
        }
        .into();
        assert!(matches!(err, FrameError::TimedOut { evaluated: 3, total: 45 }));
        assert_eq!(
            err.to_string(),
            "alignment timed out after 3 of 45 candidate angles"
        );
    }
}
