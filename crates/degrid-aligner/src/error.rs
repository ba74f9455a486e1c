use degrid_types::MaskError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AlignError {
    #[error("invalid aligner setting {field} = {value}")]
    InvalidConfig { field: &'static str, value: String },
    #[error(transparent)]
    Size(#[from] MaskError),
    #[error("alignment deadline passed after {evaluated} of {total} candidate angles")]
    DeadlineExceeded { evaluated: usize, total: usize },
}

impl AlignError {
    pub(crate) fn invalid(field: &'static str, value: impl ToString) -> Self {
        Self::InvalidConfig {
            field,
            value: value.to_string(),
        }
    }
}
