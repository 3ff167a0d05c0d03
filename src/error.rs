use thiserror::Error;

/// Failures of a single pipeline run.
///
/// Every variant is recoverable: the run that produced it is abandoned and the
/// message is shown to the user, who may re-upload or pick other columns.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Error loading file: {0}")]
    Load(String),

    #[error("The uploaded file is empty.")]
    EmptyInput,

    #[error("No numeric columns found in the uploaded file.")]
    NoNumericColumns,

    #[error("Invalid column selection: {0}")]
    InvalidSelection(String),

    #[error("Chart rendering failed: {0}")]
    ChartRender(String),

    #[error("Report composition failed: {0}")]
    Compose(String),

    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl ReportError {
    /// Stable machine-readable name of the failure.
    pub fn kind(&self) -> &'static str {
        match self {
            ReportError::Load(_) => "load_error",
            ReportError::EmptyInput => "empty_input",
            ReportError::NoNumericColumns => "no_numeric_columns",
            ReportError::InvalidSelection(_) => "invalid_selection",
            ReportError::ChartRender(_) => "chart_render_error",
            ReportError::Compose(_) => "compose_error",
            ReportError::Unexpected(_) => "unexpected_error",
        }
    }

    /// Whether the failure was caused by the user's input rather than the system.
    pub fn is_user_error(&self) -> bool {
        !matches!(self, ReportError::Compose(_) | ReportError::Unexpected(_))
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;

/// Maps a drawing backend failure onto [`ReportError::ChartRender`].
pub(crate) fn chart_err<E: std::fmt::Display>(e: E) -> ReportError {
    ReportError::ChartRender(e.to_string())
}

/// Maps a document assembly failure onto [`ReportError::Compose`].
pub(crate) fn compose_err<E: std::fmt::Display>(e: E) -> ReportError {
    ReportError::Compose(e.to_string())
}
