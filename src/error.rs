use crate::remote::RemoteError;

/// Broad category of a failure, for callers that route on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Invariant,
    Remote,
    Local,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A required input was missing. Raised before any remote call.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The remote call succeeded but returned something unusable.
    #[error("Unexpected result: {0}")]
    Invariant(String),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Local store error: {0}")]
    LocalStore(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Invariant(_) | AppError::Json(_) => ErrorKind::Invariant,
            AppError::Remote(RemoteError::Service { code: 404, .. }) => ErrorKind::NotFound,
            AppError::Remote(_) => ErrorKind::Remote,
            AppError::LocalStore(_) | AppError::Pool(_) | AppError::Io(_) => ErrorKind::Local,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_has_validation_kind() {
        assert_eq!(
            AppError::validation("Post ID is required").kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn not_found_has_not_found_kind() {
        assert_eq!(
            AppError::NotFound("user".into()).kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn remote_404_is_reported_as_not_found() {
        let err = AppError::from(RemoteError::Service {
            code: 404,
            kind: "document_not_found".into(),
            message: "Document not found".into(),
        });
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn remote_500_is_reported_as_remote() {
        let err = AppError::from(RemoteError::Service {
            code: 500,
            kind: "general_unknown".into(),
            message: "boom".into(),
        });
        assert_eq!(err.kind(), ErrorKind::Remote);
    }

    #[test]
    fn display_includes_message() {
        let err = AppError::Invariant("zero documents".into());
        assert_eq!(err.to_string(), "Unexpected result: zero documents");
    }
}
