use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

/// Errors surfaced by the store, auth and catalog clients.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("not signed in")]
    Unauthenticated,

    #[error("entry already exists")]
    Duplicate,

    #[error("not found")]
    NotFound,

    #[error("access denied")]
    AccessDenied,

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("auth error: {0}")]
    Auth(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote error (status {status}): {message}")]
    Remote { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),
}

impl AppError {
    /// Transient failures the user may re-trigger. Nothing retries on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Parse(_) => true,
            Self::Remote { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// User-facing notice for this failure.
    pub fn notice(&self) -> String {
        match self {
            Self::Unauthenticated => "Please log in first!".to_string(),
            Self::Duplicate => "This anime is already in your list!".to_string(),
            Self::NotFound => "Watchlist not found or not public".to_string(),
            Self::AccessDenied => "You don't have access to that.".to_string(),
            Self::Validation(msg) | Self::Auth(msg) => msg.clone(),
            _ => "Something went wrong. Please try again!".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_has_its_own_notice() {
        let generic = AppError::Parse("bad json".into()).notice();
        assert_ne!(AppError::Duplicate.notice(), generic);
        assert_eq!(AppError::Duplicate.notice(), "This anime is already in your list!");
    }

    #[test]
    fn transient_failures_are_retryable() {
        assert!(AppError::Remote { status: 503, message: String::new() }.is_retryable());
        assert!(AppError::Remote { status: 429, message: String::new() }.is_retryable());
        assert!(!AppError::Remote { status: 400, message: String::new() }.is_retryable());
        assert!(!AppError::Duplicate.is_retryable());
        assert!(!AppError::Unauthenticated.is_retryable());
    }

    #[test]
    fn validation_notice_is_the_message() {
        let err = AppError::Validation("Please enter a search term".into());
        assert_eq!(err.notice(), "Please enter a search term");
    }
}
