use std::fmt;

/// Failure kinds surfaced by the tracker core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    /// No active identity.
    Unauthenticated,
    /// Identity exists but no profile row ties it to a company.
    ProfileMissing,
    /// Signup with an email that is already registered.
    AlreadyExists,
    /// Update or delete of an id that does not exist for this tenant.
    NotFound(String),
    /// Rejected by validation (bad input, unknown join code).
    InvalidInput(String),
    /// Rejected by the backing store's row policy or a role check.
    Forbidden(String),
    /// Any other store failure, message passed through.
    Backend(String),
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerError::Unauthenticated => write!(f, "Not authenticated"),
            TrackerError::ProfileMissing => write!(f, "Profile not found"),
            TrackerError::AlreadyExists => write!(
                f,
                "An account with this email already exists. Please try logging in instead."
            ),
            TrackerError::NotFound(msg) => write!(f, "Not found: {msg}"),
            TrackerError::InvalidInput(msg) => write!(f, "Invalid input: {msg}"),
            TrackerError::Forbidden(msg) => write!(f, "Forbidden: {msg}"),
            TrackerError::Backend(msg) => write!(f, "Backend error: {msg}"),
        }
    }
}

impl std::error::Error for TrackerError {}

impl From<reqwest::Error> for TrackerError {
    fn from(err: reqwest::Error) -> Self {
        TrackerError::Backend(err.to_string())
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;
