use std::time::Duration;
use thiserror::Error;

/// Errors raised by the throttling core and its configuration layer.
#[derive(Debug, Error)]
pub enum ThrottlerError {
    /// The action identifier is empty or blank. Programmer error, never retried.
    #[error("Unknown action: {0:?} is not a valid action identifier")]
    UnknownAction(String),

    /// The caller's wait bound elapsed before admission. No token was consumed.
    #[error("Throttle wait for {service}/{action} exceeded {limit:?}")]
    ThrottleTimeout {
        service: String,
        action: String,
        limit: Duration,
    },

    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl ThrottlerError {
    /// Whether the caller may try the same call again later.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ThrottlerError::ThrottleTimeout { .. })
    }
}

impl From<validator::ValidationErrors> for ThrottlerError {
    fn from(err: validator::ValidationErrors) -> Self {
        ThrottlerError::ValidationError(err.to_string())
    }
}

impl From<serde_json::Error> for ThrottlerError {
    fn from(err: serde_json::Error) -> Self {
        ThrottlerError::ConfigurationError(format!("Invalid quota configuration: {}", err))
    }
}

impl From<envconfig::Error> for ThrottlerError {
    fn from(err: envconfig::Error) -> Self {
        ThrottlerError::ConfigurationError(err.to_string())
    }
}

pub type ThrottlerResult<T> = Result<T, ThrottlerError>;

/// Outcome of a failed dispatch: either the core refused to admit the call,
/// or the transport failed and its error is handed back untouched.
#[derive(Debug, Error)]
pub enum DispatchError<E: std::error::Error + 'static> {
    #[error(transparent)]
    Throttle(#[from] ThrottlerError),

    #[error(transparent)]
    Transport(E),
}

impl<E: std::error::Error + 'static> DispatchError<E> {
    pub fn transport_error(&self) -> Option<&E> {
        match self {
            DispatchError::Transport(err) => Some(err),
            DispatchError::Throttle(_) => None,
        }
    }

    /// Returns the transport error, or the throttling error if the call never left the gate.
    pub fn into_transport(self) -> Result<E, ThrottlerError> {
        match self {
            DispatchError::Transport(err) => Ok(err),
            DispatchError::Throttle(err) => Err(err),
        }
    }
}
