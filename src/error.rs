//! Unified error types for Oxidrums

use thiserror::Error;

/// Unified Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for Oxidrums
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket errors
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// CDP protocol errors
    #[error("CDP error: {0}")]
    Cdp(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A browser, context or page is required but missing
    #[error("{0}")]
    NotInitialized(String),

    /// The resource is already open
    #[error("{0}")]
    AlreadyOpen(String),

    /// Browser not found
    #[error("Browser not found: {0}")]
    BrowserNotFound(String),

    /// Context not found (or ambiguous)
    #[error("{0}")]
    ContextNotFound(String),

    /// Page not found
    #[error("{0}")]
    PageNotFound(String),

    /// Element not found
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// Cookie not found
    #[error("{0}")]
    CookieNotFound(String),

    /// An argument has the wrong shape
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Timeout
    #[error("Operation timeout: {0}")]
    Timeout(String),

    /// Navigation failed
    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    /// Script execution failed
    #[error("Script execution failed: {0}")]
    ScriptExecutionFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Raised before any engine call: nothing open, or already open
    Precondition,
    /// A lookup matched nothing (or more than one thing where one was required)
    NotFound,
    /// An argument could not be interpreted
    InvalidArgument,
    /// Surfaced from the engine or its transport
    Engine,
}

impl Error {
    /// Create a new WebSocket error
    pub fn websocket<S: Into<String>>(msg: S) -> Self {
        Error::WebSocket(msg.into())
    }

    /// Create a new CDP error
    pub fn cdp<S: Into<String>>(msg: S) -> Self {
        Error::Cdp(msg.into())
    }

    /// Create a new not-initialized error
    pub fn not_initialized<S: Into<String>>(msg: S) -> Self {
        Error::NotInitialized(msg.into())
    }

    /// Create a new already-open error
    pub fn already_open<S: Into<String>>(msg: S) -> Self {
        Error::AlreadyOpen(msg.into())
    }

    /// Create a new browser not found error
    pub fn browser_not_found<S: Into<String>>(id: S) -> Self {
        Error::BrowserNotFound(id.into())
    }

    /// Create a new context not found error
    pub fn context_not_found<S: Into<String>>(msg: S) -> Self {
        Error::ContextNotFound(msg.into())
    }

    /// Create a new page not found error
    pub fn page_not_found<S: Into<String>>(msg: S) -> Self {
        Error::PageNotFound(msg.into())
    }

    /// Create a new element not found error
    pub fn element_not_found<S: Into<String>>(id: S) -> Self {
        Error::ElementNotFound(id.into())
    }

    /// Create a new cookie not found error
    pub fn cookie_not_found<S: Into<String>>(msg: S) -> Self {
        Error::CookieNotFound(msg.into())
    }

    /// Create a new invalid argument error
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Error::Timeout(msg.into())
    }

    /// Create a new navigation failed error
    pub fn navigation_failed<S: Into<String>>(msg: S) -> Self {
        Error::NavigationFailed(msg.into())
    }

    /// Create a new script execution failed error
    pub fn script_execution_failed<S: Into<String>>(msg: S) -> Self {
        Error::ScriptExecutionFailed(msg.into())
    }

    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Error::Configuration(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotInitialized(_) | Error::AlreadyOpen(_) => ErrorKind::Precondition,
            Error::BrowserNotFound(_)
            | Error::ContextNotFound(_)
            | Error::PageNotFound(_)
            | Error::ElementNotFound(_)
            | Error::CookieNotFound(_) => ErrorKind::NotFound,
            Error::InvalidArgument(_) | Error::Configuration(_) => ErrorKind::InvalidArgument,
            _ => ErrorKind::Engine,
        }
    }

    /// Whether the error means "nothing matched"
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::InvalidArgument(format!("invalid regular expression: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(Error::not_initialized("x").kind(), ErrorKind::Precondition);
        assert_eq!(Error::already_open("x").kind(), ErrorKind::Precondition);
        assert_eq!(Error::page_not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(Error::cookie_not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(Error::invalid_argument("x").kind(), ErrorKind::InvalidArgument);
        assert_eq!(Error::timeout("x").kind(), ErrorKind::Engine);
        assert_eq!(Error::cdp("x").kind(), ErrorKind::Engine);
    }

    #[test]
    fn test_regex_error_is_invalid_argument() {
        let err: Error = regex::Regex::new("(").unwrap_err().into();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_messages_pass_through() {
        let err = Error::page_not_found("Cannot find title or URL matching foo");
        assert_eq!(err.to_string(), "Cannot find title or URL matching foo");
    }
}
