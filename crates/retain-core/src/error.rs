use std::fmt;

/// Core error taxonomy for the retention pipeline.
///
/// Transport and precondition failures are hard errors; parse failures never
/// surface through this type - the repair tiers in `retain-agent` degrade to
/// empty results instead.
#[derive(Debug)]
pub enum RetainError {
    /// Missing or invalid configuration (API key, SMTP credentials)
    Config(String),

    /// Required input file absent - hard precondition, the run does not start
    MissingInput(String),

    /// Oracle or embedding endpoint unreachable, timed out, or rejected auth
    Transport {
        url: String,
        status: Option<u16>,
        message: String,
    },

    /// A successful HTTP response whose body did not carry the expected shape
    OracleResponse(String),

    /// Input document failed to decode
    Parse(String),

    /// Vector store failure
    Store(String),

    /// Notification delivery failure
    Notify(String),

    /// File I/O outside the hard-precondition paths
    Io(String),
}

impl fmt::Display for RetainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetainError::Config(msg) => write!(f, "Configuration error: {}", msg),
            RetainError::MissingInput(path) => write!(f, "Required input not found: {}", path),
            RetainError::Transport {
                url,
                status,
                message,
            } => match status {
                Some(code) => write!(
                    f,
                    "Request to {} failed with status {}: {}",
                    url, code, message
                ),
                None => write!(f, "Request to {} failed: {}", url, message),
            },
            RetainError::OracleResponse(msg) => {
                write!(f, "Unexpected oracle response shape: {}", msg)
            }
            RetainError::Parse(msg) => write!(f, "Parse error: {}", msg),
            RetainError::Store(msg) => write!(f, "Vector store error: {}", msg),
            RetainError::Notify(msg) => write!(f, "Notification error: {}", msg),
            RetainError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for RetainError {}

impl From<reqwest::Error> for RetainError {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        if err.is_timeout() {
            RetainError::Transport {
                url,
                status: None,
                message: "request timed out".to_string(),
            }
        } else {
            RetainError::Transport {
                url,
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for RetainError {
    fn from(err: serde_json::Error) -> Self {
        RetainError::Parse(err.to_string())
    }
}

impl From<std::io::Error> for RetainError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => RetainError::MissingInput(err.to_string()),
            _ => RetainError::Io(err.to_string()),
        }
    }
}

/// Result type alias for pipeline operations
pub type RetainResult<T> = Result<T, RetainError>;
