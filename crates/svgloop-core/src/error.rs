use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// Caller-visible failures of a vectorization run.
///
/// Content problems (unparseable model output, invalid markup) and candidate-specific render
/// failures never show up here: they are recovered inside the loop.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid input: {message}")]
    InputValidation { message: String },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("Invalid configuration: {message}")]
    Config { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn input(message: impl Into<String>) -> Self {
        Self::InputValidation {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InputValidation { .. } => ErrorKind::InputValidation,
            Error::Backend(err) if err.is_retryable() => ErrorKind::BackendConnectivity,
            Error::Backend(_) => ErrorKind::BackendApi,
            Error::Render(RenderError::Unavailable { .. }) => ErrorKind::RenderFatal,
            Error::Render(RenderError::Candidate { .. }) => ErrorKind::RenderCandidate,
            Error::Config { .. } => ErrorKind::Config,
            Error::Io(_) => ErrorKind::Io,
            Error::Json(_) => ErrorKind::Json,
        }
    }
}

/// Stable labels for [`Error`] variants, used by batch reports and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InputValidation,
    BackendConnectivity,
    BackendApi,
    RenderFatal,
    RenderCandidate,
    Config,
    Io,
    Json,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InputValidation => "input_validation",
            ErrorKind::BackendConnectivity => "backend_connectivity",
            ErrorKind::BackendApi => "backend_api",
            ErrorKind::RenderFatal => "render_fatal",
            ErrorKind::RenderCandidate => "render_candidate",
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
            ErrorKind::Json => "json",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// Timeouts, connection resets, throttling and server-side outages.
    #[error("{provider}: connection failed: {message}")]
    Connectivity { provider: String, message: String },

    #[error("{provider}: API error (HTTP {status}): {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("{provider}: response contained no text")]
    EmptyResponse { provider: String },

    #[error("{provider}: {message}")]
    Unsupported { provider: String, message: String },
}

impl BackendError {
    /// Only connectivity-class failures are worth repeating; everything else would just burn
    /// quota on the same answer.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Connectivity { .. })
    }
}

/// Treats a blank model reply as (empty) content so callers can recover from it locally.
pub(crate) fn blank_reply_as_text(
    reply: std::result::Result<String, BackendError>,
) -> std::result::Result<String, BackendError> {
    match reply {
        Err(BackendError::EmptyResponse { provider }) => {
            tracing::warn!(%provider, "model returned an empty reply");
            Ok(String::new())
        }
        other => other,
    }
}

/// Problems with model-generated content. Recovered locally, never surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContentError {
    #[error("no SVG markup found in model response")]
    MarkupExtractionFailed,

    #[error("invalid SVG markup: {reason}")]
    InvalidMarkup { reason: String },

    #[error("model response could not be parsed as a scene description")]
    UnparseableDescription,
}

/// One rendering strategy's failure message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderAttempt {
    pub strategy: String,
    pub message: String,
}

impl fmt::Display for RenderAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.strategy, self.message)
    }
}

fn join_attempts(attempts: &[RenderAttempt]) -> String {
    if attempts.is_empty() {
        return "no rendering strategy configured".to_string();
    }
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RenderError {
    /// No strategy can rasterize anything in this environment. Fatal for a run.
    #[error("no rendering backend available ({})", join_attempts(.attempts))]
    Unavailable { attempts: Vec<RenderAttempt> },

    /// This particular markup was rejected by every strategy.
    #[error("candidate could not be rendered ({})", join_attempts(.attempts))]
    Candidate { attempts: Vec<RenderAttempt> },
}

impl RenderError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, RenderError::Unavailable { .. })
    }

    pub fn attempts(&self) -> &[RenderAttempt] {
        match self {
            RenderError::Unavailable { attempts } | RenderError::Candidate { attempts } => {
                attempts
            }
        }
    }
}
