use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("{context}: {status} - {body}")]
    Upstream {
        context: String,
        status: u16,
        body: String,
    },

    #[error("Gave up on {url} after {attempts} attempts: {reason}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("Service at {url} not ready after {waited_secs}s")]
    ServiceUnavailable { url: String, waited_secs: u64 },

    #[error("{message}")]
    InvalidInput { message: String },

    #[error("{message}")]
    NotFound { message: String },

    #[error("Unknown action: {action}")]
    UnknownAction { action: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Command `{command}` failed: {message}")]
    ProcessError { command: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Upstream,
    Input,
    Filesystem,
    Configuration,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl WorkerError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::HttpError(_) | Self::RetriesExhausted { .. } | Self::ServiceUnavailable { .. } => {
                ErrorCategory::Network
            }
            Self::Upstream { .. } => ErrorCategory::Upstream,
            Self::InvalidInput { .. } | Self::NotFound { .. } | Self::UnknownAction { .. } => {
                ErrorCategory::Input
            }
            Self::IoError(_) | Self::ProcessError { .. } => ErrorCategory::Filesystem,
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::UrlError(_) => ErrorCategory::Configuration,
            Self::SerializationError(_) => ErrorCategory::Internal,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Input => ErrorSeverity::Low,
            ErrorCategory::Network | ErrorCategory::Upstream => ErrorSeverity::Medium,
            ErrorCategory::Filesystem | ErrorCategory::Internal => ErrorSeverity::High,
            ErrorCategory::Configuration => ErrorSeverity::Critical,
        }
    }

    /// 網路錯誤與 5xx 上游回應視為可重試
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpError(e) => e.is_connect() || e.is_timeout(),
            Self::Upstream { status, .. } => *status >= 500,
            Self::RetriesExhausted { .. } | Self::ServiceUnavailable { .. } => true,
            _ => false,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Network => {
                "Check that the WebUI is running and reachable at the configured api_root"
            }
            ErrorCategory::Upstream => {
                "Inspect the WebUI logs; the request was rejected by the upstream API"
            }
            ErrorCategory::Input => "Fix the job input and resubmit",
            ErrorCategory::Filesystem => {
                "Check permissions and free space in the WebUI model directories"
            }
            ErrorCategory::Configuration => "Review the worker configuration file and environment",
            ErrorCategory::Internal => "Unexpected data shape; report the failing job payload",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::RetriesExhausted { url, attempts, .. } => {
                format!("WebUI did not answer {} after {} attempts", url, attempts)
            }
            Self::ServiceUnavailable { url, .. } => format!("WebUI at {} never became ready", url),
            Self::UnknownAction { action } => format!("Action '{}' is not supported", action),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkerError>;
