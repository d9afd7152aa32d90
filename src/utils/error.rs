use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {url}")]
    Status { url: String, status: StatusCode },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("Parsing error: {message}")]
    Parse { message: String },

    #[error("No records to export")]
    NoData,
}

impl AppError {
    pub fn config(message: impl Into<String>) -> Self {
        AppError::Config(message.into())
    }

    pub fn parse(message: impl Into<String>) -> Self {
        AppError::Parse {
            message: message.into(),
        }
    }

    /// Whether retrying the same request may succeed.
    ///
    /// Connection failures, timeouts, 429 and 5xx responses are transient.
    /// Everything else (4xx, malformed markup, local I/O) is not.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Http(err) => {
                if let Some(status) = err.status() {
                    return is_transient_status(status);
                }
                err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
            }
            AppError::Status { status, .. } => is_transient_status(*status),
            _ => false,
        }
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

pub type Result<T> = std::result::Result<T, AppError>;
