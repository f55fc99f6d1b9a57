use rocket::serde::json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Main error type for the stats server
#[derive(Error, Debug)]
pub enum MaiError {
    /// Input validation error (malformed credential, bad region)
    #[error("Input error: {message}")]
    Input {
        message: String,
        error_code: i32,
        status: u16,
    },

    /// No credential was supplied and none is stored
    #[error("{message}")]
    CredentialRequired {
        message: String,
        error_code: i32,
        status: u16,
    },

    /// A pending job already exists for the user and region
    #[error("{message}")]
    JobRunning {
        message: String,
        error_code: i32,
        status: u16,
    },

    /// Too many jobs were started in the sliding window
    #[error("{message}")]
    RateLimit {
        message: String,
        error_code: i32,
        retry_after_secs: u64,
        status: u16,
    },

    /// The external site definitively rejected the credential
    #[error("{message}")]
    AuthRejected {
        message: String,
        error_code: i32,
        status: u16,
    },

    /// Transient failure talking to the external site
    #[error("{message}")]
    Upstream {
        message: String,
        error_code: i32,
        status: u16,
    },

    /// A required fragment was missing from a scraped page
    #[error("Parse error: {message}")]
    Parse {
        message: String,
        error_code: i32,
        status: u16,
    },

    /// Data not found error
    #[error("No data: {message}")]
    NoData {
        message: String,
        error_code: i32,
        status: u16,
    },

    /// Client gave up waiting on a job
    #[error("Timeout: {message}")]
    Timeout { message: String },

    /// Database error
    #[error("Database error: {message}")]
    Database { message: String },

    /// JSON serialization error
    #[error("JSON error: {message}")]
    Json { message: String },

    /// HTTP client error
    #[error("HTTP error: {message}")]
    Http { message: String },

    /// Rocket error
    #[error("Rocket error: {message}")]
    Rocket { message: String },

    /// IO error
    #[error("IO error: {message}")]
    Io { message: String },
}

impl MaiError {
    /// Create a new input validation error
    pub fn input<S: Into<String>>(message: S) -> Self {
        Self::Input {
            message: message.into(),
            error_code: 100,
            status: 400,
        }
    }

    /// Create a missing credential error
    pub fn credential_required() -> Self {
        Self::CredentialRequired {
            message: "No maimai credential found for this region. Please add your authentication token first.".to_string(),
            error_code: 101,
            status: 400,
        }
    }

    /// Create a job already running error
    pub fn job_running() -> Self {
        Self::JobRunning {
            message: "A fetch is already in progress for this region".to_string(),
            error_code: 201,
            status: 409,
        }
    }

    /// Create a new rate limit error
    pub fn rate_limit(retry_after_secs: u64, max_jobs: usize, window_secs: u64) -> Self {
        Self::RateLimit {
            message: format!(
                "Rate limited. You can make {max_jobs} requests per {} minutes. Try again in {retry_after_secs} seconds.",
                window_secs / 60
            ),
            error_code: 202,
            retry_after_secs,
            status: 429,
        }
    }

    /// Create a definitive authentication failure
    pub fn auth_rejected<S: Into<String>>(message: S) -> Self {
        Self::AuthRejected {
            message: message.into(),
            error_code: 301,
            status: 401,
        }
    }

    /// Create a transient upstream failure
    pub fn upstream<S: Into<String>>(message: S) -> Self {
        Self::Upstream {
            message: message.into(),
            error_code: 302,
            status: 502,
        }
    }

    /// Create a page extraction failure
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse {
            message: message.into(),
            error_code: 303,
            status: 502,
        }
    }

    /// Create a new no data error
    pub fn no_data<S: Into<String>>(message: S) -> Self {
        Self::NoData {
            message: message.into(),
            error_code: 404,
            status: 404,
        }
    }

    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Create a rocket error
    pub fn rocket_err<S: Into<String>>(message: S) -> Self {
        Self::Rocket {
            message: message.into(),
        }
    }

    /// Duplicate-job and rate-limit rejections, as opposed to bad input
    pub fn is_concurrency_error(&self) -> bool {
        matches!(self, Self::JobRunning { .. } | Self::RateLimit { .. })
    }

    /// Seconds until a rate-limited caller may retry
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimit {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status(&self) -> u16 {
        match self {
            Self::Input { status, .. }
            | Self::CredentialRequired { status, .. }
            | Self::JobRunning { status, .. }
            | Self::RateLimit { status, .. }
            | Self::AuthRejected { status, .. }
            | Self::Upstream { status, .. }
            | Self::Parse { status, .. }
            | Self::NoData { status, .. } => *status,
            Self::Timeout { .. } => 504,
            Self::Http { .. } => 502,
            Self::Database { .. } | Self::Json { .. } | Self::Rocket { .. } | Self::Io { .. } => {
                500
            }
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> i32 {
        match self {
            Self::Input { error_code, .. }
            | Self::CredentialRequired { error_code, .. }
            | Self::JobRunning { error_code, .. }
            | Self::RateLimit { error_code, .. }
            | Self::AuthRejected { error_code, .. }
            | Self::Upstream { error_code, .. }
            | Self::Parse { error_code, .. }
            | Self::NoData { error_code, .. } => *error_code,
            Self::Timeout { .. } => 504,
            Self::Http { .. } => 302,
            Self::Database { .. } | Self::Json { .. } | Self::Rocket { .. } | Self::Io { .. } => {
                500
            }
        }
    }

    /// Get the extra data for this error
    pub fn extra_data(&self) -> Option<HashMap<String, serde_json::Value>> {
        self.retry_after().map(|secs| {
            let mut extra = HashMap::new();
            extra.insert("retry_after".to_string(), serde_json::json!(secs));
            extra
        })
    }
}

impl From<sqlx::Error> for MaiError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for MaiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for MaiError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for MaiError {
    fn from(err: reqwest::Error) -> Self {
        // reqwest embeds the request URL in its message, which may carry a session id
        Self::Http {
            message: err.without_url().to_string(),
        }
    }
}

/// Alias for Result with MaiError
pub type MaiResult<T> = Result<T, MaiError>;

/// 404 Not Found handler
#[rocket::catch(404)]
pub fn not_found() -> Value {
    rocket::serde::json::json!({
        "success": false,
        "error_code": 404,
        "message": "Endpoint not found"
    })
}

/// 500 Internal Server Error handler
#[rocket::catch(500)]
pub fn internal_error() -> Value {
    rocket::serde::json::json!({
        "success": false,
        "error_code": 500,
        "message": "Internal server error"
    })
}

/// 400 Bad Request handler
#[rocket::catch(400)]
pub fn bad_request() -> Value {
    rocket::serde::json::json!({
        "success": false,
        "error_code": 400,
        "message": "Bad request"
    })
}

/// 401 Unauthorized handler
#[rocket::catch(401)]
pub fn unauthorized() -> Value {
    rocket::serde::json::json!({
        "success": false,
        "error_code": 401,
        "message": "Unauthorized"
    })
}

/// 403 Forbidden handler
#[rocket::catch(403)]
pub fn forbidden() -> Value {
    rocket::serde::json::json!({
        "success": false,
        "error_code": 403,
        "message": "Forbidden"
    })
}
