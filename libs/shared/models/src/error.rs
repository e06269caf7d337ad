use thiserror::Error;

/// Failures of a REST call, already classified the way the UI reports them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Validation error: {message}")]
    Validation { message: String, fields: Vec<String> },

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Connection error: {0}")]
    Connectivity(String),

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }

    /// The message a user should see for this failure.
    pub fn user_message(&self) -> &str {
        match self {
            ApiError::Unauthorized(message)
            | ApiError::NotFound(message)
            | ApiError::Connectivity(message)
            | ApiError::Decode(message) => message,
            ApiError::Validation { message, .. } | ApiError::Server { message, .. } => message,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized(_) => Some(401),
            ApiError::Validation { .. } => Some(422),
            ApiError::NotFound(_) => Some(404),
            ApiError::Server { status, .. } => Some(*status),
            ApiError::Connectivity(_) | ApiError::Decode(_) => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Connectivity(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}
