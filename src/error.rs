// src/error.rs

use serde::{Deserialize, Serialize};

/// Result type used throughout the beacon library
pub type ForecastResult<T> = Result<T, ForecastError>;

/// All possible errors that can occur while serving a forecast request
#[derive(thiserror::Error, Debug)]
pub enum ForecastError {
    /// Missing or invalid request input, correctable by the caller
    #[error("{message}")]
    Validation { message: String },

    /// Missing credentials or an unusable backend, correctable by the operator
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The monitoring backend call failed
    #[error("Failed to retrieve metrics: {message}")]
    Retrieval { message: String },

    /// Numeric failure while training or running the forecast model
    #[error("Forecast training failed: {message}")]
    Training { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    /// IO-related errors
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Generic error for unexpected situations
    #[error("Unexpected error: {message}")]
    Unexpected { message: String },
}

/// Helper methods for creating common errors
impl ForecastError {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn retrieval<S: Into<String>>(message: S) -> Self {
        Self::Retrieval {
            message: message.into(),
        }
    }

    pub fn training<S: Into<String>>(message: S) -> Self {
        Self::Training {
            message: message.into(),
        }
    }

    pub fn unexpected<S: Into<String>>(message: S) -> Self {
        Self::Unexpected {
            message: message.into(),
        }
    }

    /// HTTP-equivalent status code for the transport layer
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::Retrieval { .. } => 502,
            Self::Config { .. }
            | Self::Training { .. }
            | Self::Serialization { .. }
            | Self::Io { .. }
            | Self::Unexpected { .. } => 500,
        }
    }

    /// Whether the caller can fix the request and retry
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// JSON body the transport layer should send alongside [`Self::status_code`]
    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
        }
    }
}

/// Error payload returned to callers: `{ "error": "..." }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl From<tokio::task::JoinError> for ForecastError {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::Training {
            message: format!("Training worker did not complete: {}", error),
        }
    }
}

impl From<tokio::sync::AcquireError> for ForecastError {
    fn from(error: tokio::sync::AcquireError) -> Self {
        Self::Training {
            message: format!("Training pool unavailable: {}", error),
        }
    }
}

impl From<candle_core::Error> for ForecastError {
    fn from(error: candle_core::Error) -> Self {
        Self::Training {
            message: error.to_string(),
        }
    }
}

#[cfg(feature = "http-backend")]
impl From<reqwest::Error> for ForecastError {
    fn from(error: reqwest::Error) -> Self {
        Self::Retrieval {
            message: error.to_string(),
        }
    }
}
