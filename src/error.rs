//! Error types for the tdtool bridge
//!
//! This module provides error handling with structured error codes,
//! severity classification and `tracing` integration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Error types for tdtool bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The tdtool binary could not be resolved on this system
    #[error("\"{0}\" does not seem to be installed, but is required by this bridge")]
    ToolUnavailable(String),

    /// The tdtool subprocess exited with a failure status; carries stderr verbatim
    #[error("tdtool failed: {0}")]
    ToolExecution(String),

    /// A record carried a model with no accessory mapping
    #[error(
        "Model \"{model}\" is not supported, try [{}]. If you still have not found \
         what you're looking for, submit a pull request.",
        supported.join(", ")
    )]
    UnclassifiedModel {
        model: String,
        supported: Vec<String>,
    },

    /// Sensor reading is missing or older than the staleness threshold
    #[error("No reading available for sensor {0}")]
    SensorUnavailable(i64),

    /// Control command output lacked the success marker
    #[error("Unexpected response from tdtool: {0}")]
    UnexpectedResponse(String),

    /// Device or sensor not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Parsing errors
    #[error("Parsing error: {0}")]
    Parsing(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML decoding errors
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Structured error code for machine-readable error handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Tool errors (1000-1099)
    ToolMissing,
    ToolFailed,
    ToolTimeout,

    // Configuration errors (1200-1299)
    ConfigurationInvalid,

    // Device errors (1300-1399)
    DeviceNotFound,
    DeviceControlFailed,
    DeviceTypeUnsupported,
    SensorStale,

    // Data errors (1400-1499)
    ParsingFailed,
    InvalidInput,

    // Internal errors (1900-1999)
    InternalError,
}

impl ErrorCode {
    /// Get numeric error code
    pub fn as_number(&self) -> u32 {
        match self {
            ErrorCode::ToolMissing => 1001,
            ErrorCode::ToolFailed => 1002,
            ErrorCode::ToolTimeout => 1003,

            ErrorCode::ConfigurationInvalid => 1202,

            ErrorCode::DeviceNotFound => 1301,
            ErrorCode::DeviceControlFailed => 1303,
            ErrorCode::DeviceTypeUnsupported => 1304,
            ErrorCode::SensorStale => 1305,

            ErrorCode::ParsingFailed => 1401,
            ErrorCode::InvalidInput => 1402,

            ErrorCode::InternalError => 1901,
        }
    }

    /// Get error category
    pub fn category(&self) -> &'static str {
        match self.as_number() {
            1000..=1099 => "tool",
            1200..=1299 => "configuration",
            1300..=1399 => "device",
            1400..=1499 => "data",
            1900..=1999 => "internal",
            _ => "unknown",
        }
    }
}

/// Error severity levels for logging
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Low severity - information only
    Info,
    /// Medium severity - warning condition
    Warning,
    /// High severity - error condition
    Error,
    /// Critical severity - immediate attention required
    Critical,
}

/// Structured error context with additional metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Error code for machine processing
    pub code: ErrorCode,
    /// Component that generated the error
    pub component: String,
    /// Operation that was being performed
    pub operation: String,
    /// Additional metadata about the error
    pub metadata: HashMap<String, serde_json::Value>,
    /// Timestamp when error occurred
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    /// Create new error context
    pub fn new(code: ErrorCode, component: &str, operation: &str) -> Self {
        Self {
            code,
            component: component.to_string(),
            operation: operation.to_string(),
            metadata: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    /// Add metadata to error context
    pub fn with_metadata<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<serde_json::Value>,
    {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl BridgeError {
    /// Create a tool execution error from subprocess stderr
    pub fn tool_execution<S: Into<String>>(stderr: S) -> Self {
        Self::ToolExecution(stderr.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a parsing error
    pub fn parsing_error<S: Into<String>>(msg: S) -> Self {
        Self::Parsing(msg.into())
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// Map to a structured error code
    pub fn to_error_code(&self) -> ErrorCode {
        match self {
            BridgeError::ToolUnavailable(_) => ErrorCode::ToolMissing,
            BridgeError::ToolExecution(_) => ErrorCode::ToolFailed,
            BridgeError::Timeout(_) => ErrorCode::ToolTimeout,
            BridgeError::UnclassifiedModel { .. } => ErrorCode::DeviceTypeUnsupported,
            BridgeError::SensorUnavailable(_) => ErrorCode::SensorStale,
            BridgeError::UnexpectedResponse(_) => ErrorCode::DeviceControlFailed,
            BridgeError::NotFound(_) => ErrorCode::DeviceNotFound,
            BridgeError::InvalidInput(_) => ErrorCode::InvalidInput,
            BridgeError::Config(_) | BridgeError::Toml(_) => ErrorCode::ConfigurationInvalid,
            BridgeError::Parsing(_) => ErrorCode::ParsingFailed,
            BridgeError::Io(_) => ErrorCode::InternalError,
        }
    }

    /// Get error severity
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            BridgeError::ToolUnavailable(_) => ErrorSeverity::Critical,
            BridgeError::UnclassifiedModel { .. } => ErrorSeverity::Info,
            BridgeError::SensorUnavailable(_) | BridgeError::Timeout(_) => ErrorSeverity::Warning,
            BridgeError::InvalidInput(_) | BridgeError::Parsing(_) => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    /// Check if error is retryable
    ///
    /// Nothing in the bridge retries on its own; this only informs callers.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::Timeout(_) | BridgeError::SensorUnavailable(_)
        )
    }

    /// Check if the error comes from the subprocess transport
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            BridgeError::ToolUnavailable(_)
                | BridgeError::ToolExecution(_)
                | BridgeError::Timeout(_)
                | BridgeError::Io(_)
        )
    }
}

/// Error logging and reporting utilities
pub struct ErrorReporter;

impl ErrorReporter {
    /// Log an error with appropriate severity
    pub fn log_error(error: &BridgeError, context: Option<ErrorContext>) {
        let code = error.to_error_code();
        let context = context.unwrap_or_else(|| ErrorContext::new(code.clone(), "unknown", "unknown"));
        let code_number = code.as_number();
        let category = code.category();

        match error.severity() {
            ErrorSeverity::Critical | ErrorSeverity::Error => {
                tracing::error!(
                    error_code = code_number,
                    category,
                    component = context.component,
                    operation = context.operation,
                    metadata = ?context.metadata,
                    "Error occurred: {}",
                    error
                );
            }
            ErrorSeverity::Warning => {
                tracing::warn!(
                    error_code = code_number,
                    category,
                    component = context.component,
                    operation = context.operation,
                    "Warning: {}",
                    error
                );
            }
            ErrorSeverity::Info => {
                tracing::info!(
                    error_code = code_number,
                    category,
                    component = context.component,
                    operation = context.operation,
                    "Info: {}",
                    error
                );
            }
        }
    }

    /// Format error for machine-readable output
    pub fn format_error(error: &BridgeError) -> serde_json::Value {
        let code = error.to_error_code();
        serde_json::json!({
            "error": {
                "code": code.as_number(),
                "category": code.category(),
                "message": error.to_string(),
                "retryable": error.is_retryable(),
                "transport": error.is_transport_error(),
            }
        })
    }
}
