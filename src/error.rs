//! Error types for the engine and its external generators.

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can surface to callers of the render pipeline.
///
/// Everything recoverable (generator failures, silent renders, unknown
/// pattern names, out-of-range events) is absorbed and logged instead.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The sequencer was invoked without a synthesized sample library.
    #[error("no instrument sample library has been synthesized for this session")]
    MissingSampleLibrary,

    /// The arrangement plan cannot be rendered.
    #[error("invalid arrangement plan: {reason}")]
    InvalidPlan {
        /// What is wrong with the plan.
        reason: String,
    },

    /// A numeric parameter is out of its usable range.
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// Error message.
        message: String,
    },

    /// Waveform container or PCM stream could not be interpreted.
    #[error("codec error: {message}")]
    Codec {
        /// Error message.
        message: String,
    },

    /// WAV parsing failed.
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),

    /// Base64 payload could not be decoded.
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// JSON payload could not be decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Creates an invalid plan error.
    pub fn invalid_plan(reason: impl Into<String>) -> Self {
        Self::InvalidPlan {
            reason: reason.into(),
        }
    }

    /// Creates an invalid parameter error.
    pub fn invalid_param(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }
}

/// Failures reported by the remote plan / speech generators.
///
/// These never cross the planner or vocal booth boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeneratorError {
    /// The service could not be reached.
    #[error("generator unavailable: {0}")]
    Unavailable(String),

    /// The service did not answer in time.
    #[error("generator timed out")]
    Timeout,

    /// The response did not match the requested schema.
    #[error("malformed generator response: {0}")]
    Malformed(String),

    /// The response carried no payload.
    #[error("generator returned an empty response")]
    EmptyResponse,
}
