// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for driver operations

use therm_chip::Channel;
use thiserror::Error;

/// Result type alias for driver operations
pub type Result<T> = std::result::Result<T, ThermError>;

/// Errors that can occur while driving the pipeline
#[derive(Debug, Error)]
pub enum ThermError {
    /// I/O error while opening or mapping a device
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// Model, codec or calibration rejected at construction
    #[error("Model error: {source}")]
    Model {
        /// Underlying model error
        #[from]
        source: therm_models::ModelError,
    },

    /// Physical window could not be mapped
    #[error("Mapping failed: {reason}")]
    MapFailed {
        /// Reason for failure
        reason: String,
    },

    /// Bounded wait expired before the hardware raised the start sentinel
    #[error("{channel} wait timed out after {polls} polls ({elapsed_ms}ms)")]
    Timeout {
        /// Channel that was waiting
        channel: Channel,
        /// Polls performed
        polls: u64,
        /// Wall time spent waiting
        elapsed_ms: u64,
    },

    /// Wait aborted through a cancel token
    #[error("{channel} wait cancelled")]
    Cancelled {
        /// Channel that was waiting
        channel: Channel,
    },

    /// Pipeline configuration rejected at startup
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Reason for failure
        reason: String,
    },
}

impl ThermError {
    /// Create a mapping failed error
    pub fn map_failed(reason: impl Into<String>) -> Self {
        Self::MapFailed {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Whether the error came from a bounded or cancelled wait.
    ///
    /// Such errors leave the coordinator consistent; the caller may retry.
    pub fn is_wait_interrupted(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Cancelled { .. })
    }
}
