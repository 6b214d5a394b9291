// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for model construction.
//!
//! Nothing on the per-sample path returns these: reconstruction, quantization
//! and inference resolve every numeric edge case by clamping. Errors are
//! raised only while building a model, a scaling set or a calibration table.

use thiserror::Error;

/// Result type alias for model operations
pub type Result<T> = std::result::Result<T, ModelError>;

/// Configuration errors caught at startup
#[derive(Debug, Error)]
pub enum ModelError {
    /// Layer tables disagree with declared dimensions or engine limits
    #[error("Invalid layer {index}: {reason}")]
    InvalidLayer {
        /// Layer position in the network
        index: usize,
        /// Reason for failure
        reason: String,
    },

    /// Network topology is unusable
    #[error("Invalid network: {reason}")]
    InvalidNetwork {
        /// Reason for failure
        reason: String,
    },

    /// Scaling parameters are inconsistent
    #[error("Invalid scaling: {reason}")]
    InvalidScaling {
        /// Reason for failure
        reason: String,
    },

    /// Calibration data has the wrong shape
    #[error("Invalid calibration: {reason}")]
    InvalidCalibration {
        /// Reason for failure
        reason: String,
    },

    /// A layer cannot be rewritten in another weight representation
    #[error("Conversion failed: {reason}")]
    ConversionFailed {
        /// Reason for failure
        reason: String,
    },

    /// Unknown zoo model name
    #[error("Unknown model: {name}")]
    UnknownModel {
        /// Requested name
        name: String,
    },
}

impl ModelError {
    /// Create an invalid layer error
    pub fn invalid_layer(index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidLayer {
            index,
            reason: reason.into(),
        }
    }

    /// Create an invalid network error
    pub fn invalid_network(reason: impl Into<String>) -> Self {
        Self::InvalidNetwork {
            reason: reason.into(),
        }
    }

    /// Create an invalid scaling error
    pub fn invalid_scaling(reason: impl Into<String>) -> Self {
        Self::InvalidScaling {
            reason: reason.into(),
        }
    }

    /// Create an invalid calibration error
    pub fn invalid_calibration(reason: impl Into<String>) -> Self {
        Self::InvalidCalibration {
            reason: reason.into(),
        }
    }

    /// Create a conversion error
    pub fn conversion_failed(reason: impl Into<String>) -> Self {
        Self::ConversionFailed {
            reason: reason.into(),
        }
    }
}
