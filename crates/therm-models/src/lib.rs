// SPDX-License-Identifier: AGPL-3.0-only

#![forbid(unsafe_code)]

//! Integer-only numerics for the thermal-prediction pipeline
//!
//! Three stages, leaves first:
//!
//! - **Reconstruction** ([`calibration`]): oscillator counts and calibration
//!   coefficients to a packed `SensorRecord`, evaluated in `i128`.
//! - **Codec** ([`quant`]): raw power/thermal codes to the network's `i8`
//!   input and network outputs back to 10-bit thermal codes.
//! - **Engine** ([`engine`], [`layer`]): a 2 to 6 layer quantized MLP with
//!   zero-point or pre-scaled linear layers and shift or divide requantizers.
//!
//! [`Predictor`] owns a codec, a network and its buffers. [`zoo`] holds the
//! compiled network tables.
//!
//! # Example
//!
//! ```
//! use therm_models::{Predictor, ScalingParams, ZooModel};
//!
//! # fn main() -> therm_models::Result<()> {
//! let mlp = ZooModel::Persistence28_14_14.build()?;
//! let mut predictor = Predictor::new(mlp, ScalingParams::default(), 14)?;
//!
//! let mut pred = [0u16; 14];
//! predictor.predict(&[3736; 14], &[516; 14], &mut pred);
//! assert!(pred.iter().all(|&t| t.abs_diff(516) < 8));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod calibration;
pub mod engine;
mod error;
pub mod layer;
mod predictor;
pub mod quant;
pub mod zoo;

pub use calibration::{reconstruct, CalibrationTable, CalibrationWeights};
pub use engine::{QuantizedMlp, Scratch, MAX_LAYERS};
pub use error::{ModelError, Result};
pub use layer::{LinearLayer, QuantLayer, Requant, WeightFormat, MAX_NEURONS};
pub use predictor::Predictor;
pub use quant::{ChannelScaling, ScalingParams, MAX_SHIFT};
pub use zoo::ZooModel;
