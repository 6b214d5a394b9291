// SPDX-License-Identifier: AGPL-3.0-only

//! Silicon model for the thermal-prediction test chip.
//!
//! This crate has **no dependencies** and **no hardware access**. It models
//! what the CPU sees of the die: fixed addresses, handshake sentinels shared
//! with the thermal top, and the packed word layouts of sensor buffers and
//! configuration register files.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`map`] | Fixed addresses of buffers, flags, counters and register files |
//! | [`flags`] | Handshake channels and their start/finish sentinels |
//! | [`record`] | `SensorRecord` and `FrequencyTriple` bit layouts |
//! | [`regfile`] | Top / quant / dequant configuration word packing |
//! | [`factory`] | Factory calibration words for the IVT sensors |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod factory;
pub mod flags;
pub mod map;
pub mod record;
pub mod regfile;

pub use flags::Channel;
pub use record::{FrequencyTriple, SensorRecord};
pub use regfile::{DequantRegfileEntry, QuantRegfileEntry, TopConfig};

/// Number of IVT sensors instantiated on the die.
pub const NUM_SENSORS: usize = 14;
