// SPDX-License-Identifier: AGPL-3.0-only

//! CPU-side driver for the thermal-prediction test chip.
//!
//! The thermal top samples the IVT sensors and raises a start sentinel for
//! each piece of work it needs from the CPU. This crate serves those rounds:
//! reconstruct records, run the quantized predictor, hand results back, and
//! signal completion.
//!
//! # Backend hierarchy
//!
//! ```text
//! Silicon:
//!   PhysicalWindow — /dev/mem mapping of 0x6000_0000.. (root)
//!
//! Development:
//!   SimulatedChip  — in-memory image + thermal-top peer
//!   FakeMemory     — in-memory image, nothing on the other side
//! ```
//!
//! # Quick start
//!
//! ```
//! use therm_driver::prelude::*;
//! use therm_models::{CalibrationTable, CalibrationWeights, Predictor, ScalingParams, ZooModel};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::default()
//!     .with_iterations(2)
//!     .with_wait(WaitPolicy::MaxPolls(10_000));
//! let calibration = CalibrationTable::uniform(CalibrationWeights::factory(), config.num_sensors);
//! let predictor = Predictor::new(
//!     ZooModel::Persistence28_14_14.build()?,
//!     ScalingParams::default(),
//!     config.num_sensors,
//! )?;
//!
//! let mut chip = SimulatedChip::new(Stimulus::default());
//! let mut pipeline = ThermalPipeline::new(config, calibration, predictor)?;
//! for report in pipeline.run(&mut chip)? {
//!     println!("{}", report.sensor_line());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod backends;
mod config;
mod error;
pub mod handshake;
pub mod mmio;
mod pipeline;

pub use backends::{FakeMemory, FlagRelease, PhysicalWindow, SimulatedChip, Stimulus};
pub use config::{PipelineConfig, ENV_MAX_POLLS, ENV_WAIT_TIMEOUT_MS};
pub use error::{Result, ThermError};
pub use handshake::{CancelToken, ChannelState, HandshakeCoordinator, RoundStats, WaitPolicy};
pub use mmio::{MemoryBus, MmioRegister};
pub use pipeline::{IterationReport, ThermalPipeline};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        CancelToken, FakeMemory, HandshakeCoordinator, IterationReport, MemoryBus,
        PhysicalWindow, PipelineConfig, SimulatedChip, Stimulus, ThermError, ThermalPipeline,
        WaitPolicy,
    };
}
