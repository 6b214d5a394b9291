// SPDX-License-Identifier: AGPL-3.0-only

//! Memory-bus backends
//!
//! Three backends available:
//! - **Physical**: `/dev/mem` mapping of the shared window (on-chip CPU or a
//!   host with the window exposed; needs root)
//! - **Memory**: zero-initialised image with no peer, for unit tests
//! - **Simulated**: image plus a thermal-top peer that raises the handshake
//!   sentinels, for integration tests and `therm simulate`

pub mod memory;
pub mod physical;
pub mod simulated;

pub use memory::FakeMemory;
pub use physical::PhysicalWindow;
pub use simulated::{FlagRelease, SimulatedChip, Stimulus};
