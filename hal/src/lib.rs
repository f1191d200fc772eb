//! # VIDC Hardware Abstraction Layer
//!
//! The control core never touches MMIO or clock controllers directly. It goes
//! through two narrow traits:
//!
//! - [`RegisterIo`]: 32-bit register reads, writes, masked writes and
//!   bounded polling.
//! - [`PlatformResources`]: bus votes, power domains (GDSCs), clocks, the
//!   AHB-to-AXI bridge reset, register presets and the device IRQ line.
//!
//! The [`regs`] module documents the iris33 register map used by the
//! handshake protocol. With the `mock` feature the [`mock`] module provides
//! in-memory implementations of both traits for host tests.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

pub mod mmio;
pub mod regs;
pub mod resources;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use mmio::{PollBudget, RegisterIo};
pub use resources::{Clock, PlatformResources, PowerDomain, RegisterPreset};
