//! # VIDC Power and Firmware Boot
//!
//! Power sequencing and the firmware control-register handshake of the
//! iris33 video subsystem.
//!
//! ## Power Sequence
//!
//! ```text
//!   power_on                                  power_off
//!   ────────                                  ─────────
//!   vote max bus bandwidth                    drop clock rate vote
//!          │                                         │
//!          ▼                                         ▼
//!   controller: iris-ctl GDSC, bridge reset,  hardware: idle poll per pipe,
//!               axi clock, core clock                   NOC LPI, bridge reset,
//!          │                                            vcodec clock + GDSC
//!          ▼                                         │
//!   hardware: vcodec GDSC + clock                    ▼
//!          │                                  controller: X2RPMh veto, NOC LPI,
//!          ▼                                              debug bridge, TZ FIFO
//!   POWER_ENABLE, clock rate, presets,                    reset, clocks, GDSC
//!   interrupt mask, IRQ line                         │
//!                                                    ▼
//!                                             drop bus vote, IRQ line,
//!                                             clear POWER_ENABLE
//! ```
//!
//! Any failure during `power_on` unwinds the stages already completed.
//! `power_off` is best effort: it logs sub-step failures and always clears
//! `POWER_ENABLE`.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

pub mod device;
pub mod firmware;
pub mod ops;
pub mod sequencer;

pub use device::VidcCore;
pub use firmware::PcPrepare;
pub use ops::{Iris33Ops, VenusOps};
