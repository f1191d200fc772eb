//! # VIDC Core
//!
//! Foundational types shared by every layer of the video codec accelerator
//! control core: the error taxonomy, the device lifecycle and power
//! sub-state, device-wide configuration and the session health seam used by
//! the fence subsystem.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         vidc-core                            │
//! │  ┌────────────┐  ┌──────────────┐  ┌──────────┐  ┌────────┐  │
//! │  │   Error    │  │  CoreStatus  │  │  Config  │  │Session │  │
//! │  │ (taxonomy, │  │ (lifecycle,  │  │ (queues, │  │ Health │  │
//! │  │  errno)    │  │  sub-state)  │  │  limits) │  │        │  │
//! │  └────────────┘  └──────────────┘  └──────────┘  └────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//!          ▲                 ▲                ▲            ▲
//!          │                 │                │            │
//!      vidc-hal         vidc-power     vidc-capability  vidc-sync
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

pub mod config;
pub mod error;
pub mod session;
pub mod state;

pub use config::{CoreConfig, QueueMemoryMap};
pub use error::{Error, ErrorCode, Result};
pub use session::{SessionHealth, SessionKind};
pub use state::{CoreLifecycle, CoreStatus, InterruptStatus, SubState};
