//! # VIDC Capabilities
//!
//! Every session owns a table of capabilities (codec controls and derived
//! firmware properties). Capabilities form a DAG: a change to a parent
//! recomputes each child through the child's adjust function, and every
//! capability whose value moved is sent to the firmware.
//!
//! ## Flow
//!
//! ```text
//!   client control
//!        │
//!        ▼
//!   ┌──────────────┐  not streaming   ┌────────────────────────┐
//!   │ set_control  │ ───────────────► │ store + side effects   │
//!   └──────────────┘                  │ (secure limit, layers) │
//!        │ streaming                  └────────────────────────┘
//!        ▼
//!   ┌──────────────┐    children      ┌────────────────────────┐
//!   │  propagate   │ ───────────────► │ adjust (FIFO)          │
//!   └──────────────┘                  └────────────────────────┘
//!        │ changed ids
//!        ▼
//!   ┌──────────────┐
//!   │   commit     │ ──► PropertySink (firmware packets)
//!   └──────────────┘
//!
//!   stream-on: decide work mode / route / quality,
//!              then adjust_set_all in dependency order
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

pub mod cap;
pub mod decide;
pub mod dependency;
pub mod propagate;
pub mod session;
pub mod table;

pub use cap::{CapFlags, CapId, Capability, CapabilityTable, MAX_CAP_CHILDREN, MAX_CAP_PARENTS};
pub use decide::{adjust_bitrate_boost, QualityMode, WorkMode};
pub use dependency::dependency_order;
pub use propagate::{AdjustCtx, CapabilityState, PropertySink};
pub use session::{CapabilitySession, Codec, SessionProps, SessionRegistry};
pub use table::default_table;
