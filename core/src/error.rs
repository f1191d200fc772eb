//! # VIDC Error Handling
//!
//! A single error type is shared by the power, capability and fence
//! subsystems. Each kind maps onto one of the coarse [`ErrorCode`]s that the
//! session layer reports to configuration clients.
//!
//! | Kind | Surfaced as | Raised by |
//! |------|-------------|-----------|
//! | `InvalidArgument` | invalid-argument | every entry point |
//! | `InvalidState` | invalid-argument | power sequencer, sub-state |
//! | `Timeout` / `BootTimeout` | timeout | register polls, boot handshake |
//! | `Busy` | busy | power-collapse preparation |
//! | `DependencyCycle` | fault | dependency ordering |
//! | `UnknownCapability` / `UnknownIndex` | invalid-argument | lookups |
//! | `NotDynamic` | busy | dynamic propagation |
//! | `MissingAdjustFn` | fault | dynamic propagation |
//! | `NotQueued` | invalid-argument | buffer release |
//! | `OrphanedFence` | fault | buffer release |

use core::fmt;

// =============================================================================
// RESULT TYPE
// =============================================================================

/// VIDC Result type alias
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// ERROR ENUM
// =============================================================================

/// Unified error type of the control core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Generic Errors
    // =========================================================================
    /// Malformed or missing input
    InvalidArgument,
    /// Core or session is not in the state the operation requires
    InvalidState,
    /// A bounded register poll ran out of budget
    Timeout,
    /// Preconditions for the operation are not met right now
    Busy,
    /// Operation not supported by this variant
    NotSupported,

    // =========================================================================
    // Hardware Errors
    // =========================================================================
    /// Register backend rejected an access
    Register {
        /// Offset of the failing register
        addr: u32,
    },
    /// Clock, power domain or bus vote failed
    Resource,
    /// Firmware never reported ready during the boot handshake
    BootTimeout,

    // =========================================================================
    // Capability Errors
    // =========================================================================
    /// Capability graph contains a cycle
    DependencyCycle,
    /// Capability id is not part of the session table
    UnknownCapability,
    /// Capability cannot change while streaming
    NotDynamic,
    /// Child capability has no adjust function
    MissingAdjustFn,

    // =========================================================================
    // Fence Errors
    // =========================================================================
    /// No tracked buffer carries this index
    UnknownIndex,
    /// Buffer was released without being queued
    NotQueued,
    /// Wait fence has no signal fence partner on the release list
    OrphanedFence,
}

impl Error {
    /// Coarse code reported to configuration clients
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument
            | Self::InvalidState
            | Self::UnknownCapability
            | Self::UnknownIndex
            | Self::NotQueued => ErrorCode::InvalidArgument,
            Self::Busy | Self::NotDynamic => ErrorCode::Busy,
            Self::Timeout | Self::BootTimeout => ErrorCode::Timeout,
            Self::NotSupported => ErrorCode::NotSupported,
            Self::Register { .. }
            | Self::Resource
            | Self::DependencyCycle
            | Self::MissingAdjustFn
            | Self::OrphanedFence => ErrorCode::Fault,
        }
    }

    /// Whether the caller may retry the same request later
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Busy | Self::Timeout)
    }

    /// Whether this error marks a broken internal invariant
    pub const fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::DependencyCycle | Self::MissingAdjustFn | Self::OrphanedFence
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Generic
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::InvalidState => write!(f, "invalid state"),
            Self::Timeout => write!(f, "operation timed out"),
            Self::Busy => write!(f, "resource busy"),
            Self::NotSupported => write!(f, "operation not supported"),

            // Hardware
            Self::Register { addr } => write!(f, "register access failed at {:#x}", addr),
            Self::Resource => write!(f, "platform resource request failed"),
            Self::BootTimeout => write!(f, "firmware boot handshake timed out"),

            // Capability
            Self::DependencyCycle => write!(f, "capability dependency cycle"),
            Self::UnknownCapability => write!(f, "unknown capability"),
            Self::NotDynamic => write!(f, "capability not settable while streaming"),
            Self::MissingAdjustFn => write!(f, "child capability lacks adjust function"),

            // Fence
            Self::UnknownIndex => write!(f, "unknown buffer index"),
            Self::NotQueued => write!(f, "buffer not queued"),
            Self::OrphanedFence => write!(f, "wait fence has no signal partner"),
        }
    }
}

// =============================================================================
// ERROR CODE
// =============================================================================

/// Exit code surfaced to the configuration/session layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    /// Invalid argument (`EINVAL`)
    InvalidArgument = -22,
    /// Try again later (`EAGAIN`)
    Busy            = -11,
    /// Timer expired (`ETIME`)
    Timeout         = -62,
    /// Not supported (`EOPNOTSUPP`)
    NotSupported    = -95,
    /// Internal fault (`EFAULT`)
    Fault           = -14,
}

impl ErrorCode {
    /// Negative errno-style value
    pub const fn as_errno(self) -> i32 {
        self as i32
    }
}

impl From<Error> for ErrorCode {
    fn from(e: Error) -> Self {
        e.code()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidArgument => "invalid-argument",
            Self::Busy => "busy",
            Self::Timeout => "timeout",
            Self::NotSupported => "not-supported",
            Self::Fault => "fault",
        };
        write!(f, "{} ({})", name, self.as_errno())
    }
}
