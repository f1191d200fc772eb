//! # Session Seam
//!
//! The session object itself belongs to the layer above this crate. The
//! subsystems only need to ask a few questions about it, which are captured
//! by [`SessionHealth`].

/// Session direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// Bitstream in, raw frames out
    Decode,
    /// Raw frames in, bitstream out
    Encode,
}

/// Health queries answered by a live session
///
/// Fence `signaled` callbacks may run from interrupt or recovery context
/// while the session is being torn down, so callers hold the session through
/// a weak handle and upgrade it only for the duration of the query.
pub trait SessionHealth: Send + Sync {
    /// Session identifier used as the log prefix
    fn session_id(&self) -> u32;

    /// Whether the session hit an unrecoverable error
    fn is_session_error(&self) -> bool;
}
