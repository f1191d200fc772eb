//! # Core State
//!
//! Lifecycle and power sub-state of the single device instance.
//!
//! The coarse lifecycle (`Deinit` → `InitWait` → `Init`) tracks whether the
//! firmware handshake has been started and completed. Layered on top is the
//! [`SubState`] set: transient hardware and firmware conditions such as
//! "clocks are on" or "watchdog fired". Every field here lives behind the
//! device lock owned by the power subsystem.

use core::fmt;

use bitflags::bitflags;

use crate::error::{Error, Result};

// =============================================================================
// LIFECYCLE
// =============================================================================

/// Coarse device lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoreLifecycle {
    /// Firmware not loaded
    #[default]
    Deinit,
    /// Firmware booting, waiting for the init-done response
    InitWait,
    /// Firmware up and accepting commands
    Init,
    /// Fatal error, waiting for recovery
    Error,
}

impl CoreLifecycle {
    /// Whether power may be applied in this state
    pub const fn is_operational(self) -> bool {
        matches!(self, Self::InitWait | Self::Init)
    }

    /// Short name for logs
    pub const fn name(self) -> &'static str {
        match self {
            Self::Deinit => "CORE_DEINIT",
            Self::InitWait => "CORE_INIT_WAIT",
            Self::Init => "CORE_INIT",
            Self::Error => "CORE_ERROR",
        }
    }
}

// =============================================================================
// SUB-STATE
// =============================================================================

bitflags! {
    /// Transient hardware/firmware conditions of the core
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SubState: u32 {
        /// Clocks and regulators are on
        const POWER_ENABLE       = 1 << 0;
        /// Power domain handed to firmware control
        const GDSC_HANDOFF       = 1 << 1;
        /// System suspend in progress
        const PM_SUSPEND         = 1 << 2;
        /// Firmware owns hardware power collapse
        const FW_PWR_CTRL        = 1 << 3;
        /// SMMU page fault seen
        const PAGE_FAULT         = 1 << 4;
        /// Firmware watchdog fired
        const CPU_WATCHDOG       = 1 << 5;
        /// Firmware stopped answering
        const VIDEO_UNRESPONSIVE = 1 << 6;
    }
}

impl fmt::Display for SubState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }
        let mut first = true;
        for (name, _) in self.iter_names() {
            if !first {
                write!(f, "|")?;
            }
            write!(f, "{}", name)?;
            first = false;
        }
        Ok(())
    }
}

// =============================================================================
// INTERRUPT STATUS
// =============================================================================

bitflags! {
    /// Wrapper interrupt status bits accumulated by the interrupt handler
    ///
    /// Unknown bits read from hardware are retained.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InterruptStatus: u32 {
        /// Firmware to host message interrupt
        const A2H          = 0x4;
        /// Firmware watchdog interrupt
        const A2H_WATCHDOG = 0x8;
        /// Codec idle indication
        const VCODEC_IDLE  = 0x4000_0000;
    }
}

// =============================================================================
// CORE STATUS
// =============================================================================

/// Mutable device state guarded by the device lock
#[derive(Debug, Clone, Default)]
pub struct CoreStatus {
    /// Coarse lifecycle
    pub lifecycle: CoreLifecycle,
    /// Sub-state set
    sub_state: SubState,
    /// Pending interrupt bits since the last power-on
    pub intr_status: InterruptStatus,
    /// Interrupts with no recognized status bit
    pub spur_count: u32,
    /// Recognized interrupts
    pub reg_count: u32,
    /// Last requested core clock frequency in Hz (0 = none)
    pub clk_freq: u64,
}

impl CoreStatus {
    /// Fresh status for a device in `Deinit`
    pub const fn new() -> Self {
        Self {
            lifecycle: CoreLifecycle::Deinit,
            sub_state: SubState::empty(),
            intr_status: InterruptStatus::empty(),
            spur_count: 0,
            reg_count: 0,
            clk_freq: 0,
        }
    }

    /// Current sub-state
    pub fn sub_state(&self) -> SubState {
        self.sub_state
    }

    /// Check whether every bit of `bits` is set
    pub fn is_sub_state(&self, bits: SubState) -> bool {
        self.sub_state.contains(bits)
    }

    /// Transition the sub-state
    ///
    /// Every bit in `set` must currently be clear and every bit in `clear`
    /// must currently be set; otherwise nothing changes and
    /// [`Error::InvalidState`] is returned.
    pub fn change_sub_state(&mut self, clear: SubState, set: SubState, func: &str) -> Result<()> {
        if clear.intersects(set) {
            log::error!("{}: overlapping sub-state change {} / {}", func, clear, set);
            return Err(Error::InvalidArgument);
        }
        if self.sub_state.intersects(set) || !self.sub_state.contains(clear) {
            log::error!(
                "{}: sub-state {} cannot clear {} and set {}",
                func,
                self.sub_state,
                clear,
                set
            );
            return Err(Error::InvalidState);
        }

        let prev = self.sub_state;
        self.sub_state.remove(clear);
        self.sub_state.insert(set);
        log::debug!("{}: sub-state {} -> {}", func, prev, self.sub_state);
        Ok(())
    }

    /// Unconditionally drop `bits`, used while unwinding
    pub fn force_clear_sub_state(&mut self, bits: SubState, func: &str) {
        if self.sub_state.intersects(bits) {
            log::debug!("{}: force clear {} from {}", func, bits, self.sub_state);
        }
        self.sub_state.remove(bits);
    }

    /// Set `bits` without precondition checks, used for event reporting
    pub fn raise_sub_state(&mut self, bits: SubState) {
        self.sub_state.insert(bits);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;

    #[test]
    fn test_lifecycle_operational() {
        assert!(!CoreLifecycle::Deinit.is_operational());
        assert!(CoreLifecycle::InitWait.is_operational());
        assert!(CoreLifecycle::Init.is_operational());
        assert!(!CoreLifecycle::Error.is_operational());
    }

    #[test]
    fn test_change_sub_state_requires_bits() {
        let mut status = CoreStatus::new();

        // clearing a bit that is not set is rejected
        assert_eq!(
            status.change_sub_state(SubState::POWER_ENABLE, SubState::empty(), "test"),
            Err(Error::InvalidState)
        );

        status
            .change_sub_state(SubState::empty(), SubState::POWER_ENABLE, "test")
            .unwrap();
        assert!(status.is_sub_state(SubState::POWER_ENABLE));

        // setting it twice is rejected and leaves the state untouched
        assert_eq!(
            status.change_sub_state(SubState::empty(), SubState::POWER_ENABLE, "test"),
            Err(Error::InvalidState)
        );
        assert_eq!(status.sub_state(), SubState::POWER_ENABLE);

        status
            .change_sub_state(SubState::POWER_ENABLE, SubState::empty(), "test")
            .unwrap();
        assert!(status.sub_state().is_empty());
    }

    #[test]
    fn test_overlapping_change_rejected() {
        let mut status = CoreStatus::new();
        assert_eq!(
            status.change_sub_state(SubState::PM_SUSPEND, SubState::PM_SUSPEND, "test"),
            Err(Error::InvalidArgument)
        );
    }

    #[test]
    fn test_force_clear() {
        let mut status = CoreStatus::new();
        status.force_clear_sub_state(SubState::POWER_ENABLE, "test");
        status.raise_sub_state(SubState::CPU_WATCHDOG | SubState::FW_PWR_CTRL);
        status.force_clear_sub_state(SubState::CPU_WATCHDOG, "test");
        assert_eq!(status.sub_state(), SubState::FW_PWR_CTRL);
    }

    #[test]
    fn test_sub_state_display() {
        assert_eq!(format!("{}", SubState::empty()), "NONE");
        assert_eq!(
            format!("{}", SubState::POWER_ENABLE | SubState::PAGE_FAULT),
            "POWER_ENABLE|PAGE_FAULT"
        );
    }

    #[test]
    fn test_interrupt_status_retains_unknown_bits() {
        let status = InterruptStatus::from_bits_retain(0x8 | 0x1);
        assert!(status.contains(InterruptStatus::A2H_WATCHDOG));
        assert_eq!(status.bits(), 0x9);
    }
}
