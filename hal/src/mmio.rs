//! # Register Access
//!
//! Register primitives as seen by the control core. Offsets are in bytes
//! from the start of the video subsystem register space.

use vidc_core::{Error, Result};

// =============================================================================
// POLL BUDGETS
// =============================================================================

/// Interval/timeout pair for a bounded register poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    /// Sleep between reads in microseconds
    pub interval_us: u32,
    /// Give up after this many microseconds
    pub timeout_us: u32,
}

impl PollBudget {
    /// NOC low-power handshake status
    pub const NOC_LPI: Self = Self::new(200, 2000);
    /// Debug bridge LPI release
    pub const DEBUG_BRIDGE: Self = Self::new(200, 2000);
    /// Per-pipe VCODEC idle status
    pub const VCODEC_IDLE: Self = Self::new(2000, 20000);
    /// Power-collapse readiness and WFI
    pub const PC_READY: Self = Self::new(250, 2500);

    /// Create a budget
    pub const fn new(interval_us: u32, timeout_us: u32) -> Self {
        Self {
            interval_us,
            timeout_us,
        }
    }

    /// Upper bound on the number of reads the poll performs
    pub const fn max_reads(&self) -> u32 {
        if self.interval_us == 0 {
            1
        } else {
            self.timeout_us / self.interval_us + 1
        }
    }
}

// =============================================================================
// REGISTER IO
// =============================================================================

/// 32-bit register access
///
/// Implementations only need [`read`](Self::read), [`write`](Self::write)
/// and [`delay_us`](Self::delay_us). Masked writes and polls are built on
/// top of them.
pub trait RegisterIo: Send + Sync {
    /// Read a register
    fn read(&self, addr: u32) -> Result<u32>;

    /// Write a register
    fn write(&self, addr: u32, value: u32) -> Result<()>;

    /// Busy-wait or sleep for at least `us` microseconds
    fn delay_us(&self, us: u32);

    /// Sleep somewhere in `[min_us, max_us]`
    ///
    /// The default sleeps for the upper bound. An inverted range still
    /// waits at least `min_us`.
    fn sleep_range_us(&self, min_us: u32, max_us: u32) {
        self.delay_us(max_us.max(min_us));
    }

    /// Read-modify-write touching only the bits in `mask`
    fn write_masked(&self, addr: u32, value: u32, mask: u32) -> Result<()> {
        let current = self.read(addr)?;
        let new_value = (current & !mask) | (value & mask);
        self.write(addr, new_value)
    }

    /// Poll until `(read(addr) & mask) == expected`
    ///
    /// Returns [`Error::Timeout`] once `timeout_us` has elapsed without a
    /// match. Read failures abort the poll immediately.
    fn poll_until(
        &self,
        addr: u32,
        mask: u32,
        expected: u32,
        interval_us: u32,
        timeout_us: u32,
    ) -> Result<()> {
        let mut elapsed = 0u32;

        loop {
            let value = self.read(addr)?;
            if (value & mask) == expected {
                return Ok(());
            }

            if elapsed >= timeout_us || interval_us == 0 {
                log::trace!(
                    "poll {:#x}: mask {:#x} expected {:#x} last {:#x} timed out",
                    addr,
                    mask,
                    expected,
                    value
                );
                return Err(Error::Timeout);
            }

            self.delay_us(interval_us);
            elapsed = elapsed.saturating_add(interval_us);
        }
    }

    /// [`poll_until`](Self::poll_until) with a named budget
    fn poll_budget(&self, addr: u32, mask: u32, expected: u32, budget: PollBudget) -> Result<()> {
        self.poll_until(addr, mask, expected, budget.interval_us, budget.timeout_us)
    }
}
