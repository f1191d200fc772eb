//! # Mock Backends
//!
//! In-memory [`RegisterIo`] and [`PlatformResources`] implementations for
//! host tests.
//!
//! [`MockRegisters`] is a sparse register file. Registers that were never
//! written read back their reset value (or 0). Reads can be scripted per
//! register and accesses can be made to fail. Every write is logged in order.
//!
//! [`MockResources`] tracks which domains and clocks are on, the current bus
//! and clock votes and the IRQ line, and records every call.

use alloc::collections::{BTreeMap, BTreeSet, VecDeque};
use alloc::vec::Vec;

use spin::Mutex;
use vidc_core::{Error, Result};

use crate::mmio::RegisterIo;
use crate::regs;
use crate::resources::{Clock, PlatformResources, PowerDomain, RegisterPreset};

// =============================================================================
// MOCK REGISTERS
// =============================================================================

#[derive(Debug, Default)]
struct RegisterFile {
    values: BTreeMap<u32, u32>,
    resets: BTreeMap<u32, u32>,
    scripted: BTreeMap<u32, VecDeque<u32>>,
    writes: Vec<(u32, u32)>,
    reads: BTreeMap<u32, usize>,
    fail_read: BTreeSet<u32>,
    fail_write: BTreeSet<u32>,
    delay_us: u64,
}

impl RegisterFile {
    fn current(&self, addr: u32) -> u32 {
        self.values
            .get(&addr)
            .or_else(|| self.resets.get(&addr))
            .copied()
            .unwrap_or(0)
    }
}

/// Sparse in-memory register file
#[derive(Debug, Default)]
pub struct MockRegisters {
    inner: Mutex<RegisterFile>,
}

impl MockRegisters {
    /// Empty register file, every register resets to 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Register file preloaded with the iris33 reset values
    pub fn iris33() -> Self {
        let regs = Self::new();
        regs.set_reset_value(regs::WRAPPER_INTR_MASK, regs::WRAPPER_INTR_MASK_RESET);
        regs
    }

    /// Define the value a register holds out of reset
    pub fn set_reset_value(&self, addr: u32, value: u32) {
        self.inner.lock().resets.insert(addr, value);
    }

    /// Set a register without logging a write
    pub fn set(&self, addr: u32, value: u32) {
        self.inner.lock().values.insert(addr, value);
    }

    /// Current value of a register
    pub fn get(&self, addr: u32) -> u32 {
        self.inner.lock().current(addr)
    }

    /// Queue values returned by the next reads of `addr`
    ///
    /// Once the script runs dry, reads fall back to the stored value.
    pub fn script_reads(&self, addr: u32, values: &[u32]) {
        self.inner
            .lock()
            .scripted
            .entry(addr)
            .or_default()
            .extend(values.iter().copied());
    }

    /// Make every read of `addr` fail
    pub fn fail_reads(&self, addr: u32) {
        self.inner.lock().fail_read.insert(addr);
    }

    /// Make every write of `addr` fail
    pub fn fail_writes(&self, addr: u32) {
        self.inner.lock().fail_write.insert(addr);
    }

    /// All writes in order
    pub fn writes(&self) -> Vec<(u32, u32)> {
        self.inner.lock().writes.clone()
    }

    /// Values written to one register, in order
    pub fn writes_to(&self, addr: u32) -> Vec<u32> {
        self.inner
            .lock()
            .writes
            .iter()
            .filter(|(a, _)| *a == addr)
            .map(|(_, v)| *v)
            .collect()
    }

    /// Whether `addr` was ever written
    pub fn was_written(&self, addr: u32) -> bool {
        self.inner.lock().writes.iter().any(|(a, _)| *a == addr)
    }

    /// Number of reads of `addr`
    pub fn read_count(&self, addr: u32) -> usize {
        self.inner.lock().reads.get(&addr).copied().unwrap_or(0)
    }

    /// Total time spent in `delay_us`
    pub fn total_delay_us(&self) -> u64 {
        self.inner.lock().delay_us
    }

    /// Registers whose value differs from their reset value
    pub fn diff_from_reset(&self, addrs: &[u32]) -> Vec<(u32, u32)> {
        let inner = self.inner.lock();
        addrs
            .iter()
            .filter_map(|addr| {
                let reset = inner.resets.get(addr).copied().unwrap_or(0);
                let value = inner.current(*addr);
                (value != reset).then_some((*addr, value))
            })
            .collect()
    }

    /// Forget the write log
    pub fn clear_log(&self) {
        self.inner.lock().writes.clear();
    }
}

impl RegisterIo for MockRegisters {
    fn read(&self, addr: u32) -> Result<u32> {
        let mut inner = self.inner.lock();
        if inner.fail_read.contains(&addr) {
            return Err(Error::Register { addr });
        }
        *inner.reads.entry(addr).or_insert(0) += 1;
        if let Some(value) = inner.scripted.get_mut(&addr).and_then(VecDeque::pop_front) {
            return Ok(value);
        }
        Ok(inner.current(addr))
    }

    fn write(&self, addr: u32, value: u32) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.fail_write.contains(&addr) {
            return Err(Error::Register { addr });
        }
        inner.writes.push((addr, value));
        inner.values.insert(addr, value);
        Ok(())
    }

    fn delay_us(&self, us: u32) {
        self.inner.lock().delay_us += u64::from(us);
    }
}

// =============================================================================
// MOCK RESOURCES
// =============================================================================

/// One recorded platform call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceOp {
    /// Bus vote
    SetBw(u64, u64),
    /// Domain on
    GdscOn(PowerDomain),
    /// Domain off
    GdscOff(PowerDomain),
    /// Clock on
    ClkEnable(Clock),
    /// Clock off
    ClkDisable(Clock),
    /// Bridge reset pulse
    ResetBridge,
    /// Clock rate vote
    SetClks(u64),
    /// IRQ line on
    EnableIrq,
    /// IRQ line off
    DisableIrq,
}

#[derive(Debug, Default)]
struct ResourceState {
    log: Vec<ResourceOp>,
    domains: BTreeSet<PowerDomain>,
    clocks: BTreeSet<Clock>,
    bw: (u64, u64),
    freq: u64,
    irq_enabled: bool,
    fail: Vec<ResourceOp>,
}

/// Recorder for platform resource calls
#[derive(Debug, Default)]
pub struct MockResources {
    state: Mutex<ResourceState>,
    presets: Vec<RegisterPreset>,
}

impl MockResources {
    /// All resources off, IRQ line disabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorder that reports `presets` as the register init table
    pub fn with_presets(presets: Vec<RegisterPreset>) -> Self {
        Self {
            state: Mutex::new(ResourceState::default()),
            presets,
        }
    }

    /// Make every future call matching `op` fail
    pub fn fail_on(&self, op: ResourceOp) {
        self.state.lock().fail.push(op);
    }

    /// Calls in order
    pub fn log(&self) -> Vec<ResourceOp> {
        self.state.lock().log.clone()
    }

    /// Whether a power domain is on
    pub fn is_domain_on(&self, domain: PowerDomain) -> bool {
        self.state.lock().domains.contains(&domain)
    }

    /// Whether a clock is on
    pub fn is_clock_on(&self, clock: Clock) -> bool {
        self.state.lock().clocks.contains(&clock)
    }

    /// Whether anything is still powered or clocked
    pub fn anything_on(&self) -> bool {
        let state = self.state.lock();
        !state.domains.is_empty() || !state.clocks.is_empty()
    }

    /// Current bus vote
    pub fn bw(&self) -> (u64, u64) {
        self.state.lock().bw
    }

    /// Current clock rate vote
    pub fn freq(&self) -> u64 {
        self.state.lock().freq
    }

    /// IRQ line state
    pub fn irq_enabled(&self) -> bool {
        self.state.lock().irq_enabled
    }

    fn record(&self, op: ResourceOp) -> Result<()> {
        let mut state = self.state.lock();
        state.log.push(op);
        if state.fail.contains(&op) {
            return Err(Error::Resource);
        }
        match op {
            ResourceOp::SetBw(avg, peak) => state.bw = (avg, peak),
            ResourceOp::GdscOn(d) => {
                state.domains.insert(d);
            }
            ResourceOp::GdscOff(d) => {
                state.domains.remove(&d);
            }
            ResourceOp::ClkEnable(c) => {
                state.clocks.insert(c);
            }
            ResourceOp::ClkDisable(c) => {
                state.clocks.remove(&c);
            }
            ResourceOp::SetClks(f) => state.freq = f,
            ResourceOp::EnableIrq => state.irq_enabled = true,
            ResourceOp::DisableIrq => state.irq_enabled = false,
            ResourceOp::ResetBridge => {}
        }
        Ok(())
    }
}

impl PlatformResources for MockResources {
    fn set_bw(&self, avg_kbps: u64, peak_kbps: u64) -> Result<()> {
        self.record(ResourceOp::SetBw(avg_kbps, peak_kbps))
    }

    fn gdsc_on(&self, domain: PowerDomain) -> Result<()> {
        self.record(ResourceOp::GdscOn(domain))
    }

    fn gdsc_off(&self, domain: PowerDomain) -> Result<()> {
        self.record(ResourceOp::GdscOff(domain))
    }

    fn clk_enable(&self, clock: Clock) -> Result<()> {
        self.record(ResourceOp::ClkEnable(clock))
    }

    fn clk_disable(&self, clock: Clock) -> Result<()> {
        self.record(ResourceOp::ClkDisable(clock))
    }

    fn reset_bridge(&self) -> Result<()> {
        self.record(ResourceOp::ResetBridge)
    }

    fn set_clks(&self, freq_hz: u64) -> Result<()> {
        self.record(ResourceOp::SetClks(freq_hz))
    }

    fn register_presets(&self) -> &[RegisterPreset] {
        &self.presets
    }

    fn enable_irq(&self) {
        let _ = self.record(ResourceOp::EnableIrq);
    }

    fn disable_irq(&self) {
        let _ = self.record(ResourceOp::DisableIrq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_values_and_writes() {
        let regs = MockRegisters::iris33();
        assert_eq!(regs.read(regs::WRAPPER_INTR_MASK).unwrap(), 0x1F6);
        regs.write(regs::WRAPPER_INTR_MASK, 0x1F2).unwrap();
        assert_eq!(regs.writes(), alloc::vec![(regs::WRAPPER_INTR_MASK, 0x1F2)]);
        assert_eq!(
            regs.diff_from_reset(&[regs::WRAPPER_INTR_MASK, regs::HFI_CTRL_INIT]),
            alloc::vec![(regs::WRAPPER_INTR_MASK, 0x1F2)]
        );
    }

    #[test]
    fn test_scripted_reads_fall_back() {
        let regs = MockRegisters::new();
        regs.set(0x4, 7);
        regs.script_reads(0x4, &[1, 2]);
        assert_eq!(regs.read(0x4).unwrap(), 1);
        assert_eq!(regs.read(0x4).unwrap(), 2);
        assert_eq!(regs.read(0x4).unwrap(), 7);
        assert_eq!(regs.read_count(0x4), 3);
    }

    #[test]
    fn test_write_failure_not_logged() {
        let regs = MockRegisters::new();
        regs.fail_writes(0x8);
        assert_eq!(regs.write(0x8, 1), Err(Error::Register { addr: 0x8 }));
        assert!(!regs.was_written(0x8));
    }

    #[test]
    fn test_resource_tracking() {
        let res = MockResources::new();
        res.gdsc_on(PowerDomain::Vcodec).unwrap();
        res.clk_enable(Clock::VcodecClk).unwrap();
        assert!(res.anything_on());
        res.clk_disable(Clock::VcodecClk).unwrap();
        res.gdsc_off(PowerDomain::Vcodec).unwrap();
        assert!(!res.anything_on());

        res.fail_on(ResourceOp::ClkEnable(Clock::CoreClk));
        assert_eq!(res.clk_enable(Clock::CoreClk), Err(Error::Resource));
        assert!(!res.is_clock_on(Clock::CoreClk));
    }
}
