//! # Platform Resources
//!
//! Clocks, power domains, interconnect votes and the IRQ line are owned by
//! the platform. The power sequencer drives them through
//! [`PlatformResources`].

use core::fmt;

use vidc_core::Result;

/// Bus vote used while powering on (maximum bandwidth)
pub const BW_VOTE_MAX: u64 = i32::MAX as u64;

// =============================================================================
// NAMED RESOURCES
// =============================================================================

/// Power domains (GDSCs) of the video subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PowerDomain {
    /// Controller (firmware CPU) domain
    IrisCtl,
    /// Codec hardware domain
    Vcodec,
}

impl PowerDomain {
    /// Platform name of the domain
    pub const fn name(self) -> &'static str {
        match self {
            Self::IrisCtl => "iris-ctl",
            Self::Vcodec => "vcodec",
        }
    }
}

impl fmt::Display for PowerDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Clocks of the video subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Clock {
    /// GCC AXI clock
    GccVideoAxi0,
    /// Controller core clock
    CoreClk,
    /// Codec hardware clock
    VcodecClk,
}

impl Clock {
    /// Platform name of the clock
    pub const fn name(self) -> &'static str {
        match self {
            Self::GccVideoAxi0 => "gcc_video_axi0",
            Self::CoreClk => "core_clk",
            Self::VcodecClk => "vcodec_clk",
        }
    }
}

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Register value re-applied after every power-on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterPreset {
    /// Register offset
    pub addr: u32,
    /// Value to write
    pub value: u32,
    /// Bits touched by the write
    pub mask: u32,
}

// =============================================================================
// PLATFORM RESOURCES
// =============================================================================

/// Platform resource control
pub trait PlatformResources: Send + Sync {
    /// Vote interconnect bandwidth in kbps (0/0 removes the vote)
    fn set_bw(&self, avg_kbps: u64, peak_kbps: u64) -> Result<()>;

    /// Enable a power domain
    fn gdsc_on(&self, domain: PowerDomain) -> Result<()>;

    /// Disable a power domain
    fn gdsc_off(&self, domain: PowerDomain) -> Result<()>;

    /// Prepare and enable a clock
    fn clk_enable(&self, clock: Clock) -> Result<()>;

    /// Disable and unprepare a clock
    fn clk_disable(&self, clock: Clock) -> Result<()>;

    /// Pulse the AHB-to-AXI bridge reset lines
    fn reset_bridge(&self) -> Result<()>;

    /// Scale the codec clock source (0 drops the rate vote)
    fn set_clks(&self, freq_hz: u64) -> Result<()>;

    /// Registers lost on power collapse that must be re-applied
    fn register_presets(&self) -> &[RegisterPreset] {
        &[]
    }

    /// Enable the device interrupt line
    fn enable_irq(&self);

    /// Disable the device interrupt line without waiting for handlers
    fn disable_irq(&self);
}
