//! # iris33 Register Map
//!
//! Offsets of the registers touched by the power sequencer and the firmware
//! handshake. Only the handshake protocol shape is captured here; the
//! remaining blocks of the subsystem are not described.
//!
//! ```text
//! 0x0000_0000  VCODEC    codec core (idle status per pipe)
//! 0x000A_0000  CPU_CS    firmware CPU control/status, soft interrupts
//! 0x000B_0000  WRAPPER   interrupt mask/status, NOC and debug bridge LPI
//! 0x000C_0000  TZ        CPU WFI status, AXI clock and FIFO reset
//! 0x000E_0000  AON       always-on NOC LPI handshake
//! ```

use static_assertions::const_assert;

cfg_if::cfg_if! {
    if #[cfg(feature = "hw-virt")] {
        /// CPU_CS block base. Guests see only their own CS block, remapped at 0.
        pub const CPU_CS_BASE: u32 = 0x0000_0000;
    } else {
        /// CPU_CS block base
        pub const CPU_CS_BASE: u32 = 0x000A_0000;
    }
}

/// VCODEC block base
pub const VCODEC_BASE: u32 = 0x0000_0000;
/// Wrapper block base
pub const WRAPPER_BASE: u32 = 0x000B_0000;
/// TrustZone wrapper block base
pub const WRAPPER_TZ_BASE: u32 = 0x000C_0000;
/// Always-on wrapper block base
pub const AON_BASE: u32 = 0x000E_0000;

// =============================================================================
// CPU_CS
// =============================================================================

/// Debug copy of the queue table virtual address, low word
pub const QUEUE_VADDR_LO: u32 = CPU_CS_BASE + 0x24;
/// Debug copy of the queue table virtual address, high word
pub const QUEUE_VADDR_HI: u32 = CPU_CS_BASE + 0x28;
/// Control-init trigger
pub const HFI_CTRL_INIT: u32 = CPU_CS_BASE + 0x48;
/// Control status
pub const HFI_CTRL_STATUS: u32 = CPU_CS_BASE + 0x4C;
/// Queue table enable
pub const HFI_QTBL_INFO: u32 = CPU_CS_BASE + 0x50;
/// Queue table address
pub const HFI_QTBL_ADDR: u32 = CPU_CS_BASE + 0x54;
/// Subsystem failure record address
pub const HFI_SFR_ADDR: u32 = CPU_CS_BASE + 0x5C;
/// Memory map address
pub const HFI_MMAP_ADDR: u32 = CPU_CS_BASE + 0x60;
/// Uncached region address
pub const HFI_UC_REGION_ADDR: u32 = CPU_CS_BASE + 0x64;
/// Uncached region size
pub const HFI_UC_REGION_SIZE: u32 = CPU_CS_BASE + 0x68;

/// Firmware to host soft interrupt clear
pub const CPU_CS_A2HSOFTINTCLR: u32 = CPU_CS_BASE + 0x1C;
/// Host to firmware soft interrupt enable
pub const CPU_CS_H2XSOFTINTEN: u32 = CPU_CS_BASE + 0x148;
/// Host to firmware soft interrupt trigger
pub const CPU_IC_SOFTINT: u32 = CPU_CS_BASE + 0x150;
/// AHB bridge sync reset (TZ and non-TZ sides)
pub const CPU_CS_AHB_BRIDGE_SYNC_RESET: u32 = CPU_CS_BASE + 0x160;
/// FAL10 feature control (X2RPMh veto mask)
pub const CPU_CS_X2RPMH: u32 = CPU_CS_BASE + 0x168;

/// Host to firmware soft interrupt bit
pub const CPU_IC_SOFTINT_H2A: u32 = 1 << 0;
/// Control-init trigger bit
pub const CTRL_INIT_BIT: u32 = 1 << 0;

/// Control status fields
pub mod ctrl_status {
    /// Error code field (bits 1-7)
    pub const ERROR_MASK: u32 = 0xfe;
    /// Firmware reported ready
    pub const READY: u32 = 0x1;
    /// Error pattern: UC region not programmed
    pub const ERROR_UC_REGION_NOT_SET: u32 = 0x4;
    /// Firmware ready for power collapse
    pub const PC_READY: u32 = 0x100;
    /// Codec idle indication
    pub const VCODEC_IDLE: u32 = 0x4000_0000;
}

// =============================================================================
// WRAPPER
// =============================================================================

/// Interrupt status
pub const WRAPPER_INTR_STATUS: u32 = WRAPPER_BASE + 0x0C;
/// Interrupt mask (1 = masked)
pub const WRAPPER_INTR_MASK: u32 = WRAPPER_BASE + 0x10;
/// Debug bridge LPI control
pub const WRAPPER_DEBUG_BRIDGE_LPI_CONTROL: u32 = WRAPPER_BASE + 0x54;
/// Debug bridge LPI status
pub const WRAPPER_DEBUG_BRIDGE_LPI_STATUS: u32 = WRAPPER_BASE + 0x58;
/// Firmware CPU NOC LPI control
pub const WRAPPER_CPU_NOC_LPI_CONTROL: u32 = WRAPPER_BASE + 0x5C;
/// Firmware CPU NOC LPI status
pub const WRAPPER_CPU_NOC_LPI_STATUS: u32 = WRAPPER_BASE + 0x60;
/// Codec power status (bit 1 = powered)
pub const WRAPPER_CORE_POWER_STATUS: u32 = WRAPPER_BASE + 0x80;
/// Codec core clock branch config (0 = enabled)
pub const WRAPPER_CORE_CLOCK_CONFIG: u32 = WRAPPER_BASE + 0x88;

/// Watchdog bit in status and mask registers
pub const WRAPPER_INTR_A2HWD: u32 = 0x8;
/// Firmware CPU bit in status and mask registers
pub const WRAPPER_INTR_A2H: u32 = 0x4;
/// Interrupt mask value out of reset
pub const WRAPPER_INTR_MASK_RESET: u32 = 0x1F6;
/// Codec powered bit in `WRAPPER_CORE_POWER_STATUS`
pub const CORE_POWER_ON_BIT: u32 = 1 << 1;

// =============================================================================
// TZ WRAPPER
// =============================================================================

/// Firmware CPU status (bit 0 = WFI)
pub const WRAPPER_TZ_CPU_STATUS: u32 = WRAPPER_TZ_BASE + 0x10;
/// AXI clock config used during the FIFO reset pulse
pub const WRAPPER_TZ_CTL_AXI_CLOCK_CONFIG: u32 = WRAPPER_TZ_BASE + 0x14;
/// QNS4PDX FIFO reset
pub const WRAPPER_TZ_QNS4PDXFIFO_RESET: u32 = WRAPPER_TZ_BASE + 0x18;

/// WFI bit in `WRAPPER_TZ_CPU_STATUS`
pub const TZ_CPU_WFI_BIT: u32 = 1 << 0;

// =============================================================================
// AON / VCODEC
// =============================================================================

/// Codec NOC LPI control
pub const AON_MVP_NOC_LPI_CONTROL: u32 = AON_BASE;
/// Codec NOC LPI status
pub const AON_MVP_NOC_LPI_STATUS: u32 = AON_BASE + 0x4;

/// LPI request/acknowledge bit
pub const NOC_LPI_REQ_BIT: u32 = 1 << 0;

/// Idle status of pipe 0; pipe `n` lives at `+ 4 * n`
pub const VCODEC_SS_IDLE_STATUSN: u32 = VCODEC_BASE + 0x70;
/// Idle bit in `VCODEC_SS_IDLE_STATUSN`
pub const VCODEC_SS_IDLE_BIT: u32 = 0x40_0000;

/// Idle status register of one pipe
pub const fn vcodec_idle_status(pipe: u32) -> u32 {
    VCODEC_SS_IDLE_STATUSN + 4 * pipe
}

// AHB bridge reset write sequence: assert both sides, release one, release both.
/// Bridge reset: both sides asserted
pub const AHB_BRIDGE_RESET_ASSERT: u32 = 0x3;
/// Bridge reset: TZ side still asserted
pub const AHB_BRIDGE_RESET_HALF: u32 = 0x2;
/// Bridge reset: released
pub const AHB_BRIDGE_RESET_RELEASE: u32 = 0x0;

// SFR address is tagged with the firmware CPU architecture in bit 0.
/// Architecture tag added to the SFR address
pub const SFR_ARCH_TAG: u32 = 1;

const_assert!(WRAPPER_INTR_MASK_RESET & (WRAPPER_INTR_A2H | WRAPPER_INTR_A2HWD) != 0);
const_assert!(ctrl_status::ERROR_MASK & ctrl_status::PC_READY == 0);
const_assert!(ctrl_status::ERROR_MASK & ctrl_status::ERROR_UC_REGION_NOT_SET != 0);
