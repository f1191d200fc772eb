//! # Firmware Handshake
//!
//! Control-register protocol between the host and the video firmware:
//! queue memory map, boot trigger, interrupt plumbing and the power-collapse
//! readiness check.
//!
//! ```text
//!   host                                  firmware
//!   ────                                  ────────
//!   UC_REGION / QTBL / SFR  ─────────────►
//!   CTRL_INIT = 1           ─────────────►
//!                           ◄─────────────  CTRL_STATUS != 0
//!   H2XSOFTINTEN = 1, X2RPMH = 0
//! ```

use vidc_core::{Error, InterruptStatus, Result};
use vidc_hal::regs::{self, ctrl_status};
use vidc_hal::{PollBudget, RegisterIo};

use crate::device::VidcCore;

/// Status polls before the boot handshake gives up
pub const BOOT_MAX_TRIES: u32 = 1000;

/// Lower bound of the sleep between boot status polls
pub const BOOT_SLEEP_MIN_US: u32 = 50;

/// Upper bound of the sleep between boot status polls
pub const BOOT_SLEEP_MAX_US: u32 = 100;

/// Host-to-firmware power-collapse request
///
/// Sends the HFI command that asks the firmware to prepare for power
/// collapse. The command transport lives outside this crate.
pub trait PcPrepare: Send + Sync {
    /// Ask the firmware to get ready for power collapse
    fn prepare_pc(&self) -> Result<()>;
}

// =============================================================================
// BOOT
// =============================================================================

/// Program the shared queue region for the firmware
pub fn setup_ucregion_memory_map(core: &VidcCore) -> Result<()> {
    let regs = core.regs();
    let map = &core.config().queue_map;

    regs.write(regs::HFI_UC_REGION_ADDR, map.device_addr)?;
    regs.write(regs::HFI_UC_REGION_SIZE, map.size)?;
    regs.write(regs::HFI_QTBL_ADDR, map.device_addr)?;
    regs.write(regs::HFI_QTBL_INFO, 0x1)?;

    // debug only
    regs.write(regs::QUEUE_VADDR_LO, map.virt_lo())?;
    regs.write(regs::QUEUE_VADDR_HI, map.virt_hi())?;

    if let Some(sfr) = map.sfr_device_addr {
        regs.write(regs::HFI_SFR_ADDR, sfr.wrapping_add(regs::SFR_ARCH_TAG))?;
    }

    Ok(())
}

/// Boot the firmware
///
/// Returns [`Error::BootTimeout`] when the control status stays zero for
/// [`BOOT_MAX_TRIES`] polls. An invalid-UC-region status ends the wait
/// early; it is logged and boot carries on.
pub fn boot_firmware(core: &VidcCore) -> Result<()> {
    let regs = core.regs();

    setup_ucregion_memory_map(core)?;

    regs.write(regs::HFI_CTRL_INIT, regs::CTRL_INIT_BIT)?;

    let mut status = 0;
    let mut count = 0;
    while status == 0 && count < BOOT_MAX_TRIES {
        status = regs.read(regs::HFI_CTRL_STATUS)?;

        if status & ctrl_status::ERROR_MASK == ctrl_status::ERROR_UC_REGION_NOT_SET {
            log::error!("boot_firmware: invalid setting for UC_REGION");
            break;
        }

        regs.sleep_range_us(BOOT_SLEEP_MIN_US, BOOT_SLEEP_MAX_US);
        count += 1;
    }

    if count >= BOOT_MAX_TRIES {
        log::error!("boot_firmware: error booting up firmware");
        return Err(Error::BootTimeout);
    }

    regs.write(regs::CPU_CS_H2XSOFTINTEN, 0x1)?;
    regs.write(regs::CPU_CS_X2RPMH, 0x0)?;

    log::info!("boot_firmware: ctrl status {:#x} after {} polls", status, count);
    Ok(())
}

// =============================================================================
// POWER COLLAPSE
// =============================================================================

/// Prepare the firmware for power collapse
///
/// Success means the firmware reported `PC_READY` and its CPU sits in WFI.
/// Any other outcome returns [`Error::Busy`] so the caller retries later.
pub fn prepare_pc(core: &VidcCore, hfi: &dyn PcPrepare) -> Result<()> {
    let regs = core.regs();

    let ctrl = regs.read(regs::HFI_CTRL_STATUS)?;
    let pc_ready = ctrl & ctrl_status::PC_READY;
    let idle = ctrl & ctrl_status::VCODEC_IDLE;

    if pc_ready != 0 {
        log::debug!("prepare_pc: already in pc_ready state");
        return Ok(());
    }

    let wfi = regs.read(regs::WRAPPER_TZ_CPU_STATUS)? & regs::TZ_CPU_WFI_BIT;

    if try_prepare_pc(core, hfi, wfi, idle) {
        return Ok(());
    }

    let ctrl = regs.read(regs::HFI_CTRL_STATUS)?;
    let wfi = regs.read(regs::WRAPPER_TZ_CPU_STATUS)? & regs::TZ_CPU_WFI_BIT;
    log::error!(
        "skip pc, wfi={:#x}, idle={:#x}, pcr={:#x}, ctrl={:#x}",
        wfi,
        idle,
        pc_ready,
        ctrl
    );
    Err(Error::Busy)
}

fn try_prepare_pc(core: &VidcCore, hfi: &dyn PcPrepare, wfi: u32, idle: u32) -> bool {
    let regs = core.regs();

    if wfi == 0 || idle == 0 {
        log::error!("prepare_pc: skipping, wfi status not set");
        return false;
    }

    if let Err(e) = hfi.prepare_pc() {
        log::error!("prepare_pc: firmware request failed: {}", e);
        return false;
    }

    if regs
        .poll_budget(
            regs::HFI_CTRL_STATUS,
            ctrl_status::PC_READY,
            ctrl_status::PC_READY,
            PollBudget::PC_READY,
        )
        .is_err()
    {
        log::error!("prepare_pc: ctrl status not set");
        return false;
    }

    if regs
        .poll_budget(
            regs::WRAPPER_TZ_CPU_STATUS,
            regs::TZ_CPU_WFI_BIT,
            regs::TZ_CPU_WFI_BIT,
            PollBudget::PC_READY,
        )
        .is_err()
    {
        log::error!("prepare_pc: wfi status not set");
        return false;
    }

    true
}

// =============================================================================
// INTERRUPTS
// =============================================================================

/// Ring the firmware doorbell
pub fn raise_interrupt(core: &VidcCore) -> Result<()> {
    core.regs().write(regs::CPU_IC_SOFTINT, regs::CPU_IC_SOFTINT_H2A)
}

/// Latch and acknowledge a firmware interrupt
///
/// Recognized sources are accumulated into the core interrupt status; other
/// interrupts count as spurious. Under hardware virtualization the status
/// register is not read. Returns the accumulated status.
pub fn clear_interrupt(core: &VidcCore) -> Result<InterruptStatus> {
    let mut status = core.lock();
    let regs = core.regs();

    if !core.config().is_hw_virt {
        let raw = regs.read(regs::WRAPPER_INTR_STATUS)?;
        let pending = InterruptStatus::from_bits_retain(raw);

        if pending.intersects(InterruptStatus::all()) {
            status.intr_status |= pending;
            status.reg_count += 1;
            log::trace!("interrupt: times {} status {:#x}", status.reg_count, raw);
        } else {
            status.spur_count += 1;
        }
    }

    regs.write(regs::CPU_CS_A2HSOFTINTCLR, 0x1)?;

    Ok(status.intr_status)
}

/// Whether `intr_status` carries the firmware watchdog bit
pub fn watchdog(intr_status: InterruptStatus) -> bool {
    if intr_status.contains(InterruptStatus::A2H_WATCHDOG) {
        log::error!("received watchdog interrupt");
        return true;
    }
    false
}

/// Enable firmware-to-host interrupt delivery
pub fn setup_intr(core: &VidcCore) -> Result<()> {
    log::debug!("setup_intr: enable intr");
    core.regs().write(regs::CPU_CS_H2XSOFTINTEN, 0x1)
}

/// Unmask the host-CPU and watchdog interrupts in the wrapper
pub fn interrupt_init(regs: &dyn RegisterIo) -> Result<()> {
    let mask = regs.read(regs::WRAPPER_INTR_MASK)?;
    regs.write(
        regs::WRAPPER_INTR_MASK,
        mask & !(regs::WRAPPER_INTR_A2HWD | regs::WRAPPER_INTR_A2H),
    )
}

/// Dump the NOC error logger
///
/// The vcodec NOC registers are only readable with the core clock branch
/// on, which the firmware may have gated. Nothing is read.
pub fn noc_error_info(_core: &VidcCore) -> Result<()> {
    log::debug!("noc_error_info: vcodec noc registers not accessible");
    Ok(())
}
