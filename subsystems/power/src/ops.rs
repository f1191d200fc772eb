//! # Variant Operations
//!
//! The common driver reaches the variant-specific hardware code through
//! [`VenusOps`]. [`Iris33Ops`] binds it to the iris33 sequencer and firmware
//! handshake.

use vidc_core::{InterruptStatus, Result};

use crate::device::VidcCore;
use crate::firmware::{self, PcPrepare};
use crate::sequencer;

/// Variant hooks for power and firmware control
pub trait VenusOps: Send + Sync {
    /// Variant name
    fn name(&self) -> &'static str;

    /// Boot the firmware
    fn boot_firmware(&self, core: &VidcCore) -> Result<()>;

    /// Ring the firmware doorbell
    fn raise_interrupt(&self, core: &VidcCore) -> Result<()>;

    /// Latch and acknowledge a firmware interrupt
    fn clear_interrupt(&self, core: &VidcCore) -> Result<InterruptStatus>;

    /// Power on controller and hardware
    fn power_on(&self, core: &VidcCore) -> Result<()>;

    /// Power off hardware and controller
    fn power_off(&self, core: &VidcCore) -> Result<()>;

    /// Prepare the firmware for power collapse
    fn prepare_pc(&self, core: &VidcCore, hfi: &dyn PcPrepare) -> Result<()>;

    /// Whether the status carries a watchdog
    fn watchdog(&self, intr_status: InterruptStatus) -> bool;

    /// Dump NOC error state
    fn noc_error_info(&self, core: &VidcCore) -> Result<()>;

    /// Enable firmware-to-host interrupts
    fn setup_intr(&self, core: &VidcCore) -> Result<()>;

    /// Whether the codec hardware has collapsed
    fn is_hw_power_collapsed(&self, core: &VidcCore) -> bool;
}

/// iris33 variant
#[derive(Debug, Clone, Copy, Default)]
pub struct Iris33Ops;

impl VenusOps for Iris33Ops {
    fn name(&self) -> &'static str {
        "iris33_au"
    }

    fn boot_firmware(&self, core: &VidcCore) -> Result<()> {
        firmware::boot_firmware(core)
    }

    fn raise_interrupt(&self, core: &VidcCore) -> Result<()> {
        firmware::raise_interrupt(core)
    }

    fn clear_interrupt(&self, core: &VidcCore) -> Result<InterruptStatus> {
        firmware::clear_interrupt(core)
    }

    fn power_on(&self, core: &VidcCore) -> Result<()> {
        sequencer::power_on(core)
    }

    fn power_off(&self, core: &VidcCore) -> Result<()> {
        sequencer::power_off(core)
    }

    fn prepare_pc(&self, core: &VidcCore, hfi: &dyn PcPrepare) -> Result<()> {
        firmware::prepare_pc(core, hfi)
    }

    fn watchdog(&self, intr_status: InterruptStatus) -> bool {
        firmware::watchdog(intr_status)
    }

    fn noc_error_info(&self, core: &VidcCore) -> Result<()> {
        firmware::noc_error_info(core)
    }

    fn setup_intr(&self, core: &VidcCore) -> Result<()> {
        firmware::setup_intr(core)
    }

    fn is_hw_power_collapsed(&self, core: &VidcCore) -> bool {
        sequencer::is_hw_power_collapsed(core)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;
    use alloc::sync::Arc;
    use vidc_core::{CoreConfig, CoreLifecycle, SubState};
    use vidc_hal::mock::{MockRegisters, MockResources};
    use vidc_hal::regs;

    #[test]
    fn test_boot_and_power_through_ops() {
        let mock = Arc::new(MockRegisters::iris33());
        mock.set(regs::HFI_CTRL_STATUS, 0x1);
        mock.set(regs::AON_MVP_NOC_LPI_STATUS, 0x1);
        mock.set(regs::WRAPPER_CPU_NOC_LPI_STATUS, 0x1);
        let res = Arc::new(MockResources::new());
        let core = VidcCore::new(CoreConfig::default(), mock.clone(), res.clone()).unwrap();
        core.set_lifecycle(CoreLifecycle::InitWait);

        let ops: Box<dyn VenusOps> = Box::new(Iris33Ops);
        assert_eq!(ops.name(), "iris33_au");

        ops.power_on(&core).unwrap();
        ops.boot_firmware(&core).unwrap();
        assert!(core.snapshot().is_sub_state(SubState::POWER_ENABLE));

        ops.power_off(&core).unwrap();
        assert!(!core.is_powered());
        assert!(!res.anything_on());
    }
}
