//! # Power Sequencer
//!
//! Power-on and power-off of the controller (firmware CPU) and the codec
//! hardware. Both operations run entirely under the device lock.

use vidc_core::{CoreStatus, Error, InterruptStatus, Result, SubState};
use vidc_hal::regs;
use vidc_hal::resources::BW_VOTE_MAX;
use vidc_hal::{Clock, PollBudget, PowerDomain};

use crate::device::VidcCore;
use crate::firmware;

// =============================================================================
// POWER ON
// =============================================================================

/// Stages of `power_on` that have to be unwound on failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PowerOnStage {
    /// Bus bandwidth voted
    BusVoted,
    /// Controller domain and clocks on
    Controller,
    /// Codec domain and clock on
    Hardware,
}

/// Power on the controller and the codec hardware
///
/// No-op when `POWER_ENABLE` is already set. Fails with
/// [`Error::InvalidState`] unless the core is booting or booted.
pub fn power_on(core: &VidcCore) -> Result<()> {
    let mut status = core.lock();

    if status.is_sub_state(SubState::POWER_ENABLE) {
        return Ok(());
    }

    if !status.lifecycle.is_operational() {
        log::error!("power_on: invalid core state {}", status.lifecycle.name());
        return Err(Error::InvalidState);
    }

    let res = core.resources();

    if let Err(e) = res.set_bw(BW_VOTE_MAX, BW_VOTE_MAX) {
        log::error!("power_on: failed to vote buses: {}", e);
        status.force_clear_sub_state(SubState::POWER_ENABLE, "power_on");
        return Err(e);
    }

    if let Err(e) = power_on_controller(core) {
        log::error!("power_on: failed to power on controller: {}", e);
        unwind(core, &mut status, PowerOnStage::BusVoted);
        return Err(e);
    }

    if let Err(e) = power_on_hardware(core) {
        log::error!("power_on: failed to power on hardware: {}", e);
        unwind(core, &mut status, PowerOnStage::Controller);
        return Err(e);
    }

    if let Err(e) = status.change_sub_state(SubState::empty(), SubState::POWER_ENABLE, "power_on") {
        unwind(core, &mut status, PowerOnStage::Hardware);
        return Err(e);
    }

    let freq = if status.clk_freq != 0 {
        status.clk_freq
    } else {
        core.config().default_frequency()
    };
    if let Err(e) = res.set_clks(freq) {
        log::error!("power_on: failed to scale clocks to {} Hz: {}", freq, e);
    }

    // Registers are lost whenever the domains go down.
    if let Err(e) = set_registers(core) {
        log::warn!("power_on: register presets not applied: {}", e);
    }

    if let Err(e) = firmware::interrupt_init(core.regs()) {
        log::warn!("power_on: interrupt mask not programmed: {}", e);
    }
    status.intr_status = InterruptStatus::empty();
    res.enable_irq();

    log::debug!("power_on: done, sub-state {}", status.sub_state());
    Ok(())
}

/// Undo every stage up to and including `reached`
fn unwind(core: &VidcCore, status: &mut CoreStatus, reached: PowerOnStage) {
    if reached >= PowerOnStage::Hardware {
        if let Err(e) = power_off_hardware(core, status) {
            log::error!("power_on unwind: hardware off failed: {}", e);
        }
    }
    if reached >= PowerOnStage::Controller {
        if let Err(e) = power_off_controller(core) {
            log::error!("power_on unwind: controller off failed: {}", e);
        }
    }
    if let Err(e) = core.resources().set_bw(0, 0) {
        log::error!("power_on unwind: failed to unvote buses: {}", e);
    }
    status.force_clear_sub_state(SubState::POWER_ENABLE, "power_on");
}

fn power_on_controller(core: &VidcCore) -> Result<()> {
    let res = core.resources();

    res.gdsc_on(PowerDomain::IrisCtl)?;

    if let Err(e) = res.reset_bridge() {
        let _ = res.gdsc_off(PowerDomain::IrisCtl);
        return Err(e);
    }

    if let Err(e) = res.clk_enable(Clock::GccVideoAxi0) {
        let _ = res.gdsc_off(PowerDomain::IrisCtl);
        return Err(e);
    }

    if let Err(e) = res.clk_enable(Clock::CoreClk) {
        let _ = res.clk_disable(Clock::GccVideoAxi0);
        let _ = res.gdsc_off(PowerDomain::IrisCtl);
        return Err(e);
    }

    Ok(())
}

fn power_on_hardware(core: &VidcCore) -> Result<()> {
    let res = core.resources();

    res.gdsc_on(PowerDomain::Vcodec)?;

    if let Err(e) = res.clk_enable(Clock::VcodecClk) {
        let _ = res.gdsc_off(PowerDomain::Vcodec);
        return Err(e);
    }

    Ok(())
}

/// Re-apply the platform register presets
fn set_registers(core: &VidcCore) -> Result<()> {
    let regs = core.regs();
    for preset in core.resources().register_presets() {
        regs.write_masked(preset.addr, preset.value, preset.mask)?;
    }
    Ok(())
}

// =============================================================================
// POWER OFF
// =============================================================================

/// Power off the codec hardware and the controller
///
/// No-op when `POWER_ENABLE` is clear. Sub-step failures are logged and the
/// sequence carries on; `POWER_ENABLE` is always cleared. Returns the result
/// of dropping the bus vote.
pub fn power_off(core: &VidcCore) -> Result<()> {
    let mut status = core.lock();

    if !status.is_sub_state(SubState::POWER_ENABLE) {
        return Ok(());
    }

    let res = core.resources();

    // Drop the clock rate vote so the next power-on does not inherit it.
    if let Err(e) = res.set_clks(0) {
        log::error!("power_off: resetting clocks failed: {}", e);
    }

    if let Err(e) = power_off_hardware(core, &status) {
        log::error!("power_off: failed to power off hardware: {}", e);
    }

    if let Err(e) = power_off_controller(core) {
        log::error!("power_off: failed to power off controller: {}", e);
    }

    let rc = res.set_bw(0, 0);
    if let Err(e) = rc {
        log::error!("power_off: failed to unvote buses: {}", e);
    }

    if !firmware::watchdog(status.intr_status) {
        res.disable_irq();
    }

    status.force_clear_sub_state(SubState::POWER_ENABLE, "power_off");
    log::debug!("power_off: done, sub-state {}", status.sub_state());

    rc
}

/// Codec power status: true when the hardware has collapsed
pub fn is_hw_power_collapsed(core: &VidcCore) -> bool {
    match core.regs().read(regs::WRAPPER_CORE_POWER_STATUS) {
        Ok(value) => value & regs::CORE_POWER_ON_BIT == 0,
        Err(_) => false,
    }
}

/// Power off the codec hardware
///
/// The register part stops at the first failing access; the codec domain
/// and clock are switched off regardless and the first error is returned.
fn power_off_hardware(core: &VidcCore, status: &CoreStatus) -> Result<()> {
    let skip_noc = if status.is_sub_state(SubState::FW_PWR_CTRL) {
        let collapsed = is_hw_power_collapsed(core);
        if collapsed {
            log::debug!("power_off_hardware: hw already collapsed, {}", status.sub_state());
        } else {
            log::error!(
                "power_off_hardware: hw still on, collapsing it, {}",
                status.sub_state()
            );
        }
        collapsed
    } else {
        false
    };

    let rc = if skip_noc {
        Ok(())
    } else {
        hardware_noc_sequence(core)
    };

    let res = core.resources();
    if let Err(e) = res.gdsc_off(PowerDomain::Vcodec) {
        log::error!("power_off_hardware: disable regulator vcodec failed: {}", e);
    }
    if let Err(e) = res.clk_disable(Clock::VcodecClk) {
        log::error!("power_off_hardware: disable vcodec_clk failed: {}", e);
    }

    rc
}

fn hardware_noc_sequence(core: &VidcCore) -> Result<()> {
    let regs = core.regs();

    // The vcodec idle registers are only readable with the core clock branch on.
    let value = regs.read(regs::WRAPPER_CORE_CLOCK_CONFIG)?;
    if value != 0 {
        log::error!("power_off_hardware: core clock config {:#x}, enabling it", value);
        regs.write(regs::WRAPPER_CORE_CLOCK_CONFIG, 0)?;
    }

    for pipe in 0..core.config().num_vpp_pipes {
        let addr = regs::vcodec_idle_status(pipe);
        if regs
            .poll_budget(
                addr,
                regs::VCODEC_SS_IDLE_BIT,
                regs::VCODEC_SS_IDLE_BIT,
                PollBudget::VCODEC_IDLE,
            )
            .is_err()
        {
            log::error!("power_off_hardware: VCODEC_SS_IDLE_STATUS{} not idle", pipe);
        }
    }

    noc_lpi_handshake(
        core,
        regs::AON_MVP_NOC_LPI_CONTROL,
        regs::AON_MVP_NOC_LPI_STATUS,
        "AON_MVP_NOC_LPI",
    )?;
    regs.write_masked(regs::AON_MVP_NOC_LPI_CONTROL, 0, regs::NOC_LPI_REQ_BIT)?;

    regs.write(regs::CPU_CS_AHB_BRIDGE_SYNC_RESET, regs::AHB_BRIDGE_RESET_ASSERT)?;
    regs.write(regs::CPU_CS_AHB_BRIDGE_SYNC_RESET, regs::AHB_BRIDGE_RESET_HALF)?;
    regs.write(regs::CPU_CS_AHB_BRIDGE_SYNC_RESET, regs::AHB_BRIDGE_RESET_RELEASE)?;

    Ok(())
}

/// Request NOC low power and wait for the acknowledge
///
/// A missing acknowledge is logged only.
fn noc_lpi_handshake(core: &VidcCore, control: u32, status: u32, name: &str) -> Result<()> {
    let regs = core.regs();
    regs.write_masked(control, regs::NOC_LPI_REQ_BIT, regs::NOC_LPI_REQ_BIT)?;
    if regs
        .poll_budget(
            status,
            regs::NOC_LPI_REQ_BIT,
            regs::NOC_LPI_REQ_BIT,
            PollBudget::NOC_LPI,
        )
        .is_err()
    {
        log::warn!("{} handshake not acknowledged", name);
    }
    Ok(())
}

/// Power off the controller
///
/// Same failure policy as [`power_off_hardware`].
fn power_off_controller(core: &VidcCore) -> Result<()> {
    let rc = controller_noc_sequence(core);

    let res = core.resources();
    if let Err(e) = res.clk_disable(Clock::CoreClk) {
        log::error!("power_off_controller: disable core_clk failed: {}", e);
    }
    if let Err(e) = res.clk_disable(Clock::GccVideoAxi0) {
        log::error!("power_off_controller: disable gcc_video_axi0 failed: {}", e);
    }
    if let Err(e) = res.gdsc_off(PowerDomain::IrisCtl) {
        log::error!("power_off_controller: disable regulator iris-ctl failed: {}", e);
    }

    rc
}

fn controller_noc_sequence(core: &VidcCore) -> Result<()> {
    let regs = core.regs();

    // Mask the fal10 veto before the NOC handshakes.
    regs.write(regs::CPU_CS_X2RPMH, 0x3)?;

    noc_lpi_handshake(
        core,
        regs::AON_MVP_NOC_LPI_CONTROL,
        regs::AON_MVP_NOC_LPI_STATUS,
        "AON_MVP_NOC_LPI",
    )?;
    noc_lpi_handshake(
        core,
        regs::WRAPPER_CPU_NOC_LPI_CONTROL,
        regs::WRAPPER_CPU_NOC_LPI_STATUS,
        "WRAPPER_CPU_NOC_LPI",
    )?;

    regs.write(regs::WRAPPER_DEBUG_BRIDGE_LPI_CONTROL, 0)?;
    if regs
        .poll_budget(
            regs::WRAPPER_DEBUG_BRIDGE_LPI_STATUS,
            0xffff_ffff,
            0,
            PollBudget::DEBUG_BRIDGE,
        )
        .is_err()
    {
        log::warn!("power_off_controller: debug bridge release failed");
    }

    regs.write(regs::WRAPPER_TZ_CTL_AXI_CLOCK_CONFIG, 0x3)?;
    regs.write(regs::WRAPPER_TZ_QNS4PDXFIFO_RESET, 0x1)?;
    regs.write(regs::WRAPPER_TZ_QNS4PDXFIFO_RESET, 0x0)?;
    regs.write(regs::WRAPPER_TZ_CTL_AXI_CLOCK_CONFIG, 0x0)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use alloc::vec;
    use vidc_core::{CoreConfig, CoreLifecycle};
    use vidc_hal::mock::{MockRegisters, MockResources, ResourceOp};
    use vidc_hal::RegisterPreset;

    struct Rig {
        core: VidcCore,
        regs: Arc<MockRegisters>,
        res: Arc<MockResources>,
    }

    fn rig_with(res: MockResources) -> Rig {
        let regs = Arc::new(MockRegisters::iris33());
        // hardware that acknowledges every handshake
        regs.set(regs::AON_MVP_NOC_LPI_STATUS, 0x1);
        regs.set(regs::WRAPPER_CPU_NOC_LPI_STATUS, 0x1);
        for pipe in 0..4 {
            regs.set(regs::vcodec_idle_status(pipe), regs::VCODEC_SS_IDLE_BIT);
        }
        let res = Arc::new(res);
        let core = VidcCore::new(CoreConfig::default(), regs.clone(), res.clone()).unwrap();
        core.set_lifecycle(CoreLifecycle::InitWait);
        Rig { core, regs, res }
    }

    fn rig() -> Rig {
        rig_with(MockResources::new())
    }

    #[test]
    fn test_power_on_sequence() {
        let rig = rig();
        power_on(&rig.core).unwrap();

        assert!(rig.core.is_powered());
        assert_eq!(
            rig.res.log(),
            vec![
                ResourceOp::SetBw(BW_VOTE_MAX, BW_VOTE_MAX),
                ResourceOp::GdscOn(PowerDomain::IrisCtl),
                ResourceOp::ResetBridge,
                ResourceOp::ClkEnable(Clock::GccVideoAxi0),
                ResourceOp::ClkEnable(Clock::CoreClk),
                ResourceOp::GdscOn(PowerDomain::Vcodec),
                ResourceOp::ClkEnable(Clock::VcodecClk),
                ResourceOp::SetClks(533_333_333),
                ResourceOp::EnableIrq,
            ]
        );
        // watchdog and CPU interrupts unmasked
        assert_eq!(rig.regs.get(regs::WRAPPER_INTR_MASK), 0x1F2);
    }

    #[test]
    fn test_power_on_uses_requested_frequency() {
        let rig = rig();
        rig.core.lock().clk_freq = 240_000_000;
        power_on(&rig.core).unwrap();
        assert_eq!(rig.res.freq(), 240_000_000);
    }

    #[test]
    fn test_power_on_idempotent() {
        let rig = rig();
        power_on(&rig.core).unwrap();
        let calls = rig.res.log().len();
        power_on(&rig.core).unwrap();
        assert_eq!(rig.res.log().len(), calls);
    }

    #[test]
    fn test_power_on_invalid_state() {
        let rig = rig();
        rig.core.set_lifecycle(CoreLifecycle::Deinit);
        assert_eq!(power_on(&rig.core), Err(Error::InvalidState));
        assert!(rig.res.log().is_empty());
    }

    #[test]
    fn test_power_on_rollback_on_hardware_failure() {
        let res = MockResources::new();
        res.fail_on(ResourceOp::ClkEnable(Clock::VcodecClk));
        let rig = rig_with(res);

        assert_eq!(power_on(&rig.core), Err(Error::Resource));
        assert!(!rig.core.is_powered());
        assert!(!rig.res.anything_on());
        assert_eq!(rig.res.bw(), (0, 0));
        assert!(!rig.res.irq_enabled());

        let log = rig.res.log();
        let vcodec_off = log
            .iter()
            .position(|op| *op == ResourceOp::GdscOff(PowerDomain::Vcodec))
            .unwrap();
        let ctl_off = log
            .iter()
            .position(|op| *op == ResourceOp::GdscOff(PowerDomain::IrisCtl))
            .unwrap();
        assert!(vcodec_off < ctl_off);
        assert_eq!(log.last(), Some(&ResourceOp::SetBw(0, 0)));
    }

    #[test]
    fn test_power_on_rollback_on_controller_failure() {
        let res = MockResources::new();
        res.fail_on(ResourceOp::ClkEnable(Clock::CoreClk));
        let rig = rig_with(res);

        assert_eq!(power_on(&rig.core), Err(Error::Resource));
        assert!(!rig.res.anything_on());
        assert!(!rig.res.log().contains(&ResourceOp::GdscOn(PowerDomain::Vcodec)));
    }

    #[test]
    fn test_power_on_bus_vote_failure() {
        let res = MockResources::new();
        res.fail_on(ResourceOp::SetBw(BW_VOTE_MAX, BW_VOTE_MAX));
        let rig = rig_with(res);

        assert_eq!(power_on(&rig.core), Err(Error::Resource));
        assert_eq!(rig.res.log().len(), 1);
    }

    #[test]
    fn test_clock_scaling_failure_not_fatal() {
        let res = MockResources::new();
        res.fail_on(ResourceOp::SetClks(533_333_333));
        let rig = rig_with(res);

        power_on(&rig.core).unwrap();
        assert!(rig.core.is_powered());
        assert!(rig.res.irq_enabled());
    }

    #[test]
    fn test_power_on_applies_presets() {
        let res = MockResources::with_presets(vec![RegisterPreset {
            addr: 0xB0040,
            value: 0x11,
            mask: 0xff,
        }]);
        let rig = rig_with(res);
        rig.regs.set(0xB0040, 0xff00);
        power_on(&rig.core).unwrap();
        assert_eq!(rig.regs.get(0xB0040), 0xff11);
    }

    #[test]
    fn test_power_on_off_restores_reset_state() {
        let rig = rig();
        power_on(&rig.core).unwrap();
        power_off(&rig.core).unwrap();

        assert!(!rig.core.is_powered());
        assert!(!rig.res.anything_on());
        assert!(!rig.res.is_domain_on(PowerDomain::Vcodec));
        assert_eq!(rig.res.bw(), (0, 0));
        assert_eq!(rig.res.freq(), 0);
        assert!(!rig.res.irq_enabled());

        let handshake = [
            regs::CPU_CS_AHB_BRIDGE_SYNC_RESET,
            regs::WRAPPER_DEBUG_BRIDGE_LPI_CONTROL,
            regs::WRAPPER_TZ_CTL_AXI_CLOCK_CONFIG,
            regs::WRAPPER_TZ_QNS4PDXFIFO_RESET,
            regs::WRAPPER_CORE_CLOCK_CONFIG,
        ];
        assert!(rig.regs.diff_from_reset(&handshake).is_empty());
        assert_eq!(
            rig.regs.writes_to(regs::CPU_CS_AHB_BRIDGE_SYNC_RESET),
            vec![0x3, 0x2, 0x0]
        );
        assert_eq!(rig.regs.writes_to(regs::WRAPPER_TZ_QNS4PDXFIFO_RESET), vec![0x1, 0x0]);
    }

    #[test]
    fn test_power_off_noop_when_unpowered() {
        let rig = rig();
        power_off(&rig.core).unwrap();
        assert!(rig.res.log().is_empty());
        assert!(rig.regs.writes().is_empty());
    }

    #[test]
    fn test_power_off_polls_every_pipe() {
        let rig = rig();
        power_on(&rig.core).unwrap();
        power_off(&rig.core).unwrap();
        for pipe in 0..4 {
            assert_eq!(rig.regs.read_count(regs::vcodec_idle_status(pipe)), 1);
        }
        assert_eq!(rig.regs.read_count(regs::vcodec_idle_status(4)), 0);
    }

    #[test]
    fn test_power_off_fw_controlled_collapsed_hw_skips_noc() {
        let rig = rig();
        power_on(&rig.core).unwrap();
        rig.core.lock().raise_sub_state(SubState::FW_PWR_CTRL);
        rig.regs.set(regs::WRAPPER_CORE_POWER_STATUS, 0);
        rig.regs.clear_log();

        power_off(&rig.core).unwrap();

        assert!(!rig.regs.was_written(regs::CPU_CS_AHB_BRIDGE_SYNC_RESET));
        assert_eq!(rig.regs.read_count(regs::vcodec_idle_status(0)), 0);
        assert!(!rig.res.is_domain_on(PowerDomain::Vcodec));
        // controller side still runs
        assert_eq!(rig.regs.writes_to(regs::CPU_CS_X2RPMH), vec![0x3]);
    }

    #[test]
    fn test_power_off_fw_controlled_powered_hw_runs_noc() {
        let rig = rig();
        power_on(&rig.core).unwrap();
        rig.core.lock().raise_sub_state(SubState::FW_PWR_CTRL);
        rig.regs.set(regs::WRAPPER_CORE_POWER_STATUS, regs::CORE_POWER_ON_BIT);

        power_off(&rig.core).unwrap();
        assert!(rig.regs.was_written(regs::CPU_CS_AHB_BRIDGE_SYNC_RESET));
    }

    #[test]
    fn test_power_off_keeps_irq_on_watchdog() {
        let rig = rig();
        power_on(&rig.core).unwrap();
        rig.core.lock().intr_status = InterruptStatus::A2H_WATCHDOG;

        power_off(&rig.core).unwrap();
        assert!(!rig.res.log().contains(&ResourceOp::DisableIrq));
        assert!(rig.res.irq_enabled());
        assert!(!rig.core.is_powered());
    }

    #[test]
    fn test_power_off_continues_after_register_failure() {
        let rig = rig();
        power_on(&rig.core).unwrap();
        rig.regs.fail_writes(regs::CPU_CS_X2RPMH);
        rig.regs.fail_reads(regs::WRAPPER_CORE_CLOCK_CONFIG);

        assert!(power_off(&rig.core).is_ok());
        assert!(!rig.core.is_powered());
        assert!(!rig.res.anything_on());
        assert!(!rig.regs.was_written(regs::WRAPPER_TZ_QNS4PDXFIFO_RESET));
    }

    #[test]
    fn test_power_off_reports_bus_failure() {
        let res = MockResources::new();
        res.fail_on(ResourceOp::SetBw(0, 0));
        let rig = rig_with(res);
        power_on(&rig.core).unwrap();

        assert_eq!(power_off(&rig.core), Err(Error::Resource));
        assert!(!rig.core.is_powered());
    }

    #[test]
    fn test_noc_timeout_not_fatal() {
        let rig = rig();
        power_on(&rig.core).unwrap();
        rig.regs.set(regs::AON_MVP_NOC_LPI_STATUS, 0);

        power_off(&rig.core).unwrap();
        assert_eq!(
            rig.regs.writes_to(regs::CPU_CS_AHB_BRIDGE_SYNC_RESET),
            vec![0x3, 0x2, 0x0]
        );
    }

    #[test]
    fn test_hw_power_collapsed() {
        let rig = rig();
        rig.regs.set(regs::WRAPPER_CORE_POWER_STATUS, 0);
        assert!(is_hw_power_collapsed(&rig.core));
        rig.regs.set(regs::WRAPPER_CORE_POWER_STATUS, regs::CORE_POWER_ON_BIT);
        assert!(!is_hw_power_collapsed(&rig.core));
        rig.regs.fail_reads(regs::WRAPPER_CORE_POWER_STATUS);
        assert!(!is_hw_power_collapsed(&rig.core));
    }
}
