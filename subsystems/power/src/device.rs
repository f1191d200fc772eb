//! # Device Object
//!
//! One [`VidcCore`] exists per video subsystem. It owns the register and
//! platform backends, the static configuration and the device lock that
//! guards [`CoreStatus`].

use alloc::sync::Arc;

use spin::{Mutex, MutexGuard};
use vidc_core::{CoreConfig, CoreLifecycle, CoreStatus, Result, SubState};
use vidc_hal::{PlatformResources, RegisterIo};

/// The video subsystem device
pub struct VidcCore {
    config: CoreConfig,
    regs: Arc<dyn RegisterIo>,
    resources: Arc<dyn PlatformResources>,
    /// Device lock
    status: Mutex<CoreStatus>,
}

impl VidcCore {
    /// Create the device after validating `config`
    pub fn new(
        config: CoreConfig,
        regs: Arc<dyn RegisterIo>,
        resources: Arc<dyn PlatformResources>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            regs,
            resources,
            status: Mutex::new(CoreStatus::new()),
        })
    }

    /// Static configuration
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Register backend
    pub fn regs(&self) -> &dyn RegisterIo {
        &*self.regs
    }

    /// Platform resource backend
    pub fn resources(&self) -> &dyn PlatformResources {
        &*self.resources
    }

    /// Take the device lock
    ///
    /// Must not be called while holding a session or timeline lock. The
    /// power and boot sequences keep it across register polls that spin for
    /// milliseconds, so it must not be taken from interrupt context.
    pub fn lock(&self) -> MutexGuard<'_, CoreStatus> {
        self.status.lock()
    }

    /// Copy of the current status
    pub fn snapshot(&self) -> CoreStatus {
        self.status.lock().clone()
    }

    /// Move the coarse lifecycle
    pub fn set_lifecycle(&self, lifecycle: CoreLifecycle) {
        let mut status = self.status.lock();
        if status.lifecycle != lifecycle {
            log::info!(
                "core state {} -> {}",
                status.lifecycle.name(),
                lifecycle.name()
            );
            status.lifecycle = lifecycle;
        }
    }

    /// Whether clocks and regulators are on
    pub fn is_powered(&self) -> bool {
        self.status.lock().is_sub_state(SubState::POWER_ENABLE)
    }
}

impl core::fmt::Debug for VidcCore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VidcCore")
            .field("config", &self.config)
            .field("status", &*self.status.lock())
            .finish_non_exhaustive()
    }
}
