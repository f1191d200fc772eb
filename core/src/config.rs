//! # Core Configuration
//!
//! Static per-device parameters supplied by the platform layer at probe
//! time. Nothing here changes after the core is created.

use alloc::vec;
use alloc::vec::Vec;

use crate::error::{Error, Result};

/// Default size of the shared command/response queue region
pub const DEFAULT_SHARED_QUEUE_SIZE: u32 = 0x0010_0000;

/// Maximum bitrate boost percentage
pub const MAX_BITRATE_BOOST: i32 = 25;

// =============================================================================
// QUEUE MEMORY MAP
// =============================================================================

/// Location of the shared firmware queue region
///
/// Programmed into the controller registers once per firmware boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueMemoryMap {
    /// Device-visible (IOVA) base of the queue table
    pub device_addr: u32,
    /// Size of the whole region in bytes
    pub size: u32,
    /// Kernel virtual address of the queue table, written for debugging only
    pub virt_addr: u64,
    /// Device-visible base of the subsystem failure record, if allocated
    pub sfr_device_addr: Option<u32>,
}

impl QueueMemoryMap {
    /// Low 32 bits of the virtual address
    pub const fn virt_lo(&self) -> u32 {
        self.virt_addr as u32
    }

    /// High 32 bits of the virtual address
    pub const fn virt_hi(&self) -> u32 {
        (self.virt_addr >> 32) as u32
    }
}

impl Default for QueueMemoryMap {
    fn default() -> Self {
        Self {
            device_addr: 0,
            size: DEFAULT_SHARED_QUEUE_SIZE,
            virt_addr: 0,
            sfr_device_addr: None,
        }
    }
}

// =============================================================================
// CORE CONFIG
// =============================================================================

/// Device-wide configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// Shared queue region
    pub queue_map: QueueMemoryMap,
    /// Running as a guest under hardware virtualization
    pub is_hw_virt: bool,
    /// Number of video processing pipes
    pub num_vpp_pipes: u32,
    /// Supported core clock rates in Hz, highest first
    pub freq_table: Vec<u64>,
    /// Secure sessions allowed at once
    pub max_secure_sessions: u32,
    /// Macroblocks per frame allowed in high-quality mode
    pub max_mbpf_hq: u32,
    /// Macroblocks per second allowed in high-quality mode
    pub max_mbps_hq: u32,
    /// Highest encoder bitrate in bits per second
    pub max_bitrate: u32,
}

impl CoreConfig {
    /// Check the configuration for values the sequencer cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.num_vpp_pipes == 0 || self.freq_table.is_empty() || self.queue_map.size == 0 {
            log::error!("core config rejected: {:?}", self);
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }

    /// Frequency voted on power-on when nothing else was requested
    pub fn default_frequency(&self) -> u64 {
        self.freq_table.first().copied().unwrap_or(0)
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            queue_map: QueueMemoryMap::default(),
            is_hw_virt: false,
            num_vpp_pipes: 4,
            freq_table: vec![533_333_333, 444_000_000, 366_000_000, 240_000_000],
            max_secure_sessions: 3,
            // 1920x1088 / 256
            max_mbpf_hq: 8160,
            // 1920x1088 / 256 * 60
            max_mbps_hq: 489_600,
            max_bitrate: 245_000_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = CoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_frequency(), 533_333_333);
    }

    #[test]
    fn test_invalid_config() {
        let config = CoreConfig {
            num_vpp_pipes: 0,
            ..CoreConfig::default()
        };
        assert_eq!(config.validate(), Err(Error::InvalidArgument));

        let config = CoreConfig {
            freq_table: Vec::new(),
            ..CoreConfig::default()
        };
        assert_eq!(config.validate(), Err(Error::InvalidArgument));
        assert_eq!(config.default_frequency(), 0);
    }

    #[test]
    fn test_virt_addr_split() {
        let map = QueueMemoryMap {
            virt_addr: 0xffff_ff80_1234_5000,
            ..QueueMemoryMap::default()
        };
        assert_eq!(map.virt_lo(), 0x1234_5000);
        assert_eq!(map.virt_hi(), 0xffff_ff80);
    }
}
