//! # Session Decisions
//!
//! Work mode, work route and quality mode are picked from the session
//! format and the client controls right before stream-on. The bitrate boost
//! adjust function lives here too since it follows the same resolution and
//! frame-rate rules.

use vidc_core::config::MAX_BITRATE_BOOST;
use vidc_core::Result;

use crate::cap::values::{
    BITRATE_MODE_VBR, CODED_FRAMES_INTERLACE, DEFAULT_COMPLEXITY, SLICE_MODE_MAX_BYTES,
};
use crate::cap::CapId;
use crate::propagate::{AdjustCtx, CapabilityState};
use crate::session::{mbs, Codec};

/// Single pipe work route
pub const PIPE_1: u32 = 1;

/// Firmware work mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum WorkMode {
    /// One pipeline stage (low latency)
    Stage1 = 1,
    /// Two pipeline stages
    Stage2 = 2,
}

/// Encoder quality mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum QualityMode {
    /// Highest quality tools
    MaxQuality = 1,
    /// Reduced tools, lower power
    PowerSave = 2,
}

// =============================================================================
// RESOLUTION HELPERS
// =============================================================================

fn res_is_less_than(width: u32, height: u32, ref_width: u32, ref_height: u32) -> bool {
    let max_side = ref_width.max(ref_height);
    mbs(width, height) < mbs(ref_width, ref_height) && width < max_side && height < max_side
}

fn res_is_greater_than(width: u32, height: u32, ref_width: u32, ref_height: u32) -> bool {
    let max_side = ref_width.max(ref_height);
    mbs(width, height) > mbs(ref_width, ref_height) || width > max_side || height > max_side
}

fn res_is_less_than_or_equal_to(width: u32, height: u32, ref_width: u32, ref_height: u32) -> bool {
    let max_side = ref_width.max(ref_height);
    mbs(width, height) <= mbs(ref_width, ref_height) && width <= max_side && height <= max_side
}

// =============================================================================
// DECISIONS
// =============================================================================

impl CapabilityState {
    /// Pick the work mode and store it in `Stage`
    pub fn decide_work_mode(&mut self) -> Result<WorkMode> {
        let props = &self.props;
        let table = &self.table;
        let mut mode = WorkMode::Stage2;

        if props.is_image_decode() {
            mode = WorkMode::Stage1;
        }

        if !props.image {
            let low_latency = table.value_or_zero(CapId::LowLatencyMode) != 0;
            if props.is_decode() {
                if table.value_or_zero(CapId::CodedFrames) == CODED_FRAMES_INTERLACE
                    || low_latency
                    || props.codec == Codec::Mpeg2
                    || res_is_less_than(props.width, props.height, 1280, 720)
                {
                    mode = WorkMode::Stage1;
                }
            } else {
                let res_ok = !res_is_greater_than(props.width, props.height, 4096, 2160);
                if res_ok && low_latency {
                    mode = WorkMode::Stage1;
                }
                if table.value_or_zero(CapId::SliceMode) == SLICE_MODE_MAX_BYTES {
                    mode = WorkMode::Stage1;
                }
                if table.value_or_zero(CapId::Lossless) != 0 {
                    mode = WorkMode::Stage2;
                }
                if table.value_or_zero(CapId::GopSize) == 0 {
                    mode = WorkMode::Stage2;
                }
            }
        }

        log::info!(
            "work mode {:?}, low latency {}, gop size {}",
            mode,
            table.value_or_zero(CapId::LowLatencyMode),
            table.value_or_zero(CapId::GopSize)
        );
        self.table
            .update_value(CapId::Stage, mode as i32, "decide_work_mode")?;
        Ok(mode)
    }

    /// Pick the number of pipes and store it in `Pipe`
    pub fn decide_work_route(&mut self) -> Result<u32> {
        let props = &self.props;
        let mut route = self.config.num_vpp_pipes;

        if !props.image {
            if props.is_decode() {
                if self.table.value_or_zero(CapId::CodedFrames) == CODED_FRAMES_INTERLACE
                    || props.codec == Codec::Mpeg2
                {
                    route = PIPE_1;
                }
            } else if self.table.value_or_zero(CapId::SliceMode) == SLICE_MODE_MAX_BYTES {
                route = PIPE_1;
            }
        }

        log::info!("work route {}", route);
        self.table
            .update_value(CapId::Pipe, route as i32, "decide_work_route")?;
        Ok(route)
    }

    /// Pick the encoder quality mode and store it in `QualityMode`
    ///
    /// Decoders have no quality mode; `None` is returned and nothing is
    /// stored.
    pub fn decide_quality_mode(&mut self) -> Result<Option<QualityMode>> {
        if !self.props.is_encode() {
            return Ok(None);
        }

        let mode = self.quality_mode();
        self.table
            .update_value(CapId::QualityMode, mode as i32, "decide_quality_mode")?;
        Ok(Some(mode))
    }

    fn quality_mode(&self) -> QualityMode {
        let props = &self.props;
        let table = &self.table;

        if props.image
            || table.value_or_zero(CapId::Lossless) != 0
            || table.value_or_zero(CapId::AllIntra) != 0
        {
            return QualityMode::MaxQuality;
        }

        let complexity = table.get(CapId::Complexity);
        let complexity_value = complexity.map_or(DEFAULT_COMPLEXITY, |c| c.value);
        if complexity_value < DEFAULT_COMPLEXITY {
            return QualityMode::PowerSave;
        }

        let mbpf = props.mbs_per_frame();
        let mbps = mbpf.saturating_mul(props.fps);
        let max_hq_mbpf = self.config.max_mbpf_hq;
        let max_hq_mbps = self.config.max_mbps_hq;

        if !props.realtime {
            let client_complexity = complexity.is_some_and(|c| c.is_client_set());
            if client_complexity || mbpf <= max_hq_mbpf {
                return QualityMode::MaxQuality;
            }
        }

        if mbpf <= max_hq_mbpf && mbps <= max_hq_mbps {
            QualityMode::MaxQuality
        } else {
            QualityMode::PowerSave
        }
    }
}

// =============================================================================
// BITRATE BOOST
// =============================================================================

/// Adjust function of `BitrateBoost`
///
/// Boost only applies to VBR. A client value is kept; otherwise the maximum
/// boost is used up to 4096x2176 at 60 fps. A boost that would exceed the
/// device bitrate limit is dropped.
pub fn adjust_bitrate_boost(ctx: &AdjustCtx<'_>, explicit: Option<i32>) -> Result<i32> {
    let cap = ctx.cap();
    let props = ctx.props();

    if props.output_streaming {
        return Ok(cap.value);
    }

    if ctx.parent_value(CapId::BitrateMode)? != BITRATE_MODE_VBR {
        return Ok(0);
    }

    let frame_rate = (ctx.value(CapId::FrameRate) >> 16).max(0) as u32;

    let mut boost = explicit.unwrap_or(cap.value);
    if !cap.is_client_set() {
        boost = if res_is_less_than_or_equal_to(props.width, props.height, 4096, 2176)
            && frame_rate <= 60
        {
            MAX_BITRATE_BOOST
        } else {
            0
        };
    }

    if boost > 0 {
        let bitrate = u64::try_from(ctx.value(CapId::BitRate)).unwrap_or(0);
        let max_bitrate = u64::from(ctx.config().max_bitrate);
        let headroom = (100u64 / boost as u64).max(1);
        if bitrate + bitrate / headroom > max_bitrate {
            log::debug!(
                "bitrate {} is beyond max bitrate {}, remove bitrate boost",
                bitrate,
                max_bitrate
            );
            boost = 0;
        }
    }

    Ok(boost)
}
