//! # Default Capability Table
//!
//! Per-session starting table. Platform code may replace any entry before
//! the session is opened; the parent/child links below are what drives
//! propagation and the dependency order.
//!
//! ```text
//!   BitrateMode ──┐
//!   BitRate ──────┼──► BitrateBoost
//!   FrameRate ────┘
//!
//!   EnhLayerCount ───► LayerEnable
//! ```

use vidc_core::{Result, SessionKind};

use crate::cap::values::{
    BITRATE_MODE_CQ, BITRATE_MODE_VBR, CODED_FRAMES_PROGRESSIVE, DEFAULT_COMPLEXITY,
    SLICE_MODE_MAX_BYTES, SLICE_MODE_SINGLE,
};
use crate::cap::{set_u32, CapFlags, CapId, Capability, CapabilityTable};
use crate::decide::adjust_bitrate_boost;
use crate::propagate::AdjustCtx;
use crate::session::Codec;

/// Enhancement layers an encoder supports
pub const MAX_ENH_LAYERS: i32 = 5;

/// Adjust function of `LayerEnable`
///
/// Layering is on whenever enhancement layers are requested.
pub fn adjust_layer_enable(ctx: &AdjustCtx<'_>, _explicit: Option<i32>) -> Result<i32> {
    let layers = ctx.parent_value(CapId::EnhLayerCount)?;
    Ok(i32::from(layers > 0))
}

/// Starting table for a session
pub fn default_table(kind: SessionKind, codec: Codec) -> CapabilityTable {
    let mut table = CapabilityTable::new();
    let dynamic = CapFlags::DYNAMIC_ALLOWED;

    // Frame rate is Q16
    table.insert(
        Capability::new(CapId::FrameRate, 1 << 16, 480 << 16, 1, 30 << 16)
            .with_flags(dynamic)
            .with_set(set_u32),
    );
    table.insert(
        Capability::new(CapId::Priority, 0, 2, 1, 1)
            .with_flags(dynamic)
            .with_set(set_u32),
    );
    table.insert(Capability::new(CapId::CriticalPriority, 0, 1, 1, 0));
    table.insert(Capability::new(CapId::SecureMode, 0, 1, 1, 0).with_set(set_u32));
    table.insert(Capability::new(CapId::LowLatencyMode, 0, 1, 1, 0).with_set(set_u32));
    table.insert(Capability::new(CapId::Stage, 1, 2, 1, 2).with_set(set_u32));
    table.insert(Capability::new(CapId::Pipe, 1, 4, 1, 4).with_set(set_u32));

    match kind {
        SessionKind::Decode => {
            table.insert(
                Capability::new(
                    CapId::CodedFrames,
                    CODED_FRAMES_PROGRESSIVE,
                    1,
                    1,
                    CODED_FRAMES_PROGRESSIVE,
                )
                .with_flags(CapFlags::MENU),
            );
        }
        SessionKind::Encode => {
            insert_encoder_caps(&mut table, codec);
        }
    }

    table
}

fn insert_encoder_caps(table: &mut CapabilityTable, codec: Codec) {
    let dynamic = CapFlags::DYNAMIC_ALLOWED;

    table.insert(
        Capability::new(
            CapId::BitrateMode,
            BITRATE_MODE_VBR,
            BITRATE_MODE_CQ,
            1,
            BITRATE_MODE_VBR,
        )
        .with_flags(CapFlags::MENU)
        .with_set(set_u32),
    );
    table.insert(
        Capability::new(CapId::BitRate, 1, 245_000_000, 1, 20_000_000)
            .with_flags(dynamic)
            .with_set(set_u32),
    );
    table.insert(
        Capability::new(CapId::BitrateBoost, 0, 100, 25, 0)
            .with_adjust(adjust_bitrate_boost)
            .with_set(set_u32),
    );
    table.insert(
        Capability::new(CapId::GopSize, 0, i32::MAX, 1, 2 * 30 - 1)
            .with_flags(dynamic | CapFlags::SUPPRESS_REDUNDANT_COMMIT)
            .with_set(set_u32),
    );
    table.insert(
        Capability::new(
            CapId::SliceMode,
            SLICE_MODE_SINGLE,
            SLICE_MODE_MAX_BYTES,
            1,
            SLICE_MODE_SINGLE,
        )
        .with_flags(CapFlags::MENU)
        .with_set(set_u32),
    );
    table.insert(Capability::new(CapId::Lossless, 0, 1, 1, 0).with_set(set_u32));
    table.insert(Capability::new(CapId::AllIntra, 0, 1, 1, 0).with_set(set_u32));
    table.insert(Capability::new(
        CapId::Complexity,
        0,
        100,
        1,
        DEFAULT_COMPLEXITY,
    ));
    table.insert(Capability::new(CapId::QualityMode, 1, 2, 1, 2).with_set(set_u32));

    if codec == Codec::Hevc {
        table.insert(
            Capability::new(CapId::EnhLayerCount, 0, MAX_ENH_LAYERS, 1, 0)
                .with_flags(dynamic)
                .with_set(set_u32),
        );
        table.insert(
            Capability::new(CapId::LayerEnable, 0, 1, 1, 0)
                .with_adjust(adjust_layer_enable)
                .with_set(set_u32),
        );
    }

    link_all(
        table,
        &[
            (CapId::BitrateMode, CapId::BitrateBoost),
            (CapId::BitRate, CapId::BitrateBoost),
            (CapId::FrameRate, CapId::BitrateBoost),
            (CapId::EnhLayerCount, CapId::LayerEnable),
        ],
    );
}

fn link_all(table: &mut CapabilityTable, links: &[(CapId, CapId)]) {
    for (parent, child) in links {
        if !table.contains(*parent) || !table.contains(*child) {
            continue;
        }
        if let Err(e) = table.link(*parent, *child) {
            log::error!("cannot link {} -> {}: {}", parent, child, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propagate::tests::RecordingSink;
    use crate::session::{CapabilitySession, SessionProps};
    use crate::WorkMode;
    use alloc::sync::Arc;
    use vidc_core::{CoreConfig, Error};

    fn encoder(codec: Codec) -> CapabilitySession {
        CapabilitySession::new(
            1,
            SessionProps::new(SessionKind::Encode, codec),
            default_table(SessionKind::Encode, codec),
            Arc::new(CoreConfig::default()),
        )
    }

    #[test]
    fn test_default_tables() {
        let dec = default_table(SessionKind::Decode, Codec::H264);
        assert!(dec.contains(CapId::CodedFrames));
        assert!(!dec.contains(CapId::BitRate));

        let enc = default_table(SessionKind::Encode, Codec::H264);
        assert!(enc.contains(CapId::BitrateBoost));
        assert!(!enc.contains(CapId::LayerEnable));
        assert_eq!(enc.get(CapId::BitrateBoost).unwrap().parents.len(), 3);

        let hevc = default_table(SessionKind::Encode, Codec::Hevc);
        assert_eq!(
            hevc.get(CapId::EnhLayerCount).unwrap().children.as_slice(),
            &[CapId::LayerEnable]
        );
    }

    #[test]
    fn test_default_values_are_valid() {
        for kind in [SessionKind::Encode, SessionKind::Decode] {
            let table = default_table(kind, Codec::Hevc);
            for id in table.ids() {
                let cap = table.get(id).unwrap();
                assert!(cap.validate(cap.value).is_ok(), "{} default invalid", id);
            }
        }
    }

    #[test]
    fn test_encoder_session_flow() {
        let session = encoder(Codec::Hevc);
        let mut sink = RecordingSink::default();

        // static controls before streaming
        session.set_control(CapId::EnhLayerCount, 2, &mut sink).unwrap();
        assert!(sink.sent.is_empty());

        {
            let mut state = session.lock();
            assert_eq!(state.decide_work_mode().unwrap(), WorkMode::Stage2);
            assert_eq!(state.decide_work_route().unwrap(), 4);
            assert!(state.decide_quality_mode().unwrap().is_some());
        }

        session.adjust_set_all(&mut sink).unwrap();
        let sent = |id| sink.sent.iter().find(|(i, _)| *i == id).map(|(_, v)| *v);
        assert_eq!(sent(CapId::BitrateBoost), Some(25));
        assert_eq!(sent(CapId::LayerEnable), Some(1));
        assert_eq!(sent(CapId::Stage), Some(2));
        assert_eq!(sent(CapId::Complexity), None);

        let boost = sink
            .sent
            .iter()
            .position(|(i, _)| *i == CapId::BitrateBoost)
            .unwrap();
        let bitrate = sink
            .sent
            .iter()
            .position(|(i, _)| *i == CapId::BitRate)
            .unwrap();
        assert!(bitrate < boost);

        // dynamic bitrate change while streaming
        session.lock().props_mut().output_streaming = true;
        let mut sink = RecordingSink::default();
        session.set_control(CapId::BitRate, 30_000_000, &mut sink).unwrap();
        assert_eq!(sink.sent[0], (CapId::BitRate, 30_000_000));

        // redundant gop size is not sent again
        let mut sink = RecordingSink::default();
        session.set_control(CapId::GopSize, 59, &mut sink).unwrap();
        assert!(sink.sent.is_empty());

        assert_eq!(
            session.set_control(CapId::Lossless, 1, &mut sink),
            Err(Error::NotDynamic)
        );
    }
}
