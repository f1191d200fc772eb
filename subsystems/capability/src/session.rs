//! # Capability Sessions
//!
//! [`CapabilitySession`] wraps the per-session capability state in the
//! session lock and implements the client control path. Sessions opened
//! through a [`SessionRegistry`] share the device-wide secure session limit.

use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use spin::{Mutex, MutexGuard};
use vidc_core::{CoreConfig, Error, Result, SessionKind};

use crate::cap::{CapFlags, CapId, CapabilityTable};
use crate::propagate::{CapabilityState, PropertySink};

// =============================================================================
// SESSION PROPERTIES
// =============================================================================

/// Codec of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// H.264 / AVC
    H264,
    /// H.265 / HEVC
    Hevc,
    /// VP9
    Vp9,
    /// AV1
    Av1,
    /// MPEG-2
    Mpeg2,
    /// HEIF still images
    Heic,
}

/// Format and streaming state of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProps {
    /// Direction
    pub kind: SessionKind,
    /// Codec
    pub codec: Codec,
    /// Frame width (decode: input, encode: crop)
    pub width: u32,
    /// Frame height (decode: input, encode: crop)
    pub height: u32,
    /// Operating frame rate
    pub fps: u32,
    /// Realtime session
    pub realtime: bool,
    /// Still image session
    pub image: bool,
    /// Input port streaming
    pub input_streaming: bool,
    /// Output port streaming
    pub output_streaming: bool,
}

impl SessionProps {
    /// 1080p30 realtime session, nothing streaming
    pub fn new(kind: SessionKind, codec: Codec) -> Self {
        Self {
            kind,
            codec,
            width: 1920,
            height: 1080,
            fps: 30,
            realtime: true,
            image: false,
            input_streaming: false,
            output_streaming: false,
        }
    }

    /// Encode session
    pub fn is_encode(&self) -> bool {
        self.kind == SessionKind::Encode
    }

    /// Decode session
    pub fn is_decode(&self) -> bool {
        self.kind == SessionKind::Decode
    }

    /// Still image decode session
    pub fn is_image_decode(&self) -> bool {
        self.image && self.is_decode()
    }

    /// Whether the port that carries client controls is streaming
    ///
    /// That is the bitstream port: output for encoders, input for decoders.
    pub fn is_control_port_streaming(&self) -> bool {
        match self.kind {
            SessionKind::Encode => self.output_streaming,
            SessionKind::Decode => self.input_streaming,
        }
    }

    /// 16x16 macroblocks per frame
    pub fn mbs_per_frame(&self) -> u32 {
        mbs(self.width, self.height)
    }
}

/// 16x16 macroblocks covering `width` x `height`, saturating at `u32::MAX`
pub(crate) fn mbs(width: u32, height: u32) -> u32 {
    width
        .div_ceil(16)
        .saturating_mul(height.div_ceil(16))
}

// =============================================================================
// CAPABILITY SESSION
// =============================================================================

/// Capability state of one session behind the session lock
pub struct CapabilitySession {
    id: u32,
    state: Mutex<CapabilityState>,
    secure: AtomicBool,
    registry: Weak<SessionRegistry>,
}

impl CapabilitySession {
    /// Session outside any registry
    pub fn new(
        id: u32,
        props: SessionProps,
        table: CapabilityTable,
        config: Arc<CoreConfig>,
    ) -> Self {
        Self::with_registry(id, props, table, config, Weak::new())
    }

    fn with_registry(
        id: u32,
        props: SessionProps,
        table: CapabilityTable,
        config: Arc<CoreConfig>,
        registry: Weak<SessionRegistry>,
    ) -> Self {
        let secure = table.value_or_zero(CapId::SecureMode) != 0;
        Self {
            id,
            state: Mutex::new(CapabilityState::new(props, table, config)),
            secure: AtomicBool::new(secure),
            registry,
        }
    }

    /// Session identifier
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Take the session lock
    pub fn lock(&self) -> MutexGuard<'_, CapabilityState> {
        self.state.lock()
    }

    /// Whether the session runs in secure mode
    pub fn is_secure(&self) -> bool {
        self.secure.load(Ordering::Acquire)
    }

    /// Build the dependency order (once per session)
    pub fn build_dependency_order(&self) -> Result<()> {
        self.state.lock().build_dependency_order().map(|_| ())
    }

    /// Adjust and send every capability, used at stream-on
    pub fn adjust_set_all(&self, sink: &mut dyn PropertySink) -> Result<()> {
        self.state.lock().adjust_set_all(sink)
    }

    /// Handle a client control
    ///
    /// Before streaming the value is stored with its side effects. While
    /// streaming it is propagated to every derived capability and sent.
    pub fn set_control(&self, id: CapId, value: i32, sink: &mut dyn PropertySink) -> Result<()> {
        let mut state = self.state.lock();

        let Some(cap) = state.table.get_mut(id) else {
            log::error!("session {}: no capability {}", self.id, id);
            return Err(Error::UnknownCapability);
        };
        cap.validate(value)?;
        cap.flags.insert(CapFlags::CLIENT_SET);

        log::debug!("session {}: set {} = {}", self.id, id, value);

        if !state.props.is_control_port_streaming() {
            self.update_static_property(&mut *state, id, value)
        } else {
            state.propagate(id, value)?;
            state.commit(sink)
        }
    }

    fn update_static_property(
        &self,
        state: &mut CapabilityState,
        id: CapId,
        value: i32,
    ) -> Result<()> {
        let prev = state.table.value_or_zero(id);
        state.table.update_value(id, value, "static")?;

        match id {
            CapId::SecureMode => {
                self.secure.store(value != 0, Ordering::Release);
                if value != 0 {
                    if let Err(e) = self.allow_secure_session(state.config()) {
                        state.table.update_value(id, prev, "static")?;
                        self.secure.store(prev != 0, Ordering::Release);
                        return Err(e);
                    }
                }
            }
            CapId::CriticalPriority => {
                if state.table.contains(CapId::Priority) {
                    state.table.update_value(CapId::Priority, 0, "static")?;
                }
            }
            CapId::EnhLayerCount if state.props.codec == Codec::Hevc => {
                if state.table.contains(CapId::LayerEnable) {
                    state
                        .table
                        .update_value(CapId::LayerEnable, i32::from(value > 0), "static")?;
                }
            }
            _ => {}
        }

        Ok(())
    }

    fn allow_secure_session(&self, config: &CoreConfig) -> Result<()> {
        let count = match self.registry.upgrade() {
            Some(registry) => registry.secure_count(),
            None => u32::from(self.is_secure()),
        };
        if count > config.max_secure_sessions {
            log::error!(
                "session {}: total secure sessions {} exceeded max limit {}",
                self.id,
                count,
                config.max_secure_sessions
            );
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }
}

impl core::fmt::Debug for CapabilitySession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CapabilitySession")
            .field("id", &self.id)
            .field("secure", &self.is_secure())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// SESSION REGISTRY
// =============================================================================

/// Sessions open on one device
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<Vec<Weak<CapabilitySession>>>,
}

impl SessionRegistry {
    /// Empty registry
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Open a session and register it
    pub fn open(
        self: &Arc<Self>,
        id: u32,
        props: SessionProps,
        table: CapabilityTable,
        config: Arc<CoreConfig>,
    ) -> Arc<CapabilitySession> {
        let session = Arc::new(CapabilitySession::with_registry(
            id,
            props,
            table,
            config,
            Arc::downgrade(self),
        ));
        let mut sessions = self.sessions.lock();
        sessions.retain(|s| s.strong_count() > 0);
        sessions.push(Arc::downgrade(&session));
        session
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .iter()
            .filter(|s| s.strong_count() > 0)
            .count()
    }

    /// Whether no session is live
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live sessions in secure mode
    pub fn secure_count(&self) -> u32 {
        let sessions = self.sessions.lock();
        let count = sessions
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|s| s.is_secure())
            .count();
        count as u32
    }
}
