//! # Capabilities
//!
//! A capability is one bounded, session-scoped configuration property. Each
//! session owns a [`CapabilityTable`] with one optional slot per [`CapId`];
//! an empty slot means the property does not exist for that session type.

use core::fmt;

use arrayvec::ArrayVec;
use bitflags::bitflags;
use static_assertions::const_assert;
use vidc_core::{Error, Result};

use crate::propagate::{AdjustCtx, PropertySink};

/// Most parents a capability can declare
pub const MAX_CAP_PARENTS: usize = 20;

/// Most children a capability can declare
pub const MAX_CAP_CHILDREN: usize = 20;

const_assert!(MAX_CAP_PARENTS > 0 && MAX_CAP_CHILDREN > 0);
const_assert!(CapId::COUNT <= u8::MAX as usize);

// =============================================================================
// CAPABILITY IDS
// =============================================================================

macro_rules! cap_ids {
    ($($(#[$doc:meta])* $name:ident => $label:literal,)+) => {
        /// Capability identifier
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum CapId {
            $($(#[$doc])* $name,)+
        }

        impl CapId {
            /// Every id in declaration order
            pub const ALL: &'static [CapId] = &[$(CapId::$name,)+];

            /// Number of ids
            pub const COUNT: usize = Self::ALL.len();

            /// Name used in logs
            pub const fn name(self) -> &'static str {
                match self {
                    $(CapId::$name => $label,)+
                }
            }
        }
    };
}

cap_ids! {
    /// Rate control mode
    BitrateMode => "BITRATE_MODE",
    /// Target bitrate in bits per second
    BitRate => "BIT_RATE",
    /// Extra bitrate headroom in percent for VBR
    BitrateBoost => "BITRATE_BOOST",
    /// Frame rate in Q16
    FrameRate => "FRAME_RATE",
    /// Distance between IDR frames
    GopSize => "GOP_SIZE",
    /// Progressive or interlaced coded frames
    CodedFrames => "CODED_FRAMES",
    /// Low latency mode
    LowLatencyMode => "LOWLATENCY_MODE",
    /// Slice mode
    SliceMode => "SLICE_MODE",
    /// Lossless encoding
    Lossless => "LOSSLESS",
    /// All-intra encoding
    AllIntra => "ALL_INTRA",
    /// Encoder complexity
    Complexity => "COMPLEXITY",
    /// Secure session
    SecureMode => "SECURE_MODE",
    /// Session priority
    Priority => "PRIORITY",
    /// Critical priority session
    CriticalPriority => "CRITICAL_PRIORITY",
    /// Hierarchical coding enhancement layers
    EnhLayerCount => "ENH_LAYER_COUNT",
    /// Hierarchical coding enabled
    LayerEnable => "LAYER_ENABLE",
    /// Work mode (pipeline stages)
    Stage => "STAGE",
    /// Work route (pipes)
    Pipe => "PIPE",
    /// Quality mode
    QualityMode => "QUALITY_MODE",
}

impl CapId {
    /// Slot of this id in a [`CapabilityTable`]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for CapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// VALUES
// =============================================================================

/// Well-known capability values
pub mod values {
    /// `CodedFrames`: progressive
    pub const CODED_FRAMES_PROGRESSIVE: i32 = 0;
    /// `CodedFrames`: interlaced
    pub const CODED_FRAMES_INTERLACE: i32 = 1;

    /// `SliceMode`: single slice
    pub const SLICE_MODE_SINGLE: i32 = 0;
    /// `SliceMode`: slices bounded by macroblock count
    pub const SLICE_MODE_MAX_MB: i32 = 1;
    /// `SliceMode`: slices bounded by byte count
    pub const SLICE_MODE_MAX_BYTES: i32 = 2;

    /// `BitrateMode`: variable bitrate
    pub const BITRATE_MODE_VBR: i32 = 0;
    /// `BitrateMode`: constant bitrate
    pub const BITRATE_MODE_CBR: i32 = 1;
    /// `BitrateMode`: constant quality
    pub const BITRATE_MODE_CQ: i32 = 2;

    /// `Complexity` default
    pub const DEFAULT_COMPLEXITY: i32 = 50;
}

// =============================================================================
// FLAGS
// =============================================================================

bitflags! {
    /// Capability flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CapFlags: u32 {
        /// The client set the value explicitly (sticky for the session)
        const CLIENT_SET = 1 << 0;
        /// Can be changed while streaming
        const DYNAMIC_ALLOWED = 1 << 1;
        /// Value is a menu index
        const MENU = 1 << 2;
        /// Value is a bitmask checked against `step_or_mask`
        const BITMASK = 1 << 3;
        /// Value is read back from the firmware
        const VOLATILE = 1 << 4;
        /// An unchanged value is neither committed nor propagated
        const SUPPRESS_REDUNDANT_COMMIT = 1 << 5;
    }
}

// =============================================================================
// CAPABILITY
// =============================================================================

/// Derive a capability value
///
/// Gets the explicit client value when there is one and returns the new
/// value of `ctx.id()`.
pub type AdjustFn = fn(ctx: &AdjustCtx<'_>, explicit: Option<i32>) -> Result<i32>;

/// Push a capability value to the firmware
pub type SetFn = fn(cap: &Capability, sink: &mut dyn PropertySink) -> Result<()>;

/// One configuration property
#[derive(Clone)]
pub struct Capability {
    /// Identifier
    pub id: CapId,
    /// Current value
    pub value: i32,
    /// Lowest accepted value
    pub min: i32,
    /// Highest accepted value
    pub max: i32,
    /// Step for ranges, allowed bits for bitmasks and menus
    pub step_or_mask: i32,
    /// Flags
    pub flags: CapFlags,
    /// Capabilities this one is derived from
    pub parents: ArrayVec<CapId, MAX_CAP_PARENTS>,
    /// Capabilities derived from this one
    pub children: ArrayVec<CapId, MAX_CAP_CHILDREN>,
    /// Derivation, if any
    pub adjust: Option<AdjustFn>,
    /// Firmware setter, if any
    pub set: Option<SetFn>,
}

impl Capability {
    /// Range capability without dependencies
    pub fn new(id: CapId, min: i32, max: i32, step: i32, value: i32) -> Self {
        Self {
            id,
            value,
            min,
            max,
            step_or_mask: step,
            flags: CapFlags::empty(),
            parents: ArrayVec::new(),
            children: ArrayVec::new(),
            adjust: None,
            set: None,
        }
    }

    /// Add flags
    pub fn with_flags(mut self, flags: CapFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Attach a derivation
    pub fn with_adjust(mut self, adjust: AdjustFn) -> Self {
        self.adjust = Some(adjust);
        self
    }

    /// Attach a firmware setter
    pub fn with_set(mut self, set: SetFn) -> Self {
        self.set = Some(set);
        self
    }

    /// Whether the capability may change while streaming
    pub fn is_dynamic(&self) -> bool {
        self.flags.contains(CapFlags::DYNAMIC_ALLOWED)
    }

    /// Whether the client set the value
    pub fn is_client_set(&self) -> bool {
        self.flags.contains(CapFlags::CLIENT_SET)
    }

    /// Check a client value against the bounds
    pub fn validate(&self, value: i32) -> Result<()> {
        let ok = if self.flags.contains(CapFlags::BITMASK) {
            value & !self.step_or_mask == 0
        } else {
            (self.min..=self.max).contains(&value)
        };
        if ok {
            Ok(())
        } else {
            log::error!(
                "{}: value {} outside [{}, {}] mask {:#x}",
                self.id,
                value,
                self.min,
                self.max,
                self.step_or_mask
            );
            Err(Error::InvalidArgument)
        }
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capability")
            .field("id", &self.id)
            .field("value", &self.value)
            .field("min", &self.min)
            .field("max", &self.max)
            .field("flags", &self.flags)
            .field("parents", &self.parents.as_slice())
            .field("children", &self.children.as_slice())
            .finish_non_exhaustive()
    }
}

/// Setter that sends the raw value
pub fn set_u32(cap: &Capability, sink: &mut dyn PropertySink) -> Result<()> {
    sink.set_property(cap.id, cap.value)
}

// =============================================================================
// TABLE
// =============================================================================

/// Per-session capability database
#[derive(Debug, Clone)]
pub struct CapabilityTable {
    caps: [Option<Capability>; CapId::COUNT],
}

impl CapabilityTable {
    /// Table where no capability exists
    pub fn new() -> Self {
        Self {
            caps: core::array::from_fn(|_| None),
        }
    }

    /// Add or replace a capability
    pub fn insert(&mut self, cap: Capability) {
        let slot = cap.id.index();
        self.caps[slot] = Some(cap);
    }

    /// Declare `child` as derived from `parent`
    ///
    /// Both capabilities must already be in the table.
    pub fn link(&mut self, parent: CapId, child: CapId) -> Result<()> {
        let parent_cap = self.get(parent).ok_or(Error::UnknownCapability)?;
        let child_cap = self.get(child).ok_or(Error::UnknownCapability)?;
        let add_child = !parent_cap.children.contains(&child);
        let add_parent = !child_cap.parents.contains(&parent);

        // either both sides get the edge or neither does
        if (add_child && parent_cap.children.is_full()) || (add_parent && child_cap.parents.is_full())
        {
            log::error!(
                "link {} -> {}: dependency list full",
                parent.name(),
                child.name()
            );
            return Err(Error::InvalidArgument);
        }

        if add_parent {
            if let Some(cap) = self.get_mut(child) {
                cap.parents.push(parent);
            }
        }
        if add_child {
            if let Some(cap) = self.get_mut(parent) {
                cap.children.push(child);
            }
        }
        Ok(())
    }

    /// Whether `id` exists for this session
    pub fn contains(&self, id: CapId) -> bool {
        self.caps[id.index()].is_some()
    }

    /// Look up a capability
    pub fn get(&self, id: CapId) -> Option<&Capability> {
        self.caps[id.index()].as_ref()
    }

    /// Look up a capability for update
    pub fn get_mut(&mut self, id: CapId) -> Option<&mut Capability> {
        self.caps[id.index()].as_mut()
    }

    /// Current value
    pub fn value(&self, id: CapId) -> Option<i32> {
        self.get(id).map(|cap| cap.value)
    }

    /// Current value, 0 when the capability does not exist
    pub fn value_or_zero(&self, id: CapId) -> i32 {
        self.value(id).unwrap_or(0)
    }

    /// Store a value, logging the change
    pub fn update_value(&mut self, id: CapId, value: i32, func: &str) -> Result<()> {
        let cap = self.get_mut(id).ok_or(Error::UnknownCapability)?;
        if cap.value != value {
            log::debug!("{}: {}: {} -> {}", func, id, cap.value, value);
            cap.value = value;
        }
        Ok(())
    }

    /// Ids of every existing capability in id order
    pub fn ids(&self) -> impl Iterator<Item = CapId> + '_ {
        CapId::ALL.iter().copied().filter(|id| self.contains(*id))
    }

    /// Number of existing capabilities
    pub fn len(&self) -> usize {
        self.caps.iter().filter(|c| c.is_some()).count()
    }

    /// Whether no capability exists
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CapabilityTable {
    fn default() -> Self {
        Self::new()
    }
}
