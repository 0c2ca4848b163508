// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The closure/info-table object model.
//!
//! Every heap object ("closure") is `[info table][payload]`. The info table
//! is a small, cheaply-copyable tag describing how the object's entry code
//! runs and how the collector evacuates it: a closed Rust enum dispatched on
//! directly, rather than a pointer to one of a handful of process-wide
//! static descriptors indirected through a function pointer.

#[cfg(test)]
mod closure_test;

use crate::driver::CodeLabel;
use crate::heap::{Heap, HeapAddr};
use crate::runtime::Runtime;

/// Width in bytes of one "word" slot in the heap and on stack B. Every
/// object header, saved code label, and saved heap address occupies a
/// whole word so offsets stay word-aligned even though `HeapAddr` itself
/// only needs four bytes.
pub const WORD: usize = 8;

/// Every closure, no matter its shape, occupies at least two words: the
/// info table header plus one word of payload. This is what makes an
/// in-place conversion to a forwarding indirection during collection always
/// safe, regardless of the original object's size.
pub const MIN_CLOSURE_SIZE: usize = WORD * 2;

/// Registry id of a `Custom` info table, indexing into
/// [`Runtime::custom_tables`](crate::runtime::Runtime).
pub type CustomTableId = u32;

/// The evacuation function a `Custom` info table supplies: copy `at` (an
/// object described by this table, read from `from`, the from-space of an
/// in-progress collection) into `rt`'s to-space and return its new
/// address, recursively evacuating any pointer-shaped fields in the
/// payload.
pub type EvacFn = fn(rt: &mut Runtime, from: &mut Heap, at: HeapAddr) -> HeapAddr;

/// Discriminant stored in a closure's header word. Kept numeric (rather
/// than relying on `InfoTable`'s own in-memory representation) because the
/// heap stores this as raw bytes, not a native Rust value.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Static = 0,
    Forwarding = 1,
    StringDynamic = 2,
    StringLiteral = 3,
    PartialApplication = 4,
    NullSentinel = 5,
    Custom = 6,
}

impl Tag {
    const fn from_u8(b: u8) -> Self {
        match b {
            0 => Self::Static,
            1 => Self::Forwarding,
            2 => Self::StringDynamic,
            3 => Self::StringLiteral,
            4 => Self::PartialApplication,
            5 => Self::NullSentinel,
            _ => Self::Custom,
        }
    }
}

/// The descriptor stored in a closure's header.
///
/// `Static`, `StringLiteral` and `NullSentinel` all evacuate as the
/// identity: closures carrying them must live in the runtime's static
/// arena (see [`crate::runtime::Runtime::alloc_static`]), never in the
/// collected heap, because "identity evac" only makes sense for objects
/// the collector never actually moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoTable {
    /// A runtime-owned object that is never moved by collection and whose
    /// entry code is a fixed, non-enterable stub (or simply unused).
    Static,
    /// Installed over an object's header once the collector has copied it;
    /// the word immediately after the header holds the new address.
    Forwarding,
    /// A dynamically allocated, heap-resident string closure.
    StringDynamic,
    /// A compiled-in string literal. Lives in the static arena.
    StringLiteral,
    /// A partial-application closure (see `update_frame::under_apply`).
    PartialApplication,
    /// The distinguished null sentinel every pointer register and stack
    /// slot is initialised to. Lives in the static arena; its entry must
    /// never be called.
    NullSentinel,
    /// A compiler-emitted shape this runtime does not know the layout of.
    /// `entry` and `evac` are supplied by whoever registered the shape.
    Custom {
        /// The closure's entry code label.
        entry: CodeLabel,
        /// The closure's evacuation routine.
        evac: EvacFn,
        /// Registry id, used only to round-trip through the heap header.
        id: CustomTableId,
    },
}

impl InfoTable {
    /// Whether a closure with this info table is copied during collection
    /// or kept at a fixed address ("identity evac").
    #[must_use]
    pub const fn is_identity_evac(self) -> bool {
        matches!(self, Self::Static | Self::StringLiteral | Self::NullSentinel)
    }

    /// Whether entering a closure with this info table is ever valid.
    #[must_use]
    pub const fn is_enterable(self) -> bool {
        !matches!(self, Self::NullSentinel | Self::Static)
    }

    fn tag(self) -> Tag {
        match self {
            Self::Static => Tag::Static,
            Self::Forwarding => Tag::Forwarding,
            Self::StringDynamic => Tag::StringDynamic,
            Self::StringLiteral => Tag::StringLiteral,
            Self::PartialApplication => Tag::PartialApplication,
            Self::NullSentinel => Tag::NullSentinel,
            Self::Custom { .. } => Tag::Custom,
        }
    }

    /// Serialise to the eight raw header bytes stored at a closure's
    /// address. Layout: `[tag:1][pad:3][aux:4]`, where `aux` is the custom
    /// table id for `Custom` and the new address for a `Forwarding` header
    /// installed mid-collection (see [`Self::forwarding_bytes`]).
    pub(crate) fn to_header_bytes(self) -> [u8; WORD] {
        let aux = match self {
            Self::Custom { id, .. } => id,
            _ => 0,
        };
        let mut bytes = [0u8; WORD];
        bytes[0] = self.tag() as u8;
        bytes[4..8].copy_from_slice(&aux.to_le_bytes());
        bytes
    }

    /// Header bytes for a forwarding pointer to `new_addr`, installed over
    /// an object's header the moment the collector has copied it.
    pub(crate) fn forwarding_bytes(new_addr: HeapAddr) -> [u8; WORD] {
        let mut bytes = [0u8; WORD];
        bytes[0] = Tag::Forwarding as u8;
        bytes[4..8].copy_from_slice(&new_addr.offset().to_le_bytes());
        bytes
    }

    /// Recover the forwarding target from a header known to carry
    /// `Tag::Forwarding`.
    pub(crate) fn forwarding_target(bytes: [u8; WORD]) -> HeapAddr {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&bytes[4..8]);
        HeapAddr::heap(u32::from_le_bytes(raw))
    }

    /// Parse a header word back into an `InfoTable`, resolving `Custom`
    /// ids against `rt`'s registry.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Fault::UnknownInfoTable`] if the header
    /// names a `Custom` id that was never registered.
    pub(crate) fn from_header_bytes(
        bytes: [u8; WORD],
        rt: &Runtime,
    ) -> Result<Self, crate::error::Fault> {
        let tag = Tag::from_u8(bytes[0]);
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&bytes[4..8]);
        let aux = u32::from_le_bytes(raw);
        Ok(match tag {
            Tag::Static => Self::Static,
            Tag::Forwarding => Self::Forwarding,
            Tag::StringDynamic => Self::StringDynamic,
            Tag::StringLiteral => Self::StringLiteral,
            Tag::PartialApplication => Self::PartialApplication,
            Tag::NullSentinel => Self::NullSentinel,
            Tag::Custom => {
                let (entry, evac) = rt
                    .custom_table(aux)
                    .ok_or(crate::error::Fault::UnknownInfoTable { id: aux })?;
                Self::Custom { entry, evac, id: aux }
            }
        })
    }
}

/// A typed handle to a closure living somewhere in a [`Runtime`]'s heap or
/// static arena. Thin wrapper over [`HeapAddr`]; exists so call sites read
/// "closure" instead of a bare address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosureRef(HeapAddr);

impl ClosureRef {
    /// Wrap a raw address as a closure reference.
    #[must_use]
    pub const fn new(addr: HeapAddr) -> Self {
        Self(addr)
    }

    /// The underlying address.
    #[must_use]
    pub const fn addr(self) -> HeapAddr {
        self.0
    }

    /// Address of the first payload byte, immediately after the header.
    #[must_use]
    pub fn payload_addr(self) -> HeapAddr {
        self.0.add(WORD as u32)
    }
}

/// Encode a code label as the bit pattern stored in a heap word or stack
/// slot.
///
/// Casting a `fn` item pointer to `usize` and back is the standard, sound
/// way to store executable addresses as data in Rust; the function pointer
/// type itself is never transmuted, only its address.
#[must_use]
pub fn encode_label(label: CodeLabel) -> u64 {
    label as usize as u64
}

/// Decode a code label previously encoded with [`encode_label`].
///
/// # Safety
///
/// `bits` must be a value produced by [`encode_label`] on a `CodeLabel`
/// with the exact signature `fn(&mut Runtime) -> Action`; decoding
/// arbitrary bits is undefined behaviour.
#[must_use]
pub unsafe fn decode_label(bits: u64) -> CodeLabel {
    let addr = bits as usize;
    // SAFETY: caller guarantees `bits` round-trips a valid `CodeLabel`.
    unsafe { core::mem::transmute::<usize, CodeLabel>(addr) }
}
