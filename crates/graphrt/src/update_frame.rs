// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The update-frame and partial-application protocols.
//!
//! An update frame is five slots pushed onto stack B, read from bottom
//! (oldest) to top (newest):
//!
//! ```text
//! [ return_continuation_code_label ]   <- pushed by the call site, before
//! [ saved_SB_base                  ]      entering the thunk
//! [ saved_SA_base                  ]   <- these four are the thunk's own
//! [ closure_to_update               ]      prologue (`enter_thunk_prologue`)
//! [ update_constructor_label        ]   <- topmost
//! ```
//!
//! `SB.base` is set by `save_B()` to point directly at the `saved_SB_base`
//! slot, so the remaining three slots sit at fixed offsets from it; the
//! `return_continuation` slot sits one below `SB.base`. These offsets are
//! named constants rather than magic numbers.

#[cfg(test)]
mod update_frame_test;

#[cfg(any(test, feature = "std"))]
use std::vec::Vec;

#[cfg(not(any(test, feature = "std")))]
use alloc::vec::Vec;

use crate::closure::{decode_label, encode_label, ClosureRef, InfoTable, MIN_CLOSURE_SIZE, WORD};
use crate::driver::{Action, CodeLabel};
use crate::error::Fault;
use crate::heap::{Heap, HeapAddr};
use crate::runtime::Runtime;
use crate::stack::{save_a, save_b, StackBSlot};

/// Offset, relative to `SB.base`, of the saved `SB.base` field.
pub const SAVED_SB_BASE_OFFSET: usize = 0;
/// Offset, relative to `SB.base`, of the saved `SA.base` field.
pub const SAVED_SA_BASE_OFFSET: usize = 1;
/// Offset, relative to `SB.base`, of the closure an update frame will
/// overwrite once its thunk finishes.
pub const CLOSURE_TO_UPDATE_OFFSET: usize = 2;
/// Offset, relative to `SB.base`, of the `update_constructor` label.
pub const UPDATE_CONSTRUCTOR_LABEL_OFFSET: usize = 3;

/// Size, in bytes, of a partial-application closure's fixed header: one
/// `u16` item count (the saved A slice's length) plus six bytes of padding
/// out to a whole word. There is deliberately no saved-B-slice count here
/// (see [`under_apply`]'s doc): stack B's slots in an update frame are
/// control-flow bookkeeping the runtime already recovers from the frame
/// itself, never data a partial application needs to replay.
const PA_HEADER_LEN: usize = WORD;

/// Run the standard thunk-entry prologue: establish a fresh frame on both
/// stacks and push the two
/// remaining update-frame slots. The caller must already have pushed a
/// return continuation onto stack B (for example, the dispatcher of the
/// `case` expression that is forcing this thunk) before calling this.
///
/// # Errors
///
/// Propagates a stack overflow from any of the three pushes this performs.
pub fn enter_thunk_prologue(rt: &mut Runtime, thunk: HeapAddr) -> Result<(), Fault> {
    save_b(&mut rt.sb)?;
    save_a(&mut rt.sa, &mut rt.sb)?;
    rt.sb.push(StackBSlot::from_heap_addr(thunk))?;
    rt.sb.push(StackBSlot::from_label(update_constructor))?;
    rt.push_frame();
    Ok(())
}

/// The generic "a constructor was returned" dispatch convention: record
/// the tag and argument count in the registers, pop the next continuation
/// off stack B, and step to it. This is how compiled code returns a fully
/// evaluated data value, whether the popped label turns out to be an
/// ordinary `case` continuation or [`update_constructor`]; the popper
/// never needs to know which.
///
/// # Errors
///
/// Returns [`Fault::StackUnderflow`] if stack B has nothing left to pop.
pub fn return_constructor(rt: &mut Runtime, tag: i64, arg_count: i64) -> Result<Action, Fault> {
    rt.registers.tag = tag;
    rt.registers.constructor_arg_count = arg_count;
    let slot = rt.sb.pop()?;
    // SAFETY: every slot a constructor return pops was pushed either by
    // `enter_thunk_prologue` (`update_constructor`) or by a call site
    // establishing a `case` continuation, both push via `from_label`.
    let label = unsafe { slot.as_label() };
    Ok(Action::Step(label))
}

/// The runtime-owned code label installed by [`enter_thunk_prologue`] atop
/// every update frame. When popped via [`return_constructor`]'s generic
/// dispatch, it consumes the rest of the frame, records the closure to
/// update in `ConstrUpdateRegister`, restores both stacks' bases, and
/// hands control to the original return continuation.
pub fn update_constructor(rt: &mut Runtime) -> Action {
    match update_constructor_inner(rt) {
        Ok(action) => action,
        Err(fault) => rt.abort(fault),
    }
}

fn update_constructor_inner(rt: &mut Runtime) -> Result<Action, Fault> {
    let base = rt.sb.base;
    let closure_to_update = rt.sb.read_at(base + CLOSURE_TO_UPDATE_OFFSET).as_heap_addr();
    let saved_sa_base = rt.sb.read_at(base + SAVED_SA_BASE_OFFSET).as_saved_base();
    let saved_sb_base = rt.sb.read_at(base + SAVED_SB_BASE_OFFSET).as_saved_base();
    let return_continuation_index = base.checked_sub(1).ok_or(Fault::StackUnderflow)?;
    // SAFETY: written by the call site that forced this thunk, via
    // `from_label`, directly below the frame `enter_thunk_prologue` built.
    let return_continuation = unsafe { rt.sb.read_at(return_continuation_index).as_label() };

    rt.registers.constr_update = closure_to_update;
    rt.sa.base = saved_sa_base;
    rt.sb.base = saved_sb_base;
    rt.sb.top = return_continuation_index;
    rt.pop_frame();
    Ok(Action::Step(return_continuation))
}

/// Install an indirection at `at`, overwriting whatever closure lived
/// there so that entering it again lands on `target` instead. Used both to
/// update a forced thunk with its computed value, and to unconditionally
/// redirect an under-applied thunk at its partial-application closure.
/// Reuses the `Forwarding` header shape the collector uses mid-collection;
/// the two uses never overlap in time.
pub fn install_indirection(rt: &mut Runtime, at: HeapAddr, target: HeapAddr) {
    rt.write_heap_word(at, InfoTable::forwarding_bytes(target));
}

/// Handle an under-applied function call: capture the arguments already
/// supplied (the slice of stack
/// A between the enclosing update frame's saved base and its current
/// base) into a partial-application closure, indirect the thunk that was
/// being forced at it, and unwind the current frame exactly as
/// [`update_constructor`] would, handing the new closure back as the
/// produced value via `NodeRegister`.
///
/// Resolving spec §4.7's "restores the saved A and B slices" literally
/// against this runtime's own update-frame layout: the slots an update
/// frame keeps on stack B (`saved_SB_base`, `saved_SA_base`, the
/// `closure_to_update` address, the `update_constructor` label) are
/// control-flow bookkeeping the frame itself already carries, not argument
/// data a suspended call needs replayed later — `under_apply` reads
/// `saved_sb_base`/`saved_sa_base` directly from the frame below, not from
/// a payload. So only the saved A slice (homogeneous closure-pointer
/// arguments) is captured into the payload and restored on entry, in
/// [`partial_app_entry_inner`]; there is no saved-B-slice field at all,
/// since one would carry bytes nothing ever reads back.
///
/// # Errors
///
/// Returns [`Fault::SliceTooLarge`] if the saved A slice exceeds 2^16
/// items, or propagates a heap/stack fault from allocation.
pub fn under_apply(
    rt: &mut Runtime,
    underlying_fn: CodeLabel,
    thunk_to_indirect: HeapAddr,
) -> Result<Action, Fault> {
    let base = rt.sb.base;
    let saved_sb_base = rt.sb.read_at(base + SAVED_SB_BASE_OFFSET).as_saved_base();
    let saved_sa_base = rt.sb.read_at(base + SAVED_SA_BASE_OFFSET).as_saved_base();

    let a_from = saved_sa_base;
    let a_to = rt.sa.base;
    let a_items = u16::try_from(a_to - a_from).map_err(|_| Fault::SliceTooLarge)?;

    let payload_len = PA_HEADER_LEN + WORD + usize::from(a_items) * 4;
    let closure = rt.alloc(InfoTable::PartialApplication, &vec![0u8; payload_len])?;

    // The allocation above is a GC safepoint: a collection may have
    // evacuated `thunk_to_indirect` (the frame's `closure_to_update` root)
    // and rewritten that slot in place. Re-read the frame's own slot for
    // the thunk's current address rather than trusting the pre-safepoint
    // parameter, exactly as `update_constructor_inner` does; the stack
    // index `base + CLOSURE_TO_UPDATE_OFFSET` itself never moves, only the
    // address stored there. The saved A slice is likewise re-read below,
    // since a collection moves its contents in place on stack A itself
    // (stack A is scanned in full as GC roots, so this is always up to
    // date without any extra protection).
    let thunk_to_indirect = rt.sb.read_at(base + CLOSURE_TO_UPDATE_OFFSET).as_heap_addr();
    let mut header = [0u8; PA_HEADER_LEN];
    header[0..2].copy_from_slice(&a_items.to_le_bytes());
    rt.write_payload(closure, 0, &header);
    rt.write_payload(closure, PA_HEADER_LEN, &encode_label(underlying_fn).to_le_bytes());

    let mut offset = PA_HEADER_LEN + WORD;
    for i in a_from..a_to {
        let addr = rt.sa.read_at(i);
        rt.write_payload(closure, offset, &addr.to_raw().to_le_bytes());
        offset += 4;
    }

    install_indirection(rt, thunk_to_indirect, closure.addr());
    rt.registers.node = closure.addr();

    let return_continuation_index = base.checked_sub(1).ok_or(Fault::StackUnderflow)?;
    // SAFETY: see `update_constructor_inner`; the same frame shape applies.
    let return_continuation = unsafe { rt.sb.read_at(return_continuation_index).as_label() };
    rt.sa.base = saved_sa_base;
    rt.sa.top = a_from;
    rt.sb.base = saved_sb_base;
    rt.sb.top = return_continuation_index;
    rt.pop_frame();
    Ok(Action::Step(return_continuation))
}

/// The runtime-owned entry code for a partial-application closure: restore
/// its saved argument slice beneath whatever new arguments the current
/// call already pushed, then jump to the underlying function so it can
/// re-check its arity against the combined total.
pub fn partial_app_entry(rt: &mut Runtime) -> Action {
    match partial_app_entry_inner(rt) {
        Ok(action) => action,
        Err(fault) => rt.abort(fault),
    }
}

fn partial_app_entry_inner(rt: &mut Runtime) -> Result<Action, Fault> {
    let closure = ClosureRef::new(rt.registers.node);
    let header = rt.read_payload(closure, 0, PA_HEADER_LEN).to_vec();
    let a_items = usize::from(u16::from_le_bytes([header[0], header[1]]));

    let label_bytes = rt.read_payload(closure, PA_HEADER_LEN, WORD).to_vec();
    let label_bits = u64::from_le_bytes(label_bytes.try_into().unwrap_or([0u8; 8]));
    // SAFETY: written by `under_apply` via `encode_label` at this exact offset.
    let underlying_fn = unsafe { decode_label(label_bits) };

    let a_slice_offset = PA_HEADER_LEN + WORD;
    let a_bytes = rt.read_payload(closure, a_slice_offset, a_items * 4).to_vec();
    let saved_args: Vec<HeapAddr> = a_bytes
        .chunks_exact(4)
        .map(|chunk| HeapAddr::from_raw(u32::from_le_bytes(chunk.try_into().unwrap_or([0; 4]))))
        .collect();

    rt.sa.insert_slice_at_base(&saved_args)?;
    Ok(Action::Step(underlying_fn))
}

/// Evacuate a partial-application closure during collection. This is not
/// identity: the saved A slice is recursively evacuated, since it is
/// homogeneous closure pointers exactly like the rest of stack A. There is
/// no saved B slice to carry (see [`under_apply`]'s doc): the payload
/// holds only the underlying function's label and the saved A slice.
///
/// # Errors
///
/// Returns [`Fault::HeapExhausted`] if the to-space has no room for the
/// copy, or propagates a fault from recursively evacuating an A-slice
/// entry.
pub(crate) fn evac_partial_application(
    rt: &mut Runtime,
    from: &mut Heap,
    addr: HeapAddr,
) -> Result<HeapAddr, Fault> {
    let payload_addr = addr.add(WORD as u32);
    let header = from.read(payload_addr, PA_HEADER_LEN).to_vec();
    let a_items = usize::from(u16::from_le_bytes([header[0], header[1]]));
    let rest_len = WORD + a_items * 4;
    let mut rest = from.read(payload_addr.add(PA_HEADER_LEN as u32), rest_len).to_vec();

    let total = (WORD + PA_HEADER_LEN + rest_len).max(MIN_CLOSURE_SIZE);
    let new_addr = rt.bump_to_space(total)?;

    // Install the forwarding pointer over the OLD object before recursing
    // into its own A slice, so a cycle back to this closure short-circuits
    // instead of copying it twice.
    from.write_word(addr, InfoTable::forwarding_bytes(new_addr));

    let mut full_payload = header.clone();
    full_payload.extend_from_slice(&rest);
    rt.write_to_space(new_addr, InfoTable::PartialApplication.to_header_bytes(), &full_payload);

    let a_slice_start = WORD;
    for i in 0..a_items {
        let off = a_slice_start + i * 4;
        let raw = u32::from_le_bytes(rest[off..off + 4].try_into().unwrap_or([0; 4]));
        let old = HeapAddr::from_raw(raw);
        let new = rt.evac_addr(from, old)?;
        rest[off..off + 4].copy_from_slice(&new.to_raw().to_le_bytes());
    }
    let a_region_offset = PA_HEADER_LEN + a_slice_start;
    rt.write_payload(
        ClosureRef::new(new_addr),
        a_region_offset,
        &rest[a_slice_start..a_slice_start + a_items * 4],
    );

    Ok(new_addr)
}
