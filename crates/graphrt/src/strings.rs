// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! String closures and `string_concat`.
//!
//! A string closure is `[info table][nul-terminated utf-8 bytes][pad]`.
//! `InfoTable::StringLiteral` closures live in the static arena (compiled
//! in, never moved); `InfoTable::StringDynamic` closures live in the
//! collected heap and are produced by concatenation.

#[cfg(test)]
mod strings_test;

#[cfg(any(test, feature = "std"))]
use std::vec::Vec;

#[cfg(not(any(test, feature = "std")))]
use alloc::vec::Vec;

use crate::closure::{ClosureRef, InfoTable, MIN_CLOSURE_SIZE, WORD};
use crate::error::Fault;
use crate::heap::{Heap, HeapAddr};
use crate::runtime::Runtime;

/// Allocate a compiled-in string literal in the static arena.
///
/// # Errors
///
/// Returns [`Fault::HeapExhausted`] if the static arena has no room left.
pub fn alloc_literal(rt: &mut Runtime, text: &str) -> Result<ClosureRef, Fault> {
    let mut payload = Vec::with_capacity(text.len() + 1);
    payload.extend_from_slice(text.as_bytes());
    payload.push(0);
    rt.alloc_static(InfoTable::StringLiteral, &payload)
}

/// Allocate a dynamic string closure in the collected heap.
///
/// # Errors
///
/// Returns [`Fault::HeapExhausted`] if the string does not fit even after
/// a collection.
pub fn alloc_dynamic(rt: &mut Runtime, text: &str) -> Result<ClosureRef, Fault> {
    let mut payload = Vec::with_capacity(text.len() + 1);
    payload.extend_from_slice(text.as_bytes());
    payload.push(0);
    rt.alloc(InfoTable::StringDynamic, &payload)
}

/// Read a string closure's contents as `&str`, regardless of whether it
/// lives in the static arena (a literal) or the collected heap (dynamic).
#[must_use]
pub fn read(rt: &Runtime, closure: ClosureRef) -> &str {
    let heap = if closure.addr().is_static() {
        rt.statics()
    } else {
        rt.heap()
    };
    let bytes = heap.read_cstr(closure.payload_addr());
    core::str::from_utf8(bytes).unwrap_or("")
}

/// `string_concat(s1, s2)`: allocate a new dynamic string holding the
/// concatenation of two existing string closures.
///
/// Follows the protect-before-safepoint idiom: `s1` and `s2` are pushed
/// onto stack A before the allocation (which can trigger a collection),
/// and their possibly-updated addresses are read back afterwards, before
/// their contents are copied out.
///
/// # Errors
///
/// Propagates a stack fault from [`Runtime::protect`] or a
/// [`Fault::HeapExhausted`] from the allocation.
pub fn string_concat(rt: &mut Runtime, s1: ClosureRef, s2: ClosureRef) -> Result<ClosureRef, Fault> {
    let mut combined: Option<ClosureRef> = None;
    let [a1, a2] = rt.protect([s1.addr(), s2.addr()], |rt| {
        let left = read(rt, ClosureRef::new(s1.addr())).as_bytes().to_vec();
        let right = read(rt, ClosureRef::new(s2.addr())).as_bytes().to_vec();
        let mut payload = Vec::with_capacity(left.len() + right.len() + 1);
        payload.extend_from_slice(&left);
        payload.extend_from_slice(&right);
        payload.push(0);
        combined = Some(rt.alloc(InfoTable::StringDynamic, &payload)?);
        Ok(())
    })?;
    let _ = (a1, a2);
    combined.ok_or(Fault::HeapExhausted { requested: 0 })
}

/// Evacuate a dynamic string closure during collection: copy its bytes
/// into the to-space and install a forwarding pointer over the original.
///
/// # Errors
///
/// Returns [`Fault::HeapExhausted`] if the to-space has no room for the
/// copy, only possible if the growth policy under-sized the collection.
pub(crate) fn evac_string(rt: &mut Runtime, from: &mut Heap, addr: HeapAddr) -> Result<HeapAddr, Fault> {
    let payload_addr = addr.add(WORD as u32);
    let mut bytes = from.read_cstr(payload_addr).to_vec();
    bytes.push(0);
    let total = (WORD + bytes.len()).max(MIN_CLOSURE_SIZE);
    let new_addr = rt.bump_to_space(total)?;
    rt.write_to_space(new_addr, InfoTable::StringDynamic.to_header_bytes(), &bytes);
    from.write_word(addr, InfoTable::forwarding_bytes(new_addr));
    Ok(new_addr)
}
