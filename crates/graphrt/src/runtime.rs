// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! `Runtime`: the single owned context every code label operates on.
//!
//! One struct, passed around by `&mut` reference, replaces the process-wide
//! globals a trampoline interpreter like this would otherwise need
//! (`g_Heap`, `g_SA`, `g_SB`, the register file): `setup()`/`cleanup()`
//! become `Runtime::new` and (implicitly) `Drop`, since every field here is
//! an owned `Vec`-backed value that frees itself.

#[cfg(test)]
mod runtime_test;

#[cfg(any(test, feature = "std"))]
use std::vec::Vec;

#[cfg(not(any(test, feature = "std")))]
use alloc::vec::Vec;

use crate::closure::{ClosureRef, CustomTableId, EvacFn, InfoTable, MIN_CLOSURE_SIZE, WORD};
use crate::driver::{Action, CodeLabel};
use crate::error::Fault;
use crate::heap::{Heap, HeapAddr};
use crate::registers::Registers;
use crate::stack::{StackA, StackB, StackBSlot};
use crate::update_frame::CLOSURE_TO_UPDATE_OFFSET;

/// Default capacity of the collected heap: `1 << 16` bytes, matching the
/// original runtime's `BASE_HEAP_SIZE`.
pub const DEFAULT_HEAP_CAPACITY: usize = 1 << 16;

/// Default capacity of each execution stack: `1 << 10` slots, matching the
/// original's `STACK_SIZE`.
pub const DEFAULT_STACK_CAPACITY: usize = 1 << 10;

/// Default capacity of the static arena (the null sentinel plus whatever
/// string literals a program needs).
pub const DEFAULT_STATIC_CAPACITY: usize = 4096;

/// The runtime context: heap, stacks, registers, and the bookkeeping the
/// collector needs. Every code label that wants to allocate, push, or
/// touch a register takes `&mut Runtime`.
pub struct Runtime {
    heap: Heap,
    statics: Heap,
    /// Stack A (argument pointers).
    pub sa: StackA,
    /// Stack B (secondary/continuations).
    pub sb: StackB,
    /// The register file.
    pub registers: Registers,
    custom_tables: Vec<(CodeLabel, EvacFn)>,
    /// Base index (into `sb`) of every update frame currently open, from
    /// outermost to innermost. The collector uses this to find the
    /// `closure_to_update` slot of every live frame without needing to
    /// guess which of stack B's heterogeneous slots are pointers (stack B
    /// itself is tagged only by position, never dynamically, so the
    /// collector cannot scan it generically).
    frame_bases: Vec<usize>,
    null_sentinel: HeapAddr,
    fault: Option<Fault>,
}

impl Runtime {
    /// Heap growth factor applied on every collection that does not
    /// already satisfy the outstanding allocation. Kept as a tunable
    /// constant rather than a configuration option this crate's scope
    /// doesn't need yet.
    pub const GROWTH_FACTOR: usize = 3;

    /// Construct a runtime with every default capacity.
    ///
    /// # Errors
    ///
    /// Propagates a [`Fault`] if the static arena is too small to hold the
    /// null sentinel (impossible with the default capacity, but surfaced
    /// honestly for callers using [`Self::with_capacities`]).
    pub fn new() -> Result<Self, Fault> {
        Self::with_capacities(
            DEFAULT_HEAP_CAPACITY,
            DEFAULT_STACK_CAPACITY,
            DEFAULT_STATIC_CAPACITY,
        )
    }

    /// Construct a runtime with explicit capacities for the collected
    /// heap, each execution stack, and the static arena.
    ///
    /// # Errors
    ///
    /// Returns a [`Fault`] if `static_capacity` cannot even hold the null
    /// sentinel closure.
    pub fn with_capacities(
        heap_capacity: usize,
        stack_capacity: usize,
        static_capacity: usize,
    ) -> Result<Self, Fault> {
        let mut statics = Heap::new(static_capacity);
        let null_sentinel = statics.bump(MIN_CLOSURE_SIZE)?;
        let static_sentinel = HeapAddr::static_(null_sentinel.offset());
        statics.write_word(null_sentinel, InfoTable::NullSentinel.to_header_bytes());

        Ok(Self {
            heap: Heap::new(heap_capacity),
            statics,
            sa: StackA::new(stack_capacity, Fault::ArgumentStackOverflow),
            sb: StackB::new(stack_capacity, Fault::SecondaryStackOverflow),
            registers: Registers::new(static_sentinel),
            custom_tables: Vec::new(),
            frame_bases: Vec::new(),
            null_sentinel: static_sentinel,
            fault: None,
        })
    }

    /// The address of the distinguished null-sentinel closure every
    /// pointer register starts out pointing at.
    #[must_use]
    pub const fn null_sentinel(&self) -> HeapAddr {
        self.null_sentinel
    }

    /// Read-only access to the collected heap, for diagnostics and tests.
    #[must_use]
    pub const fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Read-only access to the static arena, for diagnostics and tests.
    #[must_use]
    pub const fn statics(&self) -> &Heap {
        &self.statics
    }

    fn arena_for(&self, addr: HeapAddr) -> &Heap {
        if addr.is_static() {
            &self.statics
        } else {
            &self.heap
        }
    }

    /// Read and decode the info table stored in the header of the closure
    /// at `addr`, resolving `Custom` ids against this runtime's registry.
    /// The Rust equivalent of the ABI's `read_info_table` operation.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::UnknownInfoTable`] if the header names a `Custom`
    /// id that was never registered with [`Self::register_custom_table`].
    pub fn info_table_at(&self, addr: HeapAddr) -> Result<InfoTable, Fault> {
        let header = self.arena_for(addr).read_word(addr);
        InfoTable::from_header_bytes(header, self)
    }

    /// If the closure at `addr` has been overwritten with a forwarding
    /// indirection (either by the collector mid-evacuation, or by the
    /// update-frame protocol updating a thunk), return the address it now
    /// forwards to. Returns `None` for any other shape.
    #[must_use]
    pub fn forwarding_target(&self, addr: HeapAddr) -> Option<HeapAddr> {
        let header = self.arena_for(addr).read_word(addr);
        match InfoTable::from_header_bytes(header, self) {
            Ok(InfoTable::Forwarding) => Some(InfoTable::forwarding_target(header)),
            _ => None,
        }
    }

    /// Record `fault` as the reason the current code label is aborting and
    /// hand back an `Action` that unwinds the driver loop. Every internal
    /// operation that returns `Result<_, Fault>` is meant to be handled by
    /// a code label with `let x = match rt.op() { Ok(v) => v, Err(f) =>
    /// return rt.abort(f) };` (`CodeLabel` itself cannot return `Result`,
    /// since its signature is fixed by the calling convention in
    /// `driver::CodeLabel`).
    pub fn abort(&mut self, fault: Fault) -> Action {
        self.fault = Some(fault);
        Action::Halt(1)
    }

    /// Consume the fault recorded by [`Self::abort`], if any. Called by
    /// [`crate::driver::drive`] after every step.
    pub fn take_fault(&mut self) -> Option<Fault> {
        self.fault.take()
    }

    /// Register a compiler-emitted shape's entry/evac pair, returning the
    /// id to embed in an `InfoTable::Custom` header.
    pub fn register_custom_table(&mut self, entry: CodeLabel, evac: EvacFn) -> CustomTableId {
        self.custom_tables.push((entry, evac));
        (self.custom_tables.len() - 1) as u32
    }

    pub(crate) fn custom_table(&self, id: u32) -> Option<(CodeLabel, EvacFn)> {
        self.custom_tables.get(id as usize).copied()
    }

    /// Allocate a closure that must never move: `InfoTable::Static`,
    /// `::StringLiteral`, or `::NullSentinel`. Lives in the static arena,
    /// outside the collected heap, which is exactly what makes identity
    /// evacuation correct for these shapes.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::HeapExhausted`] if the static arena (sized once at
    /// construction) has no room left.
    pub fn alloc_static(&mut self, info: InfoTable, payload: &[u8]) -> Result<ClosureRef, Fault> {
        debug_assert!(info.is_identity_evac(), "non-static shape in static arena");
        let size = (WORD + payload.len()).max(MIN_CLOSURE_SIZE);
        let addr = self.statics.bump(size)?;
        let static_addr = HeapAddr::static_(addr.offset());
        self.statics.write_word(addr, info.to_header_bytes());
        self.statics.write(addr.add(WORD as u32), payload);
        Ok(ClosureRef::new(static_addr))
    }

    /// Allocate a closure in the collected heap, triggering a collection
    /// first if it would not otherwise fit.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::HeapExhausted`] if the closure does not fit even
    /// after growing the heap by [`Self::GROWTH_FACTOR`].
    pub fn alloc(&mut self, info: InfoTable, payload: &[u8]) -> Result<ClosureRef, Fault> {
        debug_assert!(!info.is_identity_evac(), "static shape allocated in collected heap");
        let size = (WORD + payload.len()).max(MIN_CLOSURE_SIZE);
        self.reserve(size)?;
        let addr = self.heap.bump(size)?;
        self.heap.write_word(addr, info.to_header_bytes());
        self.heap.write(addr.add(WORD as u32), payload);
        Ok(ClosureRef::new(addr))
    }

    /// Ensure `amount` bytes are available in the collected heap,
    /// triggering a collection if not. Every allocation path, and every
    /// explicit GC safepoint, goes through this.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::HeapExhausted`] if `amount` still does not fit
    /// after a collection grows the heap.
    pub fn reserve(&mut self, amount: usize) -> Result<(), Fault> {
        if self.heap.fits(amount) {
            return Ok(());
        }
        self.collect(amount)?;
        if !self.heap.fits(amount) {
            return Err(Fault::HeapExhausted { requested: amount });
        }
        Ok(())
    }

    /// Run `f` with `locals` pushed onto stack A first, and hand back
    /// their (possibly moved-by-GC) addresses afterwards.
    ///
    /// This is the protect-before-safepoint idiom: any local that must
    /// survive a call that can allocate (and
    /// so can trigger a collection) has to be reachable from a root before
    /// that call, because the collector only knows about the stacks, the
    /// registers, and open update frames, not a compiled code fragment's
    /// local variables.
    ///
    /// # Errors
    ///
    /// Propagates a stack overflow from pushing `locals`, an underflow if
    /// `f` left stack A shorter than it found it, or whatever `f` itself
    /// returns.
    pub fn protect<const N: usize>(
        &mut self,
        locals: [HeapAddr; N],
        f: impl FnOnce(&mut Self) -> Result<(), Fault>,
    ) -> Result<[HeapAddr; N], Fault> {
        for local in locals {
            self.sa.push(local)?;
        }
        f(self)?;
        let mut out = [HeapAddr::heap(0); N];
        for slot in out.iter_mut().rev() {
            *slot = self.sa.pop()?;
        }
        Ok(out)
    }

    /// Mark the start of a new update frame at stack B's current base, so
    /// the collector can find its `closure_to_update` slot. Called by
    /// [`crate::update_frame::enter_thunk_prologue`].
    pub(crate) fn push_frame(&mut self) {
        self.frame_bases.push(self.sb.base);
    }

    /// Retire the innermost open update frame, called by
    /// [`crate::update_frame::update_constructor`] once it has consumed
    /// the frame's slots.
    pub(crate) fn pop_frame(&mut self) {
        self.frame_bases.pop();
    }

    /// Copying collection: allocate a fresh to-space sized by
    /// `max(GROWTH_FACTOR × old.capacity, live_bytes + at_least)` (spec
    /// §4.1 step 1; `from.used()` before evacuation is a sound upper bound
    /// on `live_bytes`, since evacuation only ever shrinks what a root
    /// occupies), evacuate every root into it, then shrink the result back
    /// down if the grown capacity turned out to be far more than what's
    /// live.
    ///
    /// # Errors
    ///
    /// Returns a [`Fault`] if evacuation itself runs out of room in the
    /// freshly grown to-space (the heap is left in a valid, if smaller
    /// than requested, state either way).
    fn collect(&mut self, at_least: usize) -> Result<(), Fault> {
        let old_capacity = self.heap.capacity();
        let live_upper_bound = self.heap.used();
        let new_capacity = old_capacity
            .saturating_mul(Self::GROWTH_FACTOR)
            .max(live_upper_bound.saturating_add(at_least))
            .max(MIN_CLOSURE_SIZE);
        let mut from = core::mem::replace(&mut self.heap, Heap::new(new_capacity));

        let node = self.evac_addr(&mut from, self.registers.node)?;
        self.registers.node = node;
        let string = self.evac_addr(&mut from, self.registers.string)?;
        self.registers.string = string;
        let constr_update = self.evac_addr(&mut from, self.registers.constr_update)?;
        self.registers.constr_update = constr_update;

        for i in 0..self.sa.len() {
            let addr = self.sa.read_at(i);
            let new_addr = self.evac_addr(&mut from, addr)?;
            self.sa.write_at(i, new_addr);
        }

        let frame_bases = self.frame_bases.clone();
        for base in frame_bases {
            let slot_index = base + CLOSURE_TO_UPDATE_OFFSET;
            let addr = self.sb.read_at(slot_index).as_heap_addr();
            let new_addr = self.evac_addr(&mut from, addr)?;
            self.sb.write_at(slot_index, StackBSlot::from_heap_addr(new_addr));
        }

        let live_bytes = self.heap.used();
        let shrink_to = live_bytes
            .saturating_mul(Self::GROWTH_FACTOR)
            .max(at_least)
            .max(MIN_CLOSURE_SIZE);
        if shrink_to < self.heap.capacity() {
            let grown = core::mem::replace(&mut self.heap, Heap::new(0));
            self.heap = grown.shrink_to(shrink_to);
        }
        Ok(())
    }

    /// Evacuate the closure at `addr` (read from `from`, the from-space of
    /// an in-progress collection) into `self.heap` (the to-space), and
    /// return its new address. The null sentinel and every closure living
    /// in the static arena evacuate as the identity, since they are never
    /// copied in the first place.
    pub(crate) fn evac_addr(&mut self, from: &mut Heap, addr: HeapAddr) -> Result<HeapAddr, Fault> {
        if addr.is_static() {
            return Ok(addr);
        }
        let header = from.read_word(addr);
        let info = InfoTable::from_header_bytes(header, self)?;
        match info {
            InfoTable::Forwarding => Ok(InfoTable::forwarding_target(header)),
            InfoTable::Static | InfoTable::StringLiteral | InfoTable::NullSentinel => Ok(addr),
            InfoTable::StringDynamic => crate::strings::evac_string(self, from, addr),
            InfoTable::PartialApplication => crate::update_frame::evac_partial_application(self, from, addr),
            InfoTable::Custom { evac, .. } => Ok(evac(self, from, addr)),
        }
    }

    /// Raw bump allocation directly into the to-space heap during an
    /// in-progress collection. Only [`crate::strings::evac_string`] and
    /// [`crate::update_frame::evac_partial_application`] call this: going
    /// through [`Self::alloc`]/[`Self::reserve`] here would recursively
    /// trigger another collection mid-collection.
    pub(crate) fn bump_to_space(&mut self, amount: usize) -> Result<HeapAddr, Fault> {
        self.heap.bump(amount)
    }

    /// Write a closure header and payload directly into the to-space heap
    /// at an address already reserved via [`Self::bump_to_space`].
    pub(crate) fn write_to_space(&mut self, addr: HeapAddr, header: [u8; WORD], payload: &[u8]) {
        self.heap.write_word(addr, header);
        self.heap.write(addr.add(WORD as u32), payload);
    }

    /// Overwrite the header word of a live (not mid-collection) closure.
    /// Used to install an indirection by the update and partial-application
    /// protocols.
    pub(crate) fn write_heap_word(&mut self, addr: HeapAddr, word: [u8; WORD]) {
        self.heap.write_word(addr, word);
    }

    /// Write `bytes` at `offset` within a live closure's payload.
    pub(crate) fn write_payload(&mut self, closure: ClosureRef, offset: usize, bytes: &[u8]) {
        self.heap.write(closure.payload_addr().add(offset as u32), bytes);
    }

    /// Read `len` bytes at `offset` within a live closure's payload.
    pub(crate) fn read_payload(&self, closure: ClosureRef, offset: usize, len: usize) -> &[u8] {
        self.heap.read(closure.payload_addr().add(offset as u32), len)
    }
}
