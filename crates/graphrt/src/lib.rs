// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! # graphrt
//!
//! Execution runtime for a lazy, graph-reducing language compiled in the
//! style of the Spineless Tagless G-machine.
//!
//! This crate provides:
//! - A bump-allocated heap with Cheney-style semi-space copying collection
//! - The closure/info-table object model and its evacuation dispatch
//! - Two execution stacks (arguments, secondary/continuations) and the
//!   register file compiled code communicates through
//! - The update-frame protocol: thunk update on constructor return, and
//!   suspension into a partial-application closure on under-application
//! - String closures, literal or dynamic, and `string_concat`
//! - An explicit trampoline driver dispatching between compiled code labels
//!
//! Compiled code is the crate's only collaborator: `graphrt` owns no parser,
//! no compiler, and no notion of user-defined constructor layouts beyond the
//! handful of shapes it must itself inspect to collect and to drive the
//! update-frame protocol.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[cfg(any(test, feature = "std"))]
extern crate std;

#[cfg(not(any(test, feature = "std")))]
extern crate alloc;

pub mod closure;
pub mod driver;
pub mod error;
pub mod heap;
pub mod registers;
pub mod stack;
pub mod strings;
pub mod update_frame;

mod runtime;

pub use closure::{ClosureRef, CustomTableId, EvacFn, InfoTable};
pub use driver::{drive, Action, CodeLabel};
pub use error::Fault;
pub use heap::{Heap, HeapAddr};
pub use registers::Registers;
pub use runtime::Runtime;
pub use stack::{save_a, save_b, StackA, StackB, StackBSlot};
pub use update_frame::{
    enter_thunk_prologue, install_indirection, partial_app_entry, return_constructor,
    under_apply, update_constructor,
};

/// Crate version, surfaced the way a compiled program might report the
/// runtime it was linked against.
pub const VERSION: &str = match option_env!("CARGO_PKG_VERSION") {
    Some(v) => v,
    None => "unknown",
};

#[cfg(test)]
mod lib_test;
