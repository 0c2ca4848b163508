// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Crate-level smoke tests: the pieces re-exported at the crate root wire
//! together into a runnable trampoline.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::{drive, Action, ClosureRef, InfoTable, Runtime};

fn halt_with_int(rt: &mut Runtime) -> Action {
    Action::Halt(rt.registers.int as i32)
}

#[test]
fn version_is_not_the_unknown_sentinel() {
    assert_ne!(crate::VERSION, "unknown");
}

#[test]
fn drive_runs_the_entry_label_to_halt() {
    let mut rt = Runtime::new().unwrap();
    rt.registers.int = 42;
    let status = drive(&mut rt, halt_with_int).unwrap();
    assert_eq!(status, 42);
}

#[test]
fn a_freshly_constructed_runtime_has_an_empty_heap() {
    let rt = Runtime::new().unwrap();
    assert_eq!(rt.heap().used(), 0);
}

#[test]
fn the_null_sentinel_is_non_enterable_and_lives_in_the_static_arena() {
    let rt = Runtime::new().unwrap();
    assert!(rt.null_sentinel().is_static());
    assert!(!InfoTable::NullSentinel.is_enterable());
    let closure = ClosureRef::new(rt.null_sentinel());
    assert_eq!(closure.addr(), rt.null_sentinel());
}
