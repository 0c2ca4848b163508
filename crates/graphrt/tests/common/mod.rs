// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Shared harness for the end-to-end scenario tests: small helpers for
//! boxing integers as closures and driving the update-frame protocol the
//! way a compiler backend would, without hand-coding the same bookkeeping
//! in every test.

#![allow(dead_code, reason = "helpers used selectively by different test files")]

use graphrt::closure::{ClosureRef, InfoTable};
use graphrt::heap::HeapAddr;
use graphrt::update_frame::{enter_thunk_prologue, return_constructor, update_constructor};
use graphrt::{Action, CodeLabel, Fault, Runtime, StackBSlot};

/// Box a plain integer as a closure so it can travel on stack A as if it
/// were an argument closure. Lives in the static arena since it is never
/// entered or evacuated, only read back.
pub fn make_int_arg(rt: &mut Runtime, n: i64) -> ClosureRef {
    rt.alloc_static(InfoTable::Static, &n.to_le_bytes())
        .expect("static arena has room")
}

/// Read back an integer boxed by [`make_int_arg`].
pub fn read_int_arg(rt: &Runtime, closure: ClosureRef) -> i64 {
    let heap = if closure.addr().is_static() { rt.statics() } else { rt.heap() };
    let bytes = heap.read(closure.payload_addr(), 8);
    i64::from_le_bytes(bytes.try_into().unwrap_or([0; 8]))
}

/// Force `thunk`, simulating that its entry code ran and produced a
/// constructor `(tag, arg_count)`, then let `update_constructor` restore
/// the caller's frame. Returns the continuation the caller should step to
/// next and the closure the caller must now install an indirection on
/// (`ConstrUpdateRegister`'s value right after the update frame fires).
///
/// # Panics
///
/// Panics (via `expect`) if any stack operation overflows; the harness's
/// stacks are sized generously enough that this never happens in the
/// scenarios below.
pub fn force_thunk_to_constructor(
    rt: &mut Runtime,
    thunk: HeapAddr,
    return_to: CodeLabel,
    tag: i64,
    arg_count: i64,
) -> (CodeLabel, HeapAddr) {
    rt.sb.push(StackBSlot::from_label(return_to)).expect("stack B has room");
    enter_thunk_prologue(rt, thunk).expect("stack has room for the update frame");

    let action = return_constructor(rt, tag, arg_count).expect("frame was just established");
    let Action::Step(label) = action else {
        panic!("return_constructor always steps to a continuation, never halts");
    };
    assert_eq!(label as usize, update_constructor as usize);

    let next = match update_constructor(rt) {
        Action::Step(label) => label,
        Action::Halt(_) => panic!("update_constructor always steps back to the caller"),
    };
    (next, rt.registers.constr_update)
}

/// Run `entry` to completion, mapping a propagated [`Fault`] to a panic so
/// test bodies can read linearly.
pub fn drive_to_halt(rt: &mut Runtime, entry: CodeLabel) -> i32 {
    graphrt::drive(rt, entry).unwrap_or_else(|fault: Fault| panic!("unexpected runtime fault: {fault}"))
}
