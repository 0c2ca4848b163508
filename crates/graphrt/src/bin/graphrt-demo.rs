// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! A thin demonstration program that links against `graphrt` the way a
//! compiled STG program would: `setup`, run a hand-written sequence of
//! code labels exercising strings, the update-frame protocol, and partial
//! application, `cleanup`.
//!
//! This binary is not part of the runtime's core; it exists so the
//! external interface in the crate's design has a runnable example. A real
//! compiler backend would emit labels like these instead of hand-writing
//! them.

use graphrt::closure::{ClosureRef, InfoTable};
use graphrt::heap::HeapAddr;
use graphrt::update_frame::{enter_thunk_prologue, install_indirection, partial_app_entry, return_constructor, under_apply};
use graphrt::{drive, strings, Action, CodeLabel, Fault, Runtime, StackBSlot};

fn make_int_arg(rt: &mut Runtime, n: i64) -> ClosureRef {
    rt.alloc_static(InfoTable::Static, &n.to_le_bytes())
        .expect("static arena has room for demo arguments")
}

fn read_int_arg(rt: &Runtime, closure: ClosureRef) -> i64 {
    let heap = if closure.addr().is_static() { rt.statics() } else { rt.heap() };
    let bytes = heap.read(closure.payload_addr(), 8);
    i64::from_le_bytes(bytes.try_into().unwrap_or([0; 8]))
}

/// The underlying 3-ary function a partial application eventually lands
/// on: sums its three integer-boxed arguments into `IntRegister`, prints
/// the result, and halts the program.
fn sum3(rt: &mut Runtime) -> Action {
    let frame: Vec<HeapAddr> = rt.sa.frame().to_vec();
    assert_eq!(frame.len(), 3, "sum3 must be entered with exactly three arguments");
    let total: i64 = frame.iter().map(|addr| read_int_arg(rt, ClosureRef::new(*addr))).sum();
    rt.registers.int = total;
    println!("sum3 applied via partial application = {total}");
    Action::Halt(i32::try_from(total).unwrap_or(1))
}

/// Step 1: force a thunk, let it return a constructor, and let
/// `update_constructor` (reached automatically once `return_constructor`
/// pops the frame's topmost label) hand back the closure to update.
fn step_update_demo(rt: &mut Runtime) -> Action {
    let thunk = match rt.alloc(InfoTable::StringDynamic, &[0u8; 8]) {
        Ok(c) => c,
        Err(fault) => return rt.abort(fault),
    };
    if let Err(fault) = rt.sb.push(StackBSlot::from_label(step_after_update)) {
        return rt.abort(fault);
    }
    if let Err(fault) = enter_thunk_prologue(rt, thunk.addr()) {
        return rt.abort(fault);
    }

    // A real thunk's entry code would run here and eventually call
    // `return_constructor` once it finishes reducing. We simulate the
    // "thunk finished, returned constructor tag 7 with no fields" case
    // directly; `update_constructor` recovers the thunk's own address
    // from the update frame, not from a register.
    match return_constructor(rt, 7, 0) {
        Ok(action) => action,
        Err(fault) => rt.abort(fault),
    }
}

/// Step 2: the return continuation `step_update_demo` registered. By the
/// time this runs, `update_constructor` has set `ConstrUpdateRegister` to
/// the thunk and restored the caller's stack bases; compiled code now
/// installs the indirection to the freshly built result closure.
fn step_after_update(rt: &mut Runtime) -> Action {
    let thunk = rt.registers.constr_update;
    let result = match rt.alloc(InfoTable::StringDynamic, &rt.registers.tag.to_le_bytes()) {
        Ok(c) => c,
        Err(fault) => return rt.abort(fault),
    };
    install_indirection(rt, thunk, result.addr());
    println!("thunk at {thunk:?} updated with constructor tag {}", rt.registers.tag);
    Action::Step(step_partial_app_setup)
}

/// Step 3: under-apply `sum3` with a single argument, suspending the rest
/// into a partial-application closure.
fn step_partial_app_setup(rt: &mut Runtime) -> Action {
    let thunk = match rt.alloc(InfoTable::StringDynamic, &[0u8; 8]) {
        Ok(c) => c,
        Err(fault) => return rt.abort(fault),
    };
    if let Err(fault) = rt.sb.push(StackBSlot::from_label(step_after_partial_app)) {
        return rt.abort(fault);
    }
    if let Err(fault) = enter_thunk_prologue(rt, thunk.addr()) {
        return rt.abort(fault);
    }

    let first_arg = make_int_arg(rt, 1);
    if let Err(fault) = rt.sa.push(first_arg.addr()) {
        return rt.abort(fault);
    }

    match under_apply(rt, sum3 as CodeLabel, thunk.addr()) {
        Ok(action) => action,
        Err(fault) => rt.abort(fault),
    }
}

/// Step 4: the under-applied call has bubbled back up to us. Supply the
/// remaining two arguments and re-enter the partial application, which
/// restores the saved first argument beneath them and jumps back into
/// `sum3` with all three in place.
fn step_after_partial_app(rt: &mut Runtime) -> Action {
    let partial_app = rt.registers.node;
    println!("partial application built at {partial_app:?}; supplying the remaining arguments");

    let second = make_int_arg(rt, 2);
    let third = make_int_arg(rt, 3);
    rt.sa.base = rt.sa.top;
    if let Err(fault) = rt.sa.push(second.addr()) {
        return rt.abort(fault);
    }
    if let Err(fault) = rt.sa.push(third.addr()) {
        return rt.abort(fault);
    }
    partial_app_entry(rt)
}

fn run() -> Result<i32, Fault> {
    let mut rt = Runtime::new()?;

    let foo = strings::alloc_literal(&mut rt, "foo")?;
    let bar = strings::alloc_literal(&mut rt, "bar")?;
    let joined = strings::string_concat(&mut rt, foo, bar)?;
    println!("string_concat(\"foo\", \"bar\") = {:?}", strings::read(&rt, joined));

    drive(&mut rt, step_update_demo)
}

fn main() {
    match run() {
        Ok(status) => std::process::exit(status),
        Err(fault) => std::process::exit(graphrt::error::panic_exit_code(fault)),
    }
}
