// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The trampoline loop dispatching between compiled code fragments.
//!
//! Compiled code fragments ("code labels") never call each other directly;
//! each one runs to completion and returns the label to run next. A driver
//! loop repeatedly invokes the current label until one reports `Halt`.
//! This trampoline is an explicit, typed loop rather than a recursive
//! tail-call chain through opaque pointers. `Action` makes "what happens
//! next" a value instead of a cast.

use crate::error::Fault;
use crate::runtime::Runtime;

/// A compiled code fragment: takes no arguments beyond the runtime context
/// (all real arguments travel on stack A/B and in the registers) and
/// returns what the driver should do next.
pub type CodeLabel = fn(&mut Runtime) -> Action;

/// What the driver does after a code label returns.
#[derive(Clone, Copy)]
pub enum Action {
    /// Stop the program, exiting with the given status.
    Halt(i32),
    /// Run `label` next.
    Step(CodeLabel),
}

/// Run `entry`, then whichever label each step returns, until `Halt`.
///
/// Returns the halt status on success. A [`Fault`] raised by any step
/// propagates out for the caller to report. `graphrt`'s external contract
/// is that a `Fault` reaching the edge of the runtime becomes a single
/// fatal diagnostic, which is [`crate::error::panic_exit_code`]'s job, not
/// this loop's.
///
/// # Errors
///
/// Returns the first `Fault` any code label or internal runtime operation
/// raises.
pub fn drive(rt: &mut Runtime, entry: CodeLabel) -> Result<i32, Fault> {
    let mut label = entry;
    loop {
        let action = label(rt);
        if let Some(fault) = rt.take_fault() {
            return Err(fault);
        }
        match action {
            Action::Halt(status) => return Ok(status),
            Action::Step(next) => label = next,
        }
    }
}
