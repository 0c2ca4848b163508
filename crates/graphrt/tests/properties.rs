// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Property tests over randomised operation sequences, covering the
//! invariants a fixed example test can only sample a handful of points of:
//!
//! - P1: a heap never reports more bytes used than it has capacity for.
//! - P5: `top >= base` holds for both execution stacks after every push,
//!   pop, and rebase.
//! - P6: an update-frame chain's saved `SB.base` values strictly decrease
//!   outward and bottom out at the stack's own base.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use graphrt::stack::{save_a, save_b, Stack, StackBSlot};
use graphrt::update_frame::{enter_thunk_prologue, SAVED_SB_BASE_OFFSET};
use graphrt::{heap::HeapAddr, strings, Action, Fault, Runtime};
use proptest::prelude::*;

fn halt_ok(_rt: &mut Runtime) -> Action {
    Action::Halt(0)
}

proptest! {
    /// P1: after any sequence of dynamic string allocations (each of which
    /// may trigger a reserve-driven collection and growth), the heap's
    /// reported usage never exceeds its reported capacity.
    #[test]
    fn p1_heap_usage_never_exceeds_capacity(lengths in prop::collection::vec(0usize..64, 0..40)) {
        let mut rt = Runtime::with_capacities(128, 32, 512).unwrap();
        for len in lengths {
            let text = "x".repeat(len);
            strings::alloc_dynamic(&mut rt, &text).unwrap();
            prop_assert!(rt.heap().used() <= rt.heap().capacity());
        }
    }

    /// P5: after any sequence of pushes, pops, and rebases, a stack's
    /// invariant `top >= base` holds. `base` only ever moves to a value
    /// already reached by `top` (mirroring `save_B`/`save_A`), and `pop`
    /// refuses to go below `base`, so the invariant should never break no
    /// matter the interleaving.
    #[test]
    fn p5_stack_top_never_falls_below_base(
        ops in prop::collection::vec(prop_oneof![
            Just(0u8), // push
            Just(1u8), // pop
            Just(2u8), // rebase at current top
        ], 0..100)
    ) {
        let mut stack: Stack<HeapAddr> = Stack::new(16, Fault::ArgumentStackOverflow);
        for op in ops {
            match op {
                0 => {
                    let _ = stack.push(HeapAddr::heap(0));
                }
                1 => {
                    let _ = stack.pop();
                }
                _ => {
                    stack.base = stack.top;
                }
            }
            prop_assert!(stack.top >= stack.base);
        }
    }

    /// P6: nesting `n` update frames (via repeated `enter_thunk_prologue`)
    /// produces a chain of `saved_SB_base` values that strictly decreases
    /// from the innermost frame outward and terminates at zero: stack B's
    /// own base, after the same number of `update_constructor`-style pops
    /// unwinds it back down.
    #[test]
    fn p6_update_frame_chain_strictly_decreases_to_the_stack_base(depth in 1usize..8) {
        let mut rt = Runtime::new().unwrap();
        let thunk = rt.alloc(graphrt::closure::InfoTable::StringDynamic, &[0u8; 8]).unwrap().addr();

        let mut frame_bases = Vec::new();
        for _ in 0..depth {
            rt.sb.push(StackBSlot::from_label(halt_ok)).unwrap();
            enter_thunk_prologue(&mut rt, thunk).unwrap();
            frame_bases.push(rt.sb.base);
        }

        // Every frame's own base must be strictly greater than the saved
        // base it recorded (the chain moves outward to lower addresses),
        // and the outermost frame's saved base is the stack's own base: 0.
        let mut previous_saved = None;
        for &base in frame_bases.iter().rev() {
            let saved = rt.sb.read_at(base + SAVED_SB_BASE_OFFSET).as_saved_base();
            prop_assert!(saved < base);
            if let Some(prev) = previous_saved {
                prop_assert!(saved <= prev, "chain must not increase moving outward");
            }
            previous_saved = Some(saved);
        }
        prop_assert_eq!(previous_saved, Some(0));
    }
}

/// A focused (non-random) companion to P6: two nested frames, `save_a` and
/// `save_b` independently rebasing each stack, restored in the right order.
#[test]
fn nested_save_a_and_save_b_restore_to_their_pre_nesting_bases() {
    let mut rt = Runtime::new().unwrap();
    let outer_sa_base = rt.sa.base;
    let outer_sb_base = rt.sb.base;

    save_b(&mut rt.sb).unwrap();
    save_a(&mut rt.sa, &mut rt.sb).unwrap();
    assert!(rt.sb.base > outer_sb_base);
    assert_eq!(rt.sa.base, rt.sa.top);

    let inner_sb_base = rt.sb.base;
    let saved_sb = rt.sb.read_at(inner_sb_base + SAVED_SB_BASE_OFFSET).as_saved_base();
    assert_eq!(saved_sb, outer_sb_base);
}
