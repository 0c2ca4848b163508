// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for the closure/info-table object model.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{decode_label, encode_label, ClosureRef, InfoTable, WORD};
use crate::driver::Action;
use crate::heap::HeapAddr;
use crate::runtime::Runtime;

fn dummy_entry(rt: &mut Runtime) -> Action {
    Action::Halt(rt.registers.int as i32)
}

fn dummy_evac(_rt: &mut Runtime, _from: &mut crate::heap::Heap, at: HeapAddr) -> HeapAddr {
    at
}

#[test]
fn static_shapes_are_identity_evac_and_non_enterable_where_required() {
    assert!(InfoTable::Static.is_identity_evac());
    assert!(InfoTable::StringLiteral.is_identity_evac());
    assert!(InfoTable::NullSentinel.is_identity_evac());
    assert!(!InfoTable::StringDynamic.is_identity_evac());
    assert!(!InfoTable::PartialApplication.is_identity_evac());

    assert!(!InfoTable::NullSentinel.is_enterable());
    assert!(!InfoTable::Static.is_enterable());
    assert!(InfoTable::StringLiteral.is_enterable());
    assert!(InfoTable::StringDynamic.is_enterable());
}

#[test]
fn header_round_trips_for_simple_shapes() {
    let rt = Runtime::new().unwrap();
    for table in [
        InfoTable::Static,
        InfoTable::StringDynamic,
        InfoTable::StringLiteral,
        InfoTable::PartialApplication,
        InfoTable::NullSentinel,
    ] {
        let bytes = table.to_header_bytes();
        assert_eq!(InfoTable::from_header_bytes(bytes, &rt).unwrap(), table);
    }
}

#[test]
fn custom_table_round_trips_through_the_registry() {
    let mut rt = Runtime::new().unwrap();
    let id = rt.register_custom_table(dummy_entry, dummy_evac);
    let table = InfoTable::Custom {
        entry: dummy_entry,
        evac: dummy_evac,
        id,
    };
    let bytes = table.to_header_bytes();
    let recovered = InfoTable::from_header_bytes(bytes, &rt).unwrap();
    assert_eq!(recovered, table);
}

#[test]
fn unknown_custom_table_id_is_an_error() {
    let rt = Runtime::new().unwrap();
    let bytes = InfoTable::Custom {
        entry: dummy_entry,
        evac: dummy_evac,
        id: 7,
    }
    .to_header_bytes();
    assert!(InfoTable::from_header_bytes(bytes, &rt).is_err());
}

#[test]
fn forwarding_bytes_round_trip_the_target_address() {
    let target = HeapAddr::heap(512);
    let bytes = InfoTable::forwarding_bytes(target);
    assert_eq!(InfoTable::forwarding_target(bytes), target);
}

#[test]
fn closure_ref_payload_addr_is_one_word_past_the_header() {
    let closure = ClosureRef::new(HeapAddr::heap(80));
    assert_eq!(closure.payload_addr(), HeapAddr::heap(80 + WORD as u32));
    assert_eq!(closure.addr(), HeapAddr::heap(80));
}

#[test]
fn encode_decode_label_round_trips() {
    let bits = encode_label(dummy_entry);
    let recovered = unsafe { decode_label(bits) };
    assert_eq!(recovered as usize, dummy_entry as usize);
}
