// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

use super::*;
use crate::crdt::position::Entry;

fn insert_op(replica: u64, counter: u64, digit: u32, ch: char) -> Op {
    Op::Insert {
        id: OpId { replica, counter },
        pos: Position::from_entries(vec![Entry { digit, replica }]),
        ch,
    }
}

#[test]
fn round_trip_inserts_and_deletes() {
    let update = Update {
        ops: vec![
            insert_op(1, 1, 16, 'h'),
            insert_op(1, 2, 32, 'é'),
            Op::Delete {
                id: OpId { replica: 2, counter: 1 },
                target: OpId { replica: 1, counter: 1 },
            },
        ],
    };
    let bytes = update.encode();
    let back = Update::decode(&bytes).unwrap();
    assert_eq!(back, update);
}

#[test]
fn empty_payload_is_rejected() {
    assert_eq!(Update::decode(&[]), Err(UpdateError::Empty));
}

#[test]
fn bad_magic_is_rejected() {
    assert_eq!(Update::decode(&[0x00, 0x01, 0x00]), Err(UpdateError::BadMagic(0x00)));
}

#[test]
fn bad_version_is_rejected() {
    assert_eq!(Update::decode(&[0xDC, 0x09, 0x00]), Err(UpdateError::Version(0x09)));
}

#[test]
fn truncated_payload_is_rejected() {
    let bytes = Update { ops: vec![insert_op(1, 1, 16, 'x')] }.encode();
    for cut in 3..bytes.len() {
        let err = Update::decode(&bytes[..cut]).unwrap_err();
        assert!(
            matches!(err, UpdateError::Truncated | UpdateError::TooLarge),
            "cut at {cut}: {err:?}"
        );
    }
}

#[test]
fn unknown_tag_is_rejected() {
    let mut bytes = vec![0xDC, 0x01];
    write_varint(&mut bytes, 1);
    bytes.push(0x7F);
    assert_eq!(Update::decode(&bytes), Err(UpdateError::UnknownTag(0x7F)));
}

#[test]
fn absurd_op_count_is_corruption_not_allocation() {
    let mut bytes = vec![0xDC, 0x01];
    write_varint(&mut bytes, u64::MAX);
    assert_eq!(Update::decode(&bytes), Err(UpdateError::Truncated));
}

#[test]
fn invalid_char_scalar_is_rejected() {
    // Surrogate range scalar 0xD800 is not a char
    let mut bytes = vec![0xDC, 0x01];
    write_varint(&mut bytes, 1);
    bytes.push(0x00); // insert
    write_varint(&mut bytes, 1); // replica
    write_varint(&mut bytes, 1); // counter
    write_varint(&mut bytes, 0); // empty path (structurally fine)
    write_varint(&mut bytes, 0xD800);
    assert_eq!(Update::decode(&bytes), Err(UpdateError::BadChar(0xD800)));
}

#[test]
fn zero_op_update_decodes_as_empty() {
    let bytes = Update::default().encode();
    let update = Update::decode(&bytes).unwrap();
    assert!(update.is_empty());
}

#[test]
fn varint_round_trips_across_magnitudes() {
    for value in [0u64, 1, 127, 128, 300, u32::MAX as u64, u64::MAX] {
        let mut bytes = Vec::new();
        write_varint(&mut bytes, value);
        let mut reader = Reader { bytes: &bytes, at: 0 };
        assert_eq!(reader.varint().unwrap(), value);
    }
}
