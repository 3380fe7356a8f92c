// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

use super::*;
use crate::crdt::position::Entry;

#[test]
fn local_inserts_build_text() {
    let mut doc = Doc::new(1);
    doc.insert(0, "hello");
    doc.insert(5, " world");
    doc.insert(0, ">> ");
    assert_eq!(doc.text(), ">> hello world");
    assert_eq!(doc.len(), 14);
}

#[test]
fn local_delete_removes_visible_range() {
    let mut doc = Doc::new(1);
    doc.insert(0, "hello world");
    doc.delete(5, 6);
    assert_eq!(doc.text(), "hello");
    // Tombstones keep ids stable for later concurrent edits
    doc.insert(5, "!");
    assert_eq!(doc.text(), "hello!");
}

#[test]
fn updates_replicate_to_peers() {
    let mut a = Doc::new(1);
    let mut b = Doc::new(2);

    let u1 = a.insert(0, "hi");
    b.apply(&u1).unwrap();
    assert_eq!(b.text(), "hi");

    let u2 = b.insert(2, " there");
    a.apply(&u2).unwrap();
    assert_eq!(a.text(), "hi there");
    assert_eq!(a.text(), b.text());
}

#[test]
fn idempotent_application() {
    let mut a = Doc::new(1);
    let mut b = Doc::new(2);
    let update = a.insert(0, "abc");

    b.apply(&update).unwrap();
    let once = b.encode_full_state();
    b.apply(&update).unwrap();
    let twice = b.encode_full_state();

    assert_eq!(once, twice, "second application must be a byte-identical no-op");
}

#[test]
fn concurrent_inserts_converge_on_both_replicas() {
    let mut a = Doc::new(1);
    let mut b = Doc::new(2);
    let seed = a.insert(0, "ac");
    b.apply(&seed).unwrap();

    // Both insert between 'a' and 'c' without seeing each other
    let ua = a.insert(1, "X");
    let ub = b.insert(1, "Y");
    a.apply(&ub).unwrap();
    b.apply(&ua).unwrap();

    assert_eq!(a.text(), b.text());
    assert_eq!(a.text().len(), 4);
    assert!(a.text().contains('X') && a.text().contains('Y'));
}

#[test]
fn concurrent_delete_and_insert_converge() {
    let mut a = Doc::new(1);
    let mut b = Doc::new(2);
    let seed = a.insert(0, "abc");
    b.apply(&seed).unwrap();

    let del = a.delete(1, 1); // remove 'b'
    let ins = b.insert(2, "Z"); // insert after 'b'
    b.apply(&del).unwrap();
    a.apply(&ins).unwrap();

    assert_eq!(a.text(), b.text());
    assert_eq!(a.text(), "aZc");
}

#[test]
fn delete_arriving_before_insert_tombstones_in_advance() {
    let mut a = Doc::new(1);
    let mut b = Doc::new(2);
    let ins = a.insert(0, "x");
    b.apply(&ins).unwrap();
    let del = b.delete(0, 1);

    // A third replica sees b's delete before a's insert
    let mut c = Doc::new(3);
    c.apply(&del).unwrap();
    assert_eq!(c.text(), "");
    c.apply(&ins).unwrap();
    assert_eq!(c.text(), "", "insert of an already-deleted id lands as tombstone");
    assert_eq!(c.state_vector().get(1), 1);
    assert_eq!(c.state_vector().get(2), 1);
}

#[test]
fn counter_gaps_park_in_pending_until_closed() {
    let mut a = Doc::new(1);
    let mut b = Doc::new(2);
    let u1 = a.insert(0, "1");
    let u2 = a.insert(1, "2");
    let u3 = a.insert(2, "3");

    b.apply(&u3).unwrap();
    assert_eq!(b.text(), "", "op 3 waits for 1 and 2");
    b.apply(&u1).unwrap();
    assert_eq!(b.text(), "1");
    b.apply(&u2).unwrap();
    assert_eq!(b.text(), "123", "gap closed, pending drained");
}

#[test]
fn state_vector_tracks_contiguous_counters() {
    let mut a = Doc::new(1);
    a.insert(0, "ab");
    let sv = a.state_vector();
    assert_eq!(sv.get(1), 2);
    assert_eq!(sv.get(9), 0);
}

#[test]
fn delta_encoding_carries_only_whats_missing() {
    let mut a = Doc::new(1);
    let mut b = Doc::new(2);
    let u1 = a.insert(0, "base");
    b.apply(&u1).unwrap();
    let sv_b = b.state_vector();

    a.insert(4, "+new");
    let delta = a.encode_state_as_update(&sv_b);
    let decoded = Update::decode(&delta).unwrap();
    assert_eq!(decoded.ops.len(), 4, "only the four new inserts");

    b.apply_bytes(&delta).unwrap().unwrap();
    assert_eq!(b.text(), "base+new");
}

#[test]
fn state_vector_delta_law() {
    // For docs A ⊆ B: applying encode(B, sv_A) to A makes A's text equal B's.
    let mut a = Doc::new(1);
    let mut b = Doc::new(2);
    let u = a.insert(0, "shared");
    b.apply(&u).unwrap();
    b.insert(6, " extra");
    b.delete(0, 1);
    assert!(a.state_vector().is_subset_of(&b.state_vector()));

    let delta = b.encode_state_as_update(&a.state_vector());
    a.apply_bytes(&delta).unwrap().unwrap();
    assert_eq!(a.text(), b.text());
}

#[test]
fn full_state_round_trip_restores_text() {
    let mut doc = Doc::new(1);
    doc.insert(0, "fn main() {}\n");
    doc.delete(0, 3);
    let state = doc.encode_full_state();

    let restored = Doc::from_state(7, &state).unwrap();
    assert_eq!(restored.text(), doc.text());
    assert!(restored.integrity_ok());
}

#[test]
fn restored_doc_continues_local_counters_without_collision() {
    let mut doc = Doc::new(1);
    doc.insert(0, "abc");
    let state = doc.encode_full_state();

    // Same replica id resumes after its own ops
    let mut resumed = Doc::from_state(1, &state).unwrap();
    let update = resumed.insert(3, "d");
    assert_eq!(resumed.text(), "abcd");

    // The resumed ops merge cleanly back into the original
    doc.apply(&update).unwrap();
    assert_eq!(doc.text(), "abcd");
}

#[test]
fn with_text_seeds_content() {
    let doc = Doc::with_text(3, "seeded");
    assert_eq!(doc.text(), "seeded");
    assert_eq!(doc.state_vector().get(3), 6);
}

#[test]
fn zero_counter_op_is_rejected_without_mutation() {
    let mut doc = Doc::with_text(1, "ok");
    let before = doc.encode_full_state();
    let bad = Update {
        ops: vec![Op::Insert {
            id: OpId { replica: 2, counter: 0 },
            pos: Position::from_entries(vec![Entry { digit: 5, replica: 2 }]),
            ch: 'x',
        }],
    };
    assert!(matches!(doc.apply(&bad), Err(ApplyError::ZeroCounter(_))));
    assert_eq!(doc.encode_full_state(), before);
}

#[test]
fn empty_position_insert_is_rejected() {
    let mut doc = Doc::new(1);
    let bad = Update {
        ops: vec![Op::Insert {
            id: OpId { replica: 2, counter: 1 },
            pos: Position::from_entries(vec![]),
            ch: 'x',
        }],
    };
    assert!(matches!(doc.apply(&bad), Err(ApplyError::EmptyPosition(_))));
}

#[test]
fn position_conflict_is_rejected() {
    let mut doc = Doc::new(1);
    let update = doc.insert(0, "a");
    let Op::Insert { pos, .. } = &update.ops[0] else { panic!("expected insert") };
    let forged = Update {
        ops: vec![Op::Insert {
            id: OpId { replica: 9, counter: 1 },
            pos: pos.clone(),
            ch: 'z',
        }],
    };
    assert!(matches!(doc.apply(&forged), Err(ApplyError::PositionConflict(_))));
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    /// Random interleaved edits on two replicas with full exchange
    /// always converge.
    fn edit_script() -> impl Strategy<Value = Vec<(bool, usize, String)>> {
        proptest::collection::vec(
            (any::<bool>(), 0usize..20, "[a-z]{0,4}"),
            1..12,
        )
    }

    proptest! {
        #[test]
        fn two_replicas_converge(script in edit_script()) {
            let mut a = Doc::new(1);
            let mut b = Doc::new(2);
            let mut updates_a = Vec::new();
            let mut updates_b = Vec::new();

            for (on_a, offset, text) in script {
                if on_a {
                    let at = offset.min(a.len());
                    updates_a.push(a.insert(at, &text));
                } else {
                    let at = offset.min(b.len());
                    updates_b.push(b.insert(at, &text));
                }
            }
            for u in &updates_b {
                a.apply(u).unwrap();
            }
            for u in &updates_a {
                b.apply(u).unwrap();
            }

            prop_assert_eq!(a.text(), b.text());
        }

        #[test]
        fn encode_decode_preserves_text(script in edit_script()) {
            let mut doc = Doc::new(1);
            for (del, offset, text) in script {
                if del && doc.len() > 0 {
                    let at = offset.min(doc.len() - 1);
                    doc.delete(at, 1);
                } else {
                    let at = offset.min(doc.len());
                    doc.insert(at, &text);
                }
            }
            let restored = Doc::from_state(1, &doc.encode_full_state()).unwrap();
            prop_assert_eq!(restored.text(), doc.text());
        }
    }
}
