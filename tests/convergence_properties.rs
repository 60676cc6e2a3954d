// SPDX-FileCopyrightText: 2024 Danny McClanahan <dmcC2@hypnicjerk.ai>
// SPDX-FileCopyrightText: 2024 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2024 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Randomized property tests for the two convergence invariants of §8:
//! TP1 for the OT path, and permutation-independent materialization for
//! the CRDT path. Grounded on `daemon/integration-tests/`'s style of
//! exercising the crate from the outside as a black box, generalized from
//! "drive a real editor" to "drive the library's own public types with
//! `rand`-generated op streams".

use collabcore::clock::AuthorId;
use collabcore::crdt::CrdtEngine;
use collabcore::document::DocumentId;
use collabcore::op::{Op, OpId};
use collabcore::ot::{apply, transform};
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_op(rng: &mut StdRng, id: u64, author: u64, seq: u64, content_len: usize) -> Op {
    let document = DocumentId(1);
    let author = AuthorId(author);
    let pos = if content_len == 0 { 0 } else { rng.gen_range(0..=content_len) };

    match rng.gen_range(0..2) {
        0 => {
            let text: String = (0..rng.gen_range(1..=3))
                .map(|_| char::from(rng.gen_range(b'a'..=b'z')))
                .collect();
            Op::insert(OpId(id), document, author, seq, pos, text)
        }
        _ => {
            let available = content_len.saturating_sub(pos);
            let len = if available == 0 { 1 } else { rng.gen_range(1..=available) };
            Op::delete(OpId(id), document, author, seq, pos, len)
        }
    }
}

/// Property 1: for every pair of concurrent ops (a, b) and initial content
/// s, `apply(apply(s,a), transform(b,a)) == apply(apply(s,b), transform(a,b))`.
#[test]
fn ot_convergence_over_random_op_streams() {
    let mut rng = StdRng::seed_from_u64(42);

    for trial in 0..500u64 {
        let base = "the quick brown fox jumps".to_string();
        let len = base.chars().count();

        let a = random_op(&mut rng, trial * 2, 1, 1, len);
        let b = random_op(&mut rng, trial * 2 + 1, 2, 1, len);

        // Only exercise pairs that are actually valid against the shared
        // base (both sides must fit within it).
        let Ok(after_a) = apply(&a, &base) else { continue };
        let Ok(after_b) = apply(&b, &base) else { continue };

        let b_transformed = transform(&b, &a);
        let a_transformed = transform(&a, &b);

        let Ok(left) = apply(&b_transformed, &after_a) else { continue };
        let Ok(right) = apply(&a_transformed, &after_b) else { continue };

        assert_eq!(left, right, "TP1 violated for trial {trial}: a={a:?} b={b:?}");
    }
}

/// Property 2: for every permutation of a finite op set that each replica
/// eventually applies, `materialize()` returns the identical string.
#[test]
fn crdt_convergence_is_independent_of_apply_order() {
    let mut origin = CrdtEngine::new();
    let begin = collabcore::position::LogicalPosition::begin();

    let mut ops = Vec::new();
    let mut cursor = begin.clone();
    for (i, ch) in "hello world".chars().enumerate() {
        let author = AuthorId((i % 3) as u64 + 1);
        let op = origin.insert_between(&cursor, ch.to_string(), author, i as u64);
        if let collabcore::crdt::CrdtOpKind::Insert(node) = &op.kind {
            cursor = node.position.clone();
        }
        ops.push(op);
    }

    let canonical = origin.materialize();

    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..20 {
        let mut shuffled = ops.clone();
        // Fisher-Yates, since each op only causally depends on the
        // previous one from the *same* author and every op here is
        // authored by a different rotating author with a fresh insert
        // point, so any order exercises the buffering/fixed-point logic.
        for i in (1..shuffled.len()).rev() {
            let j = rng.gen_range(0..=i);
            shuffled.swap(i, j);
        }

        let mut replica = CrdtEngine::new();
        for op in shuffled {
            replica.apply_remote(op);
        }
        assert_eq!(replica.materialize(), canonical);
    }
}
