// SPDX-FileCopyrightText: 2024 Danny McClanahan <dmcC2@hypnicjerk.ai>
// SPDX-FileCopyrightText: 2024 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2024 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Pure `transform`/`apply`/`inverse`, following the literal transformation
//! table of the specification rather than the `operational-transform`
//! crate's generic algorithm.
//!
//! These functions assume a single, central serialization point (see
//! [`crate::document`]): `transform(a, b)` adjusts `a` to apply *after* `b`,
//! where `b` is already committed to the document's history. Both replicas
//! converge because every replica eventually transforms an op against the
//! same committed prefix, in the same `(sequence_number, author_id)` order.

use crate::op::{Op, OpKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("position {position} with length {length} exceeds content length {content_len}")]
pub struct BadPosition {
    pub position: usize,
    pub length: usize,
    pub content_len: usize,
}

/// Adjusts `a` so it can be applied immediately after `b`, where both were
/// issued concurrently against the same base content.
#[must_use]
pub fn transform(a: &Op, b: &Op) -> Op {
    let mut out = a.clone();

    match (&b.kind, &a.kind) {
        // anything/retain: identity.
        (OpKind::Retain(_), _) | (_, OpKind::Retain(_)) => out,

        // anything/format: position identity. Attribute merge only makes
        // sense when both sides are format ops.
        (OpKind::Format(b_attrs), OpKind::Format(a_attrs)) => {
            let mut merged = a_attrs.clone();
            if b.order_key() > a.order_key() {
                for (key, value) in b_attrs {
                    merged.insert(key.clone(), value.clone());
                }
            }
            out.kind = OpKind::Format(merged);
            out
        }
        (OpKind::Format(_), _) | (_, OpKind::Format(_)) => out,

        (OpKind::Insert(b_text), OpKind::Insert(_)) => {
            let b_len = b_text.chars().count();
            let a_before_b =
                a.position < b.position || (a.position == b.position && a.author < b.author);
            if !a_before_b {
                out.position = a.position + b_len;
            }
            out
        }

        (OpKind::Delete(b_len), OpKind::Insert(_)) => {
            if a.position <= b.position {
                // a unchanged
            } else if a.position >= b.position + b_len {
                out.position = a.position - b_len;
            } else {
                out.position = b.position;
            }
            out
        }

        (OpKind::Insert(b_text), OpKind::Delete(a_len)) => {
            let b_len = b_text.chars().count();
            if a.position >= b.position {
                out.position = a.position + b_len;
            } else if a.position + a_len <= b.position {
                // a unchanged
            } else {
                // the insert landed inside the deleted range: the deleted
                // range now also swallows the inserted text.
                out.kind = OpKind::Delete(a_len + b_len);
            }
            out
        }

        (OpKind::Delete(b_len), OpKind::Delete(a_len)) => {
            let a_start = a.position;
            let a_end = a_start + a_len;
            let b_start = b.position;
            let b_end = b_start + b_len;

            let overlap_start = a_start.max(b_start);
            let overlap_end = a_end.min(b_end);
            let overlap = overlap_end.saturating_sub(overlap_start);

            let b_before_a = b_end.min(a_start).saturating_sub(b_start);
            out.position = a_start - b_before_a;
            out.kind = OpKind::Delete(a_len.saturating_sub(overlap));
            out
        }
    }
}

/// Applies `op` to `content`, returning the new content.
pub fn apply(op: &Op, content: &str) -> Result<String, BadPosition> {
    let chars: Vec<char> = content.chars().collect();
    let len = chars.len();

    match &op.kind {
        OpKind::Insert(text) => {
            if op.position > len {
                return Err(BadPosition {
                    position: op.position,
                    length: 0,
                    content_len: len,
                });
            }
            let mut out: String = chars[..op.position].iter().collect();
            out.push_str(text);
            out.extend(chars[op.position..].iter());
            Ok(out)
        }
        OpKind::Delete(delete_len) => {
            if op.position + delete_len > len {
                return Err(BadPosition {
                    position: op.position,
                    length: *delete_len,
                    content_len: len,
                });
            }
            let mut out: String = chars[..op.position].iter().collect();
            out.extend(chars[op.position + delete_len..].iter());
            Ok(out)
        }
        OpKind::Retain(retain_len) => {
            if op.position + retain_len > len {
                return Err(BadPosition {
                    position: op.position,
                    length: *retain_len,
                    content_len: len,
                });
            }
            Ok(content.to_string())
        }
        OpKind::Format(_) => Ok(content.to_string()),
    }
}

/// Produces an op that, applied to `apply(op, content_before)`, restores
/// `content_before`. Delete's inverse captures the exact deleted substring.
#[must_use]
pub fn inverse(op: &Op, content_before: &str) -> Op {
    let mut out = op.clone();
    match &op.kind {
        OpKind::Insert(text) => {
            out.kind = OpKind::Delete(text.chars().count());
        }
        OpKind::Delete(delete_len) => {
            let chars: Vec<char> = content_before.chars().collect();
            let removed: String = chars[op.position..op.position + delete_len]
                .iter()
                .collect();
            out.kind = OpKind::Insert(removed);
        }
        OpKind::Retain(_) | OpKind::Format(_) => {}
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::AuthorId;
    use crate::document::DocumentId;
    use crate::op::OpId;
    use pretty_assertions::assert_eq;

    fn ins(id: u64, author: u64, seq: u64, pos: usize, text: &str) -> Op {
        Op::insert(OpId(id), DocumentId(1), AuthorId(author), seq, pos, text)
    }
    fn del(id: u64, author: u64, seq: u64, pos: usize, len: usize) -> Op {
        Op::delete(OpId(id), DocumentId(1), AuthorId(author), seq, pos, len)
    }

    #[test]
    fn scenario_a_concurrent_insert() {
        let alice = ins(1, 1, 1, 2, "X");
        let bob = ins(2, 2, 1, 4, "Y");

        let content = "ABCDE";
        let after_alice = apply(&alice, content).unwrap();
        assert_eq!(after_alice, "ABXCDE");

        let bob_t = transform(&bob, &alice);
        let after_bob = apply(&bob_t, &after_alice).unwrap();
        assert_eq!(after_bob, "ABXCDYE");
    }

    #[test]
    fn scenario_b_insert_inside_delete() {
        let alice = del(1, 1, 1, 0, 6);
        let bob = ins(2, 2, 1, 3, "XYZ");

        let content = "HELLO WORLD";
        let after_alice = apply(&alice, content).unwrap();
        assert_eq!(after_alice, "WORLD");

        let bob_t = transform(&bob, &alice);
        assert_eq!(bob_t.position, 0);

        let after_bob = apply(&bob_t, &after_alice).unwrap();
        assert_eq!(after_bob, "XYZWORLD");
    }

    #[test]
    fn scenario_c_overlapping_deletes() {
        let alice = del(1, 1, 1, 2, 4);
        let bob = del(2, 2, 1, 4, 3);

        let content = "123456789";
        let after_alice = apply(&alice, content).unwrap();
        assert_eq!(after_alice, "12789");

        let bob_t = transform(&bob, &alice);
        assert_eq!(bob_t.position, 2);
        assert_eq!(bob_t.kind, OpKind::Delete(1));

        let after_bob = apply(&bob_t, &after_alice).unwrap();
        assert_eq!(after_bob, "1289");
    }

    #[test]
    fn scenario_d_inverse_round_trip() {
        let op = ins(1, 1, 1, 5, "foo");
        let content = "ABCDEGHIJ";
        let after = apply(&op, content).unwrap();
        assert_eq!(after, "ABCDEfooGHIJ");

        let inv = inverse(&op, content);
        let restored = apply(&inv, &after).unwrap();
        assert_eq!(restored, content);
    }

    #[test]
    fn delete_covering_insertion_point_grows_to_swallow_it() {
        let a = del(1, 1, 1, 0, 4);
        let b = ins(2, 2, 1, 2, "Z");
        let t = transform(&a, &b);
        assert_eq!(t.kind, OpKind::Delete(5));
        assert_eq!(t.position, 0);
    }

    #[test]
    fn apply_rejects_out_of_bounds() {
        let op = del(1, 1, 1, 3, 10);
        assert!(apply(&op, "short").is_err());
    }

    #[test]
    fn format_position_identity_with_later_seq_wins() {
        use std::collections::BTreeMap;
        let mut a_attrs = BTreeMap::new();
        a_attrs.insert("bold".to_string(), "true".to_string());
        let mut a = ins(1, 1, 1, 0, "");
        a.kind = OpKind::Format(a_attrs);
        a.sequence = 1;

        let mut b_attrs = BTreeMap::new();
        b_attrs.insert("bold".to_string(), "false".to_string());
        let mut b = ins(2, 2, 2, 0, "");
        b.kind = OpKind::Format(b_attrs);
        b.sequence = 2;

        let t = transform(&a, &b);
        match t.kind {
            OpKind::Format(attrs) => assert_eq!(attrs.get("bold").unwrap(), "false"),
            _ => panic!("expected format"),
        }
    }
}
