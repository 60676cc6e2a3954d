// SPDX-FileCopyrightText: 2024 Danny McClanahan <dmcC2@hypnicjerk.ai>
// SPDX-FileCopyrightText: 2024 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2024 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Author identity and vector clocks.
//!
//! Grounded on the per-author sequence bookkeeping in `ot.rs`'s `OTServer`
//! (`editor_revision`/`daemon_revision`), generalized from "one editor" to
//! an arbitrary set of authors tracked by a `BTreeMap`.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[display("author:{}", self.0)]
pub struct AuthorId(pub u64);

/// Per-author counter map. Counts are monotonically non-decreasing per
/// author; `0` means "nothing from this author has been observed yet".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorClock(BTreeMap<AuthorId, u64>);

impl VectorClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, author: AuthorId) -> u64 {
        self.0.get(&author).copied().unwrap_or(0)
    }

    /// Advances `author`'s counter by one and returns the new value.
    pub fn inc(&mut self, author: AuthorId) -> u64 {
        let entry = self.0.entry(author).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Records an observed count for `author`, never moving it backwards.
    pub fn observe(&mut self, author: AuthorId, count: u64) {
        let entry = self.0.entry(author).or_insert(0);
        if count > *entry {
            *entry = count;
        }
    }

    /// Elementwise max of two clocks.
    #[must_use]
    pub fn merge(a: &Self, b: &Self) -> Self {
        let mut out = a.clone();
        for (&author, &count) in &b.0 {
            out.observe(author, count);
        }
        out
    }

    /// `true` iff every component of `self` is `>=` the corresponding
    /// component of `other`, and at least one is strictly greater.
    #[must_use]
    pub fn dominates(&self, other: &Self) -> bool {
        let mut strictly_greater = false;
        let authors = self.0.keys().chain(other.0.keys());
        for &author in authors {
            let a = self.get(author);
            let b = other.get(author);
            if a < b {
                return false;
            }
            if a > b {
                strictly_greater = true;
            }
        }
        strictly_greater
    }

    /// `true` iff every component named in `other` has already been reached
    /// by `self` (i.e. `self` has seen everything `other` depends on).
    #[must_use]
    pub fn satisfies(&self, other: &Self) -> bool {
        other.0.iter().all(|(&author, &count)| self.get(author) >= count)
    }

    /// Authors with a tracked component in this clock.
    #[must_use]
    pub fn authors(&self) -> Vec<AuthorId> {
        self.0.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn inc_advances_monotonically() {
        let mut c = VectorClock::new();
        let a = AuthorId(1);
        assert_eq!(c.inc(a), 1);
        assert_eq!(c.inc(a), 2);
        assert_eq!(c.get(a), 2);
    }

    #[test]
    fn merge_is_elementwise_max() {
        let mut a = VectorClock::new();
        a.observe(AuthorId(1), 3);
        a.observe(AuthorId(2), 1);
        let mut b = VectorClock::new();
        b.observe(AuthorId(1), 2);
        b.observe(AuthorId(2), 5);

        let merged = VectorClock::merge(&a, &b);
        assert_eq!(merged.get(AuthorId(1)), 3);
        assert_eq!(merged.get(AuthorId(2)), 5);
    }

    #[test]
    fn dominates_requires_strict_improvement_somewhere() {
        let mut a = VectorClock::new();
        a.observe(AuthorId(1), 2);
        let mut b = VectorClock::new();
        b.observe(AuthorId(1), 2);
        assert!(!a.dominates(&b));

        a.observe(AuthorId(1), 3);
        assert!(a.dominates(&b));
        assert!(!b.dominates(&a));
    }

    #[test]
    fn satisfies_checks_causal_readiness() {
        let mut have = VectorClock::new();
        have.observe(AuthorId(1), 5);
        let mut needed = VectorClock::new();
        needed.observe(AuthorId(1), 5);
        needed.observe(AuthorId(2), 1);

        assert!(!have.satisfies(&needed));
        have.observe(AuthorId(2), 1);
        assert!(have.satisfies(&needed));
    }
}
