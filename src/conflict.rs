// Copyright 2024, The Tari Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! Decides which of two conflicting proofs (proofs that share at least one staked outpoint)
//! should hold the Bound slot.
//!
//! The rule is a strict weak order over proofs, evaluated as a four-level tiebreak chain:
//! same master key favors the higher sequence number (a legitimate re-issuance by the same key
//! always wins); otherwise the higher score wins; otherwise fewer stakes wins (a proof that
//! commits the same weight with fewer UTXOs is cheaper to keep live); otherwise the lower proof id
//! wins, which exists only to make the order total and deterministic across nodes.

use std::cmp::Ordering;

use crate::proof::Proof;

/// Arbitrates between two conflicting proofs.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConflictArbiter;

impl ConflictArbiter {
    pub fn new() -> Self {
        Self
    }

    /// Returns `true` if `candidate` should replace `incumbent` as the Bound proof.
    ///
    /// This is a strict order: `prefer(a, b)` and `prefer(b, a)` are never both true unless `a`
    /// and `b` are the same proof.
    pub fn prefer(&self, candidate: &Proof, incumbent: &Proof) -> bool {
        Self::compare(candidate, incumbent) == Ordering::Less
    }

    /// Total order over proofs used by the tiebreak chain: `Less` means the left proof is
    /// preferred (should win). Exposed directly so [`crate::pool`] can sort a batch of
    /// conflicting candidates rather than calling `prefer` pairwise.
    pub fn compare(a: &Proof, b: &Proof) -> Ordering {
        if a.id() == b.id() {
            return Ordering::Equal;
        }
        if a.master_pub_key() == b.master_pub_key() {
            // Higher sequence wins: reverse the natural ordering on sequence.
            if let ord @ (Ordering::Less | Ordering::Greater) = b.sequence().cmp(&a.sequence()) {
                return ord;
            }
        }
        // Higher score wins.
        if let ord @ (Ordering::Less | Ordering::Greater) = b.score().cmp(&a.score()) {
            return ord;
        }
        // Fewer stakes wins.
        if let ord @ (Ordering::Less | Ordering::Greater) = a.stakes().len().cmp(&b.stakes().len()) {
            return ord;
        }
        // Lower proof id wins: the final, purely deterministic tiebreak.
        a.id().cmp(&b.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proof::{ProofBuilder, Stake};
    use crate::types::{MasterPubKey, OutPoint, ProofId};

    fn stake(byte: u8, amount: u64) -> Stake {
        Stake {
            outpoint: OutPoint { txid: [byte; 32], vout: 0 },
            amount,
            height: 100,
            is_coinbase: false,
        }
    }

    fn proof(id: u8, sequence: i64, key: u8, amount: u64) -> Proof {
        ProofBuilder::new(ProofId([id; 32]), sequence, 0, MasterPubKey([key; 33]))
            .add_stake(stake(id, amount))
            .build(1000)
            .unwrap()
    }

    #[test]
    fn same_master_key_prefers_higher_sequence() {
        let a = proof(1, 5, 9, 10_000);
        let b = proof(2, 3, 9, 10_000);
        let arbiter = ConflictArbiter::new();
        assert!(arbiter.prefer(&a, &b));
        assert!(!arbiter.prefer(&b, &a));
    }

    #[test]
    fn different_master_key_prefers_higher_score() {
        let a = proof(1, 1, 9, 50_000);
        let b = proof(2, 1, 8, 10_000);
        let arbiter = ConflictArbiter::new();
        assert!(arbiter.prefer(&a, &b));
    }

    #[test]
    fn equal_score_prefers_fewer_stakes() {
        let a = ProofBuilder::new(ProofId([1; 32]), 1, 0, MasterPubKey([9; 33]))
            .add_stake(stake(1, 10_000))
            .build(10_000)
            .unwrap();
        let b = ProofBuilder::new(ProofId([2; 32]), 1, 0, MasterPubKey([8; 33]))
            .add_stake(stake(2, 5_000))
            .add_stake(stake(3, 5_000))
            .build(10_000)
            .unwrap();
        // Both score 1 (10_000 / 10_000), `a` has one stake, `b` has two.
        assert_eq!(a.score(), b.score());
        let arbiter = ConflictArbiter::new();
        assert!(arbiter.prefer(&a, &b));
    }

    #[test]
    fn final_tiebreak_is_lower_proof_id() {
        let a = ProofBuilder::new(ProofId([1; 32]), 1, 0, MasterPubKey([9; 33]))
            .add_stake(stake(1, 10_000))
            .build(10_000)
            .unwrap();
        let b = ProofBuilder::new(ProofId([2; 32]), 1, 0, MasterPubKey([8; 33]))
            .add_stake(stake(2, 10_000))
            .build(10_000)
            .unwrap();
        let arbiter = ConflictArbiter::new();
        assert!(arbiter.prefer(&a, &b));
        assert!(!arbiter.prefer(&b, &a));
    }

    #[test]
    fn order_is_strict_weak_and_total() {
        let proofs = vec![
            proof(1, 1, 9, 10_000),
            proof(2, 2, 9, 10_000),
            proof(3, 1, 8, 40_000),
            proof(4, 1, 7, 10_000),
        ];
        for a in &proofs {
            for b in &proofs {
                for c in &proofs {
                    let ab = ConflictArbiter::compare(a, b);
                    let ba = ConflictArbiter::compare(b, a);
                    assert_eq!(ab, ba.reverse(), "antisymmetry: {:?} vs {:?}", a.id(), b.id());
                    if ab == Ordering::Less && ConflictArbiter::compare(b, c) == Ordering::Less {
                        assert_eq!(
                            ConflictArbiter::compare(a, c),
                            Ordering::Less,
                            "transitivity: {:?} < {:?} < {:?}",
                            a.id(),
                            b.id(),
                            c.id()
                        );
                    }
                }
            }
        }
    }
}
