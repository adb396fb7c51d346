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

//! A multi-key index over a pool of proofs: lookup by id (primary), ordering by
//! `(sequence desc, id)`, ordering by score (desc), and conflict detection by outpoint.
//!
//! This backs both the Bound and Conflicting pools in [`crate::pool`]. Each pool owns its own
//! `ProofIndex` instance; cross-pool outpoint uniqueness (invariant I2: an outpoint may appear in
//! at most one Bound *and* at most one Conflicting proof) is enforced one level up, by
//! [`crate::pool::PoolManager`], which consults both indices before inserting.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use thiserror::Error;

use crate::proof::Proof;
use crate::types::{OutPoint, ProofId, Score};

/// Ordering key used by the score-descending index: higher score first, proof id as a
/// deterministic tiebreak. The sort key embeds a `Reverse`-like descending field plus a stable
/// secondary key so the `BTreeSet` orders correctly without a custom `Ord` impl on `Proof` itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct ByScoreDesc {
    score_desc: Score,
    id: ProofId,
}

impl ByScoreDesc {
    fn new(score: Score, id: ProofId) -> Self {
        Self {
            score_desc: Score::MAX - score,
            id,
        }
    }
}

/// Ordering key used by the sequence-descending index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct BySequenceDesc {
    sequence_desc: i64,
    id: ProofId,
}

impl BySequenceDesc {
    fn new(sequence: i64, id: ProofId) -> Self {
        Self {
            // Negating would overflow at i64::MIN; invert through a full traversal of the
            // ordered domain instead.
            sequence_desc: i64::MAX - (sequence - i64::MIN),
            id,
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProofIndexError {
    #[error("a proof with this id is already indexed")]
    DuplicateId,
    #[error("an outpoint of this proof is already referenced by another indexed proof")]
    ConflictingOutpoint,
}

/// Multi-key index over a single pool's proofs.
#[derive(Debug, Default)]
pub struct ProofIndex {
    by_id: HashMap<ProofId, Arc<Proof>>,
    by_score: BTreeSet<ByScoreDesc>,
    by_sequence: BTreeSet<BySequenceDesc>,
    by_outpoint: HashMap<OutPoint, ProofId>,
}

impl ProofIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn contains(&self, id: ProofId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn get(&self, id: ProofId) -> Option<&Arc<Proof>> {
        self.by_id.get(&id)
    }

    /// Outpoint-to-proof-id lookup, used for conflict detection.
    pub fn find_by_outpoint(&self, outpoint: &OutPoint) -> Option<ProofId> {
        self.by_outpoint.get(outpoint).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Proof>> {
        self.by_id.values()
    }

    /// The lowest-score indexed proof, if any. Used by eviction policy.
    pub fn min_score(&self) -> Option<(Score, ProofId)> {
        self.by_score.iter().next_back().map(|k| (Score::MAX - k.score_desc, k.id))
    }

    /// Proofs in descending score order.
    pub fn iter_by_score_desc(&self) -> impl Iterator<Item = ProofId> + '_ {
        self.by_score.iter().map(|k| k.id)
    }

    /// Inserts `proof`, atomically across all four indices. Fails, leaving the index unchanged,
    /// if the id is already present or any outpoint collides with an already-indexed proof.
    pub fn insert(&mut self, proof: Arc<Proof>) -> Result<(), ProofIndexError> {
        if self.by_id.contains_key(&proof.id()) {
            return Err(ProofIndexError::DuplicateId);
        }
        for outpoint in proof.outpoints() {
            if self.by_outpoint.contains_key(&outpoint) {
                return Err(ProofIndexError::ConflictingOutpoint);
            }
        }

        for outpoint in proof.outpoints() {
            self.by_outpoint.insert(outpoint, proof.id());
        }
        self.by_score.insert(ByScoreDesc::new(proof.score(), proof.id()));
        self.by_sequence.insert(BySequenceDesc::new(proof.sequence(), proof.id()));
        self.by_id.insert(proof.id(), proof);
        Ok(())
    }

    /// Removes a proof by id, atomically across all four indices. Returns the removed proof, if
    /// present.
    pub fn remove(&mut self, id: ProofId) -> Option<Arc<Proof>> {
        let proof = self.by_id.remove(&id)?;
        for outpoint in proof.outpoints() {
            self.by_outpoint.remove(&outpoint);
        }
        self.by_score.remove(&ByScoreDesc::new(proof.score(), proof.id()));
        self.by_sequence
            .remove(&BySequenceDesc::new(proof.sequence(), proof.id()));
        Some(proof)
    }
}
