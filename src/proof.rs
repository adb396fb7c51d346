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

//! Stake declarations (`Proof`) and the collaborator interfaces this crate consults but does not
//! implement: UTXO lookup, chain tip, and signature/structure verification.

use std::collections::HashSet;

use crate::types::{Amount, Height, MasterPubKey, OutPoint, ProofId, Score, WallClockSeconds};

/// One staked outpoint contributing to a [`Proof`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stake {
    pub outpoint: OutPoint,
    pub amount: Amount,
    pub height: Height,
    pub is_coinbase: bool,
}

/// A signed declaration that a set of UTXOs is staked to participate in pre-consensus.
///
/// Binary encoding and signature verification live outside this crate (see [`ProofVerifier`]);
/// a `Proof` here is already a parsed, structurally valid value - the one invariant this crate
/// leans on is that `stakes` has no duplicate outpoints, which [`ProofBuilder`] enforces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof {
    id: ProofId,
    sequence: i64,
    expiration_time: WallClockSeconds,
    master_pub_key: MasterPubKey,
    stakes: Vec<Stake>,
    score: Score,
}

impl Proof {
    pub fn id(&self) -> ProofId {
        self.id
    }

    pub fn sequence(&self) -> i64 {
        self.sequence
    }

    /// Seconds since the epoch after which this proof is no longer valid. Zero means never.
    pub fn expiration_time(&self) -> WallClockSeconds {
        self.expiration_time
    }

    pub fn master_pub_key(&self) -> MasterPubKey {
        self.master_pub_key
    }

    pub fn stakes(&self) -> &[Stake] {
        &self.stakes
    }

    /// Integer weight derived from the sum of staked amounts; determines this proof's slot width
    /// once Bound.
    pub fn score(&self) -> Score {
        self.score
    }

    pub fn is_expired(&self, tip_median_time_past: WallClockSeconds) -> bool {
        self.expiration_time != 0 && self.expiration_time <= tip_median_time_past
    }

    pub fn outpoints(&self) -> impl Iterator<Item = OutPoint> + '_ {
        self.stakes.iter().map(|s| s.outpoint)
    }

    /// Recomputes `score` against `dust_threshold`, overriding whatever threshold the builder
    /// used. The peer manager calls this on admission so `PeerManagerConfig::proof_dust_threshold`
    /// is the value that actually governs scoring, regardless of how the proof was constructed.
    pub fn with_recomputed_score(mut self, dust_threshold: Amount) -> Self {
        self.score = Self::compute_score(&self.stakes, dust_threshold);
        self
    }

    /// Sum of staked amounts meeting `dust_threshold`, saturated to `u32::MAX`.
    ///
    /// The spec leaves the amount-to-score function unspecified beyond "a fixed monotone
    /// function" (proof encoding is out of scope, see crate docs). A saturating sum is the
    /// simplest function that is monotone in amount and preserves the total order every pool
    /// and conflict-arbitration rule in this crate depends on.
    fn compute_score(stakes: &[Stake], dust_threshold: Amount) -> Score {
        let total: u64 = stakes
            .iter()
            .filter(|s| s.amount >= dust_threshold)
            .fold(0u64, |acc, s| acc.saturating_add(s.amount));
        u32::try_from(total / dust_threshold.max(1)).unwrap_or(u32::MAX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProofBuilderError {
    #[error("a proof must declare at least one stake")]
    NoStakes,
    #[error("duplicate outpoint in stake list")]
    DuplicateOutpoint,
}

/// Builds a [`Proof`] from its logical fields, rejecting the one structural invariant this crate
/// relies on (unique outpoints) at construction time instead of deep inside pool logic.
#[derive(Debug, Clone)]
pub struct ProofBuilder {
    id: ProofId,
    sequence: i64,
    expiration_time: WallClockSeconds,
    master_pub_key: MasterPubKey,
    stakes: Vec<Stake>,
}

impl ProofBuilder {
    pub fn new(id: ProofId, sequence: i64, expiration_time: WallClockSeconds, master_pub_key: MasterPubKey) -> Self {
        Self {
            id,
            sequence,
            expiration_time,
            master_pub_key,
            stakes: Vec::new(),
        }
    }

    pub fn add_stake(mut self, stake: Stake) -> Self {
        self.stakes.push(stake);
        self
    }

    pub fn build(self, dust_threshold: Amount) -> Result<Proof, ProofBuilderError> {
        if self.stakes.is_empty() {
            return Err(ProofBuilderError::NoStakes);
        }
        let mut seen = HashSet::with_capacity(self.stakes.len());
        for stake in &self.stakes {
            if !seen.insert(stake.outpoint) {
                return Err(ProofBuilderError::DuplicateOutpoint);
            }
        }
        let score = Proof::compute_score(&self.stakes, dust_threshold);
        Ok(Proof {
            id: self.id,
            sequence: self.sequence,
            expiration_time: self.expiration_time,
            master_pub_key: self.master_pub_key,
            stakes: self.stakes,
            score,
        })
    }
}

/// Outcome of validating a proof's stakes against the current UTXO view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StakeValidation {
    /// Every outpoint is present and confirmed to at least `stake_utxo_confirmations`.
    Mature,
    /// Every outpoint is present, but at least one is below the maturity depth.
    Immature,
    /// At least one outpoint could not be found.
    MissingUtxo,
}

/// Read-only view over the chain's unspent transaction output set.
///
/// Implementations are expected to be a bounded in-memory view or a pre-taken snapshot - per the
/// concurrency model (spec §5) the peer manager must never block on external I/O while holding
/// its writer lock.
pub trait UtxoView: Send + Sync {
    /// Current confirmed height of the outpoint, or `None` if it is unknown/spent.
    fn utxo_height(&self, outpoint: &OutPoint) -> Option<Height>;
}

/// Verifies a proof's structural integrity and signature. Kept as a collaborator trait because
/// proof binary encoding and signature verification are explicitly out of scope for this crate.
pub trait ProofVerifier: Send + Sync {
    fn verify(&self, proof: &Proof) -> bool;
}

/// Everything this crate needs from "the current chain tip" to run maturity/expiry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainTip {
    pub height: Height,
    pub median_time_past: WallClockSeconds,
}

impl ChainTip {
    /// True when `stake` has reached `confirmations` confirmations as of this tip.
    pub fn stake_is_mature(&self, stake_height: Height, confirmations: u32) -> bool {
        // A stake confirmed at `stake_height` has `self.height - stake_height + 1` confirmations.
        self.height
            .saturating_sub(stake_height)
            .saturating_add(1)
            >= confirmations
    }
}

/// Validates every stake of `proof` against `utxo_view` and `tip`, given the configured
/// confirmation depth.
pub fn validate_stakes(proof: &Proof, utxo_view: &dyn UtxoView, tip: ChainTip, confirmations: u32) -> StakeValidation {
    let mut immature = false;
    for stake in proof.stakes() {
        match utxo_view.utxo_height(&stake.outpoint) {
            None => return StakeValidation::MissingUtxo,
            Some(height) => {
                if !tip.stake_is_mature(height, confirmations) {
                    immature = true;
                }
            },
        }
    }
    if immature {
        StakeValidation::Immature
    } else {
        StakeValidation::Mature
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outpoint(byte: u8) -> OutPoint {
        OutPoint {
            txid: [byte; 32],
            vout: 0,
        }
    }

    fn master_key() -> MasterPubKey {
        MasterPubKey([7u8; 33])
    }

    #[test]
    fn rejects_empty_stakes() {
        let builder = ProofBuilder::new(ProofId([1; 32]), 1, 0, master_key());
        assert_eq!(builder.build(1000).unwrap_err(), ProofBuilderError::NoStakes);
    }

    #[test]
    fn rejects_duplicate_outpoints() {
        let stake = Stake {
            outpoint: outpoint(1),
            amount: 10_000,
            height: 100,
            is_coinbase: false,
        };
        let builder = ProofBuilder::new(ProofId([1; 32]), 1, 0, master_key())
            .add_stake(stake)
            .add_stake(stake);
        assert_eq!(builder.build(1000).unwrap_err(), ProofBuilderError::DuplicateOutpoint);
    }

    #[test]
    fn score_is_monotone_in_amount() {
        let small = ProofBuilder::new(ProofId([1; 32]), 1, 0, master_key())
            .add_stake(Stake {
                outpoint: outpoint(1),
                amount: 10_000,
                height: 100,
                is_coinbase: false,
            })
            .build(10_000)
            .unwrap();
        let large = ProofBuilder::new(ProofId([2; 32]), 1, 0, master_key())
            .add_stake(Stake {
                outpoint: outpoint(2),
                amount: 20_000,
                height: 100,
                is_coinbase: false,
            })
            .build(10_000)
            .unwrap();
        assert!(large.score() > small.score());
    }

    #[test]
    fn expiration_of_zero_never_expires() {
        let proof = ProofBuilder::new(ProofId([1; 32]), 1, 0, master_key())
            .add_stake(Stake {
                outpoint: outpoint(1),
                amount: 10_000,
                height: 100,
                is_coinbase: false,
            })
            .build(10_000)
            .unwrap();
        assert!(!proof.is_expired(u64::MAX));
    }

    struct FakeUtxos(std::collections::HashMap<OutPoint, Height>);
    impl UtxoView for FakeUtxos {
        fn utxo_height(&self, outpoint: &OutPoint) -> Option<Height> {
            self.0.get(outpoint).copied()
        }
    }

    #[test]
    fn stake_validation_detects_missing_and_immature() {
        let mut map = std::collections::HashMap::new();
        map.insert(outpoint(1), 100);
        let utxos = FakeUtxos(map);
        let tip = ChainTip {
            height: 100,
            median_time_past: 0,
        };

        let proof = ProofBuilder::new(ProofId([1; 32]), 1, 0, master_key())
            .add_stake(Stake {
                outpoint: outpoint(1),
                amount: 10_000,
                height: 100,
                is_coinbase: false,
            })
            .build(10_000)
            .unwrap();
        assert_eq!(validate_stakes(&proof, &utxos, tip, 2), StakeValidation::Immature);

        let tip_later = ChainTip {
            height: 101,
            median_time_past: 0,
        };
        assert_eq!(validate_stakes(&proof, &utxos, tip_later, 2), StakeValidation::Mature);

        let missing = ProofBuilder::new(ProofId([2; 32]), 1, 0, master_key())
            .add_stake(Stake {
                outpoint: outpoint(9),
                amount: 10_000,
                height: 100,
                is_coinbase: false,
            })
            .build(10_000)
            .unwrap();
        assert_eq!(validate_stakes(&missing, &utxos, tip, 2), StakeValidation::MissingUtxo);
    }
}
