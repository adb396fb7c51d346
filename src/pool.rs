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

//! The three-pool admission state machine: Bound, Conflicting, Immature.
//!
//! This module owns the [`SlotTable`] as well as the pool indices, since a proof only ever
//! occupies a slot while Bound - the two are opened and closed together. Stake maturity,
//! verifier, and expiry checks happen one layer up in [`crate::peer_manager`]; by the time a
//! proof reaches [`PoolManager::admit_mature`] it is known to be structurally valid, unexpired,
//! and fully mature.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::conflict::ConflictArbiter;
use crate::error::{ProofRegistrationResult, RegistrationMode};
use crate::proof::Proof;
use crate::proof_index::{ProofIndex, ProofIndexError};
use crate::slot_table::{SlotIndex, SlotTable};
use crate::types::{OutPoint, PeerId, ProofId, WallClockSeconds};

/// A proof that has reached the Bound pool: it owns a peer id, a slot, and zero or more nodes.
#[derive(Debug, Clone)]
pub struct Peer {
    peer_id: PeerId,
    proof: Arc<Proof>,
    registration_time: WallClockSeconds,
    next_possible_conflict_time: WallClockSeconds,
    node_count: u32,
    has_finalized: bool,
    slot_index: SlotIndex,
}

impl Peer {
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn proof(&self) -> &Arc<Proof> {
        &self.proof
    }

    pub fn registration_time(&self) -> WallClockSeconds {
        self.registration_time
    }

    pub fn next_possible_conflict_time(&self) -> WallClockSeconds {
        self.next_possible_conflict_time
    }

    pub fn node_count(&self) -> u32 {
        self.node_count
    }

    pub fn has_finalized(&self) -> bool {
        self.has_finalized
    }

    pub fn slot_index(&self) -> SlotIndex {
        self.slot_index
    }

    pub fn set_has_finalized(&mut self, value: bool) {
        self.has_finalized = value;
    }

    pub fn increment_node_count(&mut self) {
        self.node_count += 1;
    }

    pub fn decrement_node_count(&mut self) {
        self.node_count = self.node_count.saturating_sub(1);
    }

    /// Moves `next_possible_conflict_time` forward only - refuses to move it backward, per
    /// `PeerManager::update_next_possible_conflict_time`'s monotonicity contract.
    pub fn set_next_possible_conflict_time(&mut self, t: WallClockSeconds) -> bool {
        if t < self.next_possible_conflict_time {
            return false;
        }
        self.next_possible_conflict_time = t;
        true
    }
}

#[derive(Debug, Default)]
pub struct PoolManager {
    bound: ProofIndex,
    conflicting: ProofIndex,
    immature: ProofIndex,
    peers: HashMap<PeerId, Peer>,
    proof_to_peer: HashMap<ProofId, PeerId>,
    slot_table: SlotTable,
    next_peer_id: PeerId,
    free_peer_ids: Vec<PeerId>,
}

impl PoolManager {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Queries -----------------------------------------------------------------------------

    pub fn is_bound(&self, id: ProofId) -> bool {
        self.bound.contains(id)
    }

    pub fn is_conflicting(&self, id: ProofId) -> bool {
        self.conflicting.contains(id)
    }

    pub fn is_immature(&self, id: ProofId) -> bool {
        self.immature.contains(id)
    }

    pub fn get_proof(&self, id: ProofId) -> Option<&Arc<Proof>> {
        self.bound
            .get(id)
            .or_else(|| self.conflicting.get(id))
            .or_else(|| self.immature.get(id))
    }

    pub fn peer(&self, peer_id: PeerId) -> Option<&Peer> {
        self.peers.get(&peer_id)
    }

    pub fn peer_mut(&mut self, peer_id: PeerId) -> Option<&mut Peer> {
        self.peers.get_mut(&peer_id)
    }

    pub fn peer_id_for_proof(&self, id: ProofId) -> Option<PeerId> {
        self.proof_to_peer.get(&id).copied()
    }

    pub fn bound_proofs(&self) -> impl Iterator<Item = &Arc<Proof>> {
        self.bound.iter()
    }

    pub fn peers(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }

    pub fn bound_count(&self) -> usize {
        self.bound.len()
    }

    pub fn conflicting_count(&self) -> usize {
        self.conflicting.len()
    }

    pub fn immature_count(&self) -> usize {
        self.immature.len()
    }

    pub fn slot_table(&self) -> &SlotTable {
        &self.slot_table
    }

    pub fn total_peers_score(&self) -> u64 {
        self.slot_table.live_score()
    }

    pub fn connected_peers_score(&self) -> u64 {
        self.peers
            .values()
            .filter(|p| p.node_count > 0)
            .map(|p| u64::from(p.proof.score()))
            .sum()
    }

    pub fn compact(&mut self) -> u64 {
        let mut relocations = Vec::new();
        let reclaimed = self.slot_table.compact(|peer_id, new_index| relocations.push((peer_id, new_index)));
        for (peer_id, new_index) in relocations {
            if let Some(peer) = self.peers.get_mut(&peer_id) {
                peer.slot_index = new_index;
            }
        }
        reclaimed
    }

    // --- Immature pool -------------------------------------------------------------------------

    /// Inserts `proof` into the Immature pool, evicting the lowest-scored occupant if the pool is
    /// at `cap`. Always returns [`ProofRegistrationResult::Immature`] - the classification holds
    /// even when the incoming proof itself is the one evicted for being too small to keep, or
    /// loses an outpoint conflict against another immature proof.
    pub fn insert_immature(&mut self, proof: Arc<Proof>, cap: usize) -> ProofRegistrationResult {
        if self.immature.len() >= cap {
            if let Some((min_score, min_id)) = self.immature.min_score() {
                if proof.score() <= min_score {
                    debug!(proof_id = ?proof.id(), "immature pool full, incoming proof evicted on entry");
                    return ProofRegistrationResult::Immature;
                }
                debug!(evicted = ?min_id, "evicting lowest-score immature proof to make room");
                self.immature.remove(min_id);
            }
        }

        if let Err(err) = self.immature.insert(proof.clone()) {
            match err {
                ProofIndexError::DuplicateId => {
                    debug!(proof_id = ?proof.id(), "proof already immature, ignoring duplicate insert");
                },
                ProofIndexError::ConflictingOutpoint => {
                    // Two not-yet-confirmed proofs can race for the same outpoint; keep whichever
                    // scores higher, the same policy the pool already uses for capacity eviction.
                    let rival_id = proof
                        .outpoints()
                        .find_map(|o| self.immature.find_by_outpoint(&o))
                        .expect("ConflictingOutpoint implies a rival is indexed under one of these outpoints");
                    let rival_score = self.immature.get(rival_id).expect("indexed outpoint always has a backing proof").score();
                    if proof.score() > rival_score {
                        debug!(evicted = ?rival_id, incoming = ?proof.id(), "incoming immature proof displaces outpoint rival");
                        self.immature.remove(rival_id);
                        self.immature.insert(proof).expect("rival's outpoint was just freed");
                    } else {
                        debug!(proof_id = ?proof.id(), rival = ?rival_id, "incoming immature proof loses outpoint conflict, dropped");
                    }
                },
            }
        }
        ProofRegistrationResult::Immature
    }

    pub fn remove_immature(&mut self, id: ProofId) -> Option<Arc<Proof>> {
        self.immature.remove(id)
    }

    pub fn immature_proofs(&self) -> impl Iterator<Item = &Arc<Proof>> {
        self.immature.iter()
    }

    pub fn conflicting_proofs(&self) -> impl Iterator<Item = &Arc<Proof>> {
        self.conflicting.iter()
    }

    // --- Bound / Conflicting admission -----------------------------------------------------------

    /// The Bound proof, if any, sharing an outpoint with `proof`. Under invariant I2 there is at
    /// most one. Public so callers of [`Self::admit_mature`] can capture the incumbent's identity
    /// *before* calling it, since a successful displacement frees the incumbent's peer id and
    /// they otherwise have no way to find out which node bindings need to move back to Pending.
    pub fn bound_conflict_for(&self, proof: &Proof) -> Option<ProofId> {
        proof.outpoints().find_map(|o| self.bound.find_by_outpoint(&o))
    }

    fn insert_bound(&mut self, proof: Arc<Proof>, now: WallClockSeconds, cooldown: u64) -> PeerId {
        let peer_id = self.free_peer_ids.pop().unwrap_or_else(|| {
            let id = self.next_peer_id;
            self.next_peer_id += 1;
            id
        });
        let slot_index = self.slot_table.append(proof.score(), peer_id);
        let peer = Peer {
            peer_id,
            proof: proof.clone(),
            registration_time: now,
            next_possible_conflict_time: now.saturating_add(cooldown),
            node_count: 0,
            has_finalized: false,
            slot_index,
        };
        self.proof_to_peer.insert(proof.id(), peer_id);
        let inserted = self.bound.insert(proof).is_ok();
        debug_assert!(inserted, "candidate was confirmed conflict-free against the bound index before insertion");
        self.peers.insert(peer_id, peer);
        peer_id
    }

    /// Removes a Bound peer entirely: drops its slot, its pool entry, and its peer record.
    /// Returns the removed proof so the caller (node rebinding, rival promotion) can act on it.
    pub fn remove_bound(&mut self, peer_id: PeerId) -> Option<Arc<Proof>> {
        let peer = self.peers.remove(&peer_id)?;
        self.slot_table.remove(peer.slot_index);
        self.proof_to_peer.remove(&peer.proof.id());
        self.free_peer_ids.push(peer_id);
        self.bound.remove(peer.proof.id())
    }

    /// Demotes a Bound peer to the Conflicting pool (used when a preferred rival displaces it).
    fn demote_to_conflicting(&mut self, peer_id: PeerId, conflicting_cap: usize) {
        if let Some(proof) = self.remove_bound(peer_id) {
            self.insert_conflicting_capped(proof, conflicting_cap);
        }
    }

    fn insert_conflicting_capped(&mut self, proof: Arc<Proof>, cap: usize) -> ProofRegistrationResult {
        if self.conflicting.len() >= cap {
            if let Some((min_score, min_id)) = self.conflicting.min_score() {
                if proof.score() <= min_score {
                    return ProofRegistrationResult::Rejected;
                }
                self.conflicting.remove(min_id);
            }
        }
        match self.conflicting.insert(proof) {
            Ok(()) => ProofRegistrationResult::Conflicting,
            Err(_) => ProofRegistrationResult::Rejected,
        }
    }

    /// Admits a structurally-valid, mature, unexpired proof. Runs the conflict/cooldown/preference
    /// chain from the admission state machine and returns the resulting classification.
    pub fn admit_mature(
        &mut self,
        candidate: Arc<Proof>,
        now: WallClockSeconds,
        mode: RegistrationMode,
        cooldown: u64,
        conflicting_cap: usize,
    ) -> ProofRegistrationResult {
        let incumbent_id = match self.bound_conflict_for(&candidate) {
            None => {
                self.insert_bound(candidate, now, cooldown);
                return ProofRegistrationResult::Valid;
            },
            Some(id) => id,
        };
        let incumbent_peer_id = self.proof_to_peer[&incumbent_id];

        if mode == RegistrationMode::Default {
            let incumbent = &self.peers[&incumbent_peer_id];
            if now < incumbent.next_possible_conflict_time() {
                return ProofRegistrationResult::CooldownNotElapsed;
            }
        }

        let incumbent_proof = self.peers[&incumbent_peer_id].proof().clone();
        let preferred = mode == RegistrationMode::ForceAccept || ConflictArbiter.prefer(&candidate, &incumbent_proof);

        if preferred {
            debug!(candidate = ?candidate.id(), incumbent = ?incumbent_id, "candidate displaces bound incumbent");
            self.demote_to_conflicting(incumbent_peer_id, conflicting_cap);
            self.insert_bound(candidate, now, cooldown);
            ProofRegistrationResult::Valid
        } else {
            self.insert_conflicting_capped(candidate, conflicting_cap)
        }
    }

    /// Finds the most-preferred Conflicting proof among those sharing an outpoint with
    /// `outpoints` and promotes it to Bound. Returns its id if one was promoted.
    pub fn promote_best_rival(
        &mut self,
        outpoints: &[OutPoint],
        now: WallClockSeconds,
        cooldown: u64,
    ) -> Option<ProofId> {
        let mut candidates: Vec<Arc<Proof>> = outpoints
            .iter()
            .filter_map(|o| self.conflicting.find_by_outpoint(o))
            .filter_map(|id| self.conflicting.get(id).cloned())
            .collect();
        candidates.sort_by(|a, b| a.id().cmp(&b.id()));
        candidates.dedup_by_key(|p| p.id());

        let best = candidates
            .into_iter()
            .min_by(|a, b| ConflictArbiter::compare(a, b))?;
        self.conflicting.remove(best.id());
        let id = best.id();
        self.insert_bound(best, now, cooldown);
        debug!(promoted = ?id, "conflicting rival promoted to bound");
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proof::{ProofBuilder, Stake};
    use crate::types::MasterPubKey;

    fn proof(id: u8, sequence: i64, key: u8, outpoint: u8, amount: u64) -> Arc<Proof> {
        Arc::new(
            ProofBuilder::new(ProofId([id; 32]), sequence, 0, MasterPubKey([key; 33]))
                .add_stake(Stake {
                    outpoint: OutPoint { txid: [outpoint; 32], vout: 0 },
                    amount,
                    height: 100,
                    is_coinbase: false,
                })
                .build(1000)
                .unwrap(),
        )
    }

    #[test]
    fn first_registration_of_an_outpoint_binds() {
        let mut pool = PoolManager::new();
        let result = pool.admit_mature(proof(1, 1, 1, 9, 10_000), 0, RegistrationMode::Default, 7200, 10);
        assert_eq!(result, ProofRegistrationResult::Valid);
        assert!(pool.is_bound(ProofId([1; 32])));
    }

    #[test]
    fn conflict_demotion_with_zero_cooldown() {
        let mut pool = PoolManager::new();
        assert_eq!(
            pool.admit_mature(proof(30, 30, 1, 9, 30_000), 0, RegistrationMode::Default, 0, 10),
            ProofRegistrationResult::Valid
        );
        assert_eq!(
            pool.admit_mature(proof(20, 20, 1, 9, 20_000), 0, RegistrationMode::Default, 0, 10),
            ProofRegistrationResult::Conflicting
        );
        assert_eq!(
            pool.admit_mature(proof(40, 40, 1, 9, 40_000), 0, RegistrationMode::Default, 0, 1),
            ProofRegistrationResult::Valid
        );
        assert!(pool.is_bound(ProofId([40; 32])));
        assert!(pool.is_conflicting(ProofId([30; 32])));
        assert!(!pool.is_conflicting(ProofId([20; 32])) && !pool.is_bound(ProofId([20; 32])));
    }

    #[test]
    fn cooldown_blocks_conflicting_admission() {
        let mut pool = PoolManager::new();
        pool.admit_mature(proof(1, 1, 1, 9, 10_000), 0, RegistrationMode::Default, 100, 10);
        let result = pool.admit_mature(proof(2, 2, 2, 9, 10_000), 50, RegistrationMode::Default, 100, 10);
        assert_eq!(result, ProofRegistrationResult::CooldownNotElapsed);

        let result_after = pool.admit_mature(proof(2, 2, 2, 9, 10_000), 100, RegistrationMode::Default, 100, 10);
        assert_eq!(result_after, ProofRegistrationResult::Conflicting);
    }

    #[test]
    fn removing_bound_promotes_best_conflicting_rival() {
        let mut pool = PoolManager::new();
        pool.admit_mature(proof(1, 1, 1, 9, 20_000), 0, RegistrationMode::Default, 0, 10);
        pool.admit_mature(proof(2, 2, 2, 9, 10_000), 0, RegistrationMode::Default, 0, 10);
        assert!(pool.is_conflicting(ProofId([2; 32])));

        let peer_id = pool.peer_id_for_proof(ProofId([1; 32])).unwrap();
        let removed = pool.remove_bound(peer_id).unwrap();
        let promoted = pool.promote_best_rival(&removed.outpoints().collect::<Vec<_>>(), 0, 0);
        assert_eq!(promoted, Some(ProofId([2; 32])));
        assert!(pool.is_bound(ProofId([2; 32])));
    }

    #[test]
    fn force_accept_bypasses_cooldown_and_preference() {
        let mut pool = PoolManager::new();
        pool.admit_mature(proof(1, 1, 1, 9, 50_000), 0, RegistrationMode::Default, 7200, 10);
        let result = pool.admit_mature(proof(2, 2, 2, 9, 10_000), 1, RegistrationMode::ForceAccept, 7200, 10);
        assert_eq!(result, ProofRegistrationResult::Valid);
        assert!(pool.is_bound(ProofId([2; 32])));
        assert!(pool.is_conflicting(ProofId([1; 32])));
    }

    #[test]
    fn immature_pool_evicts_lowest_score_on_overflow() {
        let mut pool = PoolManager::new();
        pool.insert_immature(proof(1, 1, 1, 1, 10_000), 2);
        pool.insert_immature(proof(2, 1, 2, 2, 20_000), 2);
        pool.insert_immature(proof(3, 1, 3, 3, 30_000), 2);
        assert!(!pool.is_immature(ProofId([1; 32])));
        assert!(pool.is_immature(ProofId([2; 32])));
        assert!(pool.is_immature(ProofId([3; 32])));
    }

    #[test]
    fn immature_pool_keeps_higher_score_on_outpoint_conflict() {
        let mut pool = PoolManager::new();
        pool.insert_immature(proof(1, 1, 1, 9, 10_000), 10);
        pool.insert_immature(proof(2, 1, 2, 9, 20_000), 10);
        assert!(!pool.is_immature(ProofId([1; 32])), "lower-score rival on the same outpoint is dropped");
        assert!(pool.is_immature(ProofId([2; 32])));

        // A still-lower-score challenger on the same outpoint does not displace the incumbent.
        pool.insert_immature(proof(3, 1, 3, 9, 5_000), 10);
        assert!(!pool.is_immature(ProofId([3; 32])));
        assert!(pool.is_immature(ProofId([2; 32])));
    }

    #[test]
    fn conflicting_proofs_iterates_the_conflicting_pool() {
        let mut pool = PoolManager::new();
        pool.admit_mature(proof(1, 30, 1, 9, 30_000), 0, RegistrationMode::Default, 0, 10);
        pool.admit_mature(proof(2, 20, 2, 9, 20_000), 0, RegistrationMode::Default, 0, 10);
        let ids: Vec<_> = pool.conflicting_proofs().map(|p| p.id()).collect();
        assert_eq!(ids, vec![ProofId([2; 32])]);
    }

    #[test]
    fn peer_next_possible_conflict_time_refuses_to_move_backward() {
        let mut pool = PoolManager::new();
        pool.admit_mature(proof(1, 1, 1, 9, 10_000), 100, RegistrationMode::Default, 50, 10);
        let peer_id = pool.peer_id_for_proof(ProofId([1; 32])).unwrap();
        let peer = pool.peer_mut(peer_id).unwrap();
        assert_eq!(peer.next_possible_conflict_time(), 150);
        assert!(!peer.set_next_possible_conflict_time(100));
        assert_eq!(peer.next_possible_conflict_time(), 150);
        assert!(peer.set_next_possible_conflict_time(200));
        assert_eq!(peer.next_possible_conflict_time(), 200);
    }

    #[test]
    fn peer_node_count_increments_and_decrements() {
        let mut pool = PoolManager::new();
        pool.admit_mature(proof(1, 1, 1, 9, 10_000), 0, RegistrationMode::Default, 0, 10);
        let peer_id = pool.peer_id_for_proof(ProofId([1; 32])).unwrap();
        let peer = pool.peer_mut(peer_id).unwrap();
        peer.increment_node_count();
        peer.increment_node_count();
        assert_eq!(peer.node_count(), 2);
        peer.decrement_node_count();
        assert_eq!(peer.node_count(), 1);
    }
}
