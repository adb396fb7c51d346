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

//! The public facade: wires the pool, node binder, maturity tracker, dangling sweeper, snapshot
//! publisher and random selector together behind a single-writer/many-reader lock.
//!
//! Stake validation and signature verification are delegated to the [`UtxoView`] and
//! [`ProofVerifier`] collaborators supplied at construction; this module owns none of that logic,
//! only the sequencing of admission, binding, and maintenance across the component modules.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use im::OrdMap;
use tracing::{debug, instrument, trace, warn};

use crate::config::PeerManagerConfig;
use crate::dangling::{DanglingSweepReport, DanglingSweeper};
use crate::error::{PeerManagerError, ProofRegistrationResult, RegistrationMode, RejectMode};
use crate::maturity::{MaturityReport, MaturityTracker};
use crate::node_binder::{NodeBinder, NodeInfo};
use crate::pool::{Peer, PoolManager};
use crate::proof::{validate_stakes, ChainTip, Proof, ProofVerifier, StakeValidation, UtxoView};
use crate::selector::RandomSelector;
use crate::snapshot::SnapshotPublisher;
use crate::types::{Amount, NodeId, PeerId, ProofId, WallClockSeconds};

struct Inner {
    pool: PoolManager,
    nodes: NodeBinder,
    dangling: DanglingSweeper,
    /// Proof ids rejected with [`RejectMode::Invalidate`]; re-registration is refused without
    /// re-running validation.
    invalidated: HashSet<ProofId>,
    tip: ChainTip,
}

/// Admits, arbitrates, indexes, and weight-samples the set of proofs and nodes participating in
/// pre-consensus.
///
/// Every mutating method takes a brief write lock; every read-only observer takes a brief read
/// lock. No method here ever calls out to [`UtxoView`] or [`ProofVerifier`] while holding the
/// lock across an await point - there is none, since both collaborators are synchronous and
/// expected to be backed by an in-memory view (see their trait docs).
pub struct PeerManager {
    config: PeerManagerConfig,
    utxo_view: Arc<dyn UtxoView>,
    verifier: Arc<dyn ProofVerifier>,
    maturity: MaturityTracker,
    selector: RandomSelector,
    snapshot: SnapshotPublisher,
    inner: RwLock<Inner>,
}

impl PeerManager {
    pub fn new(
        config: PeerManagerConfig,
        utxo_view: Arc<dyn UtxoView>,
        verifier: Arc<dyn ProofVerifier>,
        initial_tip: ChainTip,
    ) -> Self {
        Self {
            config,
            utxo_view,
            verifier,
            maturity: MaturityTracker::new(),
            selector: RandomSelector::new(),
            snapshot: SnapshotPublisher::new(),
            inner: RwLock::new(Inner {
                pool: PoolManager::new(),
                nodes: NodeBinder::new(),
                dangling: DanglingSweeper::new(),
                invalidated: HashSet::new(),
                tip: initial_tip,
            }),
        }
    }

    /// Validates `stake_utxo_confirmations`..`dangling_timeout` into a [`PeerManagerConfig`] and
    /// constructs the manager in one fallible step, for callers that build configuration from raw
    /// values (a TOML file, CLI flags) rather than a pre-validated [`PeerManagerConfig`].
    pub fn with_config(
        stake_utxo_confirmations: u32,
        conflicting_proof_cooldown: u64,
        proof_dust_threshold: Amount,
        max_immature_proofs: usize,
        dangling_timeout: u64,
        utxo_view: Arc<dyn UtxoView>,
        verifier: Arc<dyn ProofVerifier>,
        initial_tip: ChainTip,
    ) -> Result<Self, PeerManagerError> {
        let config = PeerManagerConfig::new(
            stake_utxo_confirmations,
            conflicting_proof_cooldown,
            proof_dust_threshold,
            max_immature_proofs,
            dangling_timeout,
        )?;
        Ok(Self::new(config, utxo_view, verifier, initial_tip))
    }

    pub fn config(&self) -> &PeerManagerConfig {
        &self.config
    }

    // --- Admission / lifecycle ----------------------------------------------------------------

    /// Runs a candidate proof through the full admission pipeline: duplicate/dangling/invalidated
    /// checks, verifier, expiry, stake maturity, then the Bound/Conflicting pool state machine.
    #[instrument(skip(self, proof), fields(proof_id = ?proof.id()))]
    pub fn register_proof(
        &self,
        proof: Proof,
        now: WallClockSeconds,
        mode: RegistrationMode,
    ) -> (bool, ProofRegistrationResult) {
        let mut inner = self.inner.write().expect("peer manager lock poisoned");
        let id = proof.id();

        if inner.pool.is_bound(id) || inner.pool.is_conflicting(id) || inner.pool.is_immature(id) {
            return (false, ProofRegistrationResult::AlreadyRegistered);
        }
        if inner.dangling.is_memoized_dangling(id) {
            warn!("rejecting re-registration of a proof swept as dangling");
            inner.nodes.raise_should_request_more_nodes();
            return (false, ProofRegistrationResult::Dangling);
        }
        if inner.invalidated.contains(&id) {
            warn!("rejecting re-registration of an invalidated proof");
            return (false, ProofRegistrationResult::Invalid);
        }
        if !self.verifier.verify(&proof) {
            warn!("proof failed verification");
            return (false, ProofRegistrationResult::Invalid);
        }
        if proof.is_expired(inner.tip.median_time_past) {
            warn!("proof is already expired at current tip");
            return (false, ProofRegistrationResult::Invalid);
        }

        let tip = inner.tip;
        let confirmations = self.config.stake_utxo_confirmations();
        let proof = proof.with_recomputed_score(self.config.proof_dust_threshold());
        let proof = Arc::new(proof);

        match validate_stakes(&proof, &*self.utxo_view, tip, confirmations) {
            StakeValidation::MissingUtxo => (false, ProofRegistrationResult::MissingUtxo),
            StakeValidation::Immature => {
                let result = inner.pool.insert_immature(proof, self.config.max_immature_proofs());
                debug!(?result, "proof entered immature pool");
                (false, result)
            },
            StakeValidation::Mature => {
                let incumbent = inner.pool.bound_conflict_for(&proof);
                let incumbent_peer_id = incumbent.and_then(|incumbent_id| inner.pool.peer_id_for_proof(incumbent_id));

                let result = inner.pool.admit_mature(
                    proof.clone(),
                    now,
                    mode,
                    self.config.conflicting_proof_cooldown(),
                    self.config.max_immature_proofs(),
                );

                if result.is_valid() {
                    if let (Some(incumbent_id), Some(incumbent_peer_id)) = (incumbent, incumbent_peer_id) {
                        inner.nodes.demote_bound(incumbent_peer_id, incumbent_id);
                    }
                    if let Some(peer_id) = inner.pool.peer_id_for_proof(id) {
                        inner.nodes.promote_pending(id, peer_id);
                    }
                    debug!("proof admitted to bound pool");
                } else {
                    debug!(?result, "proof did not reach bound pool");
                }
                (result.is_valid(), result)
            },
        }
    }

    /// Removes a Bound proof and memoizes it per `mode`. Returns `false` if `proof_id` is not
    /// currently Bound. Promotes the best Conflicting rival left on its outpoints, if any.
    #[instrument(skip(self))]
    pub fn reject_proof(&self, proof_id: ProofId, mode: RejectMode, now: WallClockSeconds) -> bool {
        let mut inner = self.inner.write().expect("peer manager lock poisoned");
        let Some(peer_id) = inner.pool.peer_id_for_proof(proof_id) else {
            return false;
        };
        if !inner.pool.is_bound(proof_id) {
            return false;
        }
        let Some(proof) = inner.pool.remove_bound(peer_id) else {
            return false;
        };
        inner.nodes.demote_bound(peer_id, proof_id);
        if mode == RejectMode::Invalidate {
            inner.invalidated.insert(proof_id);
        }
        warn!(?proof_id, ?mode, "proof rejected and removed from bound pool");

        let outpoints: Vec<_> = proof.outpoints().collect();
        let cooldown = self.config.conflicting_proof_cooldown();
        if let Some(rival_id) = inner.pool.promote_best_rival(&outpoints, now, cooldown) {
            if let Some(rival_peer_id) = inner.pool.peer_id_for_proof(rival_id) {
                inner.nodes.promote_pending(rival_id, rival_peer_id);
            }
        }
        true
    }

    pub fn exists(&self, proof_id: ProofId) -> bool {
        let inner = self.inner.read().expect("peer manager lock poisoned");
        inner.pool.is_bound(proof_id) || inner.pool.is_conflicting(proof_id) || inner.pool.is_immature(proof_id)
    }

    pub fn is_bound_to_peer(&self, proof_id: ProofId) -> bool {
        self.inner.read().expect("peer manager lock poisoned").pool.is_bound(proof_id)
    }

    pub fn is_in_conflicting_pool(&self, proof_id: ProofId) -> bool {
        self.inner.read().expect("peer manager lock poisoned").pool.is_conflicting(proof_id)
    }

    pub fn is_immature(&self, proof_id: ProofId) -> bool {
        self.inner.read().expect("peer manager lock poisoned").pool.is_immature(proof_id)
    }

    pub fn get_proof(&self, proof_id: ProofId) -> Option<Arc<Proof>> {
        self.inner.read().expect("peer manager lock poisoned").pool.get_proof(proof_id).cloned()
    }

    /// Like [`Self::get_proof`], but for callers that want to propagate a missing proof as an
    /// error (via `?`) instead of matching on `Option`.
    pub fn proof_or_err(&self, proof_id: ProofId) -> Result<Arc<Proof>, PeerManagerError> {
        self.get_proof(proof_id).ok_or(PeerManagerError::ProofNotFound(proof_id))
    }

    /// Point-in-time snapshot of a Bound peer's bookkeeping fields, or
    /// [`PeerManagerError::PeerNotFound`] if `peer_id` is not currently Bound.
    pub fn peer_or_err(&self, peer_id: PeerId) -> Result<Peer, PeerManagerError> {
        self.inner
            .read()
            .expect("peer manager lock poisoned")
            .pool
            .peer(peer_id)
            .cloned()
            .ok_or(PeerManagerError::PeerNotFound(peer_id))
    }

    /// Removes a Bound peer entirely (its proof, its slot, and its node bindings), promoting the
    /// best Conflicting rival on its outpoints. Returns `false` if `peer_id` is not Bound.
    #[instrument(skip(self))]
    pub fn remove_peer(&self, peer_id: PeerId, now: WallClockSeconds) -> bool {
        let mut inner = self.inner.write().expect("peer manager lock poisoned");
        let Some(proof) = inner.pool.remove_bound(peer_id) else {
            return false;
        };
        inner.nodes.demote_bound(peer_id, proof.id());
        debug!(proof_id = ?proof.id(), "peer removed");

        let outpoints: Vec<_> = proof.outpoints().collect();
        let cooldown = self.config.conflicting_proof_cooldown();
        if let Some(rival_id) = inner.pool.promote_best_rival(&outpoints, now, cooldown) {
            if let Some(rival_peer_id) = inner.pool.peer_id_for_proof(rival_id) {
                inner.nodes.promote_pending(rival_id, rival_peer_id);
            }
        }
        true
    }

    /// Reacts to a new chain tip: demotes/removes Bound proofs whose stakes regressed or expired,
    /// promotes Immature proofs that have now matured, and rescans Conflicting rivals.
    #[instrument(skip(self))]
    pub fn updated_block_tip(&self, tip: ChainTip) -> MaturityReport {
        let mut inner = self.inner.write().expect("peer manager lock poisoned");
        inner.tip = tip;
        let Inner { pool, nodes, .. } = &mut *inner;
        self.maturity.updated_block_tip(
            pool,
            nodes,
            &*self.utxo_view,
            tip,
            self.config.stake_utxo_confirmations(),
            self.config.conflicting_proof_cooldown(),
            self.config.max_immature_proofs(),
            self.config.max_immature_proofs(),
        )
    }

    /// Sweeps Bound peers with zero attached nodes past the configured dangling timeout.
    /// `local_proof`, if supplied, is exempt.
    #[instrument(skip(self))]
    pub fn cleanup_dangling_proofs(&self, local_proof: Option<ProofId>, now: WallClockSeconds) -> DanglingSweepReport {
        let mut inner = self.inner.write().expect("peer manager lock poisoned");
        let Inner { pool, nodes, dangling, .. } = &mut *inner;
        dangling.cleanup_dangling_proofs(
            pool,
            nodes,
            local_proof,
            now,
            self.config.dangling_timeout(),
            self.config.conflicting_proof_cooldown(),
        )
    }

    // --- Nodes ---------------------------------------------------------------------------------

    /// Binds `node_id` to the peer backing `proof_id` if it is currently Bound, else places it in
    /// the Pending set to wait for it. Returns `true` if bound immediately.
    #[instrument(skip(self))]
    pub fn add_node(&self, node_id: NodeId, proof_id: ProofId) -> bool {
        let mut inner = self.inner.write().expect("peer manager lock poisoned");
        Self::detach_node_count(&mut inner, node_id);

        if inner.dangling.is_memoized_dangling(proof_id) {
            inner.dangling.forget(proof_id);
            trace!(?proof_id, "node bind cleared dangling memo, re-registration now allowed");
        }

        match inner.pool.peer_id_for_proof(proof_id).filter(|_| inner.pool.is_bound(proof_id)) {
            Some(peer_id) => {
                inner.nodes.add_bound(node_id, peer_id);
                if let Some(peer) = inner.pool.peer_mut(peer_id) {
                    peer.increment_node_count();
                }
                trace!(?proof_id, peer_id, "node bound directly");
                true
            },
            None => {
                inner.nodes.add_pending(node_id, proof_id);
                trace!(?proof_id, "node placed pending, proof not yet bound");
                false
            },
        }
    }

    /// Removes `node_id` from whichever set it is in. Returns `false` if it was not tracked.
    #[instrument(skip(self))]
    pub fn remove_node(&self, node_id: NodeId) -> bool {
        let mut inner = self.inner.write().expect("peer manager lock poisoned");
        let was_tracked = inner.nodes.is_bound(node_id) || inner.nodes.is_pending(node_id);
        if let Some(peer_id) = inner.nodes.remove_node(node_id) {
            if let Some(peer) = inner.pool.peer_mut(peer_id) {
                peer.decrement_node_count();
            }
        }
        was_tracked
    }

    fn detach_node_count(inner: &mut Inner, node_id: NodeId) {
        if let Some(peer_id) = inner.nodes.peer_of(node_id) {
            if let Some(peer) = inner.pool.peer_mut(peer_id) {
                peer.decrement_node_count();
            }
        }
    }

    pub fn update_next_request_time(&self, node_id: NodeId, instant: WallClockSeconds) -> bool {
        self.inner.write().expect("peer manager lock poisoned").nodes.update_next_request_time(node_id, instant)
    }

    /// Monotonic: refuses to move `peer_id`'s cooldown deadline backward.
    pub fn update_next_possible_conflict_time(&self, peer_id: PeerId, instant: WallClockSeconds) -> bool {
        self.inner
            .write()
            .expect("peer manager lock poisoned")
            .pool
            .peer_mut(peer_id)
            .map(|peer| peer.set_next_possible_conflict_time(instant))
            .unwrap_or(false)
    }

    pub fn latch_avaproofs_sent(&self, node_id: NodeId) -> bool {
        self.inner.write().expect("peer manager lock poisoned").nodes.latch_avaproofs_sent(node_id)
    }

    pub fn select_peer(&self) -> Option<PeerId> {
        let inner = self.inner.read().expect("peer manager lock poisoned");
        self.selector.select_peer(&inner.pool, &mut rand::thread_rng())
    }

    pub fn select_node(&self, now: WallClockSeconds) -> Option<NodeId> {
        let mut inner = self.inner.write().expect("peer manager lock poisoned");
        let Inner { pool, nodes, .. } = &mut *inner;
        self.selector.select_node(pool, nodes, &mut rand::thread_rng(), now)
    }

    /// One-shot: returns whether the population has been under-connected since the last call.
    pub fn should_request_more_nodes(&self) -> bool {
        self.inner.write().expect("peer manager lock poisoned").nodes.take_should_request_more_nodes()
    }

    // --- Observers -------------------------------------------------------------------------------

    pub fn total_peers_score(&self) -> u64 {
        self.inner.read().expect("peer manager lock poisoned").pool.total_peers_score()
    }

    pub fn connected_peers_score(&self) -> u64 {
        self.inner.read().expect("peer manager lock poisoned").pool.connected_peers_score()
    }

    pub fn node_count(&self) -> usize {
        self.inner.read().expect("peer manager lock poisoned").nodes.node_count()
    }

    pub fn pending_node_count(&self) -> usize {
        self.inner.read().expect("peer manager lock poisoned").nodes.pending_node_count()
    }

    pub fn slot_count(&self) -> u64 {
        self.inner.read().expect("peer manager lock poisoned").pool.slot_table().slot_count()
    }

    pub fn fragmentation(&self) -> u64 {
        self.inner.read().expect("peer manager lock poisoned").pool.slot_table().fragmentation()
    }

    pub fn compact(&self) -> u64 {
        self.inner.write().expect("peer manager lock poisoned").pool.compact()
    }

    pub fn for_each_peer(&self, mut visitor: impl FnMut(&Peer)) {
        let inner = self.inner.read().expect("peer manager lock poisoned");
        for peer in inner.pool.peers() {
            visitor(peer);
        }
    }

    pub fn for_peer(&self, proof_id: ProofId, visitor: impl FnOnce(&Peer)) -> bool {
        let inner = self.inner.read().expect("peer manager lock poisoned");
        let Some(peer_id) = inner.pool.peer_id_for_proof(proof_id) else {
            return false;
        };
        let Some(peer) = inner.pool.peer(peer_id) else {
            return false;
        };
        visitor(peer);
        true
    }

    pub fn for_node(&self, node_id: NodeId, visitor: impl FnOnce(&NodeInfo)) -> bool {
        let inner = self.inner.read().expect("peer manager lock poisoned");
        match inner.nodes.node_info(node_id) {
            Some(info) => {
                visitor(&info);
                true
            },
            None => false,
        }
    }

    pub fn shareable_proofs_snapshot(&self) -> OrdMap<ProofId, Arc<Proof>> {
        let inner = self.inner.read().expect("peer manager lock poisoned");
        self.snapshot.publish(&inner.pool)
    }

    /// Independently recomputes invariants P1-P5 rather than trusting cached state. Intended for
    /// tests and debug assertions, not the steady-state hot path.
    pub fn verify(&self) -> bool {
        self.try_verify().is_ok()
    }

    /// Same check as [`Self::verify`], but reports which invariant failed instead of collapsing
    /// to a bare `bool`.
    pub fn try_verify(&self) -> Result<(), PeerManagerError> {
        let inner = self.inner.read().expect("peer manager lock poisoned");
        let pool = &inner.pool;

        // P1: every peer's cached slot_index points back at a live slot matching its own fields.
        for peer in pool.peers() {
            let Some(slot) = pool.slot_table().slot_at(peer.slot_index()) else {
                return Err(PeerManagerError::InvariantViolation("P1: peer's slot_index has no backing slot"));
            };
            if slot.peer_id != peer.peer_id() || slot.score != peer.proof().score() {
                return Err(PeerManagerError::InvariantViolation("P1: slot contents do not match owning peer"));
            }
        }

        // P2: no outpoint appears in more than one bound or more than one conflicting proof.
        if !Self::outpoints_disjoint(pool.bound_proofs()) {
            return Err(PeerManagerError::InvariantViolation("P2: an outpoint is staked by more than one bound proof"));
        }
        if !Self::outpoints_disjoint(pool.conflicting_proofs()) {
            return Err(PeerManagerError::InvariantViolation(
                "P2: an outpoint is staked by more than one conflicting proof",
            ));
        }

        // P3: sum of live slot scores equals the reported total.
        let live_sum: u64 = pool.peers().map(|p| u64::from(p.proof().score())).sum();
        if live_sum != pool.total_peers_score() {
            return Err(PeerManagerError::InvariantViolation("P3: live slot score sum disagrees with total_peers_score"));
        }

        // P4: connected score equals the sum over peers with at least one attached node.
        let connected_sum: u64 = pool
            .peers()
            .filter(|p| p.node_count() > 0)
            .map(|p| u64::from(p.proof().score()))
            .sum();
        if connected_sum != pool.connected_peers_score() {
            return Err(PeerManagerError::InvariantViolation(
                "P4: connected score sum disagrees with connected_peers_score",
            ));
        }

        // P5: no Pending node waits on a proof id that is in fact Bound.
        if inner.nodes.pending_proof_ids().any(|id| pool.is_bound(id)) {
            return Err(PeerManagerError::InvariantViolation("P5: a pending node waits on a proof id that is bound"));
        }

        Ok(())
    }

    fn outpoints_disjoint<'a>(proofs: impl Iterator<Item = &'a Arc<Proof>>) -> bool {
        let mut seen = HashSet::new();
        for proof in proofs {
            for outpoint in proof.outpoints() {
                if !seen.insert(outpoint) {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::proof::{ProofBuilder, Stake};
    use crate::types::{Height, MasterPubKey, OutPoint};

    #[derive(Default)]
    struct FakeUtxos(HashMap<OutPoint, Height>);
    impl UtxoView for FakeUtxos {
        fn utxo_height(&self, outpoint: &OutPoint) -> Option<Height> {
            self.0.get(outpoint).copied()
        }
    }

    struct AlwaysValid;
    impl ProofVerifier for AlwaysValid {
        fn verify(&self, _proof: &Proof) -> bool {
            true
        }
    }

    struct AlwaysInvalid;
    impl ProofVerifier for AlwaysInvalid {
        fn verify(&self, _proof: &Proof) -> bool {
            false
        }
    }

    fn proof(id: u8, sequence: i64, key: u8, outpoint: u8, amount: u64) -> Proof {
        ProofBuilder::new(ProofId([id; 32]), sequence, 0, MasterPubKey([key; 33]))
            .add_stake(Stake {
                outpoint: OutPoint { txid: [outpoint; 32], vout: 0 },
                amount,
                height: 100,
                is_coinbase: false,
            })
            .build(1000)
            .unwrap()
    }

    fn manager_with_utxo(outpoint: u8, height: Height) -> (PeerManager, ChainTip) {
        manager_with_utxo_and_verifier(outpoint, height, Arc::new(AlwaysValid))
    }

    fn manager_with_utxo_and_verifier(outpoint: u8, height: Height, verifier: Arc<dyn ProofVerifier>) -> (PeerManager, ChainTip) {
        let mut utxos = HashMap::new();
        utxos.insert(OutPoint { txid: [outpoint; 32], vout: 0 }, height);
        let tip = ChainTip { height: 101, median_time_past: 0 };
        let manager = PeerManager::new(PeerManagerConfig::new(2, 7200, 1000, 1000, 900).unwrap(), Arc::new(FakeUtxos(utxos)), verifier, tip);
        (manager, tip)
    }

    #[test]
    fn register_and_select_one_of_two_peers() {
        let mut utxos = HashMap::new();
        utxos.insert(OutPoint { txid: [9; 32], vout: 0 }, 100);
        utxos.insert(OutPoint { txid: [10; 32], vout: 0 }, 100);
        let tip = ChainTip { height: 101, median_time_past: 0 };
        let manager =
            PeerManager::new(PeerManagerConfig::new(2, 7200, 1000, 1000, 900).unwrap(), Arc::new(FakeUtxos(utxos)), Arc::new(AlwaysValid), tip);

        let (ok_a, result_a) = manager.register_proof(proof(1, 1, 1, 9, 100_000), 0, RegistrationMode::Default);
        let (ok_b, result_b) = manager.register_proof(proof(2, 1, 2, 10, 100_000), 0, RegistrationMode::Default);
        assert!(ok_a && ok_b);
        assert_eq!(result_a, ProofRegistrationResult::Valid);
        assert_eq!(result_b, ProofRegistrationResult::Valid);
        assert_eq!(manager.slot_count(), 200_000);
        assert!(manager.verify());
    }

    #[test]
    fn verifier_rejection_reports_invalid() {
        let (manager, _) = manager_with_utxo_and_verifier(9, 100, Arc::new(AlwaysInvalid));
        let (ok, result) = manager.register_proof(proof(1, 1, 1, 9, 10_000), 0, RegistrationMode::Default);
        assert!(!ok);
        assert_eq!(result, ProofRegistrationResult::Invalid);
    }

    #[test]
    fn missing_utxo_is_reported() {
        let (manager, _) = manager_with_utxo(9, 100);
        let (ok, result) = manager.register_proof(proof(1, 1, 1, 200, 10_000), 0, RegistrationMode::Default);
        assert!(!ok);
        assert_eq!(result, ProofRegistrationResult::MissingUtxo);
    }

    #[test]
    fn immature_stake_enters_immature_pool_then_matures_on_tip_advance() {
        let (manager, _) = manager_with_utxo(9, 100);
        let (ok, result) = manager.register_proof(proof(1, 1, 1, 9, 10_000), 0, RegistrationMode::Default);
        assert!(!ok);
        assert_eq!(result, ProofRegistrationResult::Immature);
        assert!(manager.is_immature(ProofId([1; 32])));

        let report = manager.updated_block_tip(ChainTip { height: 102, median_time_past: 0 });
        assert_eq!(report.promoted, vec![ProofId([1; 32])]);
        assert!(manager.is_bound_to_peer(ProofId([1; 32])));
        assert!(manager.verify());
    }

    #[test]
    fn conflict_demotion_displaces_incumbent_and_its_nodes() {
        let (manager, _) = manager_with_utxo(9, 100);
        let (ok, _) = manager.register_proof(proof(30, 30, 1, 9, 30_000), 0, RegistrationMode::Default);
        assert!(ok);
        let peer_a = {
            let mut found = None;
            manager.for_peer(ProofId([30; 32]), |p| found = Some(p.peer_id()));
            found.unwrap()
        };
        assert!(manager.add_node(1, ProofId([30; 32])));
        assert_eq!(manager.node_count(), 1);

        let (ok, result) = manager.register_proof(proof(40, 40, 1, 9, 40_000), 0, RegistrationMode::Default);
        assert!(ok);
        assert_eq!(result, ProofRegistrationResult::Valid);
        assert!(manager.is_in_conflicting_pool(ProofId([30; 32])));
        assert!(manager.is_bound_to_peer(ProofId([40; 32])));

        // node 1 followed its peer down to Pending, not left dangling on a peer id that no
        // longer refers to its proof.
        assert_eq!(manager.node_count(), 0);
        assert_eq!(manager.pending_node_count(), 1);
        let _ = peer_a;
        assert!(manager.verify());
    }

    #[test]
    fn cooldown_blocks_then_allows_conflicting_admission() {
        let mut utxos = HashMap::new();
        utxos.insert(OutPoint { txid: [9; 32], vout: 0 }, 100);
        let tip = ChainTip { height: 101, median_time_past: 0 };
        let manager = PeerManager::new(
            PeerManagerConfig::new(2, 100, 1000, 1000, 900).unwrap(),
            Arc::new(FakeUtxos(utxos)),
            Arc::new(AlwaysValid),
            tip,
        );
        manager.register_proof(proof(1, 1, 1, 9, 10_000), 0, RegistrationMode::Default);

        let (ok, result) = manager.register_proof(proof(2, 2, 2, 9, 10_000), 50, RegistrationMode::Default);
        assert!(!ok);
        assert_eq!(result, ProofRegistrationResult::CooldownNotElapsed);

        let (ok, result) = manager.register_proof(proof(2, 2, 2, 9, 10_000), 100, RegistrationMode::Default);
        assert!(!ok);
        assert_eq!(result, ProofRegistrationResult::Conflicting);
    }

    #[test]
    fn reject_proof_memoizes_and_promotes_rival() {
        let (manager, tip) = manager_with_utxo(9, 100);
        manager.register_proof(proof(1, 30, 1, 9, 30_000), 0, RegistrationMode::Default);
        manager.register_proof(proof(2, 20, 2, 9, 20_000), 0, RegistrationMode::Default);
        assert!(manager.is_in_conflicting_pool(ProofId([2; 32])));

        assert!(manager.reject_proof(ProofId([1; 32]), RejectMode::Invalidate, tip.median_time_past));
        assert!(manager.is_bound_to_peer(ProofId([2; 32])));

        let (ok, result) = manager.register_proof(proof(1, 30, 1, 9, 30_000), 0, RegistrationMode::Default);
        assert!(!ok);
        assert_eq!(result, ProofRegistrationResult::Invalid);
    }

    #[test]
    fn dangling_peer_is_swept_and_blocked_from_reregistration() {
        let (manager, _) = manager_with_utxo(9, 100);
        manager.register_proof(proof(1, 1, 1, 9, 10_000), 0, RegistrationMode::Default);

        let report = manager.cleanup_dangling_proofs(None, 900);
        assert_eq!(report.removed, vec![ProofId([1; 32])]);
        assert!(!manager.exists(ProofId([1; 32])));
        assert!(manager.should_request_more_nodes());

        let (ok, result) = manager.register_proof(proof(1, 1, 1, 9, 10_000), 900, RegistrationMode::Default);
        assert!(!ok);
        assert_eq!(result, ProofRegistrationResult::Dangling);
    }

    #[test]
    fn re_registering_a_swept_proof_raises_should_request_more_nodes() {
        let (manager, _) = manager_with_utxo(9, 100);
        manager.register_proof(proof(1, 1, 1, 9, 10_000), 0, RegistrationMode::Default);
        manager.cleanup_dangling_proofs(None, 900);
        assert!(manager.should_request_more_nodes(), "sweep itself raises the flag");

        let (ok, result) = manager.register_proof(proof(1, 1, 1, 9, 10_000), 901, RegistrationMode::Default);
        assert!(!ok);
        assert_eq!(result, ProofRegistrationResult::Dangling);
        assert!(manager.should_request_more_nodes(), "dangling re-registration raises it again");
        assert!(!manager.should_request_more_nodes(), "one-shot read clears it");
    }

    #[test]
    fn add_node_to_unknown_proof_is_pending_until_registration() {
        let (manager, _) = manager_with_utxo(9, 100);
        assert!(!manager.add_node(1, ProofId([1; 32])));
        assert_eq!(manager.pending_node_count(), 1);

        manager.register_proof(proof(1, 1, 1, 9, 10_000), 0, RegistrationMode::Default);
        assert_eq!(manager.node_count(), 0, "promotion only happens through pool transitions, not a later add_node call");

        // Re-adding after the proof is Bound binds immediately.
        assert!(manager.add_node(2, ProofId([1; 32])));
        assert_eq!(manager.node_count(), 1);
    }

    #[test]
    fn select_peer_returns_none_with_no_bound_peers() {
        let (manager, _) = manager_with_utxo(9, 100);
        assert_eq!(manager.select_peer(), None);
    }

    #[test]
    fn compact_reclaims_fragmentation_after_peer_removal() {
        let mut utxos = HashMap::new();
        utxos.insert(OutPoint { txid: [9; 32], vout: 0 }, 100);
        utxos.insert(OutPoint { txid: [10; 32], vout: 0 }, 100);
        let tip = ChainTip { height: 101, median_time_past: 0 };
        let manager =
            PeerManager::new(PeerManagerConfig::new(2, 7200, 1000, 1000, 900).unwrap(), Arc::new(FakeUtxos(utxos)), Arc::new(AlwaysValid), tip);
        manager.register_proof(proof(1, 1, 1, 9, 10_000), 0, RegistrationMode::Default);
        manager.register_proof(proof(2, 1, 2, 10, 10_000), 0, RegistrationMode::Default);

        let peer_id = {
            let mut found = None;
            manager.for_peer(ProofId([1; 32]), |p| found = Some(p.peer_id()));
            found.unwrap()
        };
        assert!(manager.remove_peer(peer_id, 0));
        assert!(manager.fragmentation() > 0);
        let reclaimed = manager.compact();
        assert!(reclaimed > 0);
        assert_eq!(manager.fragmentation(), 0);
        assert!(manager.verify());
    }

    #[test]
    fn with_config_rejects_invalid_values() {
        let mut utxos = HashMap::new();
        utxos.insert(OutPoint { txid: [9; 32], vout: 0 }, 100);
        let tip = ChainTip { height: 101, median_time_past: 0 };
        let err = PeerManager::with_config(0, 7200, 1000, 1000, 900, Arc::new(FakeUtxos(utxos)), Arc::new(AlwaysValid), tip).unwrap_err();
        assert!(matches!(err, PeerManagerError::InvalidConfig(_)));
    }

    #[test]
    fn proof_or_err_and_peer_or_err_report_not_found() {
        let (manager, _) = manager_with_utxo(9, 100);
        assert!(matches!(manager.proof_or_err(ProofId([1; 32])), Err(PeerManagerError::ProofNotFound(_))));
        assert!(matches!(manager.peer_or_err(0), Err(PeerManagerError::PeerNotFound(0))));

        manager.register_proof(proof(1, 1, 1, 9, 10_000), 0, RegistrationMode::Default);
        let peer_id = {
            let mut found = None;
            manager.for_peer(ProofId([1; 32]), |p| found = Some(p.peer_id()));
            found.unwrap()
        };
        assert!(manager.proof_or_err(ProofId([1; 32])).is_ok());
        assert!(manager.peer_or_err(peer_id).is_ok());
    }

    #[test]
    fn binding_a_node_clears_the_dangling_memo_and_allows_reregistration() {
        let (manager, _) = manager_with_utxo(9, 100);
        manager.register_proof(proof(1, 1, 1, 9, 10_000), 0, RegistrationMode::Default);
        manager.cleanup_dangling_proofs(None, 900);
        assert!(!manager.exists(ProofId([1; 32])));

        // A node binding to the swept proof id (mirroring the original's bind-then-re-register
        // flow) clears the memo even though the proof is not yet Bound again.
        assert!(!manager.add_node(11, ProofId([1; 32])));
        assert_eq!(manager.pending_node_count(), 1);

        let (ok, result) = manager.register_proof(proof(1, 1, 1, 9, 10_000), 901, RegistrationMode::Default);
        assert!(ok);
        assert_eq!(result, ProofRegistrationResult::Valid);
        assert_eq!(manager.node_count(), 1, "the pending node bound once its proof registered again");
    }

    #[test]
    fn shareable_snapshot_reflects_bound_set() {
        let (manager, _) = manager_with_utxo(9, 100);
        manager.register_proof(proof(1, 1, 1, 9, 10_000), 0, RegistrationMode::Default);
        let snapshot = manager.shareable_proofs_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains_key(&ProofId([1; 32])));
    }
}
