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

//! Reacts to chain tip changes: demotes Bound proofs whose stakes regressed or expired, promotes
//! Immature proofs that have now matured, and rescans the Conflicting pool after either move.

use tracing::{info, warn};

use crate::error::RegistrationMode;
use crate::node_binder::NodeBinder;
use crate::pool::PoolManager;
use crate::proof::{validate_stakes, ChainTip, StakeValidation, UtxoView};
use crate::types::ProofId;

#[derive(Debug, Default, Clone)]
pub struct MaturityReport {
    pub demoted_to_immature: Vec<ProofId>,
    pub removed: Vec<ProofId>,
    pub promoted: Vec<ProofId>,
    pub rivals_promoted: Vec<ProofId>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MaturityTracker;

impl MaturityTracker {
    pub fn new() -> Self {
        Self
    }

    /// Runs the full tip-change reaction described in the component design: demote/remove Bound
    /// proofs whose stakes no longer validate, promote Immature proofs that now do, and rescan
    /// the Conflicting pool after every Bound-pool change.
    #[allow(clippy::too_many_arguments)]
    pub fn updated_block_tip(
        &self,
        pool: &mut PoolManager,
        nodes: &mut NodeBinder,
        utxo_view: &dyn UtxoView,
        tip: ChainTip,
        confirmations: u32,
        cooldown: u64,
        conflicting_cap: usize,
        immature_cap: usize,
    ) -> MaturityReport {
        let mut report = MaturityReport::default();

        let bound_ids: Vec<ProofId> = pool.bound_proofs().map(|p| p.id()).collect();
        for id in bound_ids {
            let Some(proof) = pool.get_proof(id).cloned() else { continue };
            if proof.is_expired(tip.median_time_past) {
                self.remove_bound_proof(pool, nodes, id, &mut report.removed, tip, cooldown);
                continue;
            }
            match validate_stakes(&proof, utxo_view, tip, confirmations) {
                StakeValidation::Mature => {},
                StakeValidation::MissingUtxo => {
                    self.remove_bound_proof(pool, nodes, id, &mut report.removed, tip, cooldown);
                },
                StakeValidation::Immature => {
                    let Some(peer_id) = pool.peer_id_for_proof(id) else { continue };
                    if let Some(removed) = pool.remove_bound(peer_id) {
                        nodes.demote_bound(peer_id, id);
                        pool.insert_immature(removed, immature_cap);
                        report.demoted_to_immature.push(id);
                        warn!(proof_id = ?id, "bound proof demoted to immature after tip update");
                        self.promote_rivals(pool, nodes, proof.outpoints().collect(), tip, cooldown, &mut report.rivals_promoted);
                    }
                },
            }
        }

        let immature_ids: Vec<ProofId> = pool.immature_proofs().map(|p| p.id()).collect();
        for id in immature_ids {
            let Some(proof) = pool.get_proof(id).cloned() else { continue };
            match validate_stakes(&proof, utxo_view, tip, confirmations) {
                StakeValidation::Mature => {
                    pool.remove_immature(id);
                    let result = pool.admit_mature(proof, tip.median_time_past, RegistrationMode::Default, cooldown, conflicting_cap);
                    if result.is_valid() {
                        if let Some(peer_id) = pool.peer_id_for_proof(id) {
                            nodes.promote_pending(id, peer_id);
                        }
                        report.promoted.push(id);
                        info!(proof_id = ?id, "immature proof matured and promoted to bound");
                    }
                },
                StakeValidation::MissingUtxo => {
                    pool.remove_immature(id);
                    report.removed.push(id);
                },
                StakeValidation::Immature => {},
            }
        }

        report
    }

    fn remove_bound_proof(
        &self,
        pool: &mut PoolManager,
        nodes: &mut NodeBinder,
        id: ProofId,
        removed: &mut Vec<ProofId>,
        tip: ChainTip,
        cooldown: u64,
    ) {
        let Some(peer_id) = pool.peer_id_for_proof(id) else { return };
        let Some(proof) = pool.remove_bound(peer_id) else { return };
        nodes.demote_bound(peer_id, id);
        removed.push(id);
        info!(proof_id = ?id, "bound proof removed (expired or missing utxo)");
        let mut rivals_promoted = Vec::new();
        self.promote_rivals(pool, nodes, proof.outpoints().collect(), tip, cooldown, &mut rivals_promoted);
    }

    fn promote_rivals(
        &self,
        pool: &mut PoolManager,
        nodes: &mut NodeBinder,
        outpoints: Vec<crate::types::OutPoint>,
        tip: ChainTip,
        cooldown: u64,
        promoted: &mut Vec<ProofId>,
    ) {
        if let Some(rival_id) = pool.promote_best_rival(&outpoints, tip.median_time_past, cooldown) {
            if let Some(peer_id) = pool.peer_id_for_proof(rival_id) {
                nodes.promote_pending(rival_id, peer_id);
            }
            promoted.push(rival_id);
        }
    }
}
