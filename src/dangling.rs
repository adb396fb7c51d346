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

//! Periodic cleanup of Bound peers that have sat with no attached nodes past the configured
//! timeout.
//!
//! Swept proofs are memoized here so a later `register_proof` of the same id is rejected with
//! `Dangling` rather than silently re-admitted - the memo is this struct's state, not the pool's,
//! since it outlives any single sweep.

use std::collections::HashSet;

use tracing::warn;

use crate::node_binder::NodeBinder;
use crate::pool::PoolManager;
use crate::types::{ProofId, WallClockSeconds};

#[derive(Debug, Default, Clone)]
pub struct DanglingSweepReport {
    pub removed: Vec<ProofId>,
    pub rivals_promoted: Vec<ProofId>,
}

#[derive(Debug, Default)]
pub struct DanglingSweeper {
    memo: HashSet<ProofId>,
}

impl DanglingSweeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `id` was swept as dangling and has not since been cleared (see
    /// [`Self::forget`]).
    pub fn is_memoized_dangling(&self, id: ProofId) -> bool {
        self.memo.contains(&id)
    }

    /// Clears the dangling memo for `id`. A node explicitly binding to this proof id through
    /// another path (e.g. it is the node's own local proof) is the only legitimate reason to call
    /// this.
    pub fn forget(&mut self, id: ProofId) {
        self.memo.remove(&id);
    }

    /// Sweeps every Bound peer with zero attached nodes that has been dangling for at least the
    /// configured timeout. `local_proof` is exempt from sweeping unconditionally. Idempotent:
    /// calling twice with no intervening registration is a no-op the second time, since a proof
    /// once removed is no longer found among Bound peers.
    pub fn cleanup_dangling_proofs(
        &mut self,
        pool: &mut PoolManager,
        nodes: &mut NodeBinder,
        local_proof: Option<ProofId>,
        now: WallClockSeconds,
        dangling_timeout: u64,
        cooldown: u64,
    ) -> DanglingSweepReport {
        let mut report = DanglingSweepReport::default();

        let dangling_peer_ids: Vec<_> = pool
            .peers()
            .filter(|peer| {
                peer.node_count() == 0
                    && now.saturating_sub(peer.registration_time()) >= dangling_timeout
                    && Some(peer.proof().id()) != local_proof
            })
            .map(|peer| peer.peer_id())
            .collect();

        for peer_id in dangling_peer_ids {
            let Some(proof) = pool.remove_bound(peer_id) else { continue };
            let id = proof.id();
            nodes.demote_bound(peer_id, id);
            self.memo.insert(id);
            nodes.raise_should_request_more_nodes();
            report.removed.push(id);
            warn!(proof_id = ?id, "bound peer swept as dangling");

            let outpoints: Vec<_> = proof.outpoints().collect();
            if let Some(rival_id) = pool.promote_best_rival(&outpoints, now, cooldown) {
                if let Some(rival_peer_id) = pool.peer_id_for_proof(rival_id) {
                    nodes.promote_pending(rival_id, rival_peer_id);
                }
                report.rivals_promoted.push(rival_id);
            }
        }

        report
    }
}
