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

//! Weight-proportional random selection: a peer drawn proportional to its score, and a node drawn
//! from among a selected peer's eligible bound nodes.

use rand::Rng;
use tracing::trace;

use crate::node_binder::NodeBinder;
use crate::pool::PoolManager;
use crate::types::{NodeId, PeerId, WallClockSeconds};

/// Number of `select_peer` draws `select_node` will retry before giving up and raising
/// `should_request_more_nodes`.
const SELECT_NODE_ATTEMPTS: u32 = 4;

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSelector;

impl RandomSelector {
    pub fn new() -> Self {
        Self
    }

    /// Draws a peer id with probability proportional to its score. `NONE` if there are no Bound
    /// peers with positive live score.
    pub fn select_peer(&self, pool: &PoolManager, rng: &mut impl Rng) -> Option<PeerId> {
        let max = pool.slot_table().slot_count();
        if max == 0 {
            return None;
        }
        let s = rng.gen_range(0, max);
        let picked = pool.slot_table().select(s, max);
        trace!(draw = s, max, peer = ?picked, "select_peer draw");
        picked
    }

    /// Picks a node eligible at `now`, weighted by its peer's score: draws a peer via
    /// [`Self::select_peer`], then picks uniformly among that peer's eligible bound nodes. Retries
    /// up to a fixed attempt budget before giving up; on exhaustion, raises
    /// `should_request_more_nodes` on `nodes`.
    pub fn select_node(
        &self,
        pool: &PoolManager,
        nodes: &mut NodeBinder,
        rng: &mut impl Rng,
        now: WallClockSeconds,
    ) -> Option<NodeId> {
        for _ in 0..SELECT_NODE_ATTEMPTS {
            let Some(peer_id) = self.select_peer(pool, rng) else {
                break;
            };
            let eligible: Vec<NodeId> = nodes.eligible_nodes_of(peer_id, now).collect();
            if eligible.is_empty() {
                continue;
            }
            let index = rng.gen_range(0, eligible.len());
            return Some(eligible[index]);
        }
        nodes.raise_should_request_more_nodes();
        None
    }
}
