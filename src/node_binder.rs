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

//! Many-to-one node-to-peer binding, with a Pending side for nodes that reference a proof id this
//! manager does not (yet, or anymore) have Bound.
//!
//! A node is always in exactly one of two disjoint maps: [`NodeBinder::bound`] or
//! [`NodeBinder::pending`]. Pool transitions (a proof entering or leaving Bound) move whole
//! groups of nodes between the two maps; see [`NodeBinder::promote_pending`] and
//! [`NodeBinder::demote_bound`].

use std::collections::HashMap;

use crate::types::{NodeId, PeerId, ProofId, WallClockSeconds};

#[derive(Debug, Clone, Copy)]
struct BoundNode {
    peer_id: PeerId,
    next_request_time: WallClockSeconds,
    avaproofs_sent: bool,
}

#[derive(Debug, Clone, Copy)]
struct PendingNode {
    proof_id: ProofId,
    next_request_time: WallClockSeconds,
    avaproofs_sent: bool,
}

/// What a node is currently bound to, returned by [`NodeBinder::node_info`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeBinding {
    Bound { peer_id: PeerId },
    Pending { proof_id: ProofId },
}

/// A point-in-time view of one node, used by read-only observers (`PeerManager::for_node`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeInfo {
    pub binding: NodeBinding,
    pub next_request_time: WallClockSeconds,
    pub avaproofs_sent: bool,
}

#[derive(Debug, Default)]
pub struct NodeBinder {
    bound: HashMap<NodeId, BoundNode>,
    pending: HashMap<NodeId, PendingNode>,
    should_request_more_nodes: bool,
}

impl NodeBinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.bound.len()
    }

    pub fn pending_node_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_bound(&self, node_id: NodeId) -> bool {
        self.bound.contains_key(&node_id)
    }

    pub fn is_pending(&self, node_id: NodeId) -> bool {
        self.pending.contains_key(&node_id)
    }

    pub fn peer_of(&self, node_id: NodeId) -> Option<PeerId> {
        self.bound.get(&node_id).map(|n| n.peer_id)
    }

    pub fn nodes_of_peer(&self, peer_id: PeerId) -> impl Iterator<Item = NodeId> + '_ {
        self.bound
            .iter()
            .filter(move |(_, n)| n.peer_id == peer_id)
            .map(|(id, _)| *id)
    }

    /// Proof ids every Pending node is currently waiting on. Used by `PeerManager::verify` to
    /// check invariant P5 (a Pending node's proof id is never also Bound).
    pub fn pending_proof_ids(&self) -> impl Iterator<Item = ProofId> + '_ {
        self.pending.values().map(|n| n.proof_id)
    }

    /// Point-in-time snapshot of one node's binding and scheduling state.
    pub fn node_info(&self, node_id: NodeId) -> Option<NodeInfo> {
        if let Some(node) = self.bound.get(&node_id) {
            return Some(NodeInfo {
                binding: NodeBinding::Bound { peer_id: node.peer_id },
                next_request_time: node.next_request_time,
                avaproofs_sent: node.avaproofs_sent,
            });
        }
        self.pending.get(&node_id).map(|node| NodeInfo {
            binding: NodeBinding::Pending { proof_id: node.proof_id },
            next_request_time: node.next_request_time,
            avaproofs_sent: node.avaproofs_sent,
        })
    }

    /// Binds `node_id` to `peer_id` directly - used when the caller (pool admission) already
    /// knows the proof is Bound. Removes any prior Pending entry for this node.
    pub fn add_bound(&mut self, node_id: NodeId, peer_id: PeerId) {
        self.pending.remove(&node_id);
        let entry = self.bound.entry(node_id).or_insert(BoundNode {
            peer_id,
            next_request_time: 0,
            avaproofs_sent: false,
        });
        entry.peer_id = peer_id;
    }

    /// Places `node_id` in the Pending set, keyed by the proof id it is waiting on. Removes any
    /// prior Bound entry for this node.
    pub fn add_pending(&mut self, node_id: NodeId, proof_id: ProofId) {
        self.bound.remove(&node_id);
        let entry = self.pending.entry(node_id).or_insert(PendingNode {
            proof_id,
            next_request_time: 0,
            avaproofs_sent: false,
        });
        entry.proof_id = proof_id;
    }

    /// Removes `node_id` from whichever set it is in. Returns the peer it was bound to, if any.
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<PeerId> {
        if let Some(node) = self.bound.remove(&node_id) {
            return Some(node.peer_id);
        }
        self.pending.remove(&node_id);
        None
    }

    pub fn update_next_request_time(&mut self, node_id: NodeId, t: WallClockSeconds) -> bool {
        if let Some(node) = self.bound.get_mut(&node_id) {
            node.next_request_time = t;
            return true;
        }
        if let Some(node) = self.pending.get_mut(&node_id) {
            node.next_request_time = t;
            return true;
        }
        false
    }

    /// Sets the latch on first call for a given node; returns `true` only the first time.
    pub fn latch_avaproofs_sent(&mut self, node_id: NodeId) -> bool {
        if let Some(node) = self.bound.get_mut(&node_id) {
            if node.avaproofs_sent {
                return false;
            }
            node.avaproofs_sent = true;
            return true;
        }
        false
    }

    /// Moves every Pending node waiting on `proof_id` to Bound against `peer_id`. Called when a
    /// proof transitions into the Bound pool.
    pub fn promote_pending(&mut self, proof_id: ProofId, peer_id: PeerId) {
        let waiting: Vec<NodeId> = self
            .pending
            .iter()
            .filter(|(_, n)| n.proof_id == proof_id)
            .map(|(id, _)| *id)
            .collect();
        for node_id in waiting {
            if let Some(node) = self.pending.remove(&node_id) {
                self.bound.insert(
                    node_id,
                    BoundNode {
                        peer_id,
                        next_request_time: node.next_request_time,
                        avaproofs_sent: node.avaproofs_sent,
                    },
                );
            }
        }
    }

    /// Moves every node Bound to `peer_id` back to Pending, keyed on `proof_id`. Called when a
    /// proof transitions out of the Bound pool (demotion, removal, expiry).
    pub fn demote_bound(&mut self, peer_id: PeerId, proof_id: ProofId) {
        let bound_nodes: Vec<NodeId> = self
            .bound
            .iter()
            .filter(|(_, n)| n.peer_id == peer_id)
            .map(|(id, _)| *id)
            .collect();
        for node_id in bound_nodes {
            if let Some(node) = self.bound.remove(&node_id) {
                self.pending.insert(
                    node_id,
                    PendingNode {
                        proof_id,
                        next_request_time: node.next_request_time,
                        avaproofs_sent: node.avaproofs_sent,
                    },
                );
            }
        }
    }

    /// Candidate bound nodes of `peer_id` eligible for selection at `now` (`next_request_time <=
    /// now`).
    pub fn eligible_nodes_of(&self, peer_id: PeerId, now: WallClockSeconds) -> impl Iterator<Item = NodeId> + '_ {
        self.bound
            .iter()
            .filter(move |(_, n)| n.peer_id == peer_id && n.next_request_time <= now)
            .map(|(id, _)| *id)
    }

    pub fn raise_should_request_more_nodes(&mut self) {
        self.should_request_more_nodes = true;
    }

    /// One-shot read: returns the flag's value and clears it.
    pub fn take_should_request_more_nodes(&mut self) -> bool {
        std::mem::take(&mut self.should_request_more_nodes)
    }
}
