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

//! Publishes a lock-free, point-in-time view of the Bound proof set.
//!
//! `im::OrdMap` gives structural sharing: cloning the map returned by [`SnapshotPublisher::publish`]
//! is O(1), and later mutation of the live pool never alters a clone a reader is still holding.

use std::sync::Arc;

use im::OrdMap;

use crate::pool::PoolManager;
use crate::proof::Proof;
use crate::types::ProofId;

#[derive(Debug, Default, Clone, Copy)]
pub struct SnapshotPublisher;

impl SnapshotPublisher {
    pub fn new() -> Self {
        Self
    }

    /// Builds a persistent, proof-id-ordered map of exactly the Bound set at this call.
    pub fn publish(&self, pool: &PoolManager) -> OrdMap<ProofId, Arc<Proof>> {
        pool.bound_proofs().map(|proof| (proof.id(), proof.clone())).collect()
    }
}
