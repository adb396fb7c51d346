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

//! Plain value types shared by every module in this crate.
//!
//! None of these types know how to serialize themselves to the wire or verify a signature -
//! that's the embedding node's job (see [`crate::proof::ProofVerifier`]). They exist purely as
//! the vocabulary the peer manager reasons about.

use std::fmt;

use serde_derive::{Deserialize, Serialize};

/// Content-hash identifier of a [`crate::proof::Proof`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProofId(pub [u8; 32]);

impl fmt::Debug for ProofId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProofId(")?;
        for byte in &self.0[..4] {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, "..)")
    }
}

/// Dense handle assigned to a [`crate::pool::Peer`] at registration time.
///
/// Peer ids are recycled: once a peer is removed its id may be reused by a later registration.
/// Callers must not treat a `PeerId` as a stable long-term identifier - use the [`ProofId`] for
/// that.
pub type PeerId = u32;

/// Sentinel returned by [`crate::slot_table::SlotTable::select`] and the public facade in place
/// of `Option::None` where the original design used a magic id. Kept only for doc purposes; the
/// Rust API uses `Option<PeerId>` / `Option<NodeId>` throughout instead of a sentinel value.
pub const NO_PEER: PeerId = PeerId::MAX;

/// Externally assigned handle for a network endpoint.
pub type NodeId = u64;

/// A transaction output reference: `(txid, vout)`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: [u8; 32],
    pub vout: u32,
}

impl fmt::Debug for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutPoint(")?;
        for byte in &self.txid[..4] {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, "..:{})", self.vout)
    }
}

/// Amount staked by one UTXO, expressed in the chain's smallest unit.
pub type Amount = u64;

/// Block height at which a stake's UTXO was confirmed.
pub type Height = u32;

/// Integer weight derived from a proof's staked amounts; determines the width of its slot.
pub type Score = u32;

/// Opaque public key authorizing sequence revisions of a proof. Signature verification itself is
/// out of scope for this crate (see [`crate::proof::ProofVerifier`]); this type only needs
/// equality, for the "same master key" branch of [`crate::conflict`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MasterPubKey(pub [u8; 33]);

impl fmt::Debug for MasterPubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterPubKey(")?;
        for byte in &self.0[..4] {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, "..)")
    }
}

/// Wall-clock seconds since the Unix epoch. Never read internally - always supplied by the
/// caller, so tests can simulate mock time by advancing this value directly.
pub type WallClockSeconds = u64;
