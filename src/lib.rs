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

//! Stake-weighted proof and peer admission for Avalanche pre-consensus.
//!
//! This crate is the subsystem that admits, arbitrates, indexes, and weight-samples the set of
//! proofs (stake declarations) and nodes (network peers) that participate in a UTXO-based node's
//! Avalanche pre-consensus layer. It is deliberately narrow: proof encoding/decoding, signature
//! verification, on-disk persistence, chain-state management, networking transport, and the
//! Avalanche voting protocol itself all live elsewhere and are consulted here only through the
//! [`proof::UtxoView`] and [`proof::ProofVerifier`] collaborator traits.
//!
//! The public façade is [`PeerManager`]. Everything else - [`slot_table`], [`proof_index`],
//! [`conflict`], [`pool`], [`node_binder`], [`maturity`], [`dangling`], [`snapshot`], and
//! [`selector`] - is an internal component module that [`PeerManager`] wires together under a
//! single-writer/many-reader lock; they are `pub` so an embedding application can unit-test or
//! instrument them directly, but [`PeerManager`] is the supported entry point.

pub mod clock;
pub mod config;
pub mod conflict;
pub mod dangling;
pub mod error;
pub mod maturity;
pub mod node_binder;
pub mod peer_manager;
pub mod pool;
pub mod proof;
pub mod proof_index;
pub mod selector;
pub mod slot_table;
pub mod snapshot;
pub mod types;

pub use clock::wall_clock_now;
pub use config::{ConfigError, PeerManagerConfig};
pub use conflict::ConflictArbiter;
pub use dangling::{DanglingSweepReport, DanglingSweeper};
pub use error::{PeerManagerError, ProofRegistrationResult, RegistrationMode, RejectMode};
pub use maturity::{MaturityReport, MaturityTracker};
pub use node_binder::{NodeBinder, NodeBinding, NodeInfo};
pub use peer_manager::PeerManager;
pub use pool::{Peer, PoolManager};
pub use proof::{validate_stakes, ChainTip, Proof, ProofBuilder, ProofBuilderError, ProofVerifier, Stake, StakeValidation, UtxoView};
pub use proof_index::{ProofIndex, ProofIndexError};
pub use selector::RandomSelector;
pub use slot_table::{Slot, SlotIndex, SlotTable};
pub use snapshot::SnapshotPublisher;
pub use types::{Amount, Height, MasterPubKey, NodeId, OutPoint, PeerId, ProofId, Score, WallClockSeconds, NO_PEER};
