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

use thiserror::Error;

use crate::types::ProofId;

/// Outcome of a [`crate::PeerManager::register_proof`] call.
///
/// This is not a `std::error::Error` - every variant but [`Self::Valid`] is an expected, routine
/// outcome of admission, not a bug. Callers match on it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofRegistrationResult {
    /// Accepted and bound to a new peer.
    Valid,
    /// A proof with this id is already present in the Bound or Conflicting pool.
    AlreadyRegistered,
    /// The proof failed structural/signature/payout-script validation.
    Invalid,
    /// At least one staked outpoint was not found in the current UTXO view.
    MissingUtxo,
    /// Every staked outpoint was found, but at least one is below the maturity depth.
    Immature,
    /// The proof conflicts with a Bound proof and lost the preference check.
    Conflicting,
    /// The proof conflicts with a Bound proof, lost the preference check, and the Conflicting
    /// pool is full and not willing to evict anything for it.
    Rejected,
    /// The proof conflicts with a Bound proof whose cooldown has not elapsed yet.
    CooldownNotElapsed,
    /// This proof id was recently swept by [`crate::PeerManager::cleanup_dangling_proofs`] and
    /// may not be re-admitted until a node binds to it through another path.
    Dangling,
}

impl ProofRegistrationResult {
    /// True only for [`Self::Valid`]; every other variant is a recognized non-admission outcome,
    /// not an error.
    pub fn is_valid(self) -> bool {
        matches!(self, ProofRegistrationResult::Valid)
    }
}

/// How [`crate::PeerManager::register_proof`] should treat a conflict with an existing Bound
/// proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationMode {
    /// Obey conflict preference and cooldown as described in the pool transition table.
    Default,
    /// Bypass the conflict-preference check and the cooldown, unconditionally promoting the
    /// candidate to Bound and demoting any incumbent to Conflicting.
    ///
    /// This does **not** bypass expiration or maturity checks - those still run first. See
    /// `DESIGN.md` for why this crate resolves the original spec's open question this way.
    ForceAccept,
}

/// How [`crate::PeerManager::reject_proof`] should treat the rejected proof going forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectMode {
    /// Remove the proof; it may be registered again later.
    Default,
    /// Remove the proof and memoize it as invalidated for the lifetime of this manager, so a
    /// later `register_proof` with the same id is rejected without re-running validation.
    Invalidate,
}

/// Programmer/contract errors: failures that are not a routine part of proof admission.
#[derive(Debug, Error)]
pub enum PeerManagerError {
    #[error("proof {0:?} is not registered with this peer manager")]
    ProofNotFound(ProofId),
    #[error("peer id {0} does not exist")]
    PeerNotFound(crate::types::PeerId),
    #[error("internal consistency check failed: {0}")]
    InvariantViolation(&'static str),
    #[error("invalid peer manager configuration: {0}")]
    InvalidConfig(#[from] crate::config::ConfigError),
}
