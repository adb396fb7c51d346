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

//! Recognized configuration for a [`crate::PeerManager`].
//!
//! Values are validated once at construction time (`PeerManagerConfig::new`) rather than clamped
//! silently at each use site - an embedding application that builds this from its own
//! config-loading layer (`figment`, `config-rs`, a TOML file) gets a single, early error instead
//! of surprising behavior downstream.

use serde_derive::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Amount;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("stake_utxo_confirmations must be positive")]
    StakeUtxoConfirmationsNotPositive,
    #[error("proof_dust_threshold must be positive")]
    ProofDustThresholdNotPositive,
    #[error("max_immature_proofs must be positive")]
    MaxImmatureProofsNotPositive,
}

/// Recognized, validated configuration for a [`crate::PeerManager`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerManagerConfig {
    /// Minimum confirmation depth a stake's UTXO must reach before its proof can be Bound.
    stake_utxo_confirmations: u32,
    /// Seconds a Bound proof is immune to being replaced by a preferred conflicting rival.
    conflicting_proof_cooldown: u64,
    /// Minimum amount a single stake must provide to count towards a proof's score.
    proof_dust_threshold: Amount,
    /// Maximum number of proofs the Immature pool may hold at once.
    max_immature_proofs: usize,
    /// Seconds a Bound peer may sit with zero attached nodes before it is swept as dangling.
    dangling_timeout: u64,
}

impl PeerManagerConfig {
    /// Validates and constructs a configuration. This is the only way to obtain a
    /// `PeerManagerConfig`; there is no way to construct one holding invalid values.
    pub fn new(
        stake_utxo_confirmations: u32,
        conflicting_proof_cooldown: u64,
        proof_dust_threshold: Amount,
        max_immature_proofs: usize,
        dangling_timeout: u64,
    ) -> Result<Self, ConfigError> {
        if stake_utxo_confirmations == 0 {
            return Err(ConfigError::StakeUtxoConfirmationsNotPositive);
        }
        if proof_dust_threshold == 0 {
            return Err(ConfigError::ProofDustThresholdNotPositive);
        }
        if max_immature_proofs == 0 {
            return Err(ConfigError::MaxImmatureProofsNotPositive);
        }
        Ok(Self {
            stake_utxo_confirmations,
            conflicting_proof_cooldown,
            proof_dust_threshold,
            max_immature_proofs,
            dangling_timeout,
        })
    }

    pub fn stake_utxo_confirmations(&self) -> u32 {
        self.stake_utxo_confirmations
    }

    pub fn conflicting_proof_cooldown(&self) -> u64 {
        self.conflicting_proof_cooldown
    }

    pub fn proof_dust_threshold(&self) -> Amount {
        self.proof_dust_threshold
    }

    pub fn max_immature_proofs(&self) -> usize {
        self.max_immature_proofs
    }

    pub fn dangling_timeout(&self) -> u64 {
        self.dangling_timeout
    }
}

impl Default for PeerManagerConfig {
    /// Conservative defaults for a freshly bootstrapped node: a 2-block stake maturity window, a
    /// 10,000-unit dust floor, a 1000-entry immature pool, and a 900s (15 minute) dangling
    /// timeout.
    fn default() -> Self {
        Self {
            stake_utxo_confirmations: 2,
            conflicting_proof_cooldown: 2 * 60 * 60,
            proof_dust_threshold: 10_000,
            max_immature_proofs: 1000,
            dangling_timeout: 15 * 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_confirmations() {
        assert_eq!(
            PeerManagerConfig::new(0, 0, 1, 1, 0).unwrap_err(),
            ConfigError::StakeUtxoConfirmationsNotPositive
        );
    }

    #[test]
    fn rejects_zero_dust_threshold() {
        assert_eq!(
            PeerManagerConfig::new(1, 0, 0, 1, 0).unwrap_err(),
            ConfigError::ProofDustThresholdNotPositive
        );
    }

    #[test]
    fn rejects_zero_immature_cap() {
        assert_eq!(
            PeerManagerConfig::new(1, 0, 1, 0, 0).unwrap_err(),
            ConfigError::MaxImmatureProofsNotPositive
        );
    }

    #[test]
    fn accepts_sane_values() {
        let cfg = PeerManagerConfig::new(2, 7200, 10_000, 1000, 900).unwrap();
        assert_eq!(cfg.stake_utxo_confirmations(), 2);
        assert_eq!(cfg.dangling_timeout(), 900);
    }

    #[test]
    fn default_matches_documented_values() {
        let cfg = PeerManagerConfig::default();
        assert_eq!(cfg.dangling_timeout(), 900);
        assert_eq!(cfg.max_immature_proofs(), 1000);
    }

    #[test]
    fn round_trips_through_json() {
        let cfg = PeerManagerConfig::new(2, 7200, 10_000, 1000, 900).unwrap();
        let json = serde_json::to_string(&cfg).unwrap();
        let restored: PeerManagerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, restored);
    }
}
