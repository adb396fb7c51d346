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

//! Clock plumbing for callers of [`crate::PeerManager`].
//!
//! Every operation that reasons about time - registration, cooldown, node scheduling, dangling
//! detection - takes its `now` as an explicit [`crate::types::WallClockSeconds`] parameter. Nothing
//! inside this crate calls a system clock; this module exists only to give an embedding
//! application one correct, shared way to produce that parameter. Tests throughout this crate
//! simulate time by advancing a single mock clock value rather than keeping wall and steady
//! clocks distinct.

use chrono::Utc;

use crate::types::WallClockSeconds;

/// Current wall-clock time in seconds since the Unix epoch. Not called anywhere inside this
/// crate - intended only for an embedding application to produce `now` arguments with.
pub fn wall_clock_now() -> WallClockSeconds {
    Utc::now().timestamp().max(0) as WallClockSeconds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wall_clock_now_is_positive_and_recent() {
        let now = wall_clock_now();
        // Sanity bound: some time after this crate was written, well before any plausible clock
        // skew would make the check brittle.
        assert!(now > 1_700_000_000);
    }
}
