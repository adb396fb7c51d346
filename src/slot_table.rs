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

//! A dense, append-only layout of peers on a number line, used for O(log n) weight-proportional
//! sampling.
//!
//! Each peer occupies a half-open interval `[start, start + score)`. Sampling draws a uniform
//! integer over the whole address space and binary-searches for the owning interval. Removal
//! tombstones a slot (zeroes its score) rather than shifting the array; `compact` is the explicit,
//! batched operation that reclaims tombstoned space.

use crate::types::PeerId;

/// One entry in a [`SlotTable`]. `score == 0` marks a tombstone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub start: u64,
    pub score: u32,
    pub peer_id: PeerId,
}

impl Slot {
    /// Whether this slot's interval contains `s`. Tombstones (`score == 0`) never contain
    /// anything.
    pub fn contains(&self, s: u64) -> bool {
        self.score > 0 && s >= self.start && s < self.start + u64::from(self.score)
    }
}

/// Handle into a [`SlotTable`], returned by [`SlotTable::append`].
pub type SlotIndex = usize;

#[derive(Debug, Default)]
pub struct SlotTable {
    slots: Vec<Slot>,
    next_start: u64,
    fragmentation: u64,
}

impl SlotTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a new slot `[tail, tail + score)` and returns its index. O(1).
    pub fn append(&mut self, score: u32, peer_id: PeerId) -> SlotIndex {
        let start = self.next_start;
        self.slots.push(Slot { start, score, peer_id });
        self.next_start = self.next_start.saturating_add(u64::from(score));
        self.slots.len() - 1
    }

    /// Tombstones the slot at `slot_index`. If it is the last slot in the table, the table
    /// shrinks instead - no fragmentation is introduced by removing the tail.
    pub fn remove(&mut self, slot_index: SlotIndex) {
        let removed_score = match self.slots.get(slot_index) {
            Some(slot) => slot.score,
            None => return,
        };
        if slot_index == self.slots.len() - 1 {
            self.slots.pop();
            self.next_start = self.next_start.saturating_sub(u64::from(removed_score));
        } else {
            self.slots[slot_index].score = 0;
            self.fragmentation = self.fragmentation.saturating_add(u64::from(removed_score));
        }
    }

    /// Binary searches for the slot containing `s`, given an explicit upper bound `max` (the
    /// caller's notion of the sampled address space - ordinarily [`Self::slot_count`]).
    ///
    /// Returns `None` if `s >= max` or if `s` lands on a gap/tombstone.
    pub fn select(&self, s: u64, max: u64) -> Option<PeerId> {
        if s >= max {
            return None;
        }
        let idx = self.slots.partition_point(|slot| slot.start <= s);
        if idx == 0 {
            return None;
        }
        let slot = &self.slots[idx - 1];
        if slot.contains(s) {
            Some(slot.peer_id)
        } else {
            None
        }
    }

    /// Rebuilds the array dropping tombstones and reassigning `start` values. `relocate` is
    /// called with `(peer_id, new_slot_index)` for every surviving slot, so the caller can fix up
    /// each peer's cached `slot_index`.
    ///
    /// Returns the amount of fragmentation reclaimed.
    pub fn compact(&mut self, mut relocate: impl FnMut(PeerId, SlotIndex)) -> u64 {
        let reclaimed = self.fragmentation;
        let mut compacted = Vec::with_capacity(self.slots.len());
        let mut start = 0u64;
        for slot in &self.slots {
            if slot.score == 0 {
                continue;
            }
            let new_index = compacted.len();
            compacted.push(Slot {
                start,
                score: slot.score,
                peer_id: slot.peer_id,
            });
            relocate(slot.peer_id, new_index);
            start = start.saturating_add(u64::from(slot.score));
        }
        self.slots = compacted;
        self.next_start = start;
        self.fragmentation = 0;
        reclaimed
    }

    /// Position past the last slot: the sum of live and tombstoned spans, including gaps.
    pub fn slot_count(&self) -> u64 {
        self.next_start
    }

    /// Total tombstoned score currently in the table.
    pub fn fragmentation(&self) -> u64 {
        self.fragmentation
    }

    /// Sum of live slot scores (`slot_count() - fragmentation()`).
    pub fn live_score(&self) -> u64 {
        self.next_start.saturating_sub(self.fragmentation)
    }

    /// Direct slot lookup by index, used by [`crate::peer_manager::PeerManager::verify`] to
    /// cross-check invariant P1 and by tests to inspect table layout after mutation.
    pub(crate) fn slot_at(&self, slot_index: SlotIndex) -> Option<&Slot> {
        self.slots.get(slot_index)
    }
}
