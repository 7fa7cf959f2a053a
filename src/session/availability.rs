// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Which pieces the responder currently holds.
//!
//! Wire format: one chunk of exactly `ceil(P / 8)` bytes, MSB-first, so bit 7
//! of byte 0 is piece 0. Padding bits in the last byte are ignored.

use std::time::{Duration, Instant};

use tracing::{event, Level};

pub fn encode_bitfield(bits: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];
    for (i, &has) in bits.iter().enumerate() {
        if has {
            bytes[i / 8] |= 0x80 >> (i % 8);
        }
    }
    bytes
}

/// Decodes a packed bitfield for `piece_count` pieces; `None` if the payload
/// has the wrong size.
pub fn decode_bitfield(payload: &[u8], piece_count: usize) -> Option<Vec<bool>> {
    if payload.len() != piece_count.div_ceil(8) {
        return None;
    }
    Some(
        (0..piece_count)
            .map(|i| payload[i / 8] & (0x80 >> (i % 8)) != 0)
            .collect(),
    )
}

#[derive(Debug, Clone)]
pub struct RemoteAvailability {
    bits: Vec<bool>,
    refresh_interval: Duration,
    last_request: Option<Instant>,
    refreshes: u64,
}

impl RemoteAvailability {
    pub fn new(piece_count: usize, refresh_interval: Duration) -> Self {
        Self {
            bits: vec![false; piece_count],
            refresh_interval,
            last_request: None,
            refreshes: 0,
        }
    }

    /// True before the first request and whenever the refresh interval has
    /// elapsed since the last one.
    pub fn refresh_due(&self, now: Instant) -> bool {
        match self.last_request {
            None => true,
            Some(t) => now.saturating_duration_since(t) > self.refresh_interval,
        }
    }

    pub fn mark_requested(&mut self, now: Instant) {
        self.last_request = Some(now);
    }

    /// Replaces the whole vector from a bitfield response. Multi-chunk or
    /// wrongly sized payloads are discarded.
    pub fn apply(&mut self, payload: &[u8], end_chunk_num: u32) -> bool {
        if end_chunk_num > 0 {
            event!(
                Level::DEBUG,
                end_chunk_num,
                "Discarding multi-chunk bitfield response."
            );
            return false;
        }
        match decode_bitfield(payload, self.bits.len()) {
            Some(bits) => {
                self.bits = bits;
                self.refreshes += 1;
                true
            }
            None => {
                event!(
                    Level::DEBUG,
                    got = payload.len(),
                    expected = self.bits.len().div_ceil(8),
                    "Discarding bitfield with size mismatch."
                );
                false
            }
        }
    }

    pub fn has_piece(&self, piece_index: u32) -> bool {
        self.bits.get(piece_index as usize).copied().unwrap_or(false)
    }

    pub fn available_count(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    pub fn refreshes(&self) -> u64 {
        self.refreshes
    }
}
