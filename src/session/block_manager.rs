// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::time::{Duration, Instant};

pub const DEFAULT_CHUNK_SIZE: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockAddress {
    pub piece_index: u32,
    pub block_index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockState {
    #[default]
    Free,
    Pending,
    Full,
}

/// One transport-addressable chunk of a piece. The payload itself lives in
/// the owning piece's assembly buffer at `offset..offset + length`.
#[derive(Debug, Clone)]
pub struct Block {
    pub piece_index: u32,
    pub block_index: u32,
    pub offset: u32,
    pub length: u32,
    pub state: BlockState,
    pub last_seen: Option<Instant>,
}

impl Block {
    pub fn address(&self) -> BlockAddress {
        BlockAddress {
            piece_index: self.piece_index,
            block_index: self.block_index,
        }
    }

    pub fn mark_pending(&mut self, now: Instant) {
        self.state = BlockState::Pending;
        self.last_seen = Some(now);
    }

    pub fn mark_full(&mut self, now: Instant) {
        self.state = BlockState::Full;
        self.last_seen = Some(now);
    }

    pub fn reset(&mut self) {
        self.state = BlockState::Free;
        self.last_seen = None;
    }

    /// A pending block whose request is older than `timeout`.
    pub fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        self.state == BlockState::Pending
            && self
                .last_seen
                .is_some_and(|seen| now.saturating_duration_since(seen) > timeout)
    }
}

pub fn blocks_in_piece(piece_len: u32, chunk_size: u32) -> u32 {
    piece_len.div_ceil(chunk_size)
}

/// Partitions a piece of `piece_len` bytes into `chunk_size` blocks; the last
/// block carries the remainder.
pub fn generate_blocks(piece_index: u32, piece_len: u32, chunk_size: u32) -> Vec<Block> {
    (0..blocks_in_piece(piece_len, chunk_size))
        .map(|block_index| {
            let offset = block_index * chunk_size;
            Block {
                piece_index,
                block_index,
                offset,
                length: std::cmp::min(chunk_size, piece_len - offset),
                state: BlockState::Free,
                last_seen: None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHUNK: u32 = DEFAULT_CHUNK_SIZE;

    #[test]
    fn test_exact_alignment() {
        let blocks = generate_blocks(3, 2 * CHUNK, CHUNK);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].offset, CHUNK);
        assert_eq!(blocks[1].length, CHUNK);
        assert!(blocks.iter().all(|b| b.piece_index == 3));
        assert!(blocks.iter().all(|b| b.state == BlockState::Free));
    }

    #[test]
    fn test_short_last_block() {
        let blocks = generate_blocks(0, CHUNK + 1, CHUNK);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].length, CHUNK);
        assert_eq!(blocks[1].offset, CHUNK);
        assert_eq!(blocks[1].length, 1);
    }

    #[test]
    fn test_piece_smaller_than_chunk() {
        let blocks = generate_blocks(0, 100, CHUNK);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].length, 100);
        assert_eq!(blocks_in_piece(100, CHUNK), 1);
    }

    #[test]
    fn test_state_transitions_and_expiry() {
        let mut block = generate_blocks(0, CHUNK, CHUNK).remove(0);
        let t0 = Instant::now();
        let timeout = Duration::from_secs(4);

        assert!(!block.is_expired(t0 + Duration::from_secs(10), timeout));

        block.mark_pending(t0);
        assert_eq!(block.state, BlockState::Pending);
        assert!(!block.is_expired(t0 + Duration::from_secs(4), timeout));
        assert!(block.is_expired(t0 + Duration::from_secs(5), timeout));

        block.mark_full(t0 + Duration::from_secs(1));
        assert_eq!(block.state, BlockState::Full);
        assert!(!block.is_expired(t0 + Duration::from_secs(60), timeout));

        block.reset();
        assert_eq!(block.state, BlockState::Free);
        assert!(block.last_seen.is_none());
    }
}
