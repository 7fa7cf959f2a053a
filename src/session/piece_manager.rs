// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::time::{Duration, Instant};

use sha1::{Digest, Sha1};
use tracing::{event, Level};

use crate::errors::{BlockError, ManifestError};
use crate::manifest::Manifest;
use crate::session::block_manager::{generate_blocks, Block, BlockAddress, BlockState};
use crate::torrent_file::DIGEST_LEN;

#[derive(Debug, PartialEq)]
pub enum WriteOutcome {
    /// The block moved to FULL. `was_pending` tells whether it was still
    /// counted as in flight.
    Written { was_pending: bool, piece_ready: bool },
    Duplicate,
}

#[derive(Debug, PartialEq)]
pub enum CompletionOutcome {
    Incomplete,
    AlreadyComplete,
    Verified(Vec<u8>),
    DigestMismatch,
}

#[derive(Debug, Clone)]
pub struct Piece {
    pub index: u32,
    pub length: u32,
    pub global_offset: u64,
    pub digest: [u8; DIGEST_LEN],
    pub blocks: Vec<Block>,
    pub is_full: bool,
    // Allocated on the first write, released once the piece is verified.
    buffer: Option<Vec<u8>>,
}

impl Piece {
    pub fn all_blocks_full(&self) -> bool {
        self.blocks.iter().all(|b| b.state == BlockState::Full)
    }

    pub fn has_received_any(&self) -> bool {
        self.blocks.iter().any(|b| b.state == BlockState::Full)
    }

    pub fn full_blocks(&self) -> usize {
        self.blocks
            .iter()
            .filter(|b| b.state == BlockState::Full)
            .count()
    }

    fn reset(&mut self) {
        for block in &mut self.blocks {
            block.reset();
        }
        self.buffer = None;
    }
}

/// Arena of pieces and their blocks, addressed by `(piece, block)` index.
#[derive(Debug, Clone)]
pub struct PieceStore {
    pieces: Vec<Piece>,
    total_blocks: usize,
}

impl PieceStore {
    pub fn generate(manifest: &Manifest, chunk_size: u32) -> Result<Self, ManifestError> {
        if chunk_size == 0 || manifest.piece_length > u32::MAX as u64 {
            return Err(ManifestError::UnsupportedGeometry {
                piece_length: manifest.piece_length,
                chunk_size,
            });
        }

        let pieces: Vec<Piece> = manifest
            .digests
            .iter()
            .enumerate()
            .map(|(i, digest)| {
                let length = manifest.piece_len(i) as u32;
                Piece {
                    index: i as u32,
                    length,
                    global_offset: manifest.piece_offset(i),
                    digest: *digest,
                    blocks: generate_blocks(i as u32, length, chunk_size),
                    is_full: false,
                    buffer: None,
                }
            })
            .collect();

        let total_blocks = pieces.iter().map(|p| p.blocks.len()).sum();
        Ok(Self {
            pieces,
            total_blocks,
        })
    }

    pub fn piece(&self, piece_index: u32) -> Option<&Piece> {
        self.pieces.get(piece_index as usize)
    }

    pub fn block(&self, addr: BlockAddress) -> Option<&Block> {
        self.piece(addr.piece_index)
            .and_then(|p| p.blocks.get(addr.block_index as usize))
    }

    pub fn block_mut(&mut self, addr: BlockAddress) -> Option<&mut Block> {
        self.pieces
            .get_mut(addr.piece_index as usize)
            .and_then(|p| p.blocks.get_mut(addr.block_index as usize))
    }

    pub fn total_pieces(&self) -> usize {
        self.pieces.len()
    }

    pub fn total_blocks(&self) -> usize {
        self.total_blocks
    }

    /// Copies `payload` into the block's slot of the piece buffer and marks
    /// the block FULL. Writing a block that is already FULL, or any block of
    /// a verified piece, changes nothing.
    pub fn write(
        &mut self,
        piece_index: u32,
        block_index: u32,
        payload: &[u8],
        now: Instant,
    ) -> Result<WriteOutcome, BlockError> {
        let piece = self
            .pieces
            .get_mut(piece_index as usize)
            .ok_or(BlockError::UnknownPiece(piece_index))?;
        let block = piece
            .blocks
            .get(block_index as usize)
            .ok_or(BlockError::UnknownBlock {
                piece: piece_index,
                block: block_index,
            })?;

        if piece.is_full || block.state == BlockState::Full {
            return Ok(WriteOutcome::Duplicate);
        }
        if payload.len() != block.length as usize {
            return Err(BlockError::LengthMismatch {
                piece: piece_index,
                block: block_index,
                expected: block.length,
                actual: payload.len(),
            });
        }

        let start = block.offset as usize;
        let was_pending = block.state == BlockState::Pending;
        let piece_len = piece.length as usize;
        let buffer = piece.buffer.get_or_insert_with(|| vec![0u8; piece_len]);
        buffer[start..start + payload.len()].copy_from_slice(payload);

        piece.blocks[block_index as usize].mark_full(now);

        Ok(WriteOutcome::Written {
            was_pending,
            piece_ready: piece.all_blocks_full(),
        })
    }

    /// Verifies a piece whose blocks are all FULL. On a digest match the piece
    /// is marked complete and its data handed back for persisting; on a
    /// mismatch every block of the piece returns to FREE.
    pub fn try_complete(&mut self, piece_index: u32) -> CompletionOutcome {
        let Some(piece) = self.pieces.get_mut(piece_index as usize) else {
            return CompletionOutcome::Incomplete;
        };
        if piece.is_full {
            return CompletionOutcome::AlreadyComplete;
        }
        if !piece.all_blocks_full() {
            return CompletionOutcome::Incomplete;
        }

        let data = piece.buffer.take().unwrap_or_default();
        if Sha1::digest(&data).as_slice() == piece.digest.as_slice() {
            piece.is_full = true;
            CompletionOutcome::Verified(data)
        } else {
            event!(
                Level::DEBUG,
                piece = piece_index,
                "Digest mismatch, resetting piece blocks."
            );
            piece.reset();
            CompletionOutcome::DigestMismatch
        }
    }

    pub fn all_complete(&self) -> bool {
        self.pieces.iter().all(|p| p.is_full)
    }

    /// Returns every PENDING block older than `timeout` to FREE.
    pub fn expire_pending(&mut self, now: Instant, timeout: Duration) -> Vec<BlockAddress> {
        let mut expired = Vec::new();
        for piece in self.pieces.iter_mut().filter(|p| !p.is_full) {
            for block in piece.blocks.iter_mut() {
                if block.is_expired(now, timeout) {
                    block.reset();
                    expired.push(block.address());
                }
            }
        }
        expired
    }

    pub fn pieces_complete(&self) -> usize {
        self.pieces.iter().filter(|p| p.is_full).count()
    }

    pub fn blocks_complete(&self) -> usize {
        self.pieces.iter().map(|p| p.full_blocks()).sum()
    }

    pub fn pending_blocks(&self) -> usize {
        self.pieces
            .iter()
            .flat_map(|p| p.blocks.iter())
            .filter(|b| b.state == BlockState::Pending)
            .count()
    }
}
