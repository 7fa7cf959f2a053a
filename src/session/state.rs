// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::time::{Duration, Instant};

use tracing::{event, Level};

use crate::errors::ManifestError;
use crate::manifest::Manifest;
use crate::session::availability::RemoteAvailability;
use crate::session::block_manager::{BlockAddress, BlockState};
use crate::session::congestion::CubicController;
use crate::session::piece_manager::{CompletionOutcome, PieceStore, WriteOutcome};
use crate::session::{SessionConfig, SessionProgress};

#[derive(Debug)]
pub enum Action {
    /// One pass of the request scheduler.
    Tick { now: Instant },
    BlockReceived {
        piece_index: u32,
        block_index: u32,
        payload: Vec<u8>,
        now: Instant,
    },
    BitfieldReceived {
        payload: Vec<u8>,
        end_chunk_num: u32,
    },
}

#[derive(Debug, PartialEq)]
#[must_use]
pub enum Effect {
    RequestBitfield,
    SendInterest {
        piece_index: u32,
        block_index: u32,
    },
    WritePiece {
        piece_index: u32,
        offset: u64,
        data: Vec<u8>,
    },
    Completed,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionCounters {
    pub requests_sent: u64,
    pub timeouts: u64,
    pub duplicates: u64,
    pub malformed: u64,
    pub digest_failures: u64,
}

/// Everything the scheduler owns: the piece arena, the congestion window and
/// the remote availability vector. Mutated only through [`SessionState::update`].
#[derive(Debug)]
pub struct SessionState {
    pub store: PieceStore,
    pub congestion: CubicController,
    pub availability: RemoteAvailability,
    pub counters: SessionCounters,
    request_timeout: Duration,
    completed: bool,
}

impl SessionState {
    pub fn new(
        manifest: &Manifest,
        config: &SessionConfig,
        now: Instant,
    ) -> Result<Self, ManifestError> {
        let store = PieceStore::generate(manifest, config.chunk_size)?;
        Ok(Self {
            availability: RemoteAvailability::new(store.total_pieces(), config.bitfield_refresh),
            store,
            congestion: CubicController::new(config.cubic, now),
            counters: SessionCounters::default(),
            request_timeout: config.request_timeout,
            completed: false,
        })
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    pub fn progress(&self) -> SessionProgress {
        SessionProgress {
            pieces_complete: self.store.pieces_complete(),
            total_pieces: self.store.total_pieces(),
            blocks_complete: self.store.blocks_complete(),
            total_blocks: self.store.total_blocks(),
            current_window: self.congestion.window(),
            in_flight: self.congestion.in_flight(),
            loss_events: self.congestion.loss_events(),
        }
    }

    pub fn update(&mut self, action: Action) -> Vec<Effect> {
        match action {
            Action::Tick { now } => self.tick(now),
            Action::BlockReceived {
                piece_index,
                block_index,
                payload,
                now,
            } => self.block_received(piece_index, block_index, &payload, now),
            Action::BitfieldReceived {
                payload,
                end_chunk_num,
            } => {
                if self.availability.apply(&payload, end_chunk_num) {
                    event!(
                        Level::DEBUG,
                        available = self.availability.available_count(),
                        refreshes = self.availability.refreshes(),
                        "Remote bitfield refreshed."
                    );
                }
                Vec::new()
            }
        }
    }

    fn tick(&mut self, now: Instant) -> Vec<Effect> {
        if self.completed {
            return Vec::new();
        }
        let mut effects = Vec::new();

        // 1. Availability refresh
        if self.availability.refresh_due(now) {
            self.availability.mark_requested(now);
            effects.push(Effect::RequestBitfield);
        }

        // 2. Timeout sweep: one loss signal per sweep, however many expired
        let expired = self.store.expire_pending(now, self.request_timeout);
        if !expired.is_empty() {
            for _ in &expired {
                self.congestion.on_request_settled();
            }
            self.counters.timeouts += expired.len() as u64;
            self.congestion.on_loss(now);
            event!(
                Level::INFO,
                expired = expired.len(),
                window = self.congestion.window(),
                w_max = self.congestion.w_max(),
                ssthresh = self.congestion.ssthresh(),
                "Request timeout, window reduced."
            );
        }

        // 3. Issue requests in (piece, block) order while credit lasts
        'pieces: for piece_index in 0..self.store.total_pieces() as u32 {
            let Some(piece) = self.store.piece(piece_index) else {
                break;
            };
            if piece.is_full {
                continue;
            }
            if !self.availability.has_piece(piece_index) && !piece.has_received_any() {
                continue;
            }

            for block_index in 0..piece.blocks.len() as u32 {
                let addr = BlockAddress {
                    piece_index,
                    block_index,
                };
                let is_free = self
                    .store
                    .block(addr)
                    .is_some_and(|b| b.state == BlockState::Free);
                if !is_free {
                    continue;
                }
                if !self.congestion.credit_available() {
                    break 'pieces;
                }
                if let Some(block) = self.store.block_mut(addr) {
                    block.mark_pending(now);
                }
                self.congestion.on_request_sent();
                self.counters.requests_sent += 1;
                effects.push(Effect::SendInterest {
                    piece_index,
                    block_index,
                });
            }
        }

        // 4. Window growth is driven by ticks, not by requests
        self.congestion.advance(now);

        effects
    }

    fn block_received(
        &mut self,
        piece_index: u32,
        block_index: u32,
        payload: &[u8],
        now: Instant,
    ) -> Vec<Effect> {
        if self.store.piece(piece_index).is_some_and(|p| p.is_full) {
            self.counters.duplicates += 1;
            event!(
                Level::TRACE,
                piece = piece_index,
                block = block_index,
                "Block for completed piece ignored."
            );
            return Vec::new();
        }

        let piece_ready = match self.store.write(piece_index, block_index, payload, now) {
            Ok(WriteOutcome::Written {
                was_pending,
                piece_ready,
            }) => {
                if was_pending {
                    self.congestion.on_request_settled();
                }
                piece_ready
            }
            Ok(WriteOutcome::Duplicate) => {
                self.counters.duplicates += 1;
                return Vec::new();
            }
            Err(e) => {
                self.counters.malformed += 1;
                event!(Level::DEBUG, error = %e, "Discarding malformed block.");
                return Vec::new();
            }
        };

        if !piece_ready {
            return Vec::new();
        }

        match self.store.try_complete(piece_index) {
            CompletionOutcome::Verified(data) => {
                let global_offset = self
                    .store
                    .piece(piece_index)
                    .map(|p| p.global_offset)
                    .unwrap_or_default();
                event!(
                    Level::INFO,
                    piece = piece_index,
                    complete = self.store.pieces_complete(),
                    total = self.store.total_pieces(),
                    "Piece complete."
                );
                let mut effects = vec![Effect::WritePiece {
                    piece_index,
                    offset: global_offset,
                    data,
                }];
                if self.store.all_complete() {
                    self.completed = true;
                    effects.push(Effect::Completed);
                }
                effects
            }
            CompletionOutcome::DigestMismatch => {
                self.counters.digest_failures += 1;
                self.congestion.on_loss(now);
                event!(
                    Level::WARN,
                    piece = piece_index,
                    window = self.congestion.window(),
                    "Piece failed verification, re-requesting."
                );
                Vec::new()
            }
            CompletionOutcome::Incomplete | CompletionOutcome::AlreadyComplete => Vec::new(),
        }
    }
}
