// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod availability;
pub mod block_manager;
pub mod congestion;
pub mod listener;
pub mod manager;
pub mod piece_manager;
pub mod state;

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tracing::{event, Level};

use crate::config::Settings;
use crate::session::block_manager::DEFAULT_CHUNK_SIZE;
use crate::session::congestion::CubicParams;

pub use manager::Session;

/// Runtime knobs for one fetch, resolved from [`Settings`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub protocol_prefix: String,
    pub chunk_size: u32,
    pub request_timeout: Duration,
    pub bitfield_refresh: Duration,
    pub receive_timeout: Duration,
    pub tick_interval: Duration,
    pub progress_interval: Duration,
    pub event_queue_capacity: usize,
    pub cubic: CubicParams,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl SessionConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let chunk_size = if settings.chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            settings.chunk_size
        };
        let mut cubic = CubicParams {
            c: settings.cubic_c,
            beta: settings.cubic_beta,
            initial_ssthresh: settings.initial_ssthresh,
        };
        if !cubic.is_usable() {
            event!(
                Level::WARN,
                c = cubic.c,
                beta = cubic.beta,
                initial_ssthresh = cubic.initial_ssthresh,
                "Unusable congestion parameters, using defaults."
            );
            cubic = CubicParams::default();
        }
        Self {
            protocol_prefix: settings.protocol_prefix.clone(),
            chunk_size,
            request_timeout: Duration::from_millis(settings.request_timeout_ms),
            bitfield_refresh: Duration::from_secs(settings.bitfield_refresh_secs),
            receive_timeout: Duration::from_millis(settings.receive_timeout_ms.max(1)),
            tick_interval: Duration::from_millis(settings.tick_interval_ms.max(1)),
            progress_interval: Duration::from_secs(settings.progress_interval_secs.max(1)),
            event_queue_capacity: settings.event_queue_capacity.max(1),
            cubic,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionProgress {
    pub pieces_complete: usize,
    pub total_pieces: usize,
    pub blocks_complete: usize,
    pub total_blocks: usize,
    pub current_window: f64,
    pub in_flight: usize,
    pub loss_events: u64,
}

impl SessionProgress {
    pub fn is_complete(&self) -> bool {
        self.total_pieces > 0 && self.pieces_complete == self.total_pieces
    }

    pub fn percent_blocks(&self) -> f64 {
        if self.total_blocks == 0 {
            return 0.0;
        }
        self.blocks_complete as f64 * 100.0 / self.total_blocks as f64
    }
}

impl fmt::Display for SessionProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[piece: {} / {}][block: {} / {}, {:.2}%]",
            self.pieces_complete,
            self.total_pieces,
            self.blocks_complete,
            self.total_blocks,
            self.percent_blocks()
        )
    }
}
