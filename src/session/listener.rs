// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tracing::{event, Level};

use crate::naming::{ContentName, Resource};
use crate::session::state::Action;
use crate::transport::{Outcome, Response, Transport};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ListenerStats {
    pub received: u64,
    pub timeouts: u64,
    pub failures: u64,
    pub discarded: u64,
}

/// Drains the transport and turns each usable response into an [`Action`]
/// for the scheduler. Owns no session state.
pub struct ResponseListener<T: Transport> {
    transport: Arc<T>,
    name: ContentName,
    receive_timeout: Duration,
    event_tx: mpsc::Sender<Action>,
    shutdown_rx: watch::Receiver<bool>,
    stats: ListenerStats,
}

impl<T: Transport> ResponseListener<T> {
    pub fn new(
        transport: Arc<T>,
        name: ContentName,
        receive_timeout: Duration,
        event_tx: mpsc::Sender<Action>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            transport,
            name,
            receive_timeout,
            event_tx,
            shutdown_rx,
            stats: ListenerStats::default(),
        }
    }

    /// Runs until shutdown is signalled or the scheduler drops its receiver.
    pub async fn run(mut self) -> ListenerStats {
        let transport = self.transport.clone();
        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }

            let response = tokio::select! {
                biased;
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        break;
                    }
                    continue;
                }
                response = transport.receive(self.receive_timeout) => response,
            };

            let Some(action) = self.classify(response, Instant::now()) else {
                continue;
            };
            // A full queue must not outlive shutdown.
            let delivered = tokio::select! {
                biased;
                _ = self.shutdown_rx.changed() => break,
                sent = self.event_tx.send(action) => sent.is_ok(),
            };
            if !delivered {
                event!(Level::DEBUG, "Scheduler gone, listener exiting.");
                break;
            }
        }
        event!(Level::DEBUG, stats = ?self.stats, "Listener stopped.");
        self.stats
    }

    /// Maps one transport result onto a scheduler action, or `None` when the
    /// response must be dropped.
    pub fn classify(&mut self, response: Response, now: Instant) -> Option<Action> {
        match response.outcome {
            Outcome::Timeout => {
                self.stats.timeouts += 1;
                return None;
            }
            Outcome::Failure => {
                self.stats.failures += 1;
                event!(Level::TRACE, "Transport receive failure.");
                return None;
            }
            Outcome::Success => {}
        }
        if !response.is_usable() {
            self.stats.discarded += 1;
            event!(Level::TRACE, name = %response.name, "Ignoring non-data packet.");
            return None;
        }

        let resource = match self.name.parse(&response.name) {
            Ok(resource) => resource,
            Err(e) => {
                self.stats.discarded += 1;
                event!(Level::DEBUG, error = %e, "Discarding response.");
                return None;
            }
        };

        self.stats.received += 1;
        Some(match resource {
            Resource::Bitfield => Action::BitfieldReceived {
                payload: response.payload,
                end_chunk_num: response.end_chunk_num,
            },
            Resource::Piece(piece_index) => Action::BlockReceived {
                piece_index,
                block_index: response.chunk_num,
                payload: response.payload,
                now,
            },
        })
    }
}
