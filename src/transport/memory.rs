// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! In-process responder used by the session tests. Serves one content buffer
//! by name and can withhold, corrupt or duplicate selected blocks.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::errors::TransportError;
use crate::naming::{ContentName, Resource};
use crate::session::availability::encode_bitfield;
use crate::transport::{Outcome, Response, Transport};

pub struct MemoryTransport {
    name: ContentName,
    content: Vec<u8>,
    piece_length: u64,
    chunk_size: u32,
    bitfield: Vec<u8>,
    withheld: Mutex<HashSet<(u32, u32)>>,
    corrupt_once: Mutex<HashSet<(u32, u32)>>,
    duplicated: Mutex<HashSet<(u32, u32)>>,
    requests: Mutex<Vec<(String, u32)>>,
    queue_tx: mpsc::UnboundedSender<Response>,
    queue_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Response>>,
}

impl MemoryTransport {
    pub fn new(name: ContentName, content: Vec<u8>, piece_length: u64, chunk_size: u32) -> Self {
        let piece_count = (content.len() as u64).div_ceil(piece_length) as usize;
        let bitfield = encode_bitfield(&vec![true; piece_count]);
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            name,
            content,
            piece_length,
            chunk_size,
            bitfield,
            withheld: Mutex::new(HashSet::new()),
            corrupt_once: Mutex::new(HashSet::new()),
            duplicated: Mutex::new(HashSet::new()),
            requests: Mutex::new(Vec::new()),
            queue_tx,
            queue_rx: tokio::sync::Mutex::new(queue_rx),
        }
    }

    pub fn withhold(&self, piece: u32, block: u32) {
        self.withheld.lock().unwrap().insert((piece, block));
    }

    pub fn release(&self, piece: u32, block: u32) {
        self.withheld.lock().unwrap().remove(&(piece, block));
    }

    pub fn corrupt_once(&self, piece: u32, block: u32) {
        self.corrupt_once.lock().unwrap().insert((piece, block));
    }

    pub fn duplicate(&self, piece: u32, block: u32) {
        self.duplicated.lock().unwrap().insert((piece, block));
    }

    pub fn set_bitfield(&mut self, bitfield: Vec<u8>) {
        self.bitfield = bitfield;
    }

    pub fn inject(&self, response: Response) {
        let _ = self.queue_tx.send(response);
    }

    pub fn requests(&self) -> Vec<(String, u32)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_for(&self, piece: u32, block: u32) -> usize {
        let name = self.name.piece_name(piece);
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, c)| *n == name && *c == block)
            .count()
    }

    fn data(&self, name: &str, chunk_num: u32, payload: Vec<u8>) -> Response {
        Response {
            name: name.to_string(),
            chunk_num,
            end_chunk_num: 0,
            payload,
            outcome: Outcome::Success,
            is_data: true,
        }
    }

    fn block_payload(&self, piece: u32, block: u32) -> Option<Vec<u8>> {
        let piece_start = piece as u64 * self.piece_length;
        let piece_end = std::cmp::min(piece_start + self.piece_length, self.content.len() as u64);
        let start = piece_start + block as u64 * self.chunk_size as u64;
        if start >= piece_end {
            return None;
        }
        let end = std::cmp::min(start + self.chunk_size as u64, piece_end);
        Some(self.content[start as usize..end as usize].to_vec())
    }
}

impl Transport for MemoryTransport {
    async fn send_interest(&self, name: &str, chunk_num: u32) -> Result<(), TransportError> {
        self.requests
            .lock()
            .unwrap()
            .push((name.to_string(), chunk_num));

        match self.name.parse(name) {
            Ok(Resource::Bitfield) => {
                self.inject(self.data(name, 0, self.bitfield.clone()));
            }
            Ok(Resource::Piece(piece)) => {
                if self.withheld.lock().unwrap().contains(&(piece, chunk_num)) {
                    return Ok(());
                }
                let Some(mut payload) = self.block_payload(piece, chunk_num) else {
                    return Ok(());
                };
                if self.corrupt_once.lock().unwrap().remove(&(piece, chunk_num)) {
                    for byte in payload.iter_mut() {
                        *byte ^= 0xFF;
                    }
                }
                if self.duplicated.lock().unwrap().contains(&(piece, chunk_num)) {
                    self.inject(self.data(name, chunk_num, payload.clone()));
                }
                self.inject(self.data(name, chunk_num, payload));
            }
            Err(_) => {}
        }
        Ok(())
    }

    async fn receive(&self, timeout: Duration) -> Response {
        let mut rx = self.queue_rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(response)) => response,
            Ok(None) => Response::failure(),
            Err(_) => Response::timeout(),
        }
    }
}
