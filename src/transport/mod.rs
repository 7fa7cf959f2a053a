// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod udp;

#[cfg(test)]
pub mod memory;

use std::future::Future;
use std::time::Duration;

use crate::errors::TransportError;

pub use udp::UdpTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Timeout,
    Failure,
}

/// One result of a receive on the pull transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub name: String,
    pub chunk_num: u32,
    pub end_chunk_num: u32,
    pub payload: Vec<u8>,
    pub outcome: Outcome,
    pub is_data: bool,
}

impl Response {
    pub fn timeout() -> Self {
        Self::empty(Outcome::Timeout)
    }

    pub fn failure() -> Self {
        Self::empty(Outcome::Failure)
    }

    fn empty(outcome: Outcome) -> Self {
        Self {
            name: String::new(),
            chunk_num: 0,
            end_chunk_num: 0,
            payload: Vec::new(),
            outcome,
            is_data: false,
        }
    }

    pub fn is_usable(&self) -> bool {
        self.outcome == Outcome::Success && self.is_data
    }
}

/// Named-data pull transport: an Interest for `(name, chunk)` yields at most
/// one matching Data response. There is no NACK and no cancellation.
pub trait Transport: Send + Sync + 'static {
    /// Fire-and-forget Interest for one chunk of `name`.
    fn send_interest(
        &self,
        name: &str,
        chunk_num: u32,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Waits up to `timeout` for the next response of any name.
    fn receive(&self, timeout: Duration) -> impl Future<Output = Response> + Send;
}
