// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tracing::{event, Level};

use crate::errors::TransportError;
use crate::transport::{Outcome, Response, Transport};

const MAX_DATAGRAM: usize = 65_507;

pub const KIND_INTEREST: &str = "interest";
pub const KIND_DATA: &str = "data";

/// One packet exchanged with the local forwarder, bencoded into a single
/// datagram.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Packet {
    pub kind: String,
    pub name: String,
    pub chunk: u32,
    #[serde(default)]
    pub end_chunk: u32,
    #[serde(with = "serde_bytes", default)]
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn interest(name: &str, chunk: u32) -> Self {
        Self {
            kind: KIND_INTEREST.to_string(),
            name: name.to_string(),
            chunk,
            end_chunk: 0,
            payload: Vec::new(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        Ok(serde_bencode::to_bytes(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_bencode::Error> {
        serde_bencode::from_bytes(bytes)
    }
}

/// Transport that talks to a named-data forwarder over a connected UDP socket.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    pub async fn connect(bind: SocketAddr, forwarder: SocketAddr) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(bind).await?;
        socket.connect(forwarder).await?;
        event!(
            Level::INFO,
            local = ?socket.local_addr().ok(),
            %forwarder,
            "Connected to forwarder"
        );
        Ok(Self { socket })
    }
}

impl Transport for UdpTransport {
    async fn send_interest(&self, name: &str, chunk_num: u32) -> Result<(), TransportError> {
        let bytes = Packet::interest(name, chunk_num).encode()?;
        self.socket.send(&bytes).await?;
        Ok(())
    }

    async fn receive(&self, timeout: Duration) -> Response {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let len = match tokio::time::timeout(timeout, self.socket.recv(&mut buf)).await {
            Err(_) => return Response::timeout(),
            Ok(Err(e)) => {
                event!(Level::DEBUG, error = %e, "UDP receive failed");
                return Response::failure();
            }
            Ok(Ok(len)) => len,
        };

        match Packet::decode(&buf[..len]) {
            Ok(packet) => Response {
                is_data: packet.kind == KIND_DATA,
                name: packet.name,
                chunk_num: packet.chunk,
                end_chunk_num: packet.end_chunk,
                payload: packet.payload,
                outcome: Outcome::Success,
            },
            Err(e) => {
                event!(Level::DEBUG, error = %e, len, "Undecodable datagram");
                Response::failure()
            }
        }
    }
}
