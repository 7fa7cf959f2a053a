// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::config::Settings;

/// Fetch a torrent's content over a named-data forwarder.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the .torrent manifest.
    pub torrent: PathBuf,

    /// Forwarder address, e.g. 127.0.0.1:9896.
    #[arg(long)]
    pub forwarder: Option<SocketAddr>,

    /// Local address to bind the transport socket to.
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    #[arg(long)]
    pub chunk_size: Option<u32>,

    /// Name prefix the responder publishes under.
    #[arg(long)]
    pub prefix: Option<String>,

    /// Persist the effective settings to the config file before starting.
    #[arg(long)]
    pub save_settings: bool,
}

impl Cli {
    pub fn apply_overrides(&self, settings: &mut Settings) {
        if let Some(addr) = self.forwarder {
            settings.forwarder_addr = addr;
        }
        if let Some(addr) = self.bind {
            settings.bind_addr = addr;
        }
        if let Some(dir) = &self.cache_dir {
            settings.cache_dir = Some(dir.clone());
        }
        if let Some(chunk_size) = self.chunk_size {
            settings.chunk_size = chunk_size;
        }
        if let Some(prefix) = &self.prefix {
            settings.protocol_prefix = prefix.clone();
        }
    }
}
