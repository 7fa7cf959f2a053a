// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use figment::providers::{Env, Format};
use figment::{providers::Toml, Figment};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const ENV_PREFIX: &str = "CCNX_TORRENT_";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    // Disk
    pub cache_dir: Option<PathBuf>,

    // Networking
    pub forwarder_addr: SocketAddr,
    pub bind_addr: SocketAddr,
    pub protocol_prefix: String,
    pub chunk_size: u32,

    // Timings
    pub request_timeout_ms: u64,
    pub bitfield_refresh_secs: u64,
    pub receive_timeout_ms: u64,
    pub tick_interval_ms: u64,
    pub progress_interval_secs: u64,

    // Congestion control
    pub cubic_c: f64,
    pub cubic_beta: f64,
    pub initial_ssthresh: f64,

    // Performance
    pub event_queue_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_dir: None,
            forwarder_addr: SocketAddr::from(([127, 0, 0, 1], 9896)),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            protocol_prefix: "ccnx:/BitTorrent".to_string(),
            chunk_size: 4096,
            request_timeout_ms: 4000,
            bitfield_refresh_secs: 10,
            receive_timeout_ms: 1000,
            tick_interval_ms: 5,
            progress_interval_secs: 5,
            cubic_c: 0.4,
            cubic_beta: 0.2,
            initial_ssthresh: 64.0,
            event_queue_capacity: 4096,
        }
    }
}

impl Settings {
    /// The configured cache directory, or `<data_dir>/cache`.
    pub fn resolved_cache_dir(&self) -> PathBuf {
        if let Some(dir) = &self.cache_dir {
            return dir.clone();
        }
        get_app_paths()
            .map(|(_, data_dir)| data_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cache")
    }
}

/// Single source of truth for app directories.
pub fn get_app_paths() -> Option<(PathBuf, PathBuf)> {
    let proj_dirs = ProjectDirs::from("org", "ccnx", "ccnx-torrent")?;
    let config_dir = proj_dirs.config_dir().to_path_buf();
    let data_dir = proj_dirs.data_local_dir().to_path_buf();

    fs::create_dir_all(&config_dir).ok()?;
    fs::create_dir_all(&data_dir).ok()?;

    Some((config_dir, data_dir))
}

fn figment_for(config_file: Option<PathBuf>) -> Figment {
    let figment = Figment::new();
    let figment = match config_file {
        Some(path) => figment.merge(Toml::file(path)),
        None => figment,
    };
    figment.merge(Env::prefixed(ENV_PREFIX))
}

pub fn load_settings() -> Settings {
    let config_file = get_app_paths().map(|(config_dir, _)| config_dir.join("settings.toml"));
    match figment_for(config_file).extract() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!("Ignoring invalid settings, using defaults: {}", e);
            Settings::default()
        }
    }
}

/// Saves the provided settings to the config file.
pub fn save_settings(settings: &Settings) -> io::Result<()> {
    if let Some((config_dir, _)) = get_app_paths() {
        let config_file_path = config_dir.join("settings.toml");
        let temp_file_path = config_dir.join("settings.toml.tmp");
        let content = toml::to_string_pretty(settings).map_err(io::Error::other)?;
        fs::write(&temp_file_path, content)?;
        fs::rename(&temp_file_path, &config_file_path)?;
    }
    Ok(())
}
