// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};

use crate::session::SessionProgress;

pub const STATUS_FILE_NAME: &str = "ccnx_torrent_status.json";

#[derive(Serialize, Debug, Clone)]
pub struct SessionOutputState {
    pub name: String,
    pub content_id: String,
    pub run_time_secs: u64,
    pub progress: SessionProgress,
}

pub fn status_path(content_dir: &Path) -> PathBuf {
    content_dir.join(STATUS_FILE_NAME)
}

/// Writes the snapshot as pretty JSON next to the downloaded content.
pub async fn dump(output_data: SessionOutputState, content_dir: PathBuf) -> io::Result<PathBuf> {
    let file_path = status_path(&content_dir);
    tokio::task::spawn_blocking(move || -> io::Result<PathBuf> {
        std::fs::create_dir_all(&content_dir)?;
        let json = serde_json::to_string_pretty(&output_data).map_err(io::Error::other)?;
        std::fs::write(&file_path, json)?;
        Ok(file_path)
    })
    .await
    .map_err(io::Error::other)?
}
