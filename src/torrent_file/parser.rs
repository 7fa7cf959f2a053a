// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::torrent_file::Torrent;
use serde_bencode::de;
use serde_bencode::value::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Bencode parsing error: {0}")]
    Bencode(#[from] serde_bencode::Error),
    #[error("Missing 'info' dictionary in torrent file")]
    MissingInfoDict,
}

/// Decodes a `.torrent` document and keeps the canonical bencode of its
/// `info` dictionary, which the content identifier is hashed from.
pub fn from_bytes(bencode_data: &[u8]) -> Result<Torrent, ParseError> {
    let Value::Dict(mut root) = de::from_bytes::<Value>(bencode_data)? else {
        return Err(ParseError::MissingInfoDict);
    };
    let info = root
        .remove(b"info".as_slice())
        .ok_or(ParseError::MissingInfoDict)?;

    let mut torrent: Torrent = de::from_bytes(bencode_data)?;
    torrent.info.length = torrent.info.total_length();
    torrent.info_dict_bencode = serde_bencode::to_bytes(&info)?;
    Ok(torrent)
}
