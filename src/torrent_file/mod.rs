// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod parser;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

pub const DIGEST_LEN: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Torrent {
    // Not part of the bencode source; filled in by the parser so the
    // info hash can be computed over the exact bytes we received.
    #[serde(skip)]
    pub info_dict_bencode: Vec<u8>,

    pub info: Info,

    #[serde(default)]
    pub announce: Option<String>,

    #[serde(rename = "creation date", default)]
    pub creation_date: Option<i64>,

    #[serde(default)]
    pub comment: Option<String>,

    #[serde(rename = "created by", default)]
    pub created_by: Option<String>,
}

impl Torrent {
    /// SHA-1 over the bencoded `info` dictionary.
    pub fn info_hash(&self) -> [u8; DIGEST_LEN] {
        let mut hash = [0u8; DIGEST_LEN];
        hash.copy_from_slice(&Sha1::digest(&self.info_dict_bencode));
        hash
    }

    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.info_hash())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Info {
    #[serde(rename = "piece length")]
    pub piece_length: i64,

    #[serde(with = "serde_bytes")]
    #[serde(default)]
    pub pieces: Vec<u8>,

    #[serde(default)]
    pub private: Option<i64>,

    #[serde(default)]
    pub files: Vec<InfoFile>,

    pub name: String,

    #[serde(default)]
    pub length: i64,

    #[serde(default)]
    pub md5sum: Option<String>,
}

impl Info {
    pub fn total_length(&self) -> i64 {
        if self.length > 0 {
            return self.length;
        }
        self.files.iter().map(|f| f.length).sum()
    }

    pub fn is_multi_file(&self) -> bool {
        !self.files.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct InfoFile {
    pub length: i64,

    #[serde(default)]
    pub md5sum: Option<String>,

    pub path: Vec<String>,
}
