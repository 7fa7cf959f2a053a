// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::Path;

use crate::errors::ManifestError;
use crate::torrent_file::{parser, Torrent, DIGEST_LEN};

use tracing::{event, Level};

#[derive(Debug, Clone, PartialEq)]
pub struct ManifestFile {
    pub path: Vec<String>,
    pub length: u64,
}

/// Validated, read-only view of a torrent: geometry, digests and layout.
#[derive(Debug, Clone)]
pub struct Manifest {
    /// File name (single-file) or top-level directory name (multi-file).
    pub name: String,
    /// Lowercase hex info hash; the content identifier used in names.
    pub content_id: String,
    pub piece_length: u64,
    pub total_length: u64,
    pub digests: Vec<[u8; DIGEST_LEN]>,
    /// `None` for single-file content.
    pub files: Option<Vec<ManifestFile>>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let bytes = std::fs::read(path)?;
        let torrent = parser::from_bytes(&bytes)?;
        let manifest = Self::from_torrent(&torrent)?;
        event!(
            Level::INFO,
            name = %manifest.name,
            content_id = %manifest.content_id,
            pieces = manifest.piece_count(),
            piece_length = manifest.piece_length,
            total_length = manifest.total_length,
            "Loaded manifest"
        );
        Ok(manifest)
    }

    pub fn from_torrent(torrent: &Torrent) -> Result<Self, ManifestError> {
        let info = &torrent.info;

        let files = if info.is_multi_file() {
            let mut entries = Vec::with_capacity(info.files.len());
            for (index, f) in info.files.iter().enumerate() {
                if f.length < 0 {
                    return Err(ManifestError::NegativeFileLength {
                        index,
                        length: f.length,
                    });
                }
                entries.push(ManifestFile {
                    path: f.path.clone(),
                    length: f.length as u64,
                });
            }
            Some(entries)
        } else {
            None
        };

        if info.pieces.len() % DIGEST_LEN != 0 {
            return Err(ManifestError::MalformedDigests(info.pieces.len()));
        }
        let digests = info
            .pieces
            .chunks_exact(DIGEST_LEN)
            .map(|chunk| {
                let mut digest = [0u8; DIGEST_LEN];
                digest.copy_from_slice(chunk);
                digest
            })
            .collect();

        let mut manifest = Self::from_parts(
            info.name.clone(),
            torrent.info_hash_hex(),
            info.piece_length,
            info.total_length(),
            digests,
        )?;
        if let Some(entries) = &files {
            let sum: u64 = entries.iter().map(|f| f.length).sum();
            if sum != manifest.total_length {
                return Err(ManifestError::FileLengthMismatch {
                    files: sum,
                    total: manifest.total_length,
                });
            }
        }
        manifest.files = files;
        Ok(manifest)
    }

    /// Builds a single-file manifest and checks it for internal consistency.
    pub fn from_parts(
        name: String,
        content_id: String,
        piece_length: i64,
        total_length: i64,
        digests: Vec<[u8; DIGEST_LEN]>,
    ) -> Result<Self, ManifestError> {
        if piece_length <= 0 {
            return Err(ManifestError::NonPositivePieceLength(piece_length));
        }
        if total_length <= 0 {
            return Err(ManifestError::NonPositiveTotalLength(total_length));
        }

        let piece_length = piece_length as u64;
        let total_length = total_length as u64;
        let expected = total_length.div_ceil(piece_length);
        if digests.len() as u64 != expected {
            return Err(ManifestError::PieceCountMismatch {
                digests: digests.len(),
                expected,
            });
        }

        Ok(Self {
            name,
            content_id,
            piece_length,
            total_length,
            digests,
            files: None,
        })
    }

    pub fn piece_count(&self) -> usize {
        self.digests.len()
    }

    pub fn piece_offset(&self, piece_index: usize) -> u64 {
        piece_index as u64 * self.piece_length
    }

    /// Length of piece `piece_index`; the last piece covers the remainder.
    pub fn piece_len(&self, piece_index: usize) -> u64 {
        let offset = self.piece_offset(piece_index);
        std::cmp::min(self.piece_length, self.total_length.saturating_sub(offset))
    }
}
