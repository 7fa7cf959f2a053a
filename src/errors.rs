// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use thiserror::Error;

use crate::torrent_file::parser::ParseError;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("failed to read manifest: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse manifest: {0}")]
    Parse(#[from] ParseError),
    #[error("piece length must be positive, got {0}")]
    NonPositivePieceLength(i64),
    #[error("total length must be positive, got {0}")]
    NonPositiveTotalLength(i64),
    #[error("file entry {index} has negative length {length}")]
    NegativeFileLength { index: usize, length: i64 },
    #[error("file entries sum to {files} bytes but the content length is {total}")]
    FileLengthMismatch { files: u64, total: u64 },
    #[error("digest blob is {0} bytes, not a multiple of 20")]
    MalformedDigests(usize),
    #[error("manifest lists {digests} digests but the content needs {expected} pieces")]
    PieceCountMismatch { digests: usize, expected: u64 },
    #[error("piece length {piece_length} is not representable with chunk size {chunk_size}")]
    UnsupportedGeometry { piece_length: u64, chunk_size: u32 },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NameError {
    #[error("name '{0}' does not carry the expected protocol prefix")]
    ForeignPrefix(String),
    #[error("name '{0}' addresses a different content identifier")]
    ForeignContent(String),
    #[error("name '{0}' has no resource segment")]
    MissingResource(String),
    #[error("name '{0}' has an invalid resource segment")]
    InvalidResource(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BlockError {
    #[error("piece {0} does not exist")]
    UnknownPiece(u32),
    #[error("block {block} does not exist in piece {piece}")]
    UnknownBlock { piece: u32, block: u32 },
    #[error("block {block} of piece {piece} expects {expected} bytes, got {actual}")]
    LengthMismatch {
        piece: u32,
        block: u32,
        expected: u32,
        actual: usize,
    },
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("transport socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode packet: {0}")]
    Encode(#[from] serde_bencode::Error),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("session interrupted before completion")]
    Interrupted,
}
