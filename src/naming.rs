// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Content names on the named-data transport.
//!
//! Piece data lives under `<prefix>/<content-id>/<piece-index>` with the block
//! index carried in the chunk number; the availability vector lives under
//! `<prefix>/<content-id>/bitfield`.

use crate::errors::NameError;

pub const BITFIELD_SEGMENT: &str = "bitfield";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Piece(u32),
    Bitfield,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentName {
    prefix: String,
    content_id: String,
}

impl ContentName {
    pub fn new(prefix: &str, content_id: &str) -> Self {
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
            content_id: content_id.to_string(),
        }
    }

    pub fn base(&self) -> String {
        format!("{}/{}", self.prefix, self.content_id)
    }

    pub fn piece_name(&self, piece_index: u32) -> String {
        format!("{}/{}/{}", self.prefix, self.content_id, piece_index)
    }

    pub fn bitfield_name(&self) -> String {
        format!("{}/{}/{}", self.prefix, self.content_id, BITFIELD_SEGMENT)
    }

    /// Resolves a response name into the resource it addresses, rejecting
    /// names that belong to another prefix or another content.
    pub fn parse(&self, name: &str) -> Result<Resource, NameError> {
        let rest = name
            .strip_prefix(self.prefix.as_str())
            .and_then(|r| r.strip_prefix('/'))
            .ok_or_else(|| NameError::ForeignPrefix(name.to_string()))?;

        let mut segments = rest.splitn(2, '/');
        let content_id = segments.next().unwrap_or_default();
        if content_id != self.content_id {
            return Err(NameError::ForeignContent(name.to_string()));
        }

        let resource = match segments.next() {
            Some(r) if !r.is_empty() => r,
            _ => return Err(NameError::MissingResource(name.to_string())),
        };

        if resource == BITFIELD_SEGMENT {
            return Ok(Resource::Bitfield);
        }

        resource
            .parse::<u32>()
            .map(Resource::Piece)
            .map_err(|_| NameError::InvalidResource(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name() -> ContentName {
        ContentName::new("ccnx:/BitTorrent", "abcd1234")
    }

    #[test]
    fn test_build_names() {
        let n = name();
        assert_eq!(n.piece_name(7), "ccnx:/BitTorrent/abcd1234/7");
        assert_eq!(n.bitfield_name(), "ccnx:/BitTorrent/abcd1234/bitfield");
        assert_eq!(n.base(), "ccnx:/BitTorrent/abcd1234");
    }

    #[test]
    fn test_trailing_slash_in_prefix_is_ignored() {
        let n = ContentName::new("ccnx:/BitTorrent/", "abcd1234");
        assert_eq!(n.piece_name(0), "ccnx:/BitTorrent/abcd1234/0");
    }

    #[test]
    fn test_parse_piece_and_bitfield() {
        let n = name();
        assert_eq!(n.parse("ccnx:/BitTorrent/abcd1234/42"), Ok(Resource::Piece(42)));
        assert_eq!(
            n.parse("ccnx:/BitTorrent/abcd1234/bitfield"),
            Ok(Resource::Bitfield)
        );
    }

    #[test]
    fn test_parse_rejects_cross_talk() {
        let n = name();
        assert!(matches!(
            n.parse("ccnx:/Other/abcd1234/1"),
            Err(NameError::ForeignPrefix(_))
        ));
        assert!(matches!(
            n.parse("ccnx:/BitTorrentX/abcd1234/1"),
            Err(NameError::ForeignPrefix(_))
        ));
        assert!(matches!(
            n.parse("ccnx:/BitTorrent/ffff/1"),
            Err(NameError::ForeignContent(_))
        ));
    }

    #[test]
    fn test_parse_rejects_malformed_resource() {
        let n = name();
        assert!(matches!(
            n.parse("ccnx:/BitTorrent/abcd1234"),
            Err(NameError::MissingResource(_))
        ));
        assert!(matches!(
            n.parse("ccnx:/BitTorrent/abcd1234/"),
            Err(NameError::MissingResource(_))
        ));
        assert!(matches!(
            n.parse("ccnx:/BitTorrent/abcd1234/-1"),
            Err(NameError::InvalidResource(_))
        ));
        assert!(matches!(
            n.parse("ccnx:/BitTorrent/abcd1234/3/extra"),
            Err(NameError::InvalidResource(_))
        ));
    }
}
