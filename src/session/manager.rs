// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{event, Level};

use crate::errors::{SessionError, StorageError};
use crate::manifest::Manifest;
use crate::naming::ContentName;
use crate::session::listener::ResponseListener;
use crate::session::state::{Action, Effect, SessionState};
use crate::session::{SessionConfig, SessionProgress};
use crate::status::{self, SessionOutputState};
use crate::storage::{create_and_allocate_files, write_data_to_disk, MultiFileInfo};
use crate::transport::Transport;

const MAX_PIECE_WRITE_ATTEMPTS: u32 = 4;
const BASE_BACKOFF_MS: u64 = 50;
const JITTER_MS: u64 = 25;

/// Drives one content fetch from an empty cache to a verified copy on disk.
pub struct Session<T: Transport> {
    state: SessionState,
    config: SessionConfig,
    name: ContentName,
    content_name: String,
    content_id: String,
    transport: Arc<T>,
    multi_file_info: MultiFileInfo,
    progress_tx: watch::Sender<SessionProgress>,
    shutdown_tx: watch::Sender<bool>,
    started_at: Instant,
}

impl<T: Transport> Session<T> {
    /// Validates the geometry and pre-allocates the content files. Nothing is
    /// requested from the network until [`Session::run`].
    pub async fn new(
        manifest: Manifest,
        config: SessionConfig,
        cache_dir: &Path,
        transport: Arc<T>,
    ) -> Result<Self, SessionError> {
        let now = Instant::now();
        let state = SessionState::new(&manifest, &config, now)?;

        let multi_file_info =
            MultiFileInfo::from_manifest(cache_dir, &manifest).map_err(StorageError::from)?;
        create_and_allocate_files(&multi_file_info).await?;
        event!(
            Level::DEBUG,
            root = ?multi_file_info.root_dir,
            files = multi_file_info.files.len(),
            "Cache files allocated."
        );

        let (progress_tx, _) = watch::channel(state.progress());
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            name: ContentName::new(&config.protocol_prefix, &manifest.content_id),
            content_name: manifest.name,
            content_id: manifest.content_id,
            state,
            config,
            transport,
            multi_file_info,
            progress_tx,
            shutdown_tx,
            started_at: now,
        })
    }

    pub fn progress(&self) -> watch::Receiver<SessionProgress> {
        self.progress_tx.subscribe()
    }

    pub fn content_dir(&self) -> &Path {
        &self.multi_file_info.root_dir
    }

    pub async fn run(mut self) -> Result<SessionProgress, SessionError> {
        event!(
            Level::INFO,
            name = %self.name.base(),
            pieces = self.state.store.total_pieces(),
            blocks = self.state.store.total_blocks(),
            "start"
        );

        let (event_tx, mut event_rx) = mpsc::channel(self.config.event_queue_capacity);
        let listener = ResponseListener::new(
            self.transport.clone(),
            self.name.clone(),
            self.config.receive_timeout,
            event_tx,
            self.shutdown_tx.subscribe(),
        );
        let listener_handle = tokio::spawn(listener.run());

        let mut tick = tokio::time::interval(self.config.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut progress_timer = tokio::time::interval(self.config.progress_interval);
        progress_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let result = loop {
            let effects = tokio::select! {
                _ = signal::ctrl_c() => {
                    event!(Level::INFO, "Ctrl+C received, initiating clean shutdown...");
                    break Err(SessionError::Interrupted);
                }
                Some(action) = event_rx.recv() => self.state.update(action),
                _ = tick.tick() => {
                    // Everything already queued is applied before the sweep.
                    let mut effects = Vec::new();
                    while let Ok(action) = event_rx.try_recv() {
                        effects.extend(self.state.update(action));
                    }
                    effects.extend(self.state.update(Action::Tick { now: Instant::now() }));
                    effects
                }
                _ = progress_timer.tick() => {
                    let progress = self.state.progress();
                    event!(
                        Level::INFO,
                        window = progress.current_window,
                        pending = self.state.store.pending_blocks(),
                        "{}",
                        progress
                    );
                    Vec::new()
                }
            };

            if let Err(e) = self.apply_effects(effects).await {
                event!(Level::ERROR, error = %e, "Session aborted.");
                break Err(e);
            }
            self.progress_tx.send_replace(self.state.progress());

            if self.state.is_complete() {
                break Ok(self.state.progress());
            }
        };

        let _ = self.shutdown_tx.send(true);
        drop(event_rx);
        match listener_handle.await {
            Ok(stats) => event!(Level::DEBUG, ?stats, "Listener joined."),
            Err(e) => event!(Level::WARN, error = %e, "Listener task failed."),
        }

        let progress = self.state.progress();
        event!(Level::INFO, "{}", progress);
        self.progress_tx.send_replace(progress.clone());

        if result.is_ok() {
            let output = SessionOutputState {
                name: self.content_name.clone(),
                content_id: self.content_id.clone(),
                run_time_secs: self.started_at.elapsed().as_secs(),
                progress,
            };
            match status::dump(output, self.multi_file_info.root_dir.clone()).await {
                Ok(path) => event!(Level::DEBUG, ?path, "Status written."),
                Err(e) => event!(Level::WARN, error = %e, "Failed to write status dump."),
            }
        }

        result
    }

    async fn apply_effects(&mut self, effects: Vec<Effect>) -> Result<(), SessionError> {
        for effect in effects {
            self.handle_effect(effect).await?;
        }
        Ok(())
    }

    async fn handle_effect(&mut self, effect: Effect) -> Result<(), SessionError> {
        match effect {
            Effect::RequestBitfield => {
                let name = self.name.bitfield_name();
                event!(Level::INFO, name = %name, "bitfield, Interest");
                if let Err(e) = self.transport.send_interest(&name, 0).await {
                    event!(Level::WARN, error = %e, "Bitfield request failed.");
                }
            }

            Effect::SendInterest {
                piece_index,
                block_index,
            } => {
                let name = self.name.piece_name(piece_index);
                // A lost send surfaces as a timeout and is re-requested.
                if let Err(e) = self.transport.send_interest(&name, block_index).await {
                    event!(
                        Level::DEBUG,
                        piece = piece_index,
                        block = block_index,
                        error = %e,
                        "Interest send failed."
                    );
                }
            }

            Effect::WritePiece {
                piece_index,
                offset,
                data,
            } => {
                write_piece_with_retry(&self.multi_file_info, piece_index, offset, &data).await?;
                event!(Level::DEBUG, piece = piece_index, "Piece persisted.");
            }

            Effect::Completed => {
                event!(
                    Level::INFO,
                    elapsed_ms = self.started_at.elapsed().as_millis() as u64,
                    "Download complete."
                );
            }
        }
        Ok(())
    }
}

async fn write_piece_with_retry(
    multi_file_info: &MultiFileInfo,
    piece_index: u32,
    offset: u64,
    data: &[u8],
) -> Result<(), StorageError> {
    let mut attempt = 0;
    loop {
        match write_data_to_disk(multi_file_info, offset, data).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                event!(Level::WARN, piece = piece_index, error = ?e, "Disk write failed (IO Error).");
                attempt += 1;
                if attempt > MAX_PIECE_WRITE_ATTEMPTS {
                    return Err(e);
                }
            }
        }

        let backoff = BASE_BACKOFF_MS.saturating_mul(2u64.pow(attempt));
        let jitter = rand::rng().random_range(0..=JITTER_MS);
        let duration = Duration::from_millis(backoff + jitter);
        event!(
            Level::WARN,
            piece = piece_index,
            attempt = attempt,
            duration_ms = duration.as_millis() as u64,
            "Retrying disk write..."
        );
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestFile;
    use crate::session::availability::encode_bitfield;
    use crate::status::status_path;
    use crate::transport::memory::MemoryTransport;
    use crate::transport::{Outcome, Response};
    use sha1::{Digest, Sha1};
    use tempfile::tempdir;

    const PIECE_LEN: u64 = 8192;
    const CHUNK: u32 = 4096;
    // Three pieces: 8192 + 8192 + 3616 bytes, blocks 2 + 2 + 1.
    const CONTENT_LEN: usize = 20_000;

    fn content() -> Vec<u8> {
        (0..CONTENT_LEN).map(|i| (i % 251) as u8).collect()
    }

    fn manifest_for(content: &[u8], files: Option<Vec<ManifestFile>>) -> Manifest {
        let digests = content
            .chunks(PIECE_LEN as usize)
            .map(|piece| {
                let mut d = [0u8; 20];
                d.copy_from_slice(&Sha1::digest(piece));
                d
            })
            .collect();
        let mut manifest = Manifest::from_parts(
            "payload".to_string(),
            "c0ffee".to_string(),
            PIECE_LEN as i64,
            content.len() as i64,
            digests,
        )
        .unwrap();
        manifest.files = files;
        manifest
    }

    fn fast_config() -> SessionConfig {
        SessionConfig {
            chunk_size: CHUNK,
            request_timeout: Duration::from_millis(100),
            receive_timeout: Duration::from_millis(20),
            tick_interval: Duration::from_millis(1),
            progress_interval: Duration::from_secs(1),
            ..SessionConfig::default()
        }
    }

    fn transport_for(config: &SessionConfig, content: Vec<u8>) -> Arc<MemoryTransport> {
        let name = ContentName::new(&config.protocol_prefix, "c0ffee");
        Arc::new(MemoryTransport::new(name, content, PIECE_LEN, CHUNK))
    }

    async fn run_to_completion(session: Session<MemoryTransport>) -> SessionProgress {
        tokio::time::timeout(Duration::from_secs(20), session.run())
            .await
            .expect("session did not finish in time")
            .expect("session failed")
    }

    #[tokio::test]
    async fn test_session_downloads_single_file() {
        let dir = tempdir().unwrap();
        let data = content();
        let config = fast_config();
        let transport = transport_for(&config, data.clone());

        let session = Session::new(manifest_for(&data, None), config, dir.path(), transport.clone())
            .await
            .unwrap();
        let content_dir = session.content_dir().to_path_buf();
        let progress_rx = session.progress();

        let progress = run_to_completion(session).await;

        assert!(progress.is_complete());
        assert_eq!(progress.total_pieces, 3);
        assert_eq!(progress.total_blocks, 5);
        assert_eq!(progress.blocks_complete, 5);
        assert_eq!(progress_rx.borrow().pieces_complete, 3);

        let on_disk = std::fs::read(content_dir.join("payload")).unwrap();
        assert_eq!(on_disk, data);
        assert!(status_path(&content_dir).exists());

        for (piece, block) in [(0, 0), (0, 1), (1, 0), (1, 1), (2, 0)] {
            assert!(transport.requests_for(piece, block) >= 1);
        }
    }

    #[tokio::test]
    async fn test_session_writes_multi_file_layout() {
        let dir = tempdir().unwrap();
        let data = content();
        let files = vec![
            ManifestFile {
                path: vec!["a.bin".to_string()],
                length: 5_000,
            },
            ManifestFile {
                path: vec!["nested".to_string(), "b.bin".to_string()],
                length: 15_000,
            },
        ];
        let config = fast_config();
        let transport = transport_for(&config, data.clone());

        let session = Session::new(manifest_for(&data, Some(files)), config, dir.path(), transport)
            .await
            .unwrap();
        let content_dir = session.content_dir().to_path_buf();
        run_to_completion(session).await;

        assert_eq!(std::fs::read(content_dir.join("a.bin")).unwrap(), data[..5_000]);
        assert_eq!(
            std::fs::read(content_dir.join("nested").join("b.bin")).unwrap(),
            data[5_000..]
        );
    }

    #[tokio::test]
    async fn test_withheld_block_is_requested_again_after_timeout() {
        let dir = tempdir().unwrap();
        let data = content();
        let config = fast_config();
        let transport = transport_for(&config, data.clone());
        transport.withhold(1, 1);

        let releaser = transport.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            releaser.release(1, 1);
        });

        let session = Session::new(manifest_for(&data, None), config, dir.path(), transport.clone())
            .await
            .unwrap();
        let content_dir = session.content_dir().to_path_buf();
        let progress = run_to_completion(session).await;

        assert!(transport.requests_for(1, 1) >= 2);
        assert!(progress.loss_events >= 1);
        assert_eq!(std::fs::read(content_dir.join("payload")).unwrap(), data);
    }

    #[tokio::test]
    async fn test_corrupted_block_is_refetched() {
        let dir = tempdir().unwrap();
        let data = content();
        let config = fast_config();
        let transport = transport_for(&config, data.clone());
        transport.corrupt_once(0, 0);
        transport.duplicate(2, 0);

        let session = Session::new(manifest_for(&data, None), config, dir.path(), transport.clone())
            .await
            .unwrap();
        let content_dir = session.content_dir().to_path_buf();
        let progress = run_to_completion(session).await;

        assert!(transport.requests_for(0, 0) >= 2);
        assert!(progress.loss_events >= 1);
        assert_eq!(std::fs::read(content_dir.join("payload")).unwrap(), data);
    }

    #[tokio::test]
    async fn test_session_finishes_while_event_queue_is_flooded() {
        let dir = tempdir().unwrap();
        let data = content();
        let config = SessionConfig {
            event_queue_capacity: 1,
            ..fast_config()
        };
        let transport = transport_for(&config, data.clone());
        let bitfield_name = ContentName::new(&config.protocol_prefix, "c0ffee").bitfield_name();

        let flooder = transport.clone();
        let flood = tokio::spawn(async move {
            loop {
                // Bursts keep the capacity-1 queue saturated without burying
                // piece data behind an unbounded backlog.
                for _ in 0..8 {
                    flooder.inject(Response {
                        name: bitfield_name.clone(),
                        chunk_num: 0,
                        end_chunk_num: 0,
                        payload: encode_bitfield(&[true; 3]),
                        outcome: Outcome::Success,
                        is_data: true,
                    });
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });

        let session = Session::new(manifest_for(&data, None), config, dir.path(), transport)
            .await
            .unwrap();
        let content_dir = session.content_dir().to_path_buf();
        let result = tokio::time::timeout(Duration::from_secs(10), session.run()).await;
        flood.abort();

        let progress = result.expect("session hung on shutdown").unwrap();
        assert!(progress.is_complete());
        assert_eq!(std::fs::read(content_dir.join("payload")).unwrap(), data);
    }

    #[tokio::test]
    async fn test_only_advertised_pieces_are_requested() {
        let dir = tempdir().unwrap();
        let data = content();
        let config = fast_config();
        let name = ContentName::new(&config.protocol_prefix, "c0ffee");
        let mut transport = MemoryTransport::new(name, data.clone(), PIECE_LEN, CHUNK);
        transport.set_bitfield(encode_bitfield(&[true, false, false]));
        let transport = Arc::new(transport);

        let session = Session::new(manifest_for(&data, None), config, dir.path(), transport.clone())
            .await
            .unwrap();
        let content_dir = session.content_dir().to_path_buf();
        let progress_rx = session.progress();

        let result = tokio::time::timeout(Duration::from_millis(500), session.run()).await;
        assert!(result.is_err(), "session cannot finish without pieces 1 and 2");

        assert!(transport.requests_for(0, 0) >= 1);
        assert!(transport.requests_for(0, 1) >= 1);
        for block in 0..2 {
            assert_eq!(transport.requests_for(1, block), 0);
        }
        assert_eq!(transport.requests_for(2, 0), 0);

        let progress = progress_rx.borrow().clone();
        assert!(!progress.is_complete());
        assert_eq!(progress.pieces_complete, 1);
        let on_disk = std::fs::read(content_dir.join("payload")).unwrap();
        assert_eq!(on_disk[..PIECE_LEN as usize], data[..PIECE_LEN as usize]);
    }

    #[tokio::test]
    async fn test_unusable_cache_dir_fails_before_any_request() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let data = content();
        let config = fast_config();
        let transport = transport_for(&config, data.clone());

        let result = Session::new(manifest_for(&data, None), config, &blocker, transport.clone()).await;

        assert!(matches!(result, Err(SessionError::Storage(_))));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_bad_geometry_is_rejected() {
        let dir = tempdir().unwrap();
        let data = content();
        let config = SessionConfig {
            chunk_size: 0,
            ..fast_config()
        };
        let transport = transport_for(&config, data.clone());

        let result = Session::new(manifest_for(&data, None), config, dir.path(), transport).await;
        assert!(matches!(result, Err(SessionError::Manifest(_))));
    }

    #[tokio::test]
    async fn test_write_retry_gives_up_on_missing_file() {
        let dir = tempdir().unwrap();
        let mfi = MultiFileInfo::new(&dir.path().join("gone"), "gone", None, 16).unwrap();

        let result = write_piece_with_retry(&mfi, 0, 0, &[7u8; 16]).await;
        assert!(matches!(result, Err(StorageError::Io(_))));
    }
}
