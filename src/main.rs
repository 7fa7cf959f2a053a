// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

mod cli;
mod config;
mod errors;
mod manifest;
mod naming;
mod session;
mod status;
mod storage;
mod torrent_file;
mod transport;

use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;

use tracing_subscriber::filter::Targets;
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*};

use crate::config::load_settings;
use crate::errors::SessionError;
use crate::manifest::Manifest;
use crate::session::{Session, SessionConfig};
use crate::transport::UdpTransport;

const DEFAULT_LOG_FILTER: LevelFilter = LevelFilter::INFO;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = cli::Cli::parse();

    let base_data_dir = config::get_app_paths()
        .map(|(_, data_dir)| data_dir)
        .unwrap_or_else(|| env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    let log_dir = base_data_dir.join("logs");
    let general_log = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(31)
        .filename_prefix("ccnx-torrent")
        .filename_suffix("log")
        .build(&log_dir)
        .expect("Failed to initialize rolling file appender");
    let (non_blocking_general, _guard_general) = tracing_appender::non_blocking(general_log);
    let general_layer = fs::create_dir_all(&log_dir).is_ok().then(|| {
        fmt::layer()
            .with_writer(non_blocking_general)
            .with_ansi(false)
            .with_filter(Targets::new().with_default(DEFAULT_LOG_FILTER))
    });
    let stderr_layer = fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_filter(Targets::new().with_default(DEFAULT_LOG_FILTER));
    let _subscriber_result = tracing_subscriber::registry()
        .with(general_layer)
        .with(stderr_layer)
        .try_init();

    tracing::info!("STARTING CCNX-TORRENT");

    let mut settings = load_settings();
    cli.apply_overrides(&mut settings);
    if cli.save_settings {
        if let Err(e) = config::save_settings(&settings) {
            tracing::error!("Failed to save settings: {}", e);
        }
    }

    let manifest = match Manifest::load(&cli.torrent) {
        Ok(manifest) => manifest,
        Err(e) => {
            tracing::error!("Failed to load {:?}: {}", cli.torrent, e);
            return Err(e.into());
        }
    };

    let transport = Arc::new(UdpTransport::connect(settings.bind_addr, settings.forwarder_addr).await?);
    let cache_dir = settings.resolved_cache_dir();
    let session = Session::new(
        manifest,
        SessionConfig::from_settings(&settings),
        &cache_dir,
        transport,
    )
    .await?;
    let progress_rx = session.progress();
    let content_dir = session.content_dir().to_path_buf();
    tracing::info!(path = ?content_dir, "Saving content.");

    match session.run().await {
        Ok(progress) => {
            println!("{}", progress);
            println!("Saved to {}", content_dir.display());
            Ok(())
        }
        Err(SessionError::Interrupted) => {
            let progress = progress_rx.borrow().clone();
            println!("{}", progress);
            if progress.is_complete() {
                println!("Saved to {}", content_dir.display());
            } else {
                println!("Partial content left in {}", content_dir.display());
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("[Error] Session failed: {}", e);
            Err(e.into())
        }
    }
}
