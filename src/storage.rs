// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::errors::StorageError;
use crate::manifest::{Manifest, ManifestFile};
use std::path::{Component, Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt, SeekFrom};

#[derive(Debug, Clone)]
pub struct FileInfo {
    pub path: PathBuf,            // Full path of the file on disk.
    pub length: u64,              // Length of the file in bytes.
    pub global_start_offset: u64, // Start of this file within the reconstructed byte stream.
}

/// Maps the content's flat byte range onto one or more files below the
/// content's cache directory.
#[derive(Debug, Clone)]
pub struct MultiFileInfo {
    pub root_dir: PathBuf,
    pub files: Vec<FileInfo>,
    pub total_size: u64,
}

impl MultiFileInfo {
    /// `root_dir` is the per-content cache directory; single-file content is
    /// stored as `root_dir/<name>`, multi-file content below `root_dir` by path.
    pub fn new(
        root_dir: &Path,
        content_name: &str,
        files: Option<&[ManifestFile]>,
        length: u64,
    ) -> std::io::Result<Self> {
        if let Some(content_files) = files {
            let mut files_vec = Vec::with_capacity(content_files.len());
            let mut current_offset = 0;

            for f in content_files {
                let mut full_path = root_dir.to_path_buf();
                for component in &f.path {
                    full_path.push(checked_component(component)?);
                }

                files_vec.push(FileInfo {
                    path: full_path,
                    length: f.length,
                    global_start_offset: current_offset,
                });

                current_offset += f.length;
            }
            Ok(Self {
                root_dir: root_dir.to_path_buf(),
                files: files_vec,
                total_size: current_offset,
            })
        } else {
            let file_path = root_dir.join(checked_component(content_name)?);
            Ok(Self {
                root_dir: root_dir.to_path_buf(),
                files: vec![FileInfo {
                    path: file_path,
                    length,
                    global_start_offset: 0,
                }],
                total_size: length,
            })
        }
    }

    pub fn from_manifest(cache_dir: &Path, manifest: &Manifest) -> std::io::Result<Self> {
        let root_dir = cache_dir.join(checked_component(&manifest.name)?);
        Self::new(
            &root_dir,
            &manifest.name,
            manifest.files.as_deref(),
            manifest.total_length,
        )
    }
}

// A path segment from the manifest must name exactly one normal component.
fn checked_component(segment: &str) -> std::io::Result<&str> {
    let mut components = Path::new(segment).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(segment),
        _ => Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("unsafe path segment in manifest: {:?}", segment),
        )),
    }
}

impl MultiFileInfo {
    /// Splits `len` bytes at `global_offset` into per-file `(file, local
    /// offset, data range)` runs. Fails without touching disk when the range
    /// runs past the end of the content.
    fn spans(
        &self,
        global_offset: u64,
        len: usize,
    ) -> std::io::Result<Vec<(&FileInfo, u64, std::ops::Range<usize>)>> {
        let end = global_offset
            .checked_add(len as u64)
            .filter(|end| *end <= self.total_size)
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!(
                        "write of {} bytes at {} exceeds content size {}",
                        len, global_offset, self.total_size
                    ),
                )
            })?;

        Ok(self
            .files
            .iter()
            .filter_map(|file| {
                let file_end = file.global_start_offset + file.length;
                let from = global_offset.max(file.global_start_offset);
                let to = end.min(file_end);
                (from < to).then(|| {
                    let data_start = (from - global_offset) as usize;
                    let data_end = (to - global_offset) as usize;
                    (file, from - file.global_start_offset, data_start..data_end)
                })
            })
            .collect())
    }
}

/// Creates the cache directory and sizes every file of the content. Files
/// left by an earlier run keep their bytes; only their length is corrected.
pub async fn create_and_allocate_files(
    multi_file_info: &MultiFileInfo,
) -> Result<(), StorageError> {
    let root = &multi_file_info.root_dir;
    fs::create_dir_all(root).await?;

    for file_info in &multi_file_info.files {
        let dir = file_info
            .path
            .parent()
            .filter(|dir| dir.starts_with(root))
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("{:?} is outside {:?}", file_info.path, root),
                )
            })?;
        if dir != root.as_path() {
            fs::create_dir_all(dir).await?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&file_info.path)
            .await?;
        if file.metadata().await?.len() != file_info.length {
            file.set_len(file_info.length).await?;
        }
    }
    Ok(())
}

/// Writes `data` at `global_offset` of the content, splitting it across file
/// boundaries where needed.
pub async fn write_data_to_disk(
    multi_file_info: &MultiFileInfo,
    global_offset: u64,
    data: &[u8],
) -> Result<(), StorageError> {
    for (file_info, local_offset, range) in multi_file_info.spans(global_offset, data.len())? {
        let mut file = OpenOptions::new().write(true).open(&file_info.path).await?;
        file.seek(SeekFrom::Start(local_offset)).await?;
        file.write_all(&data[range]).await?;
        file.flush().await?;
    }
    Ok(())
}
