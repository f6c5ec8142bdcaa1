//! Storage for uploaded files below the media root.

use rand::{Rng, distr::Alphanumeric};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;

/// Directory below the media root that holds post images.
pub const POST_IMAGE_DIR: &str = "posts";
const COLLISION_SUFFIX_LEN: usize = 7;

#[derive(Debug, Error)]
#[error("Accessing media file {path:?} failed: {source}")]
pub struct MediaError {
    path: PathBuf,
    source: std::io::Error,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct MediaStorage {
    root: PathBuf,
}

impl MediaStorage {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes a post image under its sanitized original filename and returns
    /// the path relative to the media root. Existing files are never replaced;
    /// a random suffix is added to the name instead.
    pub async fn save_post_image(
        &self,
        filename: &str,
        content: &[u8],
    ) -> Result<String, MediaError> {
        let directory = self.root.join(POST_IMAGE_DIR);
        fs::create_dir_all(&directory)
            .await
            .map_err(|source| MediaError {
                path: directory.clone(),
                source,
            })?;

        let name = valid_file_name(filename);
        let mut candidate = name.clone();
        loop {
            let path = directory.join(&candidate);
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    let written = async {
                        file.write_all(content).await?;
                        file.flush().await
                    }
                    .await;
                    written.map_err(|source| MediaError { path, source })?;

                    debug!(file = %candidate, "Stored post image");
                    return Ok(format!("{POST_IMAGE_DIR}/{candidate}"));
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    candidate = with_random_suffix(&name);
                }
                Err(source) => return Err(MediaError { path, source }),
            }
        }
    }

    /// Deletes a file previously stored under `path`, relative to the media root.
    pub async fn remove(&self, path: &str) -> Result<(), MediaError> {
        let path = self.root.join(path);
        if let Err(source) = fs::remove_file(&path).await {
            return Err(MediaError { path, source });
        }

        debug!(file = %path.display(), "Removed media file");
        Ok(())
    }
}

/// Keeps the last path component, turns whitespace into underscores and drops
/// everything except alphanumerics, `-`, `_` and `.`.
fn valid_file_name(filename: &str) -> String {
    let base_name = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base_name
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|&c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "image".to_owned()
    } else {
        cleaned.to_owned()
    }
}

fn with_random_suffix(name: &str) -> String {
    let suffix: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(COLLISION_SUFFIX_LEN)
        .map(char::from)
        .collect();

    match name.rsplit_once('.') {
        Some((stem, extension)) => format!("{stem}_{suffix}.{extension}"),
        None => format!("{name}_{suffix}"),
    }
}
