//! Content-addressed image storage
//!
//! Card images picked by the user are copied into the data directory so
//! the card keeps working after the original file moves. Files are keyed
//! by SHA-256 and spread over a two-level directory structure.
//!
//! Example: hash "abcd1234..." with extension "png" is stored at
//! "images/ab/cd/abcd1234....png"

use crate::error::{AppError, Result};
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Image store rooted in the data directory
#[derive(Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    /// Create a new image store at the given root directory
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Initialize the image store (create directory if needed)
    pub async fn initialize(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        tracing::info!("Image store initialized at: {:?}", self.root);
        Ok(())
    }

    /// Copy image bytes into the store, returning the stored path.
    ///
    /// Storing the same bytes twice returns the same path.
    pub async fn store(&self, data: &[u8], extension: &str) -> Result<PathBuf> {
        let extension = sanitize_extension(extension)?;
        let hash = calculate_hash(data);
        let path = self.path_for(&hash, &extension);

        if path.exists() {
            tracing::debug!("Image already stored: {}", hash);
            return Ok(path);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write to temp file first (atomic write)
        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;

        fs::rename(temp_path, &path).await?;

        tracing::debug!("Stored image: {} ({} bytes)", hash, data.len());

        Ok(path)
    }

    /// Copy an image file from elsewhere on disk into the store
    pub async fn import_file(&self, source: &Path) -> Result<PathBuf> {
        let data = fs::read(source).await?;
        let extension = source
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("img");
        self.store(&data, extension).await
    }

    /// Whether `path` points inside this store
    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        path.starts_with(&self.root)
            && !path.components().any(|c| matches!(c, Component::ParentDir))
    }

    /// Delete a stored image.
    ///
    /// Paths outside the store (external URIs, user files) are left alone,
    /// as are files that are already gone.
    pub async fn delete(&self, path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref();

        if !self.contains(path) {
            tracing::debug!("Not deleting image outside store: {:?}", path);
            return Ok(false);
        }

        if !path.exists() {
            return Ok(false);
        }

        fs::remove_file(path).await?;

        tracing::debug!("Deleted image: {:?}", path);

        Ok(true)
    }

    /// List all stored image files
    pub async fn list_all(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        self.scan_directory(&self.root, &mut files).await?;
        files.sort();
        Ok(files)
    }

    fn scan_directory<'a>(
        &'a self,
        dir: &'a Path,
        files: &'a mut Vec<PathBuf>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if !dir.exists() {
                return Ok(());
            }

            let mut entries = fs::read_dir(dir).await?;

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();

                if path.is_dir() {
                    self.scan_directory(&path, files).await?;
                } else if path.is_file() && is_hash_name(&path) {
                    files.push(path);
                }
            }

            Ok(())
        })
    }

    /// Get image store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, hash: &str, extension: &str) -> PathBuf {
        self.root
            .join(&hash[0..2])
            .join(&hash[2..4])
            .join(format!("{}.{}", hash, extension))
    }
}

fn calculate_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

fn is_hash_name(path: &Path) -> bool {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .is_some_and(|stem| stem.len() == 64 && stem.chars().all(|c| c.is_ascii_hexdigit()))
}

fn sanitize_extension(extension: &str) -> Result<String> {
    let extension = extension.trim().trim_start_matches('.').to_ascii_lowercase();

    if extension.is_empty()
        || extension.len() > 10
        || !extension.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(AppError::ImageStore(format!(
            "Invalid image extension: {:?}",
            extension
        )));
    }

    Ok(extension)
}
