// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Directory-backed store for uploaded images, keyed by filename

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::{LeafscanError, Result};

/// URL prefix under which stored images are served
pub const IMAGE_ROUTE: &str = "/history/image";

/// Flat directory of uploaded blobs
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    /// Open the store, creating the directory if needed
    pub fn open<P: Into<PathBuf>>(root: P) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of a blob on disk. `name` must already be sanitized.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).is_file()
    }

    /// Write a blob, replacing any existing one with the same name
    pub fn put(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let name = sanitize_filename(name)?;
        fs::write(self.path_for(&name), bytes)?;
        debug!("Stored {} ({} bytes)", name, bytes.len());
        Ok(())
    }

    /// Remove a blob. A missing file is not an error.
    pub fn delete(&self, name: &str) -> Result<()> {
        let name = sanitize_filename(name)?;
        match fs::remove_file(self.path_for(&name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort removal of every file in the store; returns how many went away
    pub fn delete_all(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.root)? {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    warn!("Failed to read store entry: {}", e);
                    continue;
                }
            };
            if !path.is_file() {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove {:?}: {}", path, e),
            }
        }
        Ok(removed)
    }

    /// Public URL of a blob under `base_url`
    pub fn url_for(&self, base_url: &str, name: &str) -> String {
        format!(
            "{}{}/{}",
            base_url.trim_end_matches('/'),
            IMAGE_ROUTE,
            urlencoding::encode(name)
        )
    }
}

/// Reduce an upload name to a single safe path component
pub fn sanitize_filename(raw: &str) -> Result<String> {
    let name = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if name.is_empty() || name == "." || name == ".." || name.contains('\0') {
        return Err(LeafscanError::InvalidFilename(raw.to_string()));
    }
    Ok(name.to_string())
}

/// Name for an upload that arrived without a usable filename
pub fn generated_filename(bytes: &[u8]) -> String {
    let ext = image::guess_format(bytes)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("bin");
    format!("upload-{}.{}", uuid::Uuid::new_v4(), ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_keeps_plain_names() {
        assert_eq!(sanitize_filename("leaf.jpg").unwrap(), "leaf.jpg");
        assert_eq!(sanitize_filename("  лист 1.png ").unwrap(), "лист 1.png");
    }

    #[test]
    fn test_sanitize_strips_directories() {
        assert_eq!(sanitize_filename("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\leaf.jpg").unwrap(), "leaf.jpg");
        assert_eq!(sanitize_filename("dir/sub/leaf.jpg").unwrap(), "leaf.jpg");
    }

    #[test]
    fn test_sanitize_rejects_empty_and_dots() {
        for raw in ["", "   ", ".", "..", "a/..", "dir/"] {
            assert!(sanitize_filename(raw).is_err(), "accepted {:?}", raw);
        }
    }

    #[test]
    fn test_put_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::open(dir.path().join("images")).unwrap();

        store.put("leaf.jpg", b"first").unwrap();
        store.put("leaf.jpg", b"second").unwrap();

        assert_eq!(fs::read(store.path_for("leaf.jpg")).unwrap(), b"second");
    }

    #[test]
    fn test_delete_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::open(dir.path()).unwrap();

        store.put("leaf.jpg", b"x").unwrap();
        store.delete("leaf.jpg").unwrap();
        store.delete("leaf.jpg").unwrap();
        assert!(!store.exists("leaf.jpg"));
    }

    #[test]
    fn test_delete_all_empties_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::open(dir.path()).unwrap();
        for name in ["a.jpg", "b.png", "c.webp"] {
            store.put(name, b"data").unwrap();
        }

        assert_eq!(store.delete_all().unwrap(), 3);
        assert_eq!(fs::read_dir(store.root()).unwrap().count(), 0);
    }

    #[test]
    fn test_url_for_encodes_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::open(dir.path()).unwrap();

        assert_eq!(
            store.url_for("http://127.0.0.1:8000/", "my leaf.jpg"),
            "http://127.0.0.1:8000/history/image/my%20leaf.jpg"
        );
    }

    #[test]
    fn test_generated_filename_uses_detected_format() {
        let mut png = Vec::new();
        image::RgbImage::new(2, 2)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let name = generated_filename(&png);
        assert!(name.starts_with("upload-"));
        assert!(name.ends_with(".png"));
        assert!(generated_filename(b"not an image").ends_with(".bin"));
    }
}
