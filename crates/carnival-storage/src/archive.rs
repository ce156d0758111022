use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Location of one archived source page.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub content_hash: String,
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub byte_size: usize,
    /// The same bytes were already on disk for this fetch stamp.
    pub deduplicated: bool,
}

/// Write-once archive of raw source pages, so a parse can be replayed after
/// the listing has changed upstream.
#[derive(Debug, Clone)]
pub struct SnapshotArchive {
    root: PathBuf,
}

impl SnapshotArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn content_hash(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    /// `<YYYYMMDD_HHMMSS>/<source_id>/<sha256>.<ext>`
    pub fn relative_path_for(
        fetched_at: DateTime<Utc>,
        source_id: &str,
        content_hash: &str,
        extension: &str,
    ) -> PathBuf {
        let ext = match extension.trim().trim_start_matches('.') {
            "" => "bin",
            ext => ext,
        };
        PathBuf::from(fetched_at.format("%Y%m%d_%H%M%S").to_string())
            .join(source_id)
            .join(format!("{content_hash}.{ext}"))
    }

    /// Writes through a temp file and renames into place, so readers never see
    /// a partial snapshot.
    pub async fn store(
        &self,
        fetched_at: DateTime<Utc>,
        source_id: &str,
        extension: &str,
        bytes: &[u8],
    ) -> anyhow::Result<Snapshot> {
        let content_hash = Self::content_hash(bytes);
        let relative_path = Self::relative_path_for(fetched_at, source_id, &content_hash, extension);
        let absolute_path = self.root.join(&relative_path);
        let parent = absolute_path
            .parent()
            .ok_or_else(|| anyhow!("snapshot path {} has no parent", absolute_path.display()))?
            .to_path_buf();
        let snapshot = |deduplicated| Snapshot {
            content_hash: content_hash.clone(),
            relative_path: relative_path.clone(),
            absolute_path: absolute_path.clone(),
            byte_size: bytes.len(),
            deduplicated,
        };

        fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("creating snapshot directory {}", parent.display()))?;
        if fs::try_exists(&absolute_path)
            .await
            .with_context(|| format!("checking snapshot {}", absolute_path.display()))?
        {
            return Ok(snapshot(true));
        }

        let temp_path = parent.join(format!(".{}.tmp", Uuid::new_v4()));
        let mut file = fs::File::create(&temp_path)
            .await
            .with_context(|| format!("creating {}", temp_path.display()))?;
        file.write_all(bytes)
            .await
            .with_context(|| format!("writing {}", temp_path.display()))?;
        file.sync_all()
            .await
            .with_context(|| format!("syncing {}", temp_path.display()))?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &absolute_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err).with_context(|| {
                format!(
                    "moving {} into place at {}",
                    temp_path.display(),
                    absolute_path.display()
                )
            });
        }
        Ok(snapshot(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn hash_is_sha256_hex() {
        assert_eq!(
            SnapshotArchive::content_hash(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn blank_extension_falls_back_to_bin() {
        let at = DateTime::parse_from_rfc3339("2025-08-01T06:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let path = SnapshotArchive::relative_path_for(at, "mysideline", "abc", " ");
        assert_eq!(path, PathBuf::from("20250801_063000/mysideline/abc.bin"));
    }

    #[tokio::test]
    async fn identical_bytes_are_stored_once() {
        let dir = tempdir().expect("tempdir");
        let archive = SnapshotArchive::new(dir.path());
        let at = DateTime::parse_from_rfc3339("2025-08-01T06:30:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let first = archive
            .store(at, "mysideline", "json", br#"{"events":[]}"#)
            .await
            .expect("first store");
        let second = archive
            .store(at, "mysideline", ".json", br#"{"events":[]}"#)
            .await
            .expect("second store");

        assert!(!first.deduplicated);
        assert!(second.deduplicated);
        assert_eq!(first.relative_path, second.relative_path);
        assert_eq!(
            std::fs::read(&first.absolute_path).unwrap(),
            br#"{"events":[]}"#.to_vec()
        );
        let leftovers: Vec<_> = std::fs::read_dir(first.absolute_path.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
