use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::Result;

/// A downloaded result and where it belongs.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub target: PathBuf,
}

impl Artifact {
    pub fn new(bytes: Vec<u8>, target: impl Into<PathBuf>) -> Self {
        Self {
            bytes,
            target: target.into(),
        }
    }

    pub fn persist(&self) -> Result<()> {
        persist(&self.bytes, &self.target)
    }
}

/// Write `bytes` to `path` atomically.
///
/// The data goes to a temporary file next to `path` which is then renamed
/// over it, so readers never see a partial file. Parent directories are
/// created as needed. An existing file is replaced.
pub fn persist(bytes: &[u8], path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    tracing::debug!(path = %path.display(), bytes = bytes.len(), "Artifact written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persist_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("2025-01-01/artifacts/personas/01_a.png");

        persist(b"png-bytes", &target).unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"png-bytes");
    }

    #[test]
    fn persist_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("clip.mp4");

        Artifact::new(vec![1, 2, 3], &target).persist().unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(std::fs::read(&target).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn persist_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.bin");
        std::fs::write(&target, b"old").unwrap();

        persist(b"new", &target).unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"new");
    }
}
