//! Output directory layout: `<root>/<kind dir>/<service>-<suffix>.<ext>`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rand::random;
use tracing::debug;

use crate::core::router::ArtifactKind;

/// Artifact output root, passed explicitly to whoever writes artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn kind_dir(&self, kind: ArtifactKind) -> PathBuf {
        self.root.join(kind.route().directory)
    }

    pub fn artifact_path(&self, kind: ArtifactKind, service: &str) -> PathBuf {
        let route = kind.route();
        self.kind_dir(kind)
            .join(format!("{service}-{}.{}", route.suffix, route.extension))
    }

    pub fn params_path(&self, service: &str) -> PathBuf {
        self.artifact_path(ArtifactKind::ParameterDoc, service)
    }

    /// Create the directory for `kind` if needed. Safe to call repeatedly.
    pub fn ensure_kind_dir(&self, kind: ArtifactKind) -> Result<PathBuf> {
        let dir = self.kind_dir(kind);
        fs::create_dir_all(&dir).with_context(|| format!("create directory {}", dir.display()))?;
        Ok(dir)
    }

    /// Create every kind directory.
    pub fn ensure_all(&self) -> Result<()> {
        for kind in ArtifactKind::ALL {
            self.ensure_kind_dir(kind)?;
        }
        Ok(())
    }
}

/// True when `service` can be used as a file-name stem inside a kind dir.
pub fn is_safe_service_name(service: &str) -> bool {
    !service.is_empty()
        && service != "."
        && service != ".."
        && !service.contains(['/', '\\'])
        && !service.contains('\0')
}

/// Write `contents` via a uniquely named sibling temp file and a rename.
///
/// Readers never see a partially written file. Concurrent writers to the same
/// path are last-writer-wins.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .with_context(|| format!("artifact path missing file name {}", path.display()))?;
    let tmp_path = parent.join(format!(
        ".{}.{:016x}.tmp",
        file_name.to_string_lossy(),
        random::<u64>()
    ));
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err).with_context(|| format!("replace {}", path.display()));
    }
    debug!(path = %path.display(), bytes = contents.len(), "wrote file");
    Ok(())
}
