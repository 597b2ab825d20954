
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{Result, StudyError};

/// The document store the pipeline reads from. The core is indifferent to
/// where the bytes live; this seam keeps it that way.
pub trait BlobStore {
    fn save(&self, name: &str, bytes: &[u8]) -> Result<()>;
    /// Names of stored documents, sorted.
    fn list(&self) -> Result<Vec<String>>;
    fn read(&self, name: &str) -> Result<Vec<u8>>;
    /// Returns whether the document existed.
    fn delete(&self, name: &str) -> Result<bool>;
}

/// Blob store over a local directory of PDF files.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    #[inline]
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        // Names are flat; anything path-like would escape the store.
        if name.contains(['/', '\\']) || name == ".." {
            return Err(StudyError::Storage(format!(
                "invalid document name: {name}"
            )));
        }
        Ok(self.root.join(name))
    }
}

impl BlobStore for LocalBlobStore {
    #[inline]
    fn save(&self, name: &str, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.root).with_context(|| {
            format!("Failed to create document directory: {}", self.root.display())
        })?;
        let path = self.path_for(name)?;
        fs::write(&path, bytes)
            .with_context(|| format!("Failed to write document: {}", path.display()))?;
        debug!("Saved document {} ({} bytes)", name, bytes.len());
        Ok(())
    }

    #[inline]
    fn list(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)
            .with_context(|| format!("Failed to read directory: {}", self.root.display()))?
        {
            let entry = entry.map_err(StudyError::Io)?;
            let path = entry.path();
            let is_pdf = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
            if path.is_file() && is_pdf {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    names.push(name.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    #[inline]
    fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.path_for(name)?;
        fs::read(&path)
            .with_context(|| format!("Failed to read document: {}", path.display()))
            .map_err(Into::into)
    }

    #[inline]
    fn delete(&self, name: &str) -> Result<bool> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)
            .with_context(|| format!("Failed to delete document: {}", path.display()))?;
        info!("Deleted document {}", name);
        Ok(true)
    }
}

/// What kind of generated artifact is being persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Plan,
    Quiz,
    Summary,
}

impl ArtifactKind {
    fn file_name(self) -> &'static str {
        match self {
            ArtifactKind::Plan => "plan.json",
            ArtifactKind::Quiz => "quiz.json",
            ArtifactKind::Summary => "summary.json",
        }
    }
}

/// Envelope around a saved artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRecord<T> {
    pub id: Uuid,
    pub created_at: String,
    pub payload: T,
}

/// Write-through persistence for generated plans/quizzes/summaries, one JSON
/// file per project and kind. Loads are not validated beyond parsing; the
/// files are a cache of what was generated, not a source of truth.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    #[inline]
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn save<T: Serialize>(&self, kind: ArtifactKind, project: &str, payload: &T) -> Result<PathBuf> {
        let dir = self.root.join(sanitize_project_name(project));
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create artifact directory: {}", dir.display()))?;

        let record = ArtifactRecord {
            id: Uuid::new_v4(),
            created_at: Utc::now().format("%d.%m.%Y").to_string(),
            payload,
        };

        let path = dir.join(kind.file_name());
        let content = serde_json::to_string_pretty(&record)
            .context("Failed to serialize artifact")?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write artifact: {}", path.display()))?;

        info!("Saved {:?} artifact for project {}", kind, project);
        Ok(path)
    }

    #[inline]
    pub fn load<T: DeserializeOwned>(
        &self,
        kind: ArtifactKind,
        project: &str,
    ) -> Result<Option<ArtifactRecord<T>>> {
        let path = self
            .root
            .join(sanitize_project_name(project))
            .join(kind.file_name());
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read artifact: {}", path.display()))?;
        let record = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse artifact: {}", path.display()))?;
        Ok(Some(record))
    }
}

/// Keep project directory names to a safe alphabet.
fn sanitize_project_name(project: &str) -> String {
    let safe: String = project
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_'))
        .collect();
    if safe.is_empty() {
        "default".to_string()
    } else {
        safe
    }
}
