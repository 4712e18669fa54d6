//! Timestamped manifest backups.
//!
//! Layout: `<project>/.depshift/backups/package.json.<UTC timestamp>-<id>.bak`
//! with an optional `<same stem>.json` sidecar recording which upgrade was
//! about to be applied. The fixed-width timestamp makes lexicographic order
//! chronological; the random suffix keeps two backups in the same
//! millisecond apart. Backups are never pruned.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::domain::{DepshiftError, Result};
use crate::package_manager::MANIFEST_FILE;

/// Backup directory relative to the project root.
pub const DEFAULT_BACKUP_DIR: &str = ".depshift/backups";

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";
const BACKUP_EXT: &str = ".bak";
const SIDECAR_EXT: &str = ".json";

/// Upgrade that was active when a backup was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub package: String,
    #[serde(default)]
    pub from_version: Option<String>,
    pub to_version: String,
    #[serde(default)]
    pub proposal_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub path: PathBuf,
    pub file_name: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Option<BackupMetadata>,
}

/// Backup area for one project.
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted at `<project>/<relative_dir>`.
    pub fn for_project(project: &Path, relative_dir: &Path) -> Self {
        Self::new(project.join(relative_dir))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy `manifest` into the backup area.
    pub fn create(
        &self,
        manifest: &Path,
        metadata: Option<&BackupMetadata>,
    ) -> Result<BackupRecord> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            DepshiftError::Backup(format!("failed to create {}: {e}", self.dir.display()))
        })?;

        let now = Utc::now();
        let suffix = Uuid::new_v4().simple().to_string();
        let stem = format!(
            "{MANIFEST_FILE}.{}-{}",
            now.format(TIMESTAMP_FORMAT),
            &suffix[..8]
        );
        let file_name = format!("{stem}{BACKUP_EXT}");
        let path = self.dir.join(&file_name);

        std::fs::copy(manifest, &path).map_err(|e| {
            DepshiftError::Backup(format!(
                "failed to copy {} to {}: {e}",
                manifest.display(),
                path.display()
            ))
        })?;

        if let Some(meta) = metadata {
            let sidecar = self.dir.join(format!("{stem}{SIDECAR_EXT}"));
            let json = serde_json::to_vec_pretty(meta)?;
            std::fs::write(&sidecar, json).map_err(|e| {
                DepshiftError::Backup(format!("failed to write {}: {e}", sidecar.display()))
            })?;
        }

        debug!(backup = %path.display(), "manifest backed up");
        Ok(BackupRecord {
            path,
            file_name,
            created_at: parse_timestamp(&stem),
            metadata: metadata.cloned(),
        })
    }

    /// All manifest backups, oldest first. A missing directory means none.
    pub fn list(&self) -> Result<Vec<BackupRecord>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(DepshiftError::Backup(format!(
                    "failed to list {}: {e}",
                    self.dir.display()
                )))
            }
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(&format!("{MANIFEST_FILE}.")) && name.ends_with(BACKUP_EXT) {
                names.push(name);
            }
        }
        names.sort();

        Ok(names
            .into_iter()
            .map(|file_name| {
                let stem = file_name.trim_end_matches(BACKUP_EXT).to_string();
                BackupRecord {
                    path: self.dir.join(&file_name),
                    created_at: parse_timestamp(&stem),
                    metadata: self.read_metadata(&stem),
                    file_name,
                }
            })
            .collect())
    }

    pub fn latest(&self) -> Result<Option<BackupRecord>> {
        Ok(self.list()?.pop())
    }

    /// Copy the most recent backup over `manifest`.
    pub fn restore_latest(&self, manifest: &Path) -> Result<BackupRecord> {
        let record = self
            .latest()?
            .ok_or_else(|| DepshiftError::NoBackups(self.dir.display().to_string()))?;
        std::fs::copy(&record.path, manifest).map_err(|e| {
            DepshiftError::Backup(format!(
                "failed to restore {} from {}: {e}",
                manifest.display(),
                record.path.display()
            ))
        })?;
        Ok(record)
    }

    fn read_metadata(&self, stem: &str) -> Option<BackupMetadata> {
        let raw = std::fs::read(self.dir.join(format!("{stem}{SIDECAR_EXT}"))).ok()?;
        serde_json::from_slice(&raw).ok()
    }
}

fn parse_timestamp(stem: &str) -> Option<DateTime<Utc>> {
    let rest = stem.strip_prefix(&format!("{MANIFEST_FILE}."))?;
    let (ts, _) = rest.rsplit_once('-')?;
    NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
