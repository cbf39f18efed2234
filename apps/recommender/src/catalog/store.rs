//! Catalog file and crawl cursor persistence.
//!
//! Both files are rewritten whole through a temp file in the same directory followed by a
//! rename, so a crash mid-write leaves the previous version intact.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::models::assessment::{AssessmentRecord, SolutionType};

/// The flat catalog file: a pretty-printed JSON array of [`AssessmentRecord`].
#[derive(Debug, Clone)]
pub struct CatalogStore {
    path: PathBuf,
}

impl CatalogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads all records. A missing file is an empty catalog.
    pub fn load(&self) -> Result<Vec<AssessmentRecord>> {
        Ok(read_json(&self.path)?.unwrap_or_default())
    }

    /// Loads records keyed by id; later duplicates win.
    pub fn load_map(&self) -> Result<BTreeMap<String, AssessmentRecord>> {
        Ok(self
            .load()?
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect())
    }

    /// Replaces the file with `records`, ordered by id.
    pub fn save<'a>(&self, records: impl IntoIterator<Item = &'a AssessmentRecord>) -> Result<()> {
        let mut records: Vec<&AssessmentRecord> = records.into_iter().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        write_json_atomic(&self.path, &records)
    }
}

/// Where a crawl stopped. Persisted after every listing page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlCursor {
    pub solution_type: SolutionType,
    /// Offset of the next listing page to visit.
    pub next_start: u32,
    pub pages_visited: u32,
    pub finished: bool,
    pub updated_at: DateTime<Utc>,
}

impl CrawlCursor {
    pub fn start() -> Self {
        Self {
            solution_type: SolutionType::Individual,
            next_start: 0,
            pages_visited: 0,
            finished: false,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<Option<CrawlCursor>> {
        read_json(&self.path)
    }

    pub fn save(&self, cursor: &CrawlCursor) -> Result<()> {
        write_json_atomic(&self.path, cursor)
    }

    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("failed to remove {}", self.path.display())),
        }
    }
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match std::fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str(&raw)
            .map(Some)
            .with_context(|| format!("failed to parse {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
    }
}

pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}
