//! Site record repository
//!
//! Owns the in-memory record set the feed ranks on every tick. The set is
//! stored as an immutable `Arc<[SiteRecord]>`; readers clone the `Arc` and
//! writers swap in a complete replacement, so a tick always ranks either the
//! fully old or the fully new set.
//!
//! Loading validates each entry of the source document individually:
//! - Unreadable files and non-array documents are fatal
//! - Malformed entries and duplicate ids are skipped and reported
//! - A non-empty document with no valid entry is fatal

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use types::errors::{LoadError, UpdateError};
use types::ids::GeoId;
use types::numeric::Severity;
use types::site::{SeverityUpdate, SiteRecord};

/// Read access to the current record set.
pub trait SiteRepository: Send + Sync + 'static {
    /// Current record set. Cheap: clones an `Arc`.
    fn snapshot(&self) -> Arc<[SiteRecord]>;

    fn len(&self) -> usize {
        self.snapshot().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An entry of the source document that was not loaded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRecord {
    /// Position in the source array.
    pub index: usize,
    pub reason: String,
}

/// Outcome of loading the source document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: Vec<SkippedRecord>,
}

/// Outcome of applying a batch of severity updates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateReport {
    /// Records whose severity was replaced.
    pub applied: usize,
    /// Update targets that matched no record.
    pub unknown: Vec<GeoId>,
}

/// Record set held in memory, swapped wholesale on every write.
#[derive(Debug)]
pub struct InMemorySiteRepository {
    records: RwLock<Arc<[SiteRecord]>>,
}

impl InMemorySiteRepository {
    /// Create a repository, rejecting duplicate identifiers.
    pub fn new(records: Vec<SiteRecord>) -> Result<Self, UpdateError> {
        ensure_unique(&records)?;
        Ok(Self {
            records: RwLock::new(records.into()),
        })
    }

    pub fn empty() -> Self {
        Self {
            records: RwLock::new(Vec::new().into()),
        }
    }

    /// Replace the whole record set.
    pub fn replace(&self, records: Vec<SiteRecord>) -> Result<(), UpdateError> {
        ensure_unique(&records)?;
        let count = records.len();
        *self.records.write().unwrap_or_else(PoisonError::into_inner) = records.into();
        info!(records = count, "Record set replaced");
        Ok(())
    }

    /// Apply fresh severities atomically.
    ///
    /// All updates are validated before anything is written; a single
    /// non-finite severity rejects the batch. Unknown ids are reported, not
    /// rejected. When an id appears more than once the last update wins.
    pub fn apply_severity_updates(&self, updates: &[SeverityUpdate]) -> Result<UpdateReport, UpdateError> {
        let mut fresh: HashMap<&GeoId, Severity> = HashMap::with_capacity(updates.len());
        for update in updates {
            let severity = Severity::new(update.severity).ok_or_else(|| UpdateError::InvalidSeverity {
                geo_id: update.geo_id.clone(),
                value: update.severity,
            })?;
            fresh.insert(&update.geo_id, severity);
        }

        // hold the write lock across read-modify-write so concurrent batches
        // cannot lose each other's changes
        let mut guard = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let mut applied = 0;
        let next: Vec<SiteRecord> = guard
            .iter()
            .map(|record| match fresh.get(&record.geo_id) {
                Some(severity) => {
                    applied += 1;
                    record.with_severity(*severity)
                }
                None => record.clone(),
            })
            .collect();

        let known: HashSet<&GeoId> = guard.iter().map(|r| &r.geo_id).collect();
        let unknown: Vec<GeoId> = fresh
            .keys()
            .filter(|id| !known.contains(*id))
            .map(|id| (*id).clone())
            .collect();

        *guard = next.into();
        drop(guard);

        debug!(applied, unknown = unknown.len(), "Severity updates applied");
        Ok(UpdateReport { applied, unknown })
    }
}

impl SiteRepository for InMemorySiteRepository {
    fn snapshot(&self) -> Arc<[SiteRecord]> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn ensure_unique(records: &[SiteRecord]) -> Result<(), UpdateError> {
    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        if !seen.insert(&record.geo_id) {
            return Err(UpdateError::DuplicateGeoId(record.geo_id.clone()));
        }
    }
    Ok(())
}

/// Read the source document from disk and build a repository.
pub async fn load_from_path(path: impl AsRef<Path>) -> Result<(InMemorySiteRepository, LoadReport), LoadError> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path).await.map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let (records, report) = parse_records(path, &text)?;
    let repository = InMemorySiteRepository {
        records: RwLock::new(records.into()),
    };

    info!(
        path = %path.display(),
        loaded = report.loaded,
        skipped = report.skipped.len(),
        "Site records loaded"
    );
    Ok((repository, report))
}

/// Parse a JSON array of site records, skipping malformed entries.
///
/// `origin` only labels errors and log lines.
pub fn parse_records(origin: &Path, text: &str) -> Result<(Vec<SiteRecord>, LoadReport), LoadError> {
    let document: Value = serde_json::from_str(text).map_err(|source| LoadError::Parse {
        path: origin.to_path_buf(),
        source,
    })?;
    let Value::Array(entries) = document else {
        return Err(LoadError::NotAnArray {
            path: origin.to_path_buf(),
        });
    };

    let total = entries.len();
    let mut records = Vec::with_capacity(total);
    let mut report = LoadReport::default();
    let mut seen: HashSet<GeoId> = HashSet::with_capacity(total);

    for (index, entry) in entries.into_iter().enumerate() {
        let reason = match serde_json::from_value::<SiteRecord>(entry) {
            Ok(record) if record.geo_id.as_str().trim().is_empty() => "blank geoId".to_string(),
            Ok(record) if !seen.insert(record.geo_id.clone()) => {
                format!("duplicate geoId {}", record.geo_id)
            }
            Ok(record) => {
                records.push(record);
                continue;
            }
            Err(e) => e.to_string(),
        };
        warn!(index, reason = %reason, "Skipping malformed site record");
        report.skipped.push(SkippedRecord { index, reason });
    }

    if total > 0 && records.is_empty() {
        return Err(LoadError::NoValidRecords {
            path: PathBuf::from(origin),
            total,
        });
    }
    if total == 0 {
        warn!(path = %origin.display(), "Site data is an empty array; feed will push empty snapshots");
    }

    report.loaded = records.len();
    Ok((records, report))
}
