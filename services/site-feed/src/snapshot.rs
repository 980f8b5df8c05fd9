//! Ranked snapshot construction
//!
//! A snapshot is the full replacement view a client receives on each tick:
//! the top-N sites with their original fields plus an `updatedAt`
//! freshness stamp. Every push is self-contained; there are no deltas.
//!
//! One `SnapshotBuilder` belongs to one subscription. It numbers deliveries
//! and keeps the freshness stamps strictly increasing even if the wall clock
//! stalls or steps backwards.

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use types::errors::FeedError;
use types::site::SiteRecord;

use crate::ranking::rank_top_n;

/// Wire key of the freshness stamp.
pub const UPDATED_AT: &str = "updatedAt";

/// One ranked site as pushed to clients.
///
/// Serializes as the source record's own fields plus `updatedAt`. A stale
/// `updatedAt` carried in from the source is replaced, never duplicated.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry {
    pub site: SiteRecord,
    /// Time of the computation, not of the underlying data change.
    pub updated_at: DateTime<Utc>,
}

impl Serialize for SnapshotEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("geoId", &self.site.geo_id)?;
        map.serialize_entry("severity", &self.site.severity)?;
        for (key, value) in self.site.extra.iter().filter(|(key, _)| key.as_str() != UPDATED_AT) {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry(
            UPDATED_AT,
            &self.updated_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        )?;
        map.end()
    }
}

/// Top-N view computed for one tick of one subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedSnapshot {
    /// Per-subscription delivery number; tick 0 is the connect-time push.
    pub sequence: u64,
    /// Freshness stamp shared by every entry.
    pub generated_at: DateTime<Utc>,
    /// Size of the record set the ranking was taken from.
    pub total_records: usize,
    /// Most urgent first.
    pub entries: Vec<SnapshotEntry>,
}

impl RankedSnapshot {
    /// Serialize the wire payload: the ordered JSON array of entries.
    pub fn payload(&self) -> Result<String, FeedError> {
        serde_json::to_string(&self.entries).map_err(|e| FeedError::Serialization {
            message: e.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builds numbered snapshots for a single subscription.
pub struct SnapshotBuilder {
    top_n: usize,
    next_sequence: u64,
    last_generated: Option<DateTime<Utc>>,
}

impl SnapshotBuilder {
    pub fn new(top_n: usize) -> Self {
        Self {
            top_n,
            next_sequence: 0,
            last_generated: None,
        }
    }

    /// Rank `records` and stamp the result with `now`.
    ///
    /// The stamp is truncated to milliseconds (the wire precision) and bumped
    /// by one millisecond past the previous snapshot when the clock has not
    /// moved forward.
    pub fn build(&mut self, records: &[SiteRecord], now: DateTime<Utc>) -> RankedSnapshot {
        let mut generated_at = now.trunc_subsecs(3);
        if let Some(last) = self.last_generated {
            if generated_at <= last {
                generated_at = last + Duration::milliseconds(1);
            }
        }
        self.last_generated = Some(generated_at);

        let entries = rank_top_n(records, self.top_n)
            .into_iter()
            .map(|site| SnapshotEntry {
                site: site.clone(),
                updated_at: generated_at,
            })
            .collect();

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        RankedSnapshot {
            sequence,
            generated_at,
            total_records: records.len(),
            entries,
        }
    }

    /// Number of snapshots built so far.
    pub fn built(&self) -> u64 {
        self.next_sequence
    }
}
