//! Identifier types for monitored sites and live-feed subscriptions
//!
//! Site identifiers come from the external data source and are opaque;
//! subscription identifiers are allocated locally by the feed service.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Geographic identifier of a monitored site (cell / eNodeB location)
///
/// Opaque and unique per record. Ordered lexicographically, which the
/// ranking uses as its secondary key for equal severities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeoId(String);

impl GeoId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Try to create a GeoId, returning None for blank identifiers
    pub fn try_new(id: impl Into<String>) -> Option<Self> {
        let s = id.into();
        if s.trim().is_empty() {
            None
        } else {
            Some(Self(s))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GeoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for GeoId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identifier of one client subscription to the live feed
///
/// Allocated monotonically by the subscription registry, never reused
/// within a process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}
