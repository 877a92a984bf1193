//! Somatic events and the clusters that group them.
//!
//! Both are immutable once built. Clusters are shared between subclones (and
//! between trees) through `Arc`, never deep-copied.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;

/// Kind tag of a somatic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Single nucleotide variant (point mutation)
    Snv,
    /// Copy-number variant over a segment
    Cnv,
    /// Loss of heterozygosity over a segment
    Loh,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            EventKind::Snv => "snv",
            EventKind::Cnv => "cnv",
            EventKind::Loh => "loh",
        };
        f.write_str(tag)
    }
}

/// Closed genomic interval `[start, end]` on one chromosome.
///
/// A point position is an extent with `start == end`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Extent {
    chrom: String,
    start: u64,
    end: u64,
}

impl Extent {
    pub fn new(chrom: impl Into<String>, start: u64, end: u64) -> Result<Self, DomainError> {
        let chrom = chrom.into();
        if chrom.is_empty() {
            return Err(DomainError::InvalidExtent {
                extent: format!(":{}-{}", start, end),
                reason: "empty chromosome name".to_string(),
            });
        }
        if start > end {
            return Err(DomainError::InvalidExtent {
                extent: format!("{}:{}-{}", chrom, start, end),
                reason: "start after end".to_string(),
            });
        }
        Ok(Self { chrom, start, end })
    }

    pub fn point(chrom: impl Into<String>, position: u64) -> Result<Self, DomainError> {
        Self::new(chrom, position, position)
    }

    pub fn chrom(&self) -> &str {
        &self.chrom
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn is_point(&self) -> bool {
        self.start == self.end
    }

    /// Whether `other` lies completely within this extent.
    pub fn contains(&self, other: &Extent) -> bool {
        self.chrom == other.chrom && self.start <= other.start && other.end <= self.end
    }

    pub fn overlaps(&self, other: &Extent) -> bool {
        self.chrom == other.chrom && self.start <= other.end && other.start <= self.end
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_point() {
            write!(f, "{}:{}", self.chrom, self.start)
        } else {
            write!(f, "{}:{}-{}", self.chrom, self.start, self.end)
        }
    }
}

/// A single somatic mutation: kind tag plus genomic extent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SomaticEvent {
    kind: EventKind,
    extent: Extent,
}

impl SomaticEvent {
    pub fn new(kind: EventKind, extent: Extent) -> Self {
        Self { kind, extent }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn extent(&self) -> &Extent {
        &self.extent
    }

    /// Whether two events describe the same mutation up to a boundary tolerance.
    ///
    /// Only copy-number segments are tolerant: two CNVs on the same chromosome
    /// are equivalent when both their starts and their ends differ by less than
    /// `resolution` bases. Any other kind requires identical events.
    pub fn is_equivalent(&self, other: &SomaticEvent, resolution: u64) -> bool {
        if self == other {
            return true;
        }
        if self.kind != EventKind::Cnv
            || other.kind != EventKind::Cnv
            || self.extent.chrom != other.extent.chrom
        {
            return false;
        }
        let start_diff = self.extent.start.abs_diff(other.extent.start);
        let end_diff = self.extent.end.abs_diff(other.extent.end);
        start_diff < resolution && end_diff < resolution
    }
}

impl fmt::Display for SomaticEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.kind, self.extent)
    }
}

/// Named, ordered set of events that were inferred to always co-occur.
///
/// The name is the cluster's identity across trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventCluster {
    name: String,
    events: Vec<SomaticEvent>,
}

impl EventCluster {
    /// Builds a cluster, keeping the first occurrence of duplicated events.
    pub fn new(name: impl Into<String>, events: impl IntoIterator<Item = SomaticEvent>) -> Self {
        let mut members: Vec<SomaticEvent> = Vec::new();
        for event in events {
            if !members.contains(&event) {
                members.push(event);
            }
        }
        Self {
            name: name.into(),
            events: members,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn events(&self) -> &[SomaticEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Same name and same ordered event list.
    pub fn same_content(&self, other: &EventCluster) -> bool {
        self.name == other.name && self.events == other.events
    }

    /// Every event of `other` has an equivalent member here and vice versa.
    pub fn is_equivalent(&self, other: &EventCluster, resolution: u64) -> bool {
        let covers = |a: &[SomaticEvent], b: &[SomaticEvent]| {
            b.iter()
                .all(|e| a.iter().any(|m| m.is_equivalent(e, resolution)))
        };
        covers(&self.events, &other.events) && covers(&other.events, &self.events)
    }
}

impl fmt::Display for EventCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{} events]", self.name, self.events.len())
    }
}
