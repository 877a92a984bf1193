//! Reference genome lookup used to validate event extents.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, DomainResult, Extent};

/// Resolves chromosome names to their lengths.
pub trait ReferenceGenome: Send + Sync {
    /// Length of `chrom` in bases, None if the chromosome is unknown.
    fn chromosome_length(&self, chrom: &str) -> Option<u64>;

    /// Rejects extents on unknown chromosomes or reaching past the chromosome end.
    fn check_extent(&self, extent: &Extent) -> DomainResult<()> {
        match self.chromosome_length(extent.chrom()) {
            None => Err(DomainError::InvalidExtent {
                extent: extent.to_string(),
                reason: format!("unknown chromosome {}", extent.chrom()),
            }),
            Some(length) if extent.end() > length => Err(DomainError::InvalidExtent {
                extent: extent.to_string(),
                reason: format!("end beyond chromosome length {}", length),
            }),
            Some(_) => Ok(()),
        }
    }
}

/// In-memory chromosome length table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChromosomeTable {
    lengths: BTreeMap<String, u64>,
}

impl ChromosomeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chromosome(mut self, chrom: impl Into<String>, length: u64) -> Self {
        self.insert(chrom, length);
        self
    }

    pub fn insert(&mut self, chrom: impl Into<String>, length: u64) {
        self.lengths.insert(chrom.into(), length);
    }

    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }
}

impl From<BTreeMap<String, u64>> for ChromosomeTable {
    fn from(lengths: BTreeMap<String, u64>) -> Self {
        Self { lengths }
    }
}

impl ReferenceGenome for ChromosomeTable {
    fn chromosome_length(&self, chrom: &str) -> Option<u64> {
        self.lengths.get(chrom).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_extent_against_table() {
        let genome = ChromosomeTable::new().with_chromosome("1", 1_000);
        assert!(genome.check_extent(&Extent::new("1", 10, 1_000).unwrap()).is_ok());
        assert!(matches!(
            genome.check_extent(&Extent::new("1", 10, 1_001).unwrap()),
            Err(DomainError::InvalidExtent { .. })
        ));
        assert!(genome.check_extent(&Extent::point("X", 5).unwrap()).is_err());
    }
}
