//! Citation ledger.
//!
//! Tracks citation metadata keyed by marker number in arrival order and
//! checks it against the `[n]` markers in generated content.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::anomaly::ProtocolAnomaly;
use crate::citation::Citation;
use crate::markers;

/// Consistency problem between content markers and ledger entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CitationWarning {
    /// `[n]` appears in content but the ledger has no entry `n`
    Orphaned { number: u32 },
    /// Ledger entry `n` is never referenced in content
    Unused { number: u32 },
}

impl CitationWarning {
    /// Citation number the warning refers to.
    pub fn number(&self) -> u32 {
        match self {
            Self::Orphaned { number } | Self::Unused { number } => *number,
        }
    }
}

/// Counts surfaced to the export verification step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    /// Number of recorded citations
    pub citation_count: usize,
    /// Number of distinct source documents cited
    pub document_count: usize,
}

/// Append-only citation store keyed by number, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CitationLedger {
    entries: IndexMap<u32, Citation>,
}

impl CitationLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a citation.
    ///
    /// The first citation for a number wins; later ones are rejected and
    /// returned as anomalies for the caller to log.
    pub fn record(&mut self, citation: Citation) -> Result<(), ProtocolAnomaly> {
        if citation.number == 0 {
            return Err(ProtocolAnomaly::InvalidCitationNumber { number: 0 });
        }
        if self.entries.contains_key(&citation.number) {
            return Err(ProtocolAnomaly::DuplicateCitation {
                number: citation.number,
            });
        }

        self.entries.insert(citation.number, citation);
        Ok(())
    }

    /// Look up a citation by number.
    pub fn get(&self, number: u32) -> Option<&Citation> {
        self.entries.get(&number)
    }

    /// Whether a citation exists for `number`.
    pub fn contains(&self, number: u32) -> bool {
        self.entries.contains_key(&number)
    }

    /// Number of citations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ledger is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Citations in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &Citation> {
        self.entries.values()
    }

    /// Citation numbers in arrival order.
    pub fn numbers(&self) -> Vec<u32> {
        self.entries.keys().copied().collect()
    }

    /// Citation and distinct document counts.
    pub fn summary(&self) -> LedgerSummary {
        let documents: HashSet<&str> = self
            .entries
            .values()
            .map(|c| c.document_id.as_str())
            .collect();

        LedgerSummary {
            citation_count: self.entries.len(),
            document_count: documents.len(),
        }
    }

    /// Check `content` markers against this ledger.
    pub fn validate(&self, content: &str) -> Vec<CitationWarning> {
        validate(content, self)
    }
}

/// Check `content` markers against `citations`.
///
/// Orphaned warnings come first, in order of first textual appearance,
/// followed by unused warnings in ledger order.
pub fn validate(content: &str, citations: &CitationLedger) -> Vec<CitationWarning> {
    let referenced = markers::marker_numbers(content);
    let referenced_set: HashSet<u32> = referenced.iter().copied().collect();

    let orphaned = referenced
        .iter()
        .filter(|n| !citations.contains(**n))
        .map(|&number| CitationWarning::Orphaned { number });

    let unused = citations
        .entries
        .keys()
        .filter(|n| !referenced_set.contains(n))
        .map(|&number| CitationWarning::Unused { number });

    orphaned.chain(unused).collect()
}
