//! Identity-key matching between fresh records and the store.
//!
//! Two leads are the same business when their normalized phones match **or**
//! their normalized names match. Empty key components never match anything.

use std::collections::HashSet;

use leadscout_shared::{HasLeadKey, LeadKey, normalize_name};
use leadscout_storage::LeadRow;
use tracing::debug;

/// Survivors of [`filter_new`] plus what was dropped and why.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome<T> {
    /// Candidates not yet in the store, in input order.
    pub new: Vec<T>,
    /// Matched an existing lead.
    pub duplicates: usize,
    /// Matched an earlier candidate of the same batch.
    pub in_batch_duplicates: usize,
    /// No usable name.
    pub unidentifiable: usize,
}

#[derive(Debug, Default)]
struct KeyIndex {
    phones: HashSet<String>,
    names: HashSet<String>,
}

impl KeyIndex {
    fn insert(&mut self, key: LeadKey) {
        if !key.phone.is_empty() {
            self.phones.insert(key.phone);
        }
        if !key.name.is_empty() {
            self.names.insert(key.name);
        }
    }

    fn matches(&self, key: &LeadKey) -> bool {
        (!key.phone.is_empty() && self.phones.contains(&key.phone))
            || (!key.name.is_empty() && self.names.contains(&key.name))
    }
}

/// Keep the candidates whose identity key matches no existing lead.
///
/// Pure and order-preserving. Within the batch the first candidate carrying a
/// key wins; candidates with an empty normalized name are dropped.
pub fn filter_new<T, E>(candidates: Vec<T>, existing: &[E]) -> FilterOutcome<T>
where
    T: HasLeadKey,
    E: HasLeadKey,
{
    let mut stored = KeyIndex::default();
    for lead in existing {
        stored.insert(lead.lead_key());
    }

    let mut batch = KeyIndex::default();
    let mut outcome = FilterOutcome {
        new: Vec::with_capacity(candidates.len()),
        duplicates: 0,
        in_batch_duplicates: 0,
        unidentifiable: 0,
    };

    for candidate in candidates {
        let key = candidate.lead_key();
        if key.name.is_empty() {
            outcome.unidentifiable += 1;
        } else if stored.matches(&key) {
            debug!(name = candidate.lead_name(), "already in store");
            outcome.duplicates += 1;
        } else if batch.matches(&key) {
            debug!(name = candidate.lead_name(), "repeated within batch");
            outcome.in_batch_duplicates += 1;
        } else {
            batch.insert(key);
            outcome.new.push(candidate);
        }
    }

    outcome
}

/// Rows left after [`dedupe_by_name`].
#[derive(Debug, Clone, PartialEq)]
pub struct NameDedupe {
    pub kept: Vec<LeadRow>,
    /// Later rows whose name was already seen.
    pub removed: usize,
    /// Rows with no content at all.
    pub blank_dropped: usize,
}

impl NameDedupe {
    pub fn changed(&self) -> bool {
        self.removed > 0 || self.blank_dropped > 0
    }
}

/// Keep the first row per normalized business name, in original order.
///
/// Rows without a name cannot be grouped and are kept as they are. Fully blank
/// rows are dropped.
pub fn dedupe_by_name(rows: Vec<LeadRow>) -> NameDedupe {
    let mut seen = HashSet::new();
    let mut result = NameDedupe {
        kept: Vec::with_capacity(rows.len()),
        removed: 0,
        blank_dropped: 0,
    };

    for row in rows {
        if row.is_blank() {
            result.blank_dropped += 1;
            continue;
        }
        let name = normalize_name(row.lead_name());
        if !name.is_empty() && !seen.insert(name) {
            result.removed += 1;
            continue;
        }
        result.kept.push(row);
    }

    result
}
