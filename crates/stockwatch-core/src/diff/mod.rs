//! Change detection against the known-vehicle baseline

use std::collections::HashSet;

use crate::model::KnownState;

/// Result of diffing one target's current inventory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffOutcome {
    /// The target had no known-state entry
    pub is_cold_start: bool,
    /// Identifiers not previously known, in current-inventory order
    ///
    /// Always empty on cold start.
    pub new_ids: Vec<String>,
}

/// Stateless diff over [`KnownState`]
///
/// Vanished identifiers are not events. The known set is append-only so a
/// vehicle that disappears and reappears is never announced twice.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffEngine;

impl DiffEngine {
    /// Compute newly appeared identifiers for a target
    pub fn diff(known: &KnownState, exhb_no: &str, current_ids: &[String]) -> DiffOutcome {
        if !known.contains_target(exhb_no) {
            return DiffOutcome {
                is_cold_start: true,
                new_ids: Vec::new(),
            };
        }

        let known_ids: HashSet<&str> = known.ids(exhb_no).iter().map(String::as_str).collect();
        let mut emitted = HashSet::new();
        let new_ids = current_ids
            .iter()
            .filter(|id| !known_ids.contains(id.as_str()) && emitted.insert(id.as_str()))
            .cloned()
            .collect();

        DiffOutcome {
            is_cold_start: false,
            new_ids,
        }
    }

    /// Merge current identifiers into the target's entry
    ///
    /// Returns `true` if the state changed and needs persisting.
    pub fn apply(known: &mut KnownState, exhb_no: &str, current_ids: &[String]) -> bool {
        known.record(exhb_no, current_ids)
    }
}
