//! Class-level commit ordering.
//!
//! Classes referenced through owning to-one associations are written before
//! the classes that reference them. Classes caught in a cycle keep name
//! order after every class that could be sorted.

use crate::mapping::metadata::ClassMetadata;
use std::collections::{BTreeMap, BTreeSet};

/// Orders `classes` so association targets precede their referrers.
///
/// Associations to classes outside `classes` and self references are
/// ignored.
pub(crate) fn commit_order<'a, I>(classes: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a ClassMetadata>,
{
    let classes: BTreeMap<&str, &ClassMetadata> = classes
        .into_iter()
        .map(|metadata| (metadata.name(), metadata))
        .collect();

    // class -> targets it still waits for
    let mut pending: BTreeMap<&str, BTreeSet<&str>> = classes
        .iter()
        .map(|(name, metadata)| {
            let targets = metadata
                .owning_single_valued_targets()
                .filter(|target| target != name && classes.contains_key(target))
                .collect();
            (*name, targets)
        })
        .collect();

    let mut ordered = Vec::with_capacity(classes.len());
    loop {
        let ready: Vec<&str> = pending
            .iter()
            .filter(|(_, targets)| targets.is_empty())
            .map(|(name, _)| *name)
            .collect();
        if ready.is_empty() {
            break;
        }
        for name in ready {
            pending.remove(name);
            for targets in pending.values_mut() {
                targets.remove(name);
            }
            ordered.push(name.to_string());
        }
    }

    ordered.extend(pending.keys().map(|name| name.to_string()));
    ordered
}
