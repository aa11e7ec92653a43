//! Full-sync reconciliation.

use outpost_core::Entity;
use std::collections::HashSet;
use uuid::Uuid;

/// What the origin sends in answer to a "sync with existing ids" request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation<T> {
    /// Every visible record, sent as an update whether or not the leaf has it.
    pub updates: Vec<T>,
    /// Ids the leaf holds that the origin does not, in request order.
    pub deletes: Vec<Uuid>,
}

/// Reconciles the records visible to a leaf against the ids it already holds.
///
/// Applying the result to the leaf leaves it with exactly the ids of
/// `records`; running it again produces no deletes.
pub fn reconcile<T: Entity>(records: Vec<T>, existing: &[Uuid]) -> Reconciliation<T> {
    let known: HashSet<Uuid> = records.iter().map(Entity::id).collect();
    let mut seen = HashSet::new();
    let deletes = existing
        .iter()
        .copied()
        .filter(|id| !known.contains(id) && seen.insert(*id))
        .collect();

    Reconciliation {
        updates: records,
        deletes,
    }
}
