//! Contact-tag relationship rules.
//!
//! Only active tags can be newly attached. A tag that gets locked stays on
//! every contact already holding it.

use std::collections::BTreeSet;

use serde::Serialize;
use time::OffsetDateTime;

use crate::error::{DirectoryError, Result};
use crate::models::{ContactId, Tag, TagId};
use crate::store::{AssociationStore, Store, TagStore};

/// Returns true if `tag` may be newly attached to a contact.
pub fn is_assignable(tag: &Tag) -> bool {
    tag.is_active()
}

/// Outcome of a bulk assign or unassign, per contact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssignmentReport {
    /// Contacts whose tag set changed.
    pub changed: Vec<ContactId>,
    /// Contacts already in the target state.
    pub unchanged: Vec<ContactId>,
    /// IDs without a contact, skipped.
    pub missing: Vec<ContactId>,
}

impl AssignmentReport {
    fn record(&mut self, id: ContactId, outcome: Outcome) {
        match outcome {
            Outcome::Changed => self.changed.push(id),
            Outcome::Unchanged => self.unchanged.push(id),
            Outcome::Missing => self.missing.push(id),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Changed,
    Unchanged,
    Missing,
}

/// Replaces the tag set of `contact` with the assignable tags among
/// `tag_ids`.
///
/// Unknown and locked IDs are dropped silently. Returns true if the set
/// changed. Call inside the unit of work that wrote the contact.
pub fn set_tags<S: TagStore + AssociationStore + ?Sized>(
    store: &S,
    contact: ContactId,
    tag_ids: &[TagId],
) -> Result<bool> {
    let mut wanted = BTreeSet::new();
    for &id in tag_ids {
        match store.tag_by_id(id)? {
            Some(tag) if is_assignable(&tag) => {
                wanted.insert(id);
            }
            Some(_) => tracing::debug!(tag = %id, contact = %contact, "skipping locked tag"),
            None => tracing::debug!(tag = %id, contact = %contact, "skipping unknown tag"),
        }
    }

    let current = store.tag_ids_of(contact)?;
    let mut changed = false;
    for &stale in current.difference(&wanted) {
        changed |= store.unlink(contact, stale)?;
    }
    for &fresh in wanted.difference(&current) {
        changed |= store.link(contact, fresh)?;
    }
    Ok(changed)
}

/// Attaches `tag_id` to each of `contact_ids`.
///
/// Fails before touching any contact if the tag is unknown or locked. Each
/// contact is updated in its own unit of work, which checks the tag again, so
/// a storage failure or a lock partway leaves earlier contacts tagged and
/// stops the batch.
pub fn assign<S: Store>(
    store: &S,
    contact_ids: &[ContactId],
    tag_id: TagId,
    now: OffsetDateTime,
) -> Result<AssignmentReport> {
    let tag = store
        .tag_by_id(tag_id)?
        .ok_or(DirectoryError::TagNotFound(tag_id))?;
    if !is_assignable(&tag) {
        tracing::warn!(tag = %tag_id, name = tag.name(), "rejected assignment of locked tag");
        return Err(DirectoryError::LockedTagAssignmentRejected(tag_id));
    }

    for_each_contact(store, contact_ids, |s, contact| {
        // Re-read inside the unit: the tag may have been locked mid-batch.
        match s.tag_by_id(tag_id)? {
            Some(tag) if is_assignable(&tag) => {}
            Some(_) => return Err(DirectoryError::LockedTagAssignmentRejected(tag_id)),
            None => return Err(DirectoryError::TagNotFound(tag_id)),
        }
        if s.link(contact, tag_id)? {
            s.touch_contact(contact, now)?;
            Ok(Outcome::Changed)
        } else {
            Ok(Outcome::Unchanged)
        }
    })
}

/// Detaches `tag_id` from each of `contact_ids`. Locked tags can be
/// detached.
///
/// Same per-contact atomicity as [`assign`].
pub fn unassign<S: Store>(
    store: &S,
    contact_ids: &[ContactId],
    tag_id: TagId,
    now: OffsetDateTime,
) -> Result<AssignmentReport> {
    if store.tag_by_id(tag_id)?.is_none() {
        return Err(DirectoryError::TagNotFound(tag_id));
    }

    for_each_contact(store, contact_ids, |s, contact| {
        if s.unlink(contact, tag_id)? {
            s.touch_contact(contact, now)?;
            Ok(Outcome::Changed)
        } else {
            Ok(Outcome::Unchanged)
        }
    })
}

fn for_each_contact<S, F>(
    store: &S,
    contact_ids: &[ContactId],
    mut mutate: F,
) -> Result<AssignmentReport>
where
    S: Store,
    F: FnMut(&S, ContactId) -> Result<Outcome>,
{
    let mut report = AssignmentReport::default();
    let mut seen = BTreeSet::new();

    for &contact in contact_ids {
        if !seen.insert(contact) {
            continue;
        }
        let outcome = store.atomically(|s| {
            if !s.contact_exists(contact)? {
                return Ok(Outcome::Missing);
            }
            mutate(s, contact)
        })?;
        report.record(contact, outcome);
    }

    Ok(report)
}
