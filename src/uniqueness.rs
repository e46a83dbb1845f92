//! The contact business-key rule.
//!
//! The check runs before every contact write. Two concurrent writers can
//! both pass it; the store's unique index on the folded key catches that
//! case and reports it as the same error.

use crate::error::{DirectoryError, Result};
use crate::models::{ContactDetails, ContactId};
use crate::store::ContactStore;

/// Fails with [`DirectoryError::DuplicateContact`] if a contact other than
/// `exclude` already holds the business key of `candidate`.
///
/// `candidate` should be trimmed; case is ignored.
pub fn validate<S: ContactStore + ?Sized>(
    store: &S,
    candidate: &ContactDetails,
    exclude: Option<ContactId>,
) -> Result<()> {
    match store.contact_id_by_business_key(&candidate.business_key())? {
        Some(owner) if Some(owner) != exclude => {
            tracing::warn!(
                existing = %owner,
                "rejected contact write: business key already taken"
            );
            Err(DirectoryError::DuplicateContact)
        }
        _ => Ok(()),
    }
}
