//! Storage contract consumed by the directory.
//!
//! Two logical stores (contacts and tags) plus the association between
//! them. [`crate::Database`] implements the contract on SQLite;
//! [`MemoryStore`] keeps everything in process.

mod memory;

use std::collections::BTreeSet;

use anyhow::Result;
use time::OffsetDateTime;

use crate::models::{BusinessKey, Contact, ContactDetails, ContactId, Tag, TagId};
use crate::sort::ContactOrder;

pub use memory::MemoryStore;

/// Contact persistence.
///
/// Methods returning `Contact` hydrate its tags (locked ones included).
pub trait ContactStore {
    fn contact_by_id(&self, id: ContactId) -> Result<Option<Contact>>;

    /// Hydrates the given contacts. The result order is unspecified and IDs
    /// without a contact are absent; callers re-project with
    /// [`crate::sort::reproject`].
    fn contacts_by_ids(&self, ids: &[ContactId]) -> Result<Vec<Contact>>;

    /// All contacts in the default order.
    fn list_contacts(&self) -> Result<Vec<Contact>>;

    /// Contacts where any searchable field contains `term`
    /// (case-insensitive), deduplicated, in the default order.
    fn search_contacts(&self, term: &str) -> Result<Vec<Contact>>;

    /// All contact IDs in `order`.
    fn contact_ids(&self, order: &ContactOrder) -> Result<Vec<ContactId>>;

    /// IDs of contacts matching `term` like [`Self::search_contacts`], in `order`.
    fn search_contact_ids(&self, term: &str, order: &ContactOrder) -> Result<Vec<ContactId>>;

    /// IDs of contacts holding every named tag in the active state, in `order`.
    ///
    /// `names` must be lowercase and free of duplicates.
    fn contact_ids_with_all_active_tags(
        &self,
        names: &[String],
        order: &ContactOrder,
    ) -> Result<Vec<ContactId>>;

    /// IDs of contacts in `city` (case-insensitive), in `order`.
    fn contact_ids_in_city(&self, city: &str, order: &ContactOrder) -> Result<Vec<ContactId>>;

    fn contact_id_by_business_key(&self, key: &BusinessKey) -> Result<Option<ContactId>>;

    /// Inserts a contact and returns its new ID.
    ///
    /// Fails with [`crate::DirectoryError::DuplicateContact`] if the business
    /// key is already taken.
    fn insert_contact(&self, details: &ContactDetails, now: OffsetDateTime) -> Result<ContactId>;

    /// Overwrites the fields of an existing contact.
    fn update_contact(
        &self,
        id: ContactId,
        details: &ContactDetails,
        now: OffsetDateTime,
    ) -> Result<()>;

    /// Bumps `updated_at` without changing any field.
    fn touch_contact(&self, id: ContactId, now: OffsetDateTime) -> Result<()>;

    /// Deletes a contact together with all of its associations.
    fn delete_contact(&self, id: ContactId) -> Result<()>;

    fn contact_exists(&self, id: ContactId) -> Result<bool>;
}

/// Tag persistence. Listings are ordered by name.
pub trait TagStore {
    fn tag_by_id(&self, id: TagId) -> Result<Option<Tag>>;

    /// Looks up a tag by name, case-insensitively.
    fn tag_by_name(&self, name: &str) -> Result<Option<Tag>>;

    fn list_tags(&self) -> Result<Vec<Tag>>;

    /// Tags in the active state only.
    fn list_active_tags(&self) -> Result<Vec<Tag>>;

    /// Tags whose name or description contains `term` (case-insensitive).
    fn search_tags(&self, term: &str) -> Result<Vec<Tag>>;

    /// Returns true if a tag other than `excluding` uses `name`
    /// (case-insensitive).
    fn tag_name_taken(&self, name: &str, excluding: TagId) -> Result<bool>;

    /// Inserts an active tag and returns its new ID.
    fn insert_tag(&self, name: &str, description: Option<&str>, now: OffsetDateTime)
    -> Result<TagId>;

    /// Saves name, description, state and `updated_at` of an existing tag.
    fn update_tag(&self, tag: &Tag) -> Result<()>;
}

/// The symmetric contact-tag association.
///
/// Both directions are index structures of their own; `link` and `unlink`
/// update them together so neither side ever holds an association the
/// other lacks.
pub trait AssociationStore {
    fn tag_ids_of(&self, contact: ContactId) -> Result<BTreeSet<TagId>>;

    fn contact_ids_of(&self, tag: TagId) -> Result<BTreeSet<ContactId>>;

    /// Associates contact and tag. Returns false if they already were.
    fn link(&self, contact: ContactId, tag: TagId) -> Result<bool>;

    /// Dissociates contact and tag. Returns false if they were not associated.
    fn unlink(&self, contact: ContactId, tag: TagId) -> Result<bool>;
}

/// A complete store that can run a unit of work atomically.
pub trait Store: ContactStore + TagStore + AssociationStore {
    /// Runs `work` so that either all of its writes become visible or none
    /// do. Nested calls join the outermost unit.
    fn atomically<T, E, F>(&self, work: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Self) -> std::result::Result<T, E>,
        E: From<anyhow::Error>;
}
