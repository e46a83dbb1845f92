use time::OffsetDateTime;

use crate::error::{DirectoryError, Result};
use crate::models::{
    Contact, ContactDetails, ContactId, TAG_DESCRIPTION_MAX_LEN, Tag, TagDraft, TagId,
    is_valid_tag_name,
};
use crate::relations::{self, AssignmentReport};
use crate::search::{self, SearchQuery};
use crate::sort::{self, ContactOrder, SortDirection, SortKey};
use crate::store::Store;
use crate::{Database, uniqueness};

/// The contact directory: every operation on contacts and tags.
///
/// Directory owns a store and runs each write as one atomic unit on it.
/// It is UI-independent; the CLI is one caller.
///
/// # Examples
///
/// ```
/// use rolodex::{ContactDetails, Database, Directory, ListContactsOptions, TagDraft};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let directory = Directory::new(Database::in_memory()?);
///
/// let vip = directory.create_tag(TagDraft::new("#VIP"))?;
/// let max = directory.create_contact(
///     ContactDetails::new("Max", "Mustermann", "Hauptstraße 1", "12345", "Berlin"),
///     &[vip.id()],
/// )?;
/// assert_eq!(max.tag_names(), vec!["#vip"]);
///
/// let hits = directory.list_contacts(&ListContactsOptions::default().search("#vip"))?;
/// assert_eq!(hits.len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct Directory<S = Database> {
    store: S,
}

impl<S: Store> Directory<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    ///
    /// Useful for testing or inspecting raw state.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Lists contacts, optionally filtered and sorted.
    ///
    /// A search term starting with `#` lists contacts holding every named
    /// tag in the active state; any other term matches substrings of any
    /// field. Without a sort key the default order applies.
    pub fn list_contacts(&self, options: &ListContactsOptions) -> Result<Vec<Contact>> {
        let query = SearchQuery::parse(options.search.as_deref());
        let order = ContactOrder::new(options.sort, options.direction);
        tracing::debug!(
            ?query,
            sort = ?order.key(),
            direction = ?order.direction(),
            "listing contacts"
        );

        let contacts = match (&query, order.key()) {
            (SearchQuery::All, None) => self.store.list_contacts()?,
            (SearchQuery::Text(term), None) => self.store.search_contacts(term)?,
            _ => {
                let ids = search::matching_ids(&self.store, &query, &order)?;
                sort::hydrate_in_order(&self.store, &ids)?
            }
        };
        Ok(contacts)
    }

    /// Retrieves a contact with its tags.
    pub fn contact(&self, id: ContactId) -> Result<Contact> {
        self.store
            .contact_by_id(id)?
            .ok_or(DirectoryError::ContactNotFound(id))
    }

    /// Contacts living in `city` (case-insensitive), in the default order.
    pub fn contacts_in_city(&self, city: &str) -> Result<Vec<Contact>> {
        let ids = self
            .store
            .contact_ids_in_city(city.trim(), &ContactOrder::default())?;
        Ok(sort::hydrate_in_order(&self.store, &ids)?)
    }

    /// Creates a contact and attaches the assignable tags among `tag_ids`.
    ///
    /// Unknown and locked tag IDs are skipped. Fails with
    /// [`DirectoryError::DuplicateContact`] if the business key is taken.
    pub fn create_contact(&self, details: ContactDetails, tag_ids: &[TagId]) -> Result<Contact> {
        let details = details.trimmed();
        let now = OffsetDateTime::now_utc();

        let contact = self.store.atomically(|store| {
            uniqueness::validate(store, &details, None)?;
            let id = store.insert_contact(&details.normalized(), now)?;
            relations::set_tags(store, id, tag_ids)?;
            store
                .contact_by_id(id)?
                .ok_or(DirectoryError::ContactNotFound(id))
        })?;

        tracing::info!(id = %contact.id, tags = contact.tags.len(), "created contact");
        Ok(contact)
    }

    /// Overwrites the fields of a contact.
    ///
    /// With `tag_ids` the tag set is replaced by the assignable tags among
    /// them; locked tags the contact held are dropped unless still listed
    /// and assignable. Without `tag_ids` the tag set is left alone.
    pub fn update_contact(
        &self,
        id: ContactId,
        details: ContactDetails,
        tag_ids: Option<&[TagId]>,
    ) -> Result<Contact> {
        let details = details.trimmed();
        let now = OffsetDateTime::now_utc();

        let contact = self.store.atomically(|store| {
            if !store.contact_exists(id)? {
                return Err(DirectoryError::ContactNotFound(id));
            }
            uniqueness::validate(store, &details, Some(id))?;
            store.update_contact(id, &details.normalized(), now)?;
            if let Some(tag_ids) = tag_ids {
                relations::set_tags(store, id, tag_ids)?;
            }
            store
                .contact_by_id(id)?
                .ok_or(DirectoryError::ContactNotFound(id))
        })?;

        tracing::info!(id = %id, "updated contact");
        Ok(contact)
    }

    /// Deletes a contact and all of its tag associations.
    pub fn delete_contact(&self, id: ContactId) -> Result<()> {
        self.store.atomically(|store| {
            if !store.contact_exists(id)? {
                return Err(DirectoryError::ContactNotFound(id));
            }
            store.delete_contact(id)?;
            Ok(())
        })?;

        tracing::info!(id = %id, "deleted contact");
        Ok(())
    }

    /// Attaches an active tag to many contacts.
    ///
    /// Not atomic across the batch: each contact is its own unit of work.
    pub fn assign_tag(&self, contact_ids: &[ContactId], tag_id: TagId) -> Result<AssignmentReport> {
        let report =
            relations::assign(&self.store, contact_ids, tag_id, OffsetDateTime::now_utc())?;
        tracing::info!(
            tag = %tag_id,
            changed = report.changed.len(),
            unchanged = report.unchanged.len(),
            missing = report.missing.len(),
            "assigned tag"
        );
        Ok(report)
    }

    /// Detaches a tag (active or locked) from many contacts.
    ///
    /// Not atomic across the batch, like [`Self::assign_tag`].
    pub fn unassign_tag(
        &self,
        contact_ids: &[ContactId],
        tag_id: TagId,
    ) -> Result<AssignmentReport> {
        let report =
            relations::unassign(&self.store, contact_ids, tag_id, OffsetDateTime::now_utc())?;
        tracing::info!(
            tag = %tag_id,
            changed = report.changed.len(),
            unchanged = report.unchanged.len(),
            missing = report.missing.len(),
            "unassigned tag"
        );
        Ok(report)
    }

    /// All tags, active and locked, ordered by name.
    pub fn list_tags(&self) -> Result<Vec<Tag>> {
        Ok(self.store.list_tags()?)
    }

    /// Tags whose name or description contains `term`, ordered by name.
    /// A blank term lists every tag.
    pub fn search_tags(&self, term: &str) -> Result<Vec<Tag>> {
        let term = term.trim();
        if term.is_empty() {
            return self.list_tags();
        }
        Ok(self.store.search_tags(term)?)
    }

    /// Tags that can be assigned right now, i.e. the active ones.
    pub fn available_tags(&self) -> Result<Vec<Tag>> {
        Ok(self.store.list_active_tags()?)
    }

    pub fn tag(&self, id: TagId) -> Result<Tag> {
        self.store
            .tag_by_id(id)?
            .ok_or(DirectoryError::TagNotFound(id))
    }

    /// Creates an active tag. The name is stored lowercase.
    pub fn create_tag(&self, draft: TagDraft) -> Result<Tag> {
        let draft = validate_tag_draft(draft)?;
        let name = draft.name.clone();
        let now = OffsetDateTime::now_utc();

        let tag = self.store.atomically(|store| {
            if store.tag_by_name(&draft.name)?.is_some() {
                return Err(DirectoryError::DuplicateTag(draft.name.clone()));
            }
            let draft = draft.normalized();
            let id = store.insert_tag(&draft.name, draft.description.as_deref(), now)?;
            store.tag_by_id(id)?.ok_or(DirectoryError::TagNotFound(id))
        });

        match tag {
            Ok(tag) => {
                tracing::info!(id = %tag.id(), name = tag.name(), "created tag");
                Ok(tag)
            }
            Err(e) => {
                tracing::warn!(name = %name, error = %e, "rejected tag");
                Err(e)
            }
        }
    }

    /// Renames a tag or changes its description. The lock state is kept.
    pub fn update_tag(&self, id: TagId, draft: TagDraft) -> Result<Tag> {
        let draft = validate_tag_draft(draft)?;
        let now = OffsetDateTime::now_utc();

        let tag = self.store.atomically(|store| {
            let mut tag = store
                .tag_by_id(id)?
                .ok_or(DirectoryError::TagNotFound(id))?;
            if store.tag_name_taken(&draft.name, id)? {
                return Err(DirectoryError::DuplicateTag(draft.name.clone()));
            }
            tag.apply(draft, now);
            store.update_tag(&tag)?;
            Ok(tag)
        })?;

        tracing::info!(id = %id, name = tag.name(), "updated tag");
        Ok(tag)
    }

    /// Locks a tag: it stays on its contacts but can no longer be assigned
    /// or matched by tag search. Locking a locked tag is a no-op.
    pub fn lock_tag(&self, id: TagId) -> Result<Tag> {
        self.transition_tag(id, Tag::lock, "locked tag")
    }

    /// Unlocks a tag. Unlocking an active tag is a no-op.
    pub fn unlock_tag(&self, id: TagId) -> Result<Tag> {
        self.transition_tag(id, Tag::unlock, "unlocked tag")
    }

    fn transition_tag(
        &self,
        id: TagId,
        transition: fn(&mut Tag, OffsetDateTime) -> bool,
        message: &'static str,
    ) -> Result<Tag> {
        let now = OffsetDateTime::now_utc();
        self.store.atomically(|store| {
            let mut tag = store
                .tag_by_id(id)?
                .ok_or(DirectoryError::TagNotFound(id))?;
            if transition(&mut tag, now) {
                store.update_tag(&tag)?;
                tracing::info!(id = %id, name = tag.name(), "{message}");
            }
            Ok(tag)
        })
    }
}

/// Checks the name pattern on the name as given, then trims the description
/// and checks its length. Surrounding whitespace makes a name invalid.
fn validate_tag_draft(draft: TagDraft) -> Result<TagDraft> {
    let name = draft.name;
    if !is_valid_tag_name(&name) {
        tracing::warn!(name = %name, "rejected tag name");
        return Err(DirectoryError::InvalidTagName(name));
    }

    let description = draft.description.map(|d| d.trim().to_string());
    if description
        .as_deref()
        .is_some_and(|d| d.chars().count() > TAG_DESCRIPTION_MAX_LEN)
    {
        return Err(DirectoryError::InvalidTagDescription);
    }

    Ok(TagDraft { name, description })
}

/// Options for [`Directory::list_contacts`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListContactsOptions {
    /// Search term; `#`-prefixed for tag search. `None` or blank lists all.
    pub search: Option<String>,

    /// Sort key. `None` selects the default order (family name, given name).
    pub sort: Option<SortKey>,

    /// Direction for `sort`; ignored without a sort key.
    pub direction: SortDirection,
}

impl ListContactsOptions {
    /// Builds options from raw request parameters. Unknown sort keys select
    /// the default order; any direction other than `desc` is ascending.
    pub fn from_raw(search: Option<&str>, sort: Option<&str>, direction: Option<&str>) -> Self {
        Self {
            search: search.map(str::to_string),
            sort: sort.and_then(SortKey::parse),
            direction: SortDirection::parse(direction),
        }
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn sorted_by(mut self, key: SortKey, direction: SortDirection) -> Self {
        self.sort = Some(key);
        self.direction = direction;
        self
    }
}
