use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use anyhow::Result;
use time::OffsetDateTime;

use super::{AssociationStore, ContactStore, Store, TagStore};
use crate::DirectoryError;
use crate::models::{BusinessKey, Contact, ContactDetails, ContactId, Tag, TagId, TagState};
use crate::sort::ContactOrder;

#[derive(Debug, Clone)]
struct ContactRow {
    details: ContactDetails,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    last_contact_id: i64,
    last_tag_id: i64,
    contacts: BTreeMap<ContactId, ContactRow>,
    tags: BTreeMap<TagId, Tag>,
    tags_by_contact: HashMap<ContactId, BTreeSet<TagId>>,
    contacts_by_tag: HashMap<TagId, BTreeSet<ContactId>>,
}

impl MemoryState {
    fn hydrate(&self, id: ContactId) -> Option<Contact> {
        let row = self.contacts.get(&id)?;
        let mut tags: Vec<Tag> = self
            .tags_by_contact
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|tag_id| self.tags.get(tag_id).cloned())
            .collect();
        tags.sort_by(|a, b| a.name().cmp(b.name()));

        Some(Contact {
            id,
            details: row.details.clone(),
            created_at: row.created_at,
            updated_at: row.updated_at,
            tags,
        })
    }

    fn ordered_ids<P>(&self, order: &ContactOrder, mut predicate: P) -> Vec<ContactId>
    where
        P: FnMut(ContactId, &ContactRow) -> bool,
    {
        let mut rows: Vec<(ContactId, &ContactRow)> = self
            .contacts
            .iter()
            .filter(|(id, row)| predicate(**id, *row))
            .map(|(id, row)| (*id, row))
            .collect();
        rows.sort_by(|a, b| order.compare((a.0, &a.1.details), (b.0, &b.1.details)));
        rows.into_iter().map(|(id, _)| id).collect()
    }

    fn business_key_owner(&self, key: &BusinessKey) -> Option<ContactId> {
        self.contacts
            .iter()
            .find(|(_, row)| &row.details.business_key() == key)
            .map(|(id, _)| *id)
    }

    fn link(&mut self, contact: ContactId, tag: TagId) -> bool {
        let added = self.tags_by_contact.entry(contact).or_default().insert(tag);
        let mirrored = self.contacts_by_tag.entry(tag).or_default().insert(contact);
        debug_assert_eq!(added, mirrored, "association sides diverged");
        added
    }

    fn unlink(&mut self, contact: ContactId, tag: TagId) -> bool {
        let removed = self
            .tags_by_contact
            .get_mut(&contact)
            .is_some_and(|tags| tags.remove(&tag));
        let mirrored = self
            .contacts_by_tag
            .get_mut(&tag)
            .is_some_and(|contacts| contacts.remove(&contact));
        debug_assert_eq!(removed, mirrored, "association sides diverged");
        removed
    }

    fn sorted_tags<P>(&self, predicate: P) -> Vec<Tag>
    where
        P: FnMut(&&Tag) -> bool,
    {
        let mut tags: Vec<Tag> = self.tags.values().filter(predicate).cloned().collect();
        tags.sort_by(|a, b| a.name().cmp(b.name()));
        tags
    }
}

/// In-process store backed by ordered maps.
///
/// The association lives in two maps (contact → tags and tag → contacts)
/// that only change together. `atomically` snapshots the whole state and
/// restores it when the unit of work fails.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RefCell<MemoryState>,
    depth: Cell<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ContactStore for MemoryStore {
    fn contact_by_id(&self, id: ContactId) -> Result<Option<Contact>> {
        Ok(self.state.borrow().hydrate(id))
    }

    fn contacts_by_ids(&self, ids: &[ContactId]) -> Result<Vec<Contact>> {
        let state = self.state.borrow();
        let unique: HashSet<ContactId> = ids.iter().copied().collect();
        Ok(unique.into_iter().filter_map(|id| state.hydrate(id)).collect())
    }

    fn list_contacts(&self) -> Result<Vec<Contact>> {
        let state = self.state.borrow();
        let ids = state.ordered_ids(&ContactOrder::default(), |_, _| true);
        Ok(ids.into_iter().filter_map(|id| state.hydrate(id)).collect())
    }

    fn search_contacts(&self, term: &str) -> Result<Vec<Contact>> {
        let ids = self.search_contact_ids(term, &ContactOrder::default())?;
        let state = self.state.borrow();
        Ok(ids.into_iter().filter_map(|id| state.hydrate(id)).collect())
    }

    fn contact_ids(&self, order: &ContactOrder) -> Result<Vec<ContactId>> {
        Ok(self.state.borrow().ordered_ids(order, |_, _| true))
    }

    fn search_contact_ids(&self, term: &str, order: &ContactOrder) -> Result<Vec<ContactId>> {
        let needle = term.to_lowercase();
        Ok(self
            .state
            .borrow()
            .ordered_ids(order, |_, row| row.details.matches_text(&needle)))
    }

    fn contact_ids_with_all_active_tags(
        &self,
        names: &[String],
        order: &ContactOrder,
    ) -> Result<Vec<ContactId>> {
        let state = self.state.borrow();
        let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();
        Ok(state.ordered_ids(order, |id, _| {
            let held = state
                .tags_by_contact
                .get(&id)
                .into_iter()
                .flatten()
                .filter_map(|tag_id| state.tags.get(tag_id))
                .filter(|tag| tag.is_active() && wanted.contains(tag.name()))
                .count();
            !wanted.is_empty() && held == wanted.len()
        }))
    }

    fn contact_ids_in_city(&self, city: &str, order: &ContactOrder) -> Result<Vec<ContactId>> {
        let city = city.to_lowercase();
        Ok(self
            .state
            .borrow()
            .ordered_ids(order, |_, row| row.details.city.to_lowercase() == city))
    }

    fn contact_id_by_business_key(&self, key: &BusinessKey) -> Result<Option<ContactId>> {
        Ok(self.state.borrow().business_key_owner(key))
    }

    fn insert_contact(&self, details: &ContactDetails, now: OffsetDateTime) -> Result<ContactId> {
        let mut state = self.state.borrow_mut();
        if state.business_key_owner(&details.business_key()).is_some() {
            return Err(DirectoryError::DuplicateContact.into());
        }

        state.last_contact_id += 1;
        let id = ContactId::new(state.last_contact_id);
        state.contacts.insert(
            id,
            ContactRow {
                details: details.clone(),
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    fn update_contact(
        &self,
        id: ContactId,
        details: &ContactDetails,
        now: OffsetDateTime,
    ) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state
            .business_key_owner(&details.business_key())
            .is_some_and(|owner| owner != id)
        {
            return Err(DirectoryError::DuplicateContact.into());
        }

        let row = state
            .contacts
            .get_mut(&id)
            .ok_or(DirectoryError::ContactNotFound(id))?;
        row.details = details.clone();
        row.updated_at = now;
        Ok(())
    }

    fn touch_contact(&self, id: ContactId, now: OffsetDateTime) -> Result<()> {
        if let Some(row) = self.state.borrow_mut().contacts.get_mut(&id) {
            row.updated_at = now;
        }
        Ok(())
    }

    fn delete_contact(&self, id: ContactId) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let held = state.tags_by_contact.get(&id).cloned().unwrap_or_default();
        for tag in held {
            state.unlink(id, tag);
        }
        state.tags_by_contact.remove(&id);
        state.contacts.remove(&id);
        Ok(())
    }

    fn contact_exists(&self, id: ContactId) -> Result<bool> {
        Ok(self.state.borrow().contacts.contains_key(&id))
    }
}

impl TagStore for MemoryStore {
    fn tag_by_id(&self, id: TagId) -> Result<Option<Tag>> {
        Ok(self.state.borrow().tags.get(&id).cloned())
    }

    fn tag_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let name = name.to_lowercase();
        Ok(self
            .state
            .borrow()
            .tags
            .values()
            .find(|tag| tag.name().to_lowercase() == name)
            .cloned())
    }

    fn list_tags(&self) -> Result<Vec<Tag>> {
        Ok(self.state.borrow().sorted_tags(|_| true))
    }

    fn list_active_tags(&self) -> Result<Vec<Tag>> {
        Ok(self.state.borrow().sorted_tags(|tag| tag.is_active()))
    }

    fn search_tags(&self, term: &str) -> Result<Vec<Tag>> {
        let needle = term.to_lowercase();
        Ok(self.state.borrow().sorted_tags(|tag| {
            tag.name().to_lowercase().contains(&needle)
                || tag
                    .description()
                    .unwrap_or("")
                    .to_lowercase()
                    .contains(&needle)
        }))
    }

    fn tag_name_taken(&self, name: &str, excluding: TagId) -> Result<bool> {
        let name = name.to_lowercase();
        Ok(self
            .state
            .borrow()
            .tags
            .values()
            .any(|tag| tag.id() != excluding && tag.name().to_lowercase() == name))
    }

    fn insert_tag(
        &self,
        name: &str,
        description: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<TagId> {
        if self.tag_by_name(name)?.is_some() {
            return Err(DirectoryError::DuplicateTag(name.to_string()).into());
        }

        let mut state = self.state.borrow_mut();
        state.last_tag_id += 1;
        let id = TagId::new(state.last_tag_id);
        state.tags.insert(
            id,
            Tag {
                id,
                name: name.to_string(),
                description: description.map(str::to_string),
                state: TagState::Active,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    fn update_tag(&self, tag: &Tag) -> Result<()> {
        if self.tag_name_taken(tag.name(), tag.id())? {
            return Err(DirectoryError::DuplicateTag(tag.name().to_string()).into());
        }

        let mut state = self.state.borrow_mut();
        let stored = state
            .tags
            .get_mut(&tag.id())
            .ok_or(DirectoryError::TagNotFound(tag.id()))?;
        *stored = tag.clone();
        Ok(())
    }
}

impl AssociationStore for MemoryStore {
    fn tag_ids_of(&self, contact: ContactId) -> Result<BTreeSet<TagId>> {
        Ok(self
            .state
            .borrow()
            .tags_by_contact
            .get(&contact)
            .cloned()
            .unwrap_or_default())
    }

    fn contact_ids_of(&self, tag: TagId) -> Result<BTreeSet<ContactId>> {
        Ok(self
            .state
            .borrow()
            .contacts_by_tag
            .get(&tag)
            .cloned()
            .unwrap_or_default())
    }

    fn link(&self, contact: ContactId, tag: TagId) -> Result<bool> {
        let mut state = self.state.borrow_mut();
        if !state.contacts.contains_key(&contact) {
            return Err(DirectoryError::ContactNotFound(contact).into());
        }
        if !state.tags.contains_key(&tag) {
            return Err(DirectoryError::TagNotFound(tag).into());
        }
        Ok(state.link(contact, tag))
    }

    fn unlink(&self, contact: ContactId, tag: TagId) -> Result<bool> {
        Ok(self.state.borrow_mut().unlink(contact, tag))
    }
}

impl Store for MemoryStore {
    fn atomically<T, E, F>(&self, work: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Self) -> std::result::Result<T, E>,
        E: From<anyhow::Error>,
    {
        let outermost = self.depth.get() == 0;
        let snapshot = outermost.then(|| self.state.borrow().clone());

        self.depth.set(self.depth.get() + 1);
        let result = work(self);
        self.depth.set(self.depth.get() - 1);

        if result.is_err()
            && let Some(snapshot) = snapshot
        {
            *self.state.borrow_mut() = snapshot;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(given: &str, family: &str) -> ContactDetails {
        ContactDetails::new(given, family, "Weg 1", "10115", "Berlin")
    }

    #[test]
    fn link_and_unlink_keep_both_directions_in_sync() {
        let store = MemoryStore::new();
        let now = OffsetDateTime::now_utc();
        let contact = store.insert_contact(&details("Max", "Muster"), now).unwrap();
        let tag = store.insert_tag("#vip", None, now).unwrap();

        assert!(store.link(contact, tag).unwrap());
        assert!(!store.link(contact, tag).unwrap(), "second link is a no-op");
        assert_eq!(store.tag_ids_of(contact).unwrap(), BTreeSet::from([tag]));
        assert_eq!(store.contact_ids_of(tag).unwrap(), BTreeSet::from([contact]));

        assert!(store.unlink(contact, tag).unwrap());
        assert!(!store.unlink(contact, tag).unwrap());
        assert!(store.tag_ids_of(contact).unwrap().is_empty());
        assert!(store.contact_ids_of(tag).unwrap().is_empty());
    }

    #[test]
    fn delete_contact_clears_reverse_index() {
        let store = MemoryStore::new();
        let now = OffsetDateTime::now_utc();
        let contact = store.insert_contact(&details("Max", "Muster"), now).unwrap();
        let tag = store.insert_tag("#vip", None, now).unwrap();
        store.link(contact, tag).unwrap();

        store.delete_contact(contact).unwrap();

        assert!(!store.contact_exists(contact).unwrap());
        assert!(store.contact_ids_of(tag).unwrap().is_empty());
    }

    #[test]
    fn insert_rejects_taken_business_key() {
        let store = MemoryStore::new();
        let now = OffsetDateTime::now_utc();
        store.insert_contact(&details("Max", "Muster"), now).unwrap();

        let err = store
            .insert_contact(&details("MAX", "muster"), now)
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<DirectoryError>(),
            Some(DirectoryError::DuplicateContact)
        ));
    }

    #[test]
    fn failed_unit_of_work_restores_snapshot() {
        let store = MemoryStore::new();
        let now = OffsetDateTime::now_utc();

        let result: std::result::Result<(), DirectoryError> = store.atomically(|s| {
            s.insert_contact(&details("Max", "Muster"), now)?;
            s.atomically(|inner| {
                inner.insert_tag("#vip", None, now)?;
                Ok::<_, DirectoryError>(())
            })?;
            Err(DirectoryError::DuplicateContact)
        });

        assert!(result.is_err());
        assert!(store.list_contacts().unwrap().is_empty());
        assert!(store.list_tags().unwrap().is_empty());
    }
}
