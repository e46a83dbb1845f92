use std::collections::BTreeSet;

use anyhow::Result;
use rusqlite::params;

use super::Database;
use crate::DirectoryError;
use crate::models::{ContactId, TagId};
use crate::store::{AssociationStore, ContactStore};

impl Database {
    fn tag_exists(&self, id: TagId) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM tags WHERE id = ?1)",
            [id.get()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }
}

impl AssociationStore for Database {
    fn tag_ids_of(&self, contact: ContactId) -> Result<BTreeSet<TagId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT tag_id FROM contact_tags WHERE contact_id = ?1")?;
        let ids = stmt
            .query_map([contact.get()], |row| row.get(0).map(TagId::new))?
            .collect::<rusqlite::Result<BTreeSet<_>>>()?;
        Ok(ids)
    }

    fn contact_ids_of(&self, tag: TagId) -> Result<BTreeSet<ContactId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT contact_id FROM contact_tags WHERE tag_id = ?1")?;
        let ids = stmt
            .query_map([tag.get()], |row| row.get(0).map(ContactId::new))?
            .collect::<rusqlite::Result<BTreeSet<_>>>()?;
        Ok(ids)
    }

    fn link(&self, contact: ContactId, tag: TagId) -> Result<bool> {
        if !self.contact_exists(contact)? {
            return Err(DirectoryError::ContactNotFound(contact).into());
        }
        if !self.tag_exists(tag)? {
            return Err(DirectoryError::TagNotFound(tag).into());
        }

        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO contact_tags (contact_id, tag_id) VALUES (?1, ?2)",
            params![contact.get(), tag.get()],
        )?;
        Ok(inserted > 0)
    }

    fn unlink(&self, contact: ContactId, tag: TagId) -> Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM contact_tags WHERE contact_id = ?1 AND tag_id = ?2",
            params![contact.get(), tag.get()],
        )?;
        Ok(removed > 0)
    }
}
