use std::collections::HashMap;

use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params, params_from_iter};
use time::OffsetDateTime;

use super::tags::tag_from_row;
use super::{Database, is_unique_violation, placeholders, timestamp};
use crate::DirectoryError;
use crate::models::{BusinessKey, Contact, ContactDetails, ContactId};
use crate::sort::ContactOrder;
use crate::store::ContactStore;

/// Contact columns (indices 0..=13) followed by tag columns (14..=19).
const HYDRATED_COLUMNS: &str = "c.id, c.salutation, c.given_name, c.family_name, c.street, \
     c.postal_code, c.city, c.phone_primary, c.phone_secondary, c.email, c.company, c.note, \
     c.created_at, c.updated_at, \
     t.id, t.name, t.description, t.state, t.created_at, t.updated_at";

const HYDRATED_FROM: &str = "contacts c \
     LEFT JOIN contact_tags ct ON ct.contact_id = c.id \
     LEFT JOIN tags t ON t.id = ct.tag_id";

const TAG_OFFSET: usize = 14;

/// Columns covered by full-text search.
const SEARCHABLE_COLUMNS: [&str; 11] = [
    "salutation",
    "given_name",
    "family_name",
    "street",
    "postal_code",
    "city",
    "phone_primary",
    "phone_secondary",
    "email",
    "company",
    "note",
];

/// Upper bound on bound parameters per hydration query.
const HYDRATE_CHUNK: usize = 500;

/// `WHERE` body matching `?1` (lowercase) against every searchable column.
fn text_match_clause() -> String {
    SEARCHABLE_COLUMNS
        .iter()
        .map(|column| format!("instr(fold_case(coalesce(c.{column}, '')), ?1) > 0"))
        .collect::<Vec<_>>()
        .join(" OR ")
}

fn details_from_row(row: &Row<'_>) -> rusqlite::Result<ContactDetails> {
    Ok(ContactDetails {
        salutation: row.get(1)?,
        given_name: row.get(2)?,
        family_name: row.get(3)?,
        street: row.get(4)?,
        postal_code: row.get(5)?,
        city: row.get(6)?,
        phone_primary: row.get(7)?,
        phone_secondary: row.get(8)?,
        email: row.get(9)?,
        company: row.get(10)?,
        note: row.get(11)?,
    })
}

/// Folds joined contact/tag rows into contacts, keeping the order in which
/// each contact first appears.
fn fold_hydrated(rows: &mut rusqlite::Rows<'_>) -> rusqlite::Result<Vec<Contact>> {
    let mut contacts: Vec<Contact> = Vec::new();
    let mut positions: HashMap<ContactId, usize> = HashMap::new();

    while let Some(row) = rows.next()? {
        let id = ContactId::new(row.get(0)?);
        let position = match positions.get(&id) {
            Some(&position) => position,
            None => {
                contacts.push(Contact {
                    id,
                    details: details_from_row(row)?,
                    created_at: timestamp(row, 12)?,
                    updated_at: timestamp(row, 13)?,
                    tags: Vec::new(),
                });
                positions.insert(id, contacts.len() - 1);
                contacts.len() - 1
            }
        };

        let tag_id: Option<i64> = row.get(TAG_OFFSET)?;
        if tag_id.is_some() {
            contacts[position].tags.push(tag_from_row(row, TAG_OFFSET)?);
        }
    }

    Ok(contacts)
}

impl Database {
    fn query_ids(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<ContactId>> {
        let mut stmt = self.conn.prepare(sql)?;
        let ids = stmt
            .query_map(params, |row| row.get(0).map(ContactId::new))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    fn query_hydrated(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Contact>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        Ok(fold_hydrated(&mut rows)?)
    }
}

/// Maps a unique index violation to `DuplicateContact`.
fn contact_write_error(error: rusqlite::Error) -> anyhow::Error {
    if is_unique_violation(&error) {
        DirectoryError::DuplicateContact.into()
    } else {
        error.into()
    }
}

impl ContactStore for Database {
    fn contact_by_id(&self, id: ContactId) -> Result<Option<Contact>> {
        let sql = format!(
            "SELECT {HYDRATED_COLUMNS} FROM {HYDRATED_FROM} WHERE c.id = ?1 ORDER BY t.name"
        );
        Ok(self.query_hydrated(&sql, [id.get()])?.into_iter().next())
    }

    fn contacts_by_ids(&self, ids: &[ContactId]) -> Result<Vec<Contact>> {
        let mut contacts = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(HYDRATE_CHUNK) {
            let sql = format!(
                "SELECT {HYDRATED_COLUMNS} FROM {HYDRATED_FROM} \
                 WHERE c.id IN ({}) ORDER BY c.id, t.name",
                placeholders(1, chunk.len())
            );
            let hydrated =
                self.query_hydrated(&sql, params_from_iter(chunk.iter().map(|id| id.get())))?;
            contacts.extend(hydrated);
        }
        Ok(contacts)
    }

    fn list_contacts(&self) -> Result<Vec<Contact>> {
        let sql = format!(
            "SELECT {HYDRATED_COLUMNS} FROM {HYDRATED_FROM} ORDER BY {}, t.name",
            ContactOrder::default().order_by_clause("c")
        );
        self.query_hydrated(&sql, [])
    }

    fn search_contacts(&self, term: &str) -> Result<Vec<Contact>> {
        let sql = format!(
            "SELECT {HYDRATED_COLUMNS} FROM {HYDRATED_FROM} WHERE {} ORDER BY {}, t.name",
            text_match_clause(),
            ContactOrder::default().order_by_clause("c")
        );
        self.query_hydrated(&sql, [term.to_lowercase()])
    }

    fn contact_ids(&self, order: &ContactOrder) -> Result<Vec<ContactId>> {
        let sql = format!(
            "SELECT c.id FROM contacts c ORDER BY {}",
            order.order_by_clause("c")
        );
        self.query_ids(&sql, [])
    }

    fn search_contact_ids(&self, term: &str, order: &ContactOrder) -> Result<Vec<ContactId>> {
        let sql = format!(
            "SELECT c.id FROM contacts c WHERE {} ORDER BY {}",
            text_match_clause(),
            order.order_by_clause("c")
        );
        self.query_ids(&sql, [term.to_lowercase()])
    }

    fn contact_ids_with_all_active_tags(
        &self,
        names: &[String],
        order: &ContactOrder,
    ) -> Result<Vec<ContactId>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT c.id FROM contacts c
             JOIN contact_tags ct ON ct.contact_id = c.id
             JOIN tags t ON t.id = ct.tag_id
             WHERE t.state = 'active' AND fold_case(t.name) IN ({})
             GROUP BY c.id
             HAVING COUNT(DISTINCT t.id) = ?{}
             ORDER BY {}",
            placeholders(1, names.len()),
            names.len() + 1,
            order.order_by_clause("c")
        );

        let mut values: Vec<rusqlite::types::Value> = names
            .iter()
            .map(|name| rusqlite::types::Value::Text(name.clone()))
            .collect();
        values.push(rusqlite::types::Value::Integer(names.len() as i64));

        self.query_ids(&sql, params_from_iter(values))
    }

    fn contact_ids_in_city(&self, city: &str, order: &ContactOrder) -> Result<Vec<ContactId>> {
        let sql = format!(
            "SELECT c.id FROM contacts c WHERE fold_case(c.city) = ?1 ORDER BY {}",
            order.order_by_clause("c")
        );
        self.query_ids(&sql, [city.to_lowercase()])
    }

    fn contact_id_by_business_key(&self, key: &BusinessKey) -> Result<Option<ContactId>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM contacts WHERE business_key = ?1",
                [key.storage_form()],
                |row| row.get(0).map(ContactId::new),
            )
            .optional()?;
        Ok(id)
    }

    fn insert_contact(&self, details: &ContactDetails, now: OffsetDateTime) -> Result<ContactId> {
        let now = now.unix_timestamp();
        self.conn
            .execute(
                "INSERT INTO contacts (salutation, given_name, family_name, street, postal_code,
                     city, phone_primary, phone_secondary, email, company, note, business_key,
                     created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
                params![
                    details.salutation,
                    details.given_name,
                    details.family_name,
                    details.street,
                    details.postal_code,
                    details.city,
                    details.phone_primary,
                    details.phone_secondary,
                    details.email,
                    details.company,
                    details.note,
                    details.business_key().storage_form(),
                    now,
                ],
            )
            .map_err(contact_write_error)?;

        Ok(ContactId::new(self.conn.last_insert_rowid()))
    }

    fn update_contact(
        &self,
        id: ContactId,
        details: &ContactDetails,
        now: OffsetDateTime,
    ) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE contacts SET salutation = ?2, given_name = ?3, family_name = ?4,
                     street = ?5, postal_code = ?6, city = ?7, phone_primary = ?8,
                     phone_secondary = ?9, email = ?10, company = ?11, note = ?12,
                     business_key = ?13, updated_at = ?14
                 WHERE id = ?1",
                params![
                    id.get(),
                    details.salutation,
                    details.given_name,
                    details.family_name,
                    details.street,
                    details.postal_code,
                    details.city,
                    details.phone_primary,
                    details.phone_secondary,
                    details.email,
                    details.company,
                    details.note,
                    details.business_key().storage_form(),
                    now.unix_timestamp(),
                ],
            )
            .map_err(contact_write_error)?;

        if changed == 0 {
            return Err(DirectoryError::ContactNotFound(id).into());
        }
        Ok(())
    }

    fn touch_contact(&self, id: ContactId, now: OffsetDateTime) -> Result<()> {
        self.conn.execute(
            "UPDATE contacts SET updated_at = ?2 WHERE id = ?1",
            params![id.get(), now.unix_timestamp()],
        )?;
        Ok(())
    }

    fn delete_contact(&self, id: ContactId) -> Result<()> {
        // contact_tags rows go with it via ON DELETE CASCADE
        self.conn
            .execute("DELETE FROM contacts WHERE id = ?1", [id.get()])?;
        Ok(())
    }

    fn contact_exists(&self, id: ContactId) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM contacts WHERE id = ?1)",
            [id.get()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }
}
