use anyhow::Result;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{OptionalExtension, Row, params};
use time::OffsetDateTime;

use super::{Database, is_unique_violation, timestamp};
use crate::DirectoryError;
use crate::models::{Tag, TagId, TagState};
use crate::store::TagStore;

const TAG_COLUMNS: &str = "id, name, description, state, created_at, updated_at";

impl ToSql for TagState {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TagState {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// Reads a tag from six consecutive columns starting at `offset`.
pub(super) fn tag_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: TagId::new(row.get(offset)?),
        name: row.get(offset + 1)?,
        description: row.get(offset + 2)?,
        state: row.get(offset + 3)?,
        created_at: timestamp(row, offset + 4)?,
        updated_at: timestamp(row, offset + 5)?,
    })
}

fn tag_write_error(error: rusqlite::Error, name: &str) -> anyhow::Error {
    if is_unique_violation(&error) {
        DirectoryError::DuplicateTag(name.to_string()).into()
    } else {
        error.into()
    }
}

impl Database {
    fn query_tags(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Tag>> {
        let mut stmt = self.conn.prepare(sql)?;
        let tags = stmt
            .query_map(params, |row| tag_from_row(row, 0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tags)
    }
}

impl TagStore for Database {
    fn tag_by_id(&self, id: TagId) -> Result<Option<Tag>> {
        let tag = self
            .conn
            .query_row(
                &format!("SELECT {TAG_COLUMNS} FROM tags WHERE id = ?1"),
                [id.get()],
                |row| tag_from_row(row, 0),
            )
            .optional()?;
        Ok(tag)
    }

    fn tag_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let tag = self
            .conn
            .query_row(
                &format!("SELECT {TAG_COLUMNS} FROM tags WHERE fold_case(name) = ?1"),
                [name.to_lowercase()],
                |row| tag_from_row(row, 0),
            )
            .optional()?;
        Ok(tag)
    }

    fn list_tags(&self) -> Result<Vec<Tag>> {
        self.query_tags(&format!("SELECT {TAG_COLUMNS} FROM tags ORDER BY name"), [])
    }

    fn list_active_tags(&self) -> Result<Vec<Tag>> {
        self.query_tags(
            &format!("SELECT {TAG_COLUMNS} FROM tags WHERE state = 'active' ORDER BY name"),
            [],
        )
    }

    fn search_tags(&self, term: &str) -> Result<Vec<Tag>> {
        self.query_tags(
            &format!(
                "SELECT {TAG_COLUMNS} FROM tags
                 WHERE instr(fold_case(name), ?1) > 0
                    OR instr(fold_case(coalesce(description, '')), ?1) > 0
                 ORDER BY name"
            ),
            [term.to_lowercase()],
        )
    }

    fn tag_name_taken(&self, name: &str, excluding: TagId) -> Result<bool> {
        let taken: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM tags WHERE fold_case(name) = ?1 AND id != ?2)",
            params![name.to_lowercase(), excluding.get()],
            |row| row.get(0),
        )?;
        Ok(taken)
    }

    fn insert_tag(
        &self,
        name: &str,
        description: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<TagId> {
        self.conn
            .execute(
                "INSERT INTO tags (name, description, state, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![name, description, TagState::Active, now.unix_timestamp()],
            )
            .map_err(|e| tag_write_error(e, name))?;

        Ok(TagId::new(self.conn.last_insert_rowid()))
    }

    fn update_tag(&self, tag: &Tag) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE tags SET name = ?2, description = ?3, state = ?4, updated_at = ?5
                 WHERE id = ?1",
                params![
                    tag.id().get(),
                    tag.name(),
                    tag.description(),
                    tag.state(),
                    tag.updated_at().unix_timestamp(),
                ],
            )
            .map_err(|e| tag_write_error(e, tag.name()))?;

        if changed == 0 {
            return Err(DirectoryError::TagNotFound(tag.id()).into());
        }
        Ok(())
    }
}
