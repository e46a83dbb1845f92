use time::OffsetDateTime;

/// Individual migration with version metadata.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

impl Migration {
    pub const fn new(version: u32, description: &'static str, up: &'static str) -> Self {
        Self {
            version,
            description,
            up,
        }
    }

    /// Checks if this migration has been applied to the database.
    pub fn is_applied(&self, conn: &rusqlite::Connection) -> anyhow::Result<bool> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE version = ?1)",
            [self.version],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Applies this migration and records it in `schema_migrations`, both in
    /// one transaction.
    pub fn apply(&self, conn: &mut rusqlite::Connection) -> anyhow::Result<()> {
        let tx = conn.transaction()?;

        tx.execute_batch(self.up)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?1, ?2, ?3)",
            rusqlite::params![
                self.version,
                OffsetDateTime::now_utc().unix_timestamp(),
                self.description
            ],
        )?;

        tx.commit()?;
        Ok(())
    }
}

/// Registry of all migrations in version order.
pub const MIGRATIONS: &[Migration] = &[Migration::new(
    1,
    "Initial schema: create contacts, tags, contact_tags tables",
    include_str!("migrations/001_initial_schema.sql"),
)];

/// Applies all pending migrations in version order.
pub fn apply_pending_migrations(conn: &mut rusqlite::Connection) -> anyhow::Result<()> {
    ensure_migration_table_exists(conn)?;

    for migration in MIGRATIONS {
        if !migration.is_applied(conn)? {
            migration.apply(conn)?;
            tracing::info!(
                version = migration.version,
                description = migration.description,
                "applied migration"
            );
        }
    }

    Ok(())
}

/// Returns the versions recorded in `schema_migrations`, ascending.
pub fn applied_versions(conn: &rusqlite::Connection) -> anyhow::Result<Vec<u32>> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations ORDER BY version")?;
    let versions = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<u32>>>()?;
    Ok(versions)
}

fn ensure_migration_table_exists(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        );
        "#,
    )?;
    Ok(())
}
