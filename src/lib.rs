pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod relations;
pub mod search;
pub mod service;
pub mod sort;
pub mod store;
pub mod uniqueness;

pub use db::Database;
pub use error::{DirectoryError, Result};
pub use models::{
    BusinessKey, Contact, ContactDetails, ContactId, Tag, TagDraft, TagId, TagState,
};
pub use relations::AssignmentReport;
pub use search::SearchQuery;
pub use service::{Directory, ListContactsOptions};
pub use sort::{ContactOrder, SortDirection, SortKey};
pub use store::{AssociationStore, ContactStore, MemoryStore, Store, TagStore};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_accessible_from_crate_root() {
        let db = Database::in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn directory_works_over_both_stores() {
        let sqlite = Directory::new(Database::in_memory().unwrap());
        let memory = Directory::new(MemoryStore::new());

        let a = sqlite.create_tag(TagDraft::new("#A1")).unwrap();
        let b = memory.create_tag(TagDraft::new("#A1")).unwrap();

        assert_eq!(a.name(), b.name());
        assert_eq!(a.state(), TagState::Active);
    }
}
