use super::*;
use crate::DirectoryError;
use crate::models::{ContactDetails, ContactId, TagId, TagState};
use crate::sort::{ContactOrder, SortDirection, SortKey};
use crate::store::{AssociationStore, ContactStore, TagStore};
use tempfile::tempdir;

fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

fn details(given: &str, family: &str) -> ContactDetails {
    ContactDetails::new(given, family, "Hauptstraße 1", "12345", "Berlin")
}

fn ids(values: &[i64]) -> Vec<ContactId> {
    values.iter().copied().map(ContactId::new).collect()
}

#[test]
fn in_memory_opens_successfully() {
    let result = Database::in_memory();
    assert!(result.is_ok());
}

#[test]
fn schema_tables_exist() {
    let db = Database::in_memory().unwrap();

    let tables: Vec<String> = db
        .connection()
        .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .filter_map(|r| r.ok())
        .collect();

    assert!(tables.contains(&"contacts".to_string()));
    assert!(tables.contains(&"tags".to_string()));
    assert!(tables.contains(&"contact_tags".to_string()));
    assert!(tables.contains(&"schema_migrations".to_string()));
}

#[test]
fn schema_indexes_exist() {
    let db = Database::in_memory().unwrap();

    let indexes: Vec<String> = db
        .connection()
        .prepare(
            "SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%' ORDER BY name",
        )
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .filter_map(|r| r.ok())
        .collect();

    assert!(indexes.contains(&"idx_contacts_business_key".to_string()));
    assert!(indexes.contains(&"idx_contact_tags_contact".to_string()));
    assert!(indexes.contains(&"idx_contact_tags_tag".to_string()));
}

#[test]
fn foreign_keys_enabled() {
    let db = Database::in_memory().unwrap();

    let fk_enabled: i32 = db
        .connection()
        .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
        .unwrap();

    assert_eq!(fk_enabled, 1);
}

#[test]
fn fold_case_lowercases_unicode_and_keeps_null() {
    let db = Database::in_memory().unwrap();

    let folded: String = db
        .connection()
        .query_row("SELECT fold_case('ÖLWEG Straße')", [], |row| row.get(0))
        .unwrap();
    let null: Option<String> = db
        .connection()
        .query_row("SELECT fold_case(NULL)", [], |row| row.get(0))
        .unwrap();

    assert_eq!(folded, "ölweg straße");
    assert_eq!(null, None);
}

#[test]
fn open_creates_database_file() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test.db");

    let result = Database::open(&db_path);
    assert!(result.is_ok());
    assert!(db_path.exists());
}

#[test]
fn reopen_is_idempotent() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test.db");

    {
        let db = Database::open(&db_path).unwrap();
        db.insert_contact(&details("Max", "Mustermann"), now())
            .unwrap();
    }

    let db = Database::open(&db_path).unwrap();

    assert_eq!(db.schema_versions().unwrap(), vec![1]);
    assert_eq!(db.list_contacts().unwrap().len(), 1);
}

#[test]
fn insert_and_hydrate_contact_with_tags_by_name() {
    let db = Database::in_memory().unwrap();
    let contact = db
        .insert_contact(&details("Max", "Mustermann").with_company("ACME"), now())
        .unwrap();
    let zeta = db.insert_tag("#zeta", None, now()).unwrap();
    let alpha = db.insert_tag("#alpha", Some("first"), now()).unwrap();
    db.link(contact, zeta).unwrap();
    db.link(contact, alpha).unwrap();

    let hydrated = db.contact_by_id(contact).unwrap().unwrap();

    assert_eq!(hydrated.details.company.as_deref(), Some("ACME"));
    assert_eq!(hydrated.tag_names(), vec!["#alpha", "#zeta"]);
    assert_eq!(hydrated.tags[0].description(), Some("first"));
}

#[test]
fn contact_by_id_returns_none_for_unknown() {
    let db = Database::in_memory().unwrap();

    assert!(db.contact_by_id(ContactId::new(42)).unwrap().is_none());
}

#[test]
fn unique_business_key_violation_maps_to_duplicate_contact() {
    let db = Database::in_memory().unwrap();
    db.insert_contact(&details("Max", "Mustermann"), now())
        .unwrap();

    let err = db
        .insert_contact(&details("MAX", "MUSTERMANN"), now())
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<DirectoryError>(),
        Some(DirectoryError::DuplicateContact)
    ));
}

#[test]
fn contacts_by_ids_skips_missing_and_deduplicates_join_rows() {
    let db = Database::in_memory().unwrap();
    let a = db.insert_contact(&details("Anna", "A"), now()).unwrap();
    let b = db.insert_contact(&details("Bernd", "B"), now()).unwrap();
    for name in ["#one", "#two", "#three"] {
        let tag = db.insert_tag(name, None, now()).unwrap();
        db.link(a, tag).unwrap();
    }

    let hydrated = db
        .contacts_by_ids(&[b, ContactId::new(99), a])
        .unwrap();

    assert_eq!(hydrated.len(), 2);
    let a_hydrated = hydrated.iter().find(|c| c.id == a).unwrap();
    assert_eq!(a_hydrated.tags.len(), 3);
}

#[test]
fn ordered_ids_follow_fold_case_and_direction() {
    let db = Database::in_memory().unwrap();
    let ute = db.insert_contact(&details("Ute", "ärger"), now()).unwrap();
    let bob = db.insert_contact(&details("Bob", "Zorn"), now()).unwrap();
    let eva = db.insert_contact(&details("eva", "zorn"), now()).unwrap();

    let asc = db
        .contact_ids(&ContactOrder::new(
            Some(SortKey::FamilyName),
            SortDirection::Ascending,
        ))
        .unwrap();
    let desc = db
        .contact_ids(&ContactOrder::new(
            Some(SortKey::FamilyName),
            SortDirection::Descending,
        ))
        .unwrap();

    // "zorn" < "ärger" in code point order
    assert_eq!(asc, vec![bob, eva, ute]);
    assert_eq!(desc, vec![ute, eva, bob]);
}

#[test]
fn search_matches_non_ascii_case_insensitively() {
    let db = Database::in_memory().unwrap();
    let jurgen = db
        .insert_contact(
            &ContactDetails::new("Jürgen", "Öztürk", "Ölweg 2", "80331", "MÜNCHEN"),
            now(),
        )
        .unwrap();
    db.insert_contact(&details("Max", "Mustermann"), now())
        .unwrap();

    let hits = db
        .search_contact_ids("münchen", &ContactOrder::default())
        .unwrap();
    let hydrated = db.search_contacts("ÖZT").unwrap();

    assert_eq!(hits, vec![jurgen]);
    assert_eq!(hydrated.len(), 1);
    assert_eq!(hydrated[0].id, jurgen);
}

#[test]
fn search_contacts_returns_each_contact_once() {
    let db = Database::in_memory().unwrap();
    let contact = db
        .insert_contact(&details("Max", "Mustermann").with_note("max@home"), now())
        .unwrap();
    for name in ["#a1", "#b2"] {
        let tag = db.insert_tag(name, None, now()).unwrap();
        db.link(contact, tag).unwrap();
    }

    let hits = db.search_contacts("max").unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].tags.len(), 2);
}

#[test]
fn all_active_tags_requires_every_tag_active() {
    let db = Database::in_memory().unwrap();
    let both = db.insert_contact(&details("Anna", "A"), now()).unwrap();
    let one = db.insert_contact(&details("Bernd", "B"), now()).unwrap();
    let vip = db.insert_tag("#vip", None, now()).unwrap();
    let kunde = db.insert_tag("#kunde", None, now()).unwrap();
    db.link(both, vip).unwrap();
    db.link(both, kunde).unwrap();
    db.link(one, vip).unwrap();

    let names = vec!["#vip".to_string(), "#kunde".to_string()];
    let order = ContactOrder::default();
    assert_eq!(
        db.contact_ids_with_all_active_tags(&names, &order).unwrap(),
        vec![both]
    );

    let mut locked = db.tag_by_id(kunde).unwrap().unwrap();
    assert!(locked.lock(now()));
    db.update_tag(&locked).unwrap();

    assert!(
        db.contact_ids_with_all_active_tags(&names, &order)
            .unwrap()
            .is_empty()
    );
    assert_eq!(
        db.contact_ids_with_all_active_tags(&["#vip".to_string()], &order)
            .unwrap(),
        ids(&[both.get(), one.get()])
    );
}

#[test]
fn city_lookup_ignores_case() {
    let db = Database::in_memory().unwrap();
    let berlin = db.insert_contact(&details("Max", "M"), now()).unwrap();
    db.insert_contact(
        &ContactDetails::new("Eva", "E", "Weg 2", "20095", "Hamburg"),
        now(),
    )
    .unwrap();

    assert_eq!(
        db.contact_ids_in_city("BERLIN", &ContactOrder::default())
            .unwrap(),
        vec![berlin]
    );
}

#[test]
fn tag_state_round_trips_through_text_column() {
    let db = Database::in_memory().unwrap();
    let id = db.insert_tag("#vip", None, now()).unwrap();
    let mut tag = db.tag_by_id(id).unwrap().unwrap();
    tag.lock(now());
    db.update_tag(&tag).unwrap();

    let stored: String = db
        .connection()
        .query_row("SELECT state FROM tags WHERE id = ?1", [id.get()], |row| {
            row.get(0)
        })
        .unwrap();

    assert_eq!(stored, "locked");
    assert_eq!(
        db.tag_by_id(id).unwrap().unwrap().state(),
        TagState::Locked
    );
    assert!(db.list_active_tags().unwrap().is_empty());
}

#[test]
fn tag_names_are_unique_case_insensitively() {
    let db = Database::in_memory().unwrap();
    let vip = db.insert_tag("#vip", None, now()).unwrap();

    let err = db.insert_tag("#VIP", None, now()).unwrap_err();

    assert!(matches!(
        err.downcast_ref::<DirectoryError>(),
        Some(DirectoryError::DuplicateTag(_))
    ));
    assert_eq!(db.tag_by_name("#Vip").unwrap().unwrap().id(), vip);
    assert!(db.tag_name_taken("#VIP", TagId::new(999)).unwrap());
    assert!(!db.tag_name_taken("#vip", vip).unwrap());
}

#[test]
fn search_tags_covers_name_and_description() {
    let db = Database::in_memory().unwrap();
    db.insert_tag("#kunde", Some("Bestandskunde"), now())
        .unwrap();
    db.insert_tag("#privat", Some("Familie und Freunde"), now())
        .unwrap();

    let by_name: Vec<String> = db
        .search_tags("KUND")
        .unwrap()
        .iter()
        .map(|t| t.name().to_string())
        .collect();
    let by_description = db.search_tags("freunde").unwrap();

    assert_eq!(by_name, vec!["#kunde"]);
    assert_eq!(by_description.len(), 1);
    assert_eq!(by_description[0].name(), "#privat");
}

#[test]
fn link_is_idempotent_and_symmetric() {
    let db = Database::in_memory().unwrap();
    let contact = db.insert_contact(&details("Max", "M"), now()).unwrap();
    let tag = db.insert_tag("#vip", None, now()).unwrap();

    assert!(db.link(contact, tag).unwrap());
    assert!(!db.link(contact, tag).unwrap());
    assert!(db.tag_ids_of(contact).unwrap().contains(&tag));
    assert!(db.contact_ids_of(tag).unwrap().contains(&contact));

    assert!(db.unlink(contact, tag).unwrap());
    assert!(!db.unlink(contact, tag).unwrap());
    assert!(db.contact_ids_of(tag).unwrap().is_empty());
}

#[test]
fn link_rejects_unknown_sides() {
    let db = Database::in_memory().unwrap();
    let contact = db.insert_contact(&details("Max", "M"), now()).unwrap();

    let err = db.link(contact, TagId::new(5)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DirectoryError>(),
        Some(DirectoryError::TagNotFound(_))
    ));
}

#[test]
fn delete_contact_cascades_associations() {
    let db = Database::in_memory().unwrap();
    let contact = db.insert_contact(&details("Max", "M"), now()).unwrap();
    let tag = db.insert_tag("#vip", None, now()).unwrap();
    db.link(contact, tag).unwrap();

    db.delete_contact(contact).unwrap();

    assert!(!db.contact_exists(contact).unwrap());
    assert!(db.contact_ids_of(tag).unwrap().is_empty());
}

#[test]
fn atomically_rolls_back_on_error() {
    let db = Database::in_memory().unwrap();

    let result: std::result::Result<(), DirectoryError> = db.atomically(|db| {
        db.insert_contact(&details("Max", "M"), now())?;
        db.insert_tag("#vip", None, now())?;
        Err(DirectoryError::DuplicateContact)
    });

    assert!(result.is_err());
    assert!(db.list_contacts().unwrap().is_empty());
    assert!(db.list_tags().unwrap().is_empty());
    assert!(db.connection().is_autocommit());
}

#[test]
fn nested_atomically_joins_outer_transaction() {
    let db = Database::in_memory().unwrap();

    let result: std::result::Result<(), DirectoryError> = db.atomically(|db| {
        db.atomically(|inner| {
            inner.insert_tag("#vip", None, now())?;
            Ok::<_, DirectoryError>(())
        })?;
        Err(DirectoryError::InvalidTagDescription)
    });

    assert!(result.is_err());
    assert!(db.list_tags().unwrap().is_empty());
}
