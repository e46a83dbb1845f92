//! Tag creation, renaming, locking and assignment through the directory.
use anyhow::Result;
use rolodex::{
    ContactDetails, Database, Directory, DirectoryError, ListContactsOptions, MemoryStore, Store,
    TagDraft, TagState,
};

fn contact(given: &str) -> ContactDetails {
    ContactDetails::new(given, "Muster", "Weg 1", "12345", "Berlin")
}

fn lifecycle<S: Store>(directory: Directory<S>) -> Result<()> {
    let tag = directory.create_tag(TagDraft::new("#Projekt_A").with_description("Team A"))?;
    assert_eq!(tag.name(), "#projekt_a");
    assert_eq!(tag.state(), TagState::Active);

    assert!(matches!(
        directory.create_tag(TagDraft::new("#PROJEKT_A")),
        Err(DirectoryError::DuplicateTag(_))
    ));
    assert!(matches!(
        directory.create_tag(TagDraft::new("projekt")),
        Err(DirectoryError::InvalidTagName(_))
    ));
    assert!(matches!(
        directory.create_tag(TagDraft::new("#x").with_description("d".repeat(501))),
        Err(DirectoryError::InvalidTagDescription)
    ));

    let max = directory.create_contact(contact("Max"), &[tag.id()])?;
    let erika = directory.create_contact(contact("Erika"), &[])?;

    // Lock: stays on Max, cannot be assigned to Erika, not matched by search.
    let locked = directory.lock_tag(tag.id())?;
    assert_eq!(locked.state(), TagState::Locked);
    assert_eq!(directory.lock_tag(tag.id())?.state(), TagState::Locked);
    assert!(matches!(
        directory.assign_tag(&[erika.id], tag.id()),
        Err(DirectoryError::LockedTagAssignmentRejected(_))
    ));
    assert!(directory.contact(max.id)?.has_tag(tag.id()));
    assert!(directory.available_tags()?.is_empty());
    assert!(
        directory
            .list_contacts(&ListContactsOptions::default().search("#projekt_a"))?
            .is_empty()
    );

    // Renaming keeps the lock and the associations.
    let renamed = directory.update_tag(tag.id(), TagDraft::new("#Projekt_B"))?;
    assert_eq!(renamed.name(), "#projekt_b");
    assert_eq!(renamed.state(), TagState::Locked);
    assert_eq!(renamed.description(), None);
    assert_eq!(directory.contact(max.id)?.tag_names(), vec!["#projekt_b"]);

    // Unlocked tags are searchable and assignable again.
    directory.unlock_tag(tag.id())?;
    let report = directory.assign_tag(&[erika.id], tag.id())?;
    assert_eq!(report.changed, vec![erika.id]);
    let hits = directory.list_contacts(&ListContactsOptions::default().search("#projekt_b"))?;
    assert_eq!(hits.len(), 2);

    // A locked tag can still be removed.
    directory.lock_tag(tag.id())?;
    let report = directory.unassign_tag(&[max.id, erika.id], tag.id())?;
    assert_eq!(report.changed.len(), 2);

    let found = directory.search_tags("team")?;
    assert!(found.is_empty(), "description was cleared by the rename");
    assert_eq!(directory.search_tags("PROJEKT")?.len(), 1);

    Ok(())
}

#[test]
fn tag_lifecycle_in_sqlite() -> Result<()> {
    lifecycle(Directory::new(Database::in_memory()?))
}

#[test]
fn tag_lifecycle_in_memory() -> Result<()> {
    lifecycle(Directory::new(MemoryStore::new()))
}

#[test]
fn renaming_to_own_name_in_other_case_is_allowed() -> Result<()> {
    let directory = Directory::new(Database::in_memory()?);
    let tag = directory.create_tag(TagDraft::new("#vip"))?;
    let other = directory.create_tag(TagDraft::new("#kunde"))?;

    let renamed = directory.update_tag(tag.id(), TagDraft::new("#VIP"))?;

    assert_eq!(renamed.name(), "#vip");
    assert!(matches!(
        directory.update_tag(other.id(), TagDraft::new("#Vip")),
        Err(DirectoryError::DuplicateTag(_))
    ));
    Ok(())
}

#[test]
fn updating_contact_with_tags_drops_locked_ones() -> Result<()> {
    let directory = Directory::new(Database::in_memory()?);
    let open = directory.create_tag(TagDraft::new("#offen"))?;
    let closed = directory.create_tag(TagDraft::new("#alt"))?;
    let max = directory.create_contact(contact("Max"), &[open.id(), closed.id()])?;
    directory.lock_tag(closed.id())?;

    let kept = directory.update_contact(max.id, contact("Max").with_note("neu"), None)?;
    assert_eq!(kept.tag_names(), vec!["#alt", "#offen"]);

    let replaced =
        directory.update_contact(max.id, contact("Max"), Some(&[open.id(), closed.id()]))?;
    assert_eq!(replaced.tag_names(), vec!["#offen"]);

    Ok(())
}
