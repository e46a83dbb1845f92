use thiserror::Error;

use crate::models::{ContactId, TAG_DESCRIPTION_MAX_LEN, TagId};

/// Errors surfaced by the contact directory.
///
/// Every variant except [`DirectoryError::Storage`] is a rejected request the
/// caller can act on; the directory never retries or substitutes defaults.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// No contact exists with the given ID.
    #[error("contact {0} not found")]
    ContactNotFound(ContactId),

    /// Another contact already has the same name and address.
    #[error("a contact with this name and address already exists")]
    DuplicateContact,

    /// No tag exists with the given ID.
    #[error("tag {0} not found")]
    TagNotFound(TagId),

    /// Another tag already uses this name (case-insensitive).
    #[error("a tag named '{0}' already exists")]
    DuplicateTag(String),

    /// Locked tags cannot be newly assigned.
    #[error("tag {0} is locked and cannot be assigned")]
    LockedTagAssignmentRejected(TagId),

    /// Tag name does not match `#` followed by letters, digits or underscores.
    #[error(
        "invalid tag name '{0}': expected 2-50 characters, '#' followed by letters, digits or underscores"
    )]
    InvalidTagName(String),

    /// Tag description exceeds the maximum length.
    #[error("tag description must not exceed {} characters", TAG_DESCRIPTION_MAX_LEN)]
    InvalidTagDescription,

    /// The underlying store failed.
    #[error(transparent)]
    Storage(anyhow::Error),
}

impl DirectoryError {
    /// Returns true for rejected requests, false for storage failures.
    pub fn is_user_error(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}

/// Store errors arrive as `anyhow::Error`. A store may raise a
/// `DirectoryError` itself (e.g. a unique index violation reported as
/// `DuplicateContact`), so those are unwrapped instead of being buried
/// under `Storage`.
impl From<anyhow::Error> for DirectoryError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<DirectoryError>() {
            Ok(directory_error) => directory_error,
            Err(other) => Self::Storage(other),
        }
    }
}

impl From<rusqlite::Error> for DirectoryError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Storage(error.into())
    }
}

/// Result alias used by the directory's public operations.
pub type Result<T, E = DirectoryError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anyhow_wrapping_directory_error_is_unwrapped() {
        let wrapped = anyhow::Error::new(DirectoryError::DuplicateContact);
        let error = DirectoryError::from(wrapped);

        assert!(matches!(error, DirectoryError::DuplicateContact));
        assert!(error.is_user_error());
    }

    #[test]
    fn other_anyhow_errors_become_storage() {
        let error = DirectoryError::from(anyhow::anyhow!("disk full"));

        assert!(matches!(error, DirectoryError::Storage(_)));
        assert!(!error.is_user_error());
        assert_eq!(error.to_string(), "disk full");
    }

    #[test]
    fn messages_name_the_offending_ids() {
        assert_eq!(
            DirectoryError::ContactNotFound(ContactId::new(7)).to_string(),
            "contact 7 not found"
        );
        assert_eq!(
            DirectoryError::LockedTagAssignmentRejected(TagId::new(3)).to_string(),
            "tag 3 is locked and cannot be assigned"
        );
        assert_eq!(
            DirectoryError::InvalidTagDescription.to_string(),
            "tag description must not exceed 500 characters"
        );
    }
}
