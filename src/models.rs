mod contact;
mod ids;
mod tag;

pub use contact::{BusinessKey, Contact, ContactDetails};
pub use ids::{ContactId, TagId};
pub use tag::{
    TAG_DESCRIPTION_MAX_LEN, TAG_NAME_MAX_LEN, TAG_NAME_MIN_LEN, Tag, TagDraft, TagState,
    UnknownTagState, is_valid_tag_name,
};

/// Turns blank or whitespace-only input into `None`.
pub(crate) fn normalize_optional(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
