use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{TagId, normalize_optional};

/// Minimum length of a tag name, including the leading `#`.
pub const TAG_NAME_MIN_LEN: usize = 2;
/// Maximum length of a tag name, including the leading `#`.
pub const TAG_NAME_MAX_LEN: usize = 50;
/// Maximum length of a tag description.
pub const TAG_DESCRIPTION_MAX_LEN: usize = 500;

/// Lifecycle state of a tag.
///
/// Locked tags stay on the contacts that already hold them but are hidden
/// from assignment and from tag search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagState {
    /// Tag can be assigned and matched in tag search.
    #[default]
    Active,
    /// Tag is soft-deleted: kept on contacts, excluded from assignment and search.
    Locked,
}

impl TagState {
    /// Returns the storage representation of this state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Locked => "locked",
        }
    }

    pub fn is_active(self) -> bool {
        self == Self::Active
    }
}

impl fmt::Display for TagState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown tag state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tag state '{0}'")]
pub struct UnknownTagState(pub String);

impl FromStr for TagState {
    type Err = UnknownTagState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "locked" => Ok(Self::Locked),
            other => Err(UnknownTagState(other.to_string())),
        }
    }
}

/// A user-defined label ("hashtag") that can be attached to contacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub(crate) id: TagId,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) state: TagState,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) updated_at: OffsetDateTime,
}

impl Tag {
    /// Returns the tag's unique identifier.
    pub fn id(&self) -> TagId {
        self.id
    }

    /// Returns the lowercase tag name, including the leading `#`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn state(&self) -> TagState {
        self.state
    }

    /// Returns true if the tag is available for assignment and tag search.
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub fn updated_at(&self) -> OffsetDateTime {
        self.updated_at
    }

    /// Transitions the tag to `Locked`. Returns false if it already was.
    pub(crate) fn lock(&mut self, now: OffsetDateTime) -> bool {
        self.transition(TagState::Locked, now)
    }

    /// Transitions the tag to `Active`. Returns false if it already was.
    pub(crate) fn unlock(&mut self, now: OffsetDateTime) -> bool {
        self.transition(TagState::Active, now)
    }

    fn transition(&mut self, target: TagState, now: OffsetDateTime) -> bool {
        if self.state == target {
            return false;
        }
        self.state = target;
        self.updated_at = now;
        true
    }

    /// Applies an already validated draft.
    pub(crate) fn apply(&mut self, draft: TagDraft, now: OffsetDateTime) {
        let draft = draft.normalized();
        self.name = draft.name;
        self.description = draft.description;
        self.updated_at = now;
    }
}

/// Input for creating or updating a tag.
///
/// The lock state is deliberately absent: it only changes through
/// lock/unlock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDraft {
    pub name: String,
    pub description: Option<String>,
}

impl TagDraft {
    /// Creates a draft with the given name and no description.
    ///
    /// # Examples
    ///
    /// ```
    /// use rolodex::TagDraft;
    ///
    /// let draft = TagDraft::new("#VIP").with_description("Very important");
    /// assert_eq!(draft.name, "#VIP");
    /// assert_eq!(draft.description.as_deref(), Some("Very important"));
    /// ```
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Lowercases the name and turns a blank description into `None`.
    pub fn normalized(self) -> Self {
        Self {
            name: self.name.to_lowercase(),
            description: normalize_optional(self.description),
        }
    }
}

/// Checks the tag name rules: 2-50 characters, `#` followed by ASCII
/// letters, digits or underscores only.
///
/// # Examples
///
/// ```
/// use rolodex::models::is_valid_tag_name;
///
/// assert!(is_valid_tag_name("#Kunde_2024"));
/// assert!(!is_valid_tag_name("#"));
/// assert!(!is_valid_tag_name("kunde"));
/// assert!(!is_valid_tag_name("#mit leerzeichen"));
/// ```
pub fn is_valid_tag_name(name: &str) -> bool {
    let len = name.chars().count();
    if !(TAG_NAME_MIN_LEN..=TAG_NAME_MAX_LEN).contains(&len) {
        return false;
    }
    name.strip_prefix('#').is_some_and(|rest| {
        !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}
