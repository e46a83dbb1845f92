//! Sort keys, their deterministic column order, and order-preserving
//! hydration.
//!
//! Fetching contacts together with their tags is a one-to-many join, which
//! may both reorder and duplicate rows. Listings therefore run in two
//! phases: resolve the identifiers in the requested order without touching
//! tags, bulk-hydrate those identifiers in whatever order the store returns
//! them, then re-project the hydrated contacts into the identifier order.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::{Contact, ContactDetails, ContactId};
use crate::store::ContactStore;

/// A user-selectable sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortKey {
    /// `vorname`: given name, then family name.
    #[serde(rename = "vorname")]
    GivenName,
    /// `nachname`: family name, then given name.
    #[serde(rename = "nachname")]
    FamilyName,
    /// `firma`: company, then family name, then given name.
    #[serde(rename = "firma")]
    Company,
    /// `adresse`: city, then street, then family name, then given name.
    #[serde(rename = "adresse")]
    Address,
}

impl SortKey {
    /// Parses a sort key case-insensitively. Unknown keys yield `None`,
    /// which selects the default order.
    pub fn parse(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GivenName => "vorname",
            Self::FamilyName => "nachname",
            Self::Company => "firma",
            Self::Address => "adresse",
        }
    }

    fn columns(self) -> &'static [SortColumn] {
        use SortColumn::*;
        match self {
            Self::GivenName => &[GivenName, FamilyName],
            Self::FamilyName => &[FamilyName, GivenName],
            Self::Company => &[Company, FamilyName, GivenName],
            Self::Address => &[City, Street, FamilyName, GivenName],
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown sort key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sort key '{0}' (expected vorname, nachname, firma or adresse)")]
pub struct UnknownSortKey(pub String);

impl FromStr for SortKey {
    type Err = UnknownSortKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vorname" => Ok(Self::GivenName),
            "nachname" => Ok(Self::FamilyName),
            "firma" => Ok(Self::Company),
            "adresse" => Ok(Self::Address),
            _ => Err(UnknownSortKey(s.to_string())),
        }
    }
}

/// Sort direction. Anything other than `desc` (case-insensitive) is ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    #[serde(rename = "asc")]
    Ascending,
    #[serde(rename = "desc")]
    Descending,
}

impl SortDirection {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(dir) if dir.trim().eq_ignore_ascii_case("desc") => Self::Descending,
            _ => Self::Ascending,
        }
    }

    fn sql(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// A column participating in a contact ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    GivenName,
    FamilyName,
    Company,
    Street,
    City,
}

impl SortColumn {
    /// Column name in the `contacts` table.
    pub fn sql_column(self) -> &'static str {
        match self {
            Self::GivenName => "given_name",
            Self::FamilyName => "family_name",
            Self::Company => "company",
            Self::Street => "street",
            Self::City => "city",
        }
    }

    fn value(self, details: &ContactDetails) -> Option<&str> {
        match self {
            Self::GivenName => Some(details.given_name.as_str()),
            Self::FamilyName => Some(details.family_name.as_str()),
            Self::Company => details.company.as_deref(),
            Self::Street => Some(details.street.as_str()),
            Self::City => Some(details.city.as_str()),
        }
    }
}

const DEFAULT_COLUMNS: &[SortColumn] = &[SortColumn::FamilyName, SortColumn::GivenName];

/// A deterministic total order over contacts.
///
/// All columns apply in the same direction, compare case-insensitively and
/// place unset values first when ascending. Ties on every column fall back
/// to the contact ID ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactOrder {
    key: Option<SortKey>,
    columns: &'static [SortColumn],
    direction: SortDirection,
}

impl ContactOrder {
    /// Builds the order for an optional sort key.
    ///
    /// Without a key the default order (family name, given name, ascending)
    /// applies and `direction` is ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use rolodex::{ContactOrder, SortDirection, SortKey};
    ///
    /// let order = ContactOrder::new(Some(SortKey::Company), SortDirection::Descending);
    /// assert_eq!(
    ///     order.order_by_clause("c"),
    ///     "fold_case(c.company) DESC, fold_case(c.family_name) DESC, \
    ///      fold_case(c.given_name) DESC, c.id ASC"
    /// );
    /// ```
    pub fn new(key: Option<SortKey>, direction: SortDirection) -> Self {
        match key {
            Some(key) => Self {
                key: Some(key),
                columns: key.columns(),
                direction,
            },
            None => Self::default(),
        }
    }

    /// Resolves raw request parameters. Unknown keys select the default order.
    pub fn resolve(key: Option<&str>, direction: Option<&str>) -> Self {
        Self::new(key.and_then(SortKey::parse), SortDirection::parse(direction))
    }

    pub fn key(&self) -> Option<SortKey> {
        self.key
    }

    pub fn direction(&self) -> SortDirection {
        self.direction
    }

    pub fn columns(&self) -> &'static [SortColumn] {
        self.columns
    }

    /// Renders the SQL `ORDER BY` body for a `contacts` table aliased `alias`.
    ///
    /// Relies on the `fold_case` function registered by the database.
    pub fn order_by_clause(&self, alias: &str) -> String {
        let direction = self.direction.sql();
        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|column| format!("fold_case({alias}.{}) {direction}", column.sql_column()))
            .collect();
        parts.push(format!("{alias}.id ASC"));
        parts.join(", ")
    }

    /// Compares two contacts the same way `order_by_clause` sorts them.
    pub fn compare(
        &self,
        (a_id, a): (ContactId, &ContactDetails),
        (b_id, b): (ContactId, &ContactDetails),
    ) -> Ordering {
        self.columns
            .iter()
            .map(|column| {
                let left = column.value(a).map(str::to_lowercase);
                let right = column.value(b).map(str::to_lowercase);
                let ordering = left.cmp(&right);
                match self.direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| a_id.cmp(&b_id))
    }
}

impl Default for ContactOrder {
    fn default() -> Self {
        Self {
            key: None,
            columns: DEFAULT_COLUMNS,
            direction: SortDirection::Ascending,
        }
    }
}

/// Re-projects hydrated contacts into the order of `ids`.
///
/// IDs without a hydrated contact (e.g. deleted in between) are dropped;
/// duplicate hydrated rows collapse onto their ID.
pub fn reproject(ids: &[ContactId], hydrated: Vec<Contact>) -> Vec<Contact> {
    let mut by_id: HashMap<ContactId, Contact> = hydrated
        .into_iter()
        .map(|contact| (contact.id, contact))
        .collect();

    ids.iter().filter_map(|id| by_id.remove(id)).collect()
}

/// Hydrates `ids` with their tags, preserving the order of `ids`.
pub fn hydrate_in_order<S: ContactStore + ?Sized>(
    store: &S,
    ids: &[ContactId],
) -> anyhow::Result<Vec<Contact>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let hydrated = store.contacts_by_ids(ids)?;
    Ok(reproject(ids, hydrated))
}
