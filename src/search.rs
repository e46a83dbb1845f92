//! Search dispatch: decides between full-text and tag search and resolves
//! the matching contact IDs in the requested order.

use anyhow::Result;

use crate::models::ContactId;
use crate::sort::ContactOrder;
use crate::store::ContactStore;

/// A parsed search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchQuery {
    /// No term: every contact matches.
    All,
    /// Contacts holding every listed tag in the active state.
    ///
    /// Names are lowercase and unique. An empty list matches nothing.
    Tags(Vec<String>),
    /// Case-insensitive substring match over all searchable fields.
    Text(String),
}

impl SearchQuery {
    /// Parses a raw search string.
    ///
    /// A trimmed term starting with `#` selects tag search: whitespace
    /// separated tokens that start with `#` are kept, everything else is
    /// ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use rolodex::SearchQuery;
    ///
    /// assert_eq!(SearchQuery::parse(Some("  ")), SearchQuery::All);
    /// assert_eq!(
    ///     SearchQuery::parse(Some("#VIP foo #kunde")),
    ///     SearchQuery::Tags(vec!["#vip".to_string(), "#kunde".to_string()])
    /// );
    /// assert_eq!(
    ///     SearchQuery::parse(Some(" Berlin ")),
    ///     SearchQuery::Text("Berlin".to_string())
    /// );
    /// ```
    pub fn parse(raw: Option<&str>) -> Self {
        let term = raw.map(str::trim).unwrap_or("");
        if term.is_empty() {
            return Self::All;
        }

        if term.starts_with('#') {
            let mut names: Vec<String> = Vec::new();
            for token in term.split_whitespace().filter(|t| t.starts_with('#')) {
                let name = token.to_lowercase();
                if !names.contains(&name) {
                    names.push(name);
                }
            }
            return Self::Tags(names);
        }

        Self::Text(term.to_string())
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}

/// Resolves the IDs of contacts matching `query`, in `order`.
pub fn matching_ids<S: ContactStore + ?Sized>(
    store: &S,
    query: &SearchQuery,
    order: &ContactOrder,
) -> Result<Vec<ContactId>> {
    match query {
        SearchQuery::All => store.contact_ids(order),
        SearchQuery::Tags(names) if names.is_empty() => Ok(Vec::new()),
        SearchQuery::Tags(names) => store.contact_ids_with_all_active_tags(names, order),
        SearchQuery::Text(term) => store.search_contact_ids(term, order),
    }
}
