use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{ContactId, Tag, normalize_optional};

/// The user-editable fields of a contact.
///
/// Used both as the input for create/update and as the stored state of a
/// [`Contact`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDetails {
    pub salutation: Option<String>,
    pub given_name: String,
    pub family_name: String,
    pub street: String,
    pub postal_code: String,
    pub city: String,
    pub phone_primary: Option<String>,
    pub phone_secondary: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub note: Option<String>,
}

impl ContactDetails {
    /// Creates details with the required name and address fields set.
    ///
    /// # Examples
    ///
    /// ```
    /// use rolodex::ContactDetails;
    ///
    /// let details = ContactDetails::new("Max", "Mustermann", "Hauptstraße 1", "12345", "Berlin")
    ///     .with_company("ACME GmbH");
    /// assert_eq!(details.company.as_deref(), Some("ACME GmbH"));
    /// ```
    pub fn new(
        given_name: impl Into<String>,
        family_name: impl Into<String>,
        street: impl Into<String>,
        postal_code: impl Into<String>,
        city: impl Into<String>,
    ) -> Self {
        Self {
            given_name: given_name.into(),
            family_name: family_name.into(),
            street: street.into(),
            postal_code: postal_code.into(),
            city: city.into(),
            ..Default::default()
        }
    }

    pub fn with_salutation(mut self, salutation: impl Into<String>) -> Self {
        self.salutation = Some(salutation.into());
        self
    }

    pub fn with_phones(mut self, primary: impl Into<String>, secondary: Option<&str>) -> Self {
        self.phone_primary = Some(primary.into());
        self.phone_secondary = secondary.map(str::to_string);
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Trims surrounding whitespace from every field.
    pub fn trimmed(self) -> Self {
        fn trim(s: String) -> String {
            let trimmed = s.trim();
            if trimmed.len() == s.len() {
                s
            } else {
                trimmed.to_string()
            }
        }

        Self {
            salutation: self.salutation.map(trim),
            given_name: trim(self.given_name),
            family_name: trim(self.family_name),
            street: trim(self.street),
            postal_code: trim(self.postal_code),
            city: trim(self.city),
            phone_primary: self.phone_primary.map(trim),
            phone_secondary: self.phone_secondary.map(trim),
            email: self.email.map(trim),
            company: self.company.map(trim),
            note: self.note.map(trim),
        }
    }

    /// Stores blank optional fields as unset instead of empty strings.
    pub fn normalized(self) -> Self {
        Self {
            salutation: normalize_optional(self.salutation),
            phone_primary: normalize_optional(self.phone_primary),
            phone_secondary: normalize_optional(self.phone_secondary),
            email: normalize_optional(self.email),
            company: normalize_optional(self.company),
            note: normalize_optional(self.note),
            ..self
        }
    }

    /// Returns the case-insensitive identity of this contact.
    pub fn business_key(&self) -> BusinessKey {
        BusinessKey::of(self)
    }

    /// Returns every field covered by full-text search, unset fields as `None`.
    pub fn searchable_fields(&self) -> [Option<&str>; 11] {
        [
            self.salutation.as_deref(),
            Some(self.given_name.as_str()),
            Some(self.family_name.as_str()),
            Some(self.street.as_str()),
            Some(self.postal_code.as_str()),
            Some(self.city.as_str()),
            self.phone_primary.as_deref(),
            self.phone_secondary.as_deref(),
            self.email.as_deref(),
            self.company.as_deref(),
            self.note.as_deref(),
        ]
    }

    /// Returns true if any searchable field contains `needle`.
    ///
    /// `needle` must already be lowercase; unset fields behave like empty
    /// strings.
    pub fn matches_text(&self, needle: &str) -> bool {
        self.searchable_fields()
            .into_iter()
            .any(|field| field.unwrap_or("").to_lowercase().contains(needle))
    }
}

/// The case-insensitive (given name, family name, street, postal code, city)
/// tuple that identifies a contact independently of its storage ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BusinessKey {
    given_name: String,
    family_name: String,
    street: String,
    postal_code: String,
    city: String,
}

impl BusinessKey {
    /// Separates the parts of the storage form.
    const SEPARATOR: char = '\u{1f}';
    /// Precedes a literal separator or escape character inside a part.
    const ESCAPE: char = '\\';

    pub fn of(details: &ContactDetails) -> Self {
        Self {
            given_name: details.given_name.to_lowercase(),
            family_name: details.family_name.to_lowercase(),
            street: details.street.to_lowercase(),
            postal_code: details.postal_code.to_lowercase(),
            city: details.city.to_lowercase(),
        }
    }

    /// Returns the single-column form used by the store's unique index.
    ///
    /// Separator and escape characters inside a part are escaped, so two
    /// keys share a storage form only if all five parts are equal.
    pub fn storage_form(&self) -> String {
        let parts = [
            self.given_name.as_str(),
            self.family_name.as_str(),
            self.street.as_str(),
            self.postal_code.as_str(),
            self.city.as_str(),
        ];

        let mut form = String::with_capacity(parts.iter().map(|p| p.len() + 1).sum());
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                form.push(Self::SEPARATOR);
            }
            for ch in part.chars() {
                if ch == Self::SEPARATOR || ch == Self::ESCAPE {
                    form.push(Self::ESCAPE);
                }
                form.push(ch);
            }
        }
        form
    }
}

/// A stored contact together with all tags it holds.
///
/// Tags are listed by name and include locked tags: locking hides a tag from
/// assignment and search but never retracts it from a contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    #[serde(flatten)]
    pub details: ContactDetails,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub tags: Vec<Tag>,
}

impl Contact {
    /// Returns `"given family"` for display.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.details.given_name, self.details.family_name)
    }

    /// Returns true if the contact holds a tag with the given ID.
    pub fn has_tag(&self, id: super::TagId) -> bool {
        self.tags.iter().any(|tag| tag.id() == id)
    }

    /// Returns the contact's tag names in display order.
    pub fn tag_names(&self) -> Vec<&str> {
        self.tags.iter().map(Tag::name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mustermann() -> ContactDetails {
        ContactDetails::new("Max", "Mustermann", "Hauptstraße 1", "12345", "Berlin")
    }

    #[test]
    fn business_key_ignores_case() {
        let upper = mustermann();
        let lower = ContactDetails::new("max", "MUSTERMANN", "hauptstraße 1", "12345", "berlin");

        assert_eq!(upper.business_key(), lower.business_key());
        assert_eq!(
            upper.business_key().storage_form(),
            lower.business_key().storage_form()
        );
    }

    #[test]
    fn business_key_ignores_optional_fields() {
        let plain = mustermann();
        let with_company = mustermann().with_company("ACME").with_note("VIP");

        assert_eq!(plain.business_key(), with_company.business_key());
    }

    #[test]
    fn business_key_folds_non_ascii_letters() {
        let a = ContactDetails::new("Jürgen", "Öztürk", "Ölweg 2", "80331", "München");
        let b = ContactDetails::new("JÜRGEN", "ÖZTÜRK", "ÖLWEG 2", "80331", "MÜNCHEN");

        assert_eq!(a.business_key(), b.business_key());
    }

    #[test]
    fn storage_form_keeps_fields_apart() {
        let a = ContactDetails::new("ab", "c", "s", "1", "x");
        let b = ContactDetails::new("a", "bc", "s", "1", "x");

        assert_ne!(a.business_key().storage_form(), b.business_key().storage_form());
    }

    #[test]
    fn storage_form_escapes_separator_inside_fields() {
        let a = ContactDetails::new("a\u{1f}b", "c", "s", "1", "x");
        let b = ContactDetails::new("a", "b\u{1f}c", "s", "1", "x");
        let c = ContactDetails::new("a\\", "\u{1f}c", "s", "1", "x");
        let d = ContactDetails::new("a\\\u{1f}", "c", "s", "1", "x");

        assert_ne!(a.business_key(), b.business_key());
        assert_ne!(a.business_key().storage_form(), b.business_key().storage_form());
        assert_ne!(c.business_key().storage_form(), d.business_key().storage_form());
        assert_eq!(
            a.business_key().storage_form(),
            ContactDetails::new("A\u{1f}B", "C", "S", "1", "X")
                .business_key()
                .storage_form()
        );
    }

    #[test]
    fn trimmed_then_normalized_unsets_blank_optionals() {
        let details = ContactDetails {
            salutation: Some("  ".to_string()),
            phone_primary: Some(" 030 123 ".to_string()),
            phone_secondary: Some("\t".to_string()),
            email: Some(String::new()),
            company: Some("   ".to_string()),
            note: Some(" \n ".to_string()),
            ..ContactDetails::new(" Max ", "Mustermann ", "Hauptstraße 1", "12345", " Berlin")
        }
        .trimmed()
        .normalized();

        assert_eq!(details.given_name, "Max");
        assert_eq!(details.family_name, "Mustermann");
        assert_eq!(details.city, "Berlin");
        assert_eq!(details.phone_primary.as_deref(), Some("030 123"));
        assert_eq!(details.salutation, None);
        assert_eq!(details.phone_secondary, None);
        assert_eq!(details.email, None);
        assert_eq!(details.company, None);
        assert_eq!(details.note, None);
    }

    #[test]
    fn matches_text_checks_every_field() {
        let details = mustermann()
            .with_salutation("Herr")
            .with_phones("030-555", Some("0171-999"))
            .with_email("max@example.org")
            .with_company("ACME GmbH")
            .with_note("Trifft sich gern montags");

        for needle in [
            "herr", "max", "muster", "haupt", "123", "berl", "030-5", "0171", "example",
            "acme", "montags",
        ] {
            assert!(details.matches_text(needle), "should match {needle}");
        }
        assert!(!details.matches_text("hamburg"));
    }

    #[test]
    fn matches_text_never_matches_unset_field_as_null() {
        let details = mustermann();

        assert!(!details.matches_text("null"));
        assert!(!details.matches_text("none"));
    }
}
