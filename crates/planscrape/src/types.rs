use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// A ward option from the monthly-list search form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ward {
    /// Token submitted as `searchCriteria.ward`.
    pub value: String,
    pub name: String,
}

impl Ward {
    /// Builds a ward from a bare token, using the token as its display name.
    pub fn from_token(token: &str) -> Self {
        Self {
            value: token.to_string(),
            name: token.to_string(),
        }
    }
}

impl Display for Ward {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.value)
    }
}

/// One monthly-list search: a "Mon YY" month and a ward token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub month: String,
    pub ward: String,
}

impl Display for SearchCriteria {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} / {}", self.month, self.ward)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRecord {
    /// The portal's `keyVal` for the application.
    pub record_id: String,
    pub address: String,
}

/// One page of monthly-list search results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    pub next_page: Option<u32>,
    pub records: Vec<ListingRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl Display for ContactInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} <{}>",
            self.name.as_deref().unwrap_or("-"),
            self.email.as_deref().unwrap_or("-")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRow {
    pub address: String,
    pub name: Option<String>,
    pub email: String,
}

impl OutputRow {
    /// Combines a listing address with its contact details, keeping the row only
    /// when the email is present and is neither a `.gov` address nor mentions "tree".
    pub fn qualify(address: &str, contact: ContactInfo) -> Option<Self> {
        let email = contact.email.filter(|e| is_wanted_email(e))?;
        Some(Self {
            address: address.to_string(),
            name: contact.name,
            email,
        })
    }
}

impl Display for OutputRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} <{}>",
            self.address,
            self.name.as_deref().unwrap_or("-"),
            self.email
        )
    }
}

fn is_wanted_email(email: &str) -> bool {
    let lower = email.trim().to_lowercase();
    !lower.is_empty() && !lower.ends_with(".gov") && !lower.contains("tree")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(email: Option<&str>) -> ContactInfo {
        ContactInfo {
            name: Some("Jane Doe".to_string()),
            email: email.map(str::to_string),
        }
    }

    #[test]
    fn test_qualify_excludes_gov_email() {
        assert!(OutputRow::qualify("1 Guildhall", contact(Some("x@council.gov"))).is_none());
    }

    #[test]
    fn test_qualify_excludes_tree_email() {
        assert!(
            OutputRow::qualify("1 Guildhall", contact(Some("agent@treeservices.com"))).is_none()
        );
        assert!(
            OutputRow::qualify("1 Guildhall", contact(Some("info@OakTREE.co.uk"))).is_none()
        );
    }

    #[test]
    fn test_qualify_includes_regular_email() {
        let row = OutputRow::qualify("1 Guildhall", contact(Some("agent@example.com")))
            .expect("Row should qualify");
        assert_eq!(row.address, "1 Guildhall");
        assert_eq!(row.name.as_deref(), Some("Jane Doe"));
        assert_eq!(row.email, "agent@example.com");
    }

    #[test]
    fn test_qualify_requires_email() {
        assert!(OutputRow::qualify("1 Guildhall", contact(None)).is_none());
        assert!(OutputRow::qualify("1 Guildhall", contact(Some("   "))).is_none());
    }

    #[test]
    fn test_qualify_keeps_gov_uk_addresses() {
        assert!(OutputRow::qualify("1 Guildhall", contact(Some("planning@city.gov.uk"))).is_some());
    }

    #[test]
    fn test_output_row_display() {
        let row = OutputRow::qualify("1 Guildhall", contact(Some("agent@example.com"))).unwrap();
        assert_eq!(row.to_string(), "1 Guildhall: Jane Doe <agent@example.com>");

        let row = OutputRow {
            name: None,
            ..row
        };
        assert_eq!(row.to_string(), "1 Guildhall: - <agent@example.com>");
    }
}
