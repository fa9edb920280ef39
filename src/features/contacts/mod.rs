//! # Contacts Feature
//!
//! Contact records, the pure address-resolution functions that turn a phone
//! number into a canonical messaging destination, and the manager that is
//! the sole write path for contacts.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.3.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: ContactManager owns normalization on every write
//! - 1.0.0: Initial release with pure address resolution

use serde::{Deserialize, Serialize};

use crate::core::Config;
use crate::database::Database;
use crate::error::{Error, Result};

/// A person reminders can be sent to.
///
/// The engine reads contacts; it never mutates them outside of the upsert
/// path. `destination` is derived deterministically from `phone_e164` and is
/// the stable key for upserts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    pub name: String,
    /// Phone number exactly as the operator entered it.
    pub phone_raw: String,
    /// Normalized E.164 form, e.g. `+919876543210`.
    pub phone_e164: String,
    /// Canonical messaging-channel address, e.g. `919876543210@c.us`.
    pub destination: String,
    pub tags: String,
    pub note: String,
}

/// Normalize a free-form phone number to E.164.
///
/// Accepts `+` international form, `00` international prefixes, and bare
/// national numbers (which get `default_country_code` prepended). Rejects
/// anything outside 8-15 digits.
pub fn normalize_phone(raw: &str, default_country_code: &str) -> Result<String> {
    let trimmed = raw.trim();
    let has_plus = trimmed.starts_with('+');
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();

    let international = if has_plus {
        digits
    } else if let Some(rest) = digits.strip_prefix("00") {
        rest.to_string()
    } else if digits.len() == 10 {
        format!("{default_country_code}{digits}")
    } else {
        digits
    };

    if international.len() < 8 || international.len() > 15 || international.starts_with('0') {
        return Err(Error::InvalidPhone(raw.to_string()));
    }

    Ok(format!("+{international}"))
}

/// Derive the canonical destination address from an E.164 number.
///
/// Deterministic: digits only, suffixed with the channel's address domain.
pub fn destination_from_e164(e164: &str) -> String {
    let digits: String = e164.chars().filter(|c| c.is_ascii_digit()).collect();
    format!("{digits}@c.us")
}

/// Write-side surface for contacts.
///
/// Every persisted contact goes through here: the phone is normalized with
/// the configured country code and the destination derived from it, so a
/// stored destination always matches the stored phone.
#[derive(Clone)]
pub struct ContactManager {
    database: Database,
    default_country_code: String,
}

impl ContactManager {
    pub fn new(database: Database, config: &Config) -> Self {
        ContactManager {
            database,
            default_country_code: config.default_country_code.clone(),
        }
    }

    /// Normalize the phone and upsert. Rejects unparseable numbers before
    /// anything is written.
    pub async fn upsert(
        &self,
        name: &str,
        phone_raw: &str,
        tags: &str,
        note: &str,
    ) -> Result<Contact> {
        let e164 = normalize_phone(phone_raw, &self.default_country_code)?;
        self.database
            .upsert_contact(name, phone_raw, &e164, tags, note)
            .await
    }

    pub async fn get(&self, id: i64) -> Result<Contact> {
        self.database.get_contact(id).await
    }

    pub async fn list(&self, search: &str, tag: &str) -> Result<Vec<Contact>> {
        self.database.list_contacts(search, tag).await
    }
}
