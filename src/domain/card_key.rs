use std::collections::BTreeSet;
use std::fmt::{self, Display};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CardoError;

/// A validated card key of the form `<prefix>_<base36 id>`.
///
/// Guarantees:
/// - Prefix is 1-10 lowercase ascii letters
/// - Identifier is non-empty lowercase base36
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CardKey(String);

impl CardKey {
    pub fn new(key: &str) -> Result<Self, CardoError> {
        let Some((prefix, id)) = key.split_once('_') else {
            return Err(CardoError::InvalidInput(format!(
                "Card key '{key}' must be of the form '<prefix>_<id>'"
            )));
        };
        if !is_valid_prefix(prefix) {
            return Err(CardoError::InvalidInput(format!(
                "Card key '{key}' has an invalid prefix '{prefix}'"
            )));
        }
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) {
            return Err(CardoError::InvalidInput(format!(
                "Card key '{key}' has an invalid identifier '{id}'"
            )));
        }
        Ok(Self(key.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The project or module prefix, i.e. the text before the first `_`.
    pub fn prefix(&self) -> &str {
        self.0.split_once('_').map(|(p, _)| p).unwrap_or(&self.0)
    }

    /// The base36 identifier after the prefix.
    pub fn identifier(&self) -> &str {
        self.0.split_once('_').map(|(_, i)| i).unwrap_or("")
    }

    /// Mint the next free key under `prefix`, given every key already in use.
    ///
    /// Identifiers are base36; the minted key is one past the numerically
    /// largest existing identifier so that keys never collide even after
    /// deletions.
    pub fn mint(prefix: &str, existing: &BTreeSet<CardKey>) -> Result<Self, CardoError> {
        if !is_valid_prefix(prefix) {
            return Err(CardoError::InvalidInput(format!(
                "Card key prefix '{prefix}' must match ^[a-z]{{1,10}}$"
            )));
        }
        let next = existing
            .iter()
            .filter(|key| key.prefix() == prefix)
            .filter_map(|key| u64::from_str_radix(key.identifier(), 36).ok())
            .max()
            .map_or(1, |max| max + 1);
        Ok(Self(format!("{prefix}_{}", to_base36(next))))
    }
}

impl Display for CardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CardKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for CardKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for CardKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        CardKey::new(&s).map_err(serde::de::Error::custom)
    }
}

/// Text before the first `_` of a card key, without validating the rest.
pub fn module_name_from_card_key(key: &str) -> &str {
    key.split('_').next().unwrap_or(key)
}

pub(crate) fn is_valid_prefix(prefix: &str) -> bool {
    !prefix.is_empty() && prefix.len() <= 10 && prefix.chars().all(|c| c.is_ascii_lowercase())
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 digits are ascii")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_keys() {
        let key = CardKey::new("demo_1a").unwrap();
        assert_eq!(key.prefix(), "demo");
        assert_eq!(key.identifier(), "1a");
    }

    #[test]
    fn rejects_missing_separator_and_bad_prefix() {
        assert!(CardKey::new("demo1a").is_err());
        assert!(CardKey::new("Demo_1").is_err());
        assert!(CardKey::new("waytoolongprefix_1").is_err());
        assert!(CardKey::new("demo_").is_err());
    }

    #[test]
    fn mints_past_the_largest_identifier() {
        let mut existing = BTreeSet::new();
        existing.insert(CardKey::new("demo_5").unwrap());
        existing.insert(CardKey::new("demo_z").unwrap());
        existing.insert(CardKey::new("other_zz").unwrap());

        let minted = CardKey::mint("demo", &existing).unwrap();
        assert_eq!(minted.as_str(), "demo_10");
    }

    #[test]
    fn mints_one_in_an_empty_project() {
        let minted = CardKey::mint("demo", &BTreeSet::new()).unwrap();
        assert_eq!(minted.as_str(), "demo_1");
    }

    #[test]
    fn module_name_is_text_before_first_underscore() {
        assert_eq!(module_name_from_card_key("test_ab_c"), "test");
        assert_eq!(module_name_from_card_key("plain"), "plain");
    }
}
