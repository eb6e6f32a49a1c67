//! Content-derived record identifiers.
//!
//! A [`Fingerprint`] is the SHA-256 digest of a group's key parts joined with
//! [`FINGERPRINT_SEPARATOR`]. The same digest can be produced client side
//! ([`Fingerprint::digest`]) or handed to MySQL as an expression
//! ([`Fingerprint::sql_expression`]) so that the engine derives the stored key
//! itself. Both sides agree because `SHA2(.., 256)` also yields lowercase hex.

use crate::constants::FINGERPRINT_SEPARATOR;
use crate::database::SqlValue;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    parts: Vec<String>,
}

impl Fingerprint {
    /// Build a fingerprint over the given ordered parts
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            parts: parts.into_iter().map(Into::into).collect(),
        }
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// Lowercase hex SHA-256 of the joined parts
    pub fn digest(&self) -> String {
        let joined = self.parts.join(FINGERPRINT_SEPARATOR);
        format!("{:x}", Sha256::digest(joined.as_bytes()))
    }

    /// Render as an unquoted SQL expression, pushing each part as a bound
    /// parameter.
    pub fn sql_expression(&self, params: &mut Vec<SqlValue>) -> String {
        let placeholders = vec!["?"; self.parts.len()].join(", ");
        params.extend(self.parts.iter().cloned().map(SqlValue::Text));
        format!("SHA2(CONCAT_WS('{FINGERPRINT_SEPARATOR}', {placeholders}), 256)")
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_stable_hex() {
        let fingerprint = Fingerprint::new(["2020", "January", "Monday", "morning", "6", "9"]);
        let digest = fingerprint.digest();

        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(digest, fingerprint.clone().digest());
    }

    #[test]
    fn test_known_digest() {
        // sha256("a|b")
        let fingerprint = Fingerprint::new(["a", "b"]);
        assert_eq!(
            fingerprint.digest(),
            "0eab8a0a3380abf4c7d1fb0b43b66aafbb64a4b953e4eb2dccca579461912d0c"
        );
    }

    #[test]
    fn test_part_boundaries_matter() {
        let first = Fingerprint::new(["ab", "c"]);
        let second = Fingerprint::new(["a", "bc"]);
        assert_ne!(first.digest(), second.digest());
    }

    #[test]
    fn test_sql_expression_binds_every_part() {
        let fingerprint = Fingerprint::new(["2020", "May", "Friday", "all_day", "", ""]);
        let mut params = Vec::new();
        let sql = fingerprint.sql_expression(&mut params);

        assert_eq!(sql, "SHA2(CONCAT_WS('|', ?, ?, ?, ?, ?, ?), 256)");
        assert_eq!(params.len(), 6);
        assert_eq!(params[4], SqlValue::Text(String::new()));
    }
}
